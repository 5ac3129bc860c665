use super::{Segment, SegmentProposer};
use crate::audio::decode::WaveForm;
use crate::audio::energy::{score_or_default, EnergyConfig};
use crate::error::{ProposerError, SignalAnalysisError};

pub const ENERGY_HEADLINE: &str = "LOUDEST MOMENT 🔊";
pub const ENERGY_REASON: &str = "Peak audio energy";

/// Proposes the single loudest window of the source audio. The transcript
/// is ignored, so this works without any transcription backend.
pub struct EnergyProposer {
    waveform: Result<WaveForm, SignalAnalysisError>,
    window_duration: f64,
    config: EnergyConfig,
}

impl EnergyProposer {
    /// `waveform` may be the extraction error; the proposer then returns
    /// the default window.
    pub fn new(
        waveform: Result<WaveForm, SignalAnalysisError>,
        window_duration: f64,
        config: EnergyConfig,
    ) -> Self {
        Self {
            waveform,
            window_duration,
            config,
        }
    }
}

impl SegmentProposer for EnergyProposer {
    fn name(&self) -> &str {
        "energy"
    }

    fn propose(&self, _transcript: &str) -> Result<Vec<Segment>, ProposerError> {
        let (start, end) =
            score_or_default(self.waveform.as_ref(), self.window_duration, &self.config);
        Ok(vec![Segment::new(start, end, ENERGY_HEADLINE, ENERGY_REASON)])
    }
}
