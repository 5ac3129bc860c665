use std::path::Path;

use anyhow::{Context, Result};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{format_transcript, TimedWord, Transcriber};
use crate::audio::decode::WaveForm;

const WHISPER_RATE: u32 = 16_000;

/// Local Whisper model. Owned by the caller and reused across runs; there
/// is no process-wide model cache.
pub struct WhisperTranscriber {
    ctx: WhisperContext,
    language: Option<String>,
}

impl WhisperTranscriber {
    pub fn new(model_path: &Path, language: Option<&str>) -> Result<Self> {
        let ctx = WhisperContext::new_with_params(
            model_path
                .to_str()
                .context("Model path contains invalid UTF-8")?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize Whisper context: {}", e))?;

        Ok(Self {
            ctx,
            language: language.map(String::from),
        })
    }

    /// Word-level transcription of mono audio at any sample rate.
    pub fn words(&self, audio: &WaveForm) -> Result<Vec<TimedWord>> {
        let samples = if audio.sample_rate() != WHISPER_RATE {
            resample(audio.samples(), audio.sample_rate())?
        } else {
            audio.samples().to_vec()
        };

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_token_timestamps(true);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        if let Some(ref lang) = self.language {
            params.set_language(Some(lang));
        }

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| anyhow::anyhow!("Failed to create Whisper state: {}", e))?;
        state
            .full(params, &samples)
            .map_err(|e| anyhow::anyhow!("Whisper transcription failed: {}", e))?;

        let mut words = Vec::new();
        for i in 0..state.full_n_segments() {
            let segment = state
                .get_segment(i)
                .ok_or_else(|| anyhow::anyhow!("Segment {} out of bounds", i))?;

            let mut pending = PendingWord::default();
            for j in 0..segment.n_tokens() {
                let Some(token) = segment.get_token(j) else {
                    continue;
                };
                let data = token.token_data();
                if data.id < 0 {
                    continue;
                }
                let Ok(bytes) = token.to_bytes() else {
                    continue;
                };
                // [_BEG_], [_TT_123] and friends
                if bytes.is_empty() || (bytes.starts_with(b"[_") && bytes.ends_with(b"]")) {
                    continue;
                }
                // A leading space (or BPE 'Ġ') opens a new word
                if bytes.starts_with(b" ") || bytes.starts_with(&[0xC4, 0xA0]) {
                    words.extend(pending.take());
                }
                pending.push(bytes, data.t0, data.t1);
            }
            words.extend(pending.take());
        }

        log::debug!("Token reassembly produced {} words", words.len());
        Ok(words)
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, audio: &WaveForm) -> Result<String> {
        log::info!("Transcribing {:.1}s of audio with Whisper...", audio.duration());
        let words = self.words(audio)?;
        log::info!("Whisper returned {} words", words.len());
        Ok(format_transcript(&words))
    }
}

/// Token bytes accumulated for the word being built. Timestamps are in
/// Whisper's 10 ms units.
#[derive(Default)]
struct PendingWord {
    bytes: Vec<u8>,
    t0: Option<i64>,
    t1: i64,
}

impl PendingWord {
    fn push(&mut self, bytes: &[u8], t0: i64, t1: i64) {
        self.t0.get_or_insert(t0);
        self.t1 = t1;
        self.bytes.extend_from_slice(bytes);
    }

    fn take(&mut self) -> Option<TimedWord> {
        let t0 = self.t0.take()?;
        let text = String::from_utf8_lossy(&self.bytes).trim().to_string();
        self.bytes.clear();
        if text.is_empty() {
            return None;
        }
        Some(TimedWord {
            text,
            start_time: t0 as f32 / 100.0,
            end_time: self.t1 as f32 / 100.0,
        })
    }
}

fn resample(samples: &[f32], from_rate: u32) -> Result<Vec<f32>> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
        WindowFunction,
    };

    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = WHISPER_RATE as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .context("Failed to create resampler")?;

    let output = resampler
        .process(&[samples.to_vec()], None)
        .context("Resampling failed")?;
    Ok(output.into_iter().next().unwrap_or_default())
}
