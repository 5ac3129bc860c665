//! Candidate segment selection.
//!
//! A proposer turns a transcript into `(start, end, headline, reason)`
//! tuples. Whatever the backend does, [`propose_or_fallback`] never hands
//! the renderer an empty list.

pub mod energy;
pub mod gemini;
pub mod manual;

use serde::{Deserialize, Serialize};

use crate::error::ProposerError;

pub const FALLBACK_HEADLINE: &str = "VIRAL HIGHLIGHT 🔥";
pub const FALLBACK_REASON: &str = "Error fallback";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(alias = "start")]
    pub start_time: f64,
    #[serde(alias = "end")]
    pub end_time: f64,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub reason: String,
}

impl Segment {
    pub fn new(start_time: f64, end_time: f64, headline: &str, reason: &str) -> Self {
        Self {
            start_time,
            end_time,
            headline: headline.to_string(),
            reason: reason.to_string(),
        }
    }

    /// The first minute, used whenever a proposer has nothing usable.
    pub fn fallback() -> Self {
        Self::new(0.0, 60.0, FALLBACK_HEADLINE, FALLBACK_REASON)
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn is_valid(&self) -> bool {
        self.start_time.is_finite()
            && self.end_time.is_finite()
            && self.start_time >= 0.0
            && self.end_time > self.start_time
    }

    pub fn overlaps(&self, other: &Segment) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}

pub trait SegmentProposer {
    fn name(&self) -> &str;
    fn propose(&self, transcript: &str) -> Result<Vec<Segment>, ProposerError>;
}

/// Run `proposer`, falling back to [`Segment::fallback`] on error or when no
/// usable segment remains after [`sanitize`].
pub fn propose_or_fallback(proposer: &dyn SegmentProposer, transcript: &str) -> Vec<Segment> {
    match proposer.propose(transcript) {
        Ok(segments) => {
            let proposed = segments.len();
            let segments = sanitize(segments);
            if segments.is_empty() {
                log::warn!(
                    "{} proposed {} segment(s), none usable; using fallback",
                    proposer.name(),
                    proposed
                );
                return vec![Segment::fallback()];
            }
            log::info!("{} proposed {} segment(s)", proposer.name(), segments.len());
            segments
        }
        Err(e) => {
            log::warn!("{} failed: {}; using fallback", proposer.name(), e);
            vec![Segment::fallback()]
        }
    }
}

/// Drop invalid entries and any entry overlapping one already kept.
/// Order is preserved.
pub fn sanitize(segments: Vec<Segment>) -> Vec<Segment> {
    let mut kept: Vec<Segment> = Vec::with_capacity(segments.len());
    for segment in segments {
        if !segment.is_valid() {
            log::warn!(
                "Dropping invalid segment {:.2}-{:.2} {:?}",
                segment.start_time,
                segment.end_time,
                segment.headline
            );
            continue;
        }
        if let Some(prior) = kept.iter().find(|k| k.overlaps(&segment)) {
            log::warn!(
                "Dropping segment {:.2}-{:.2} {:?}: overlaps {:.2}-{:.2}",
                segment.start_time,
                segment.end_time,
                segment.headline,
                prior.start_time,
                prior.end_time
            );
            continue;
        }
        kept.push(segment);
    }
    kept
}
