//! Speech-to-text behind a capability trait.
//!
//! The pipeline only needs a transcript string to hand to the segment
//! proposer. Where it comes from is up to the caller: a text file, or a
//! local Whisper model when built with the `transcribe` feature.

#[cfg(feature = "transcribe")]
pub mod model;
#[cfg(feature = "transcribe")]
pub mod whisper;

#[cfg(any(test, feature = "transcribe"))]
use std::fmt::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::audio::decode::WaveForm;

/// Seconds between inline `[12.0s]` markers in a word transcript
#[cfg(any(test, feature = "transcribe"))]
const MARKER_INTERVAL: f32 = 10.0;

pub trait Transcriber {
    fn transcribe(&self, audio: &WaveForm) -> Result<String>;
}

/// A word with timing, in seconds from the start of the audio.
#[cfg(any(test, feature = "transcribe"))]
#[derive(Clone, Debug, PartialEq)]
pub struct TimedWord {
    pub text: String,
    pub start_time: f32,
    pub end_time: f32,
}

/// Join words into one transcript, with a time marker at the start and
/// then at least every ten seconds, so a proposer can cite timestamps.
#[cfg(any(test, feature = "transcribe"))]
pub fn format_transcript(words: &[TimedWord]) -> String {
    let mut out = String::new();
    let mut next_marker = f32::NEG_INFINITY;
    for word in words {
        if word.start_time >= next_marker {
            if !out.is_empty() {
                out.push('\n');
            }
            let _ = write!(out, "[{:.1}s]", word.start_time);
            next_marker = word.start_time + MARKER_INTERVAL;
        }
        out.push(' ');
        out.push_str(&word.text);
    }
    out
}

/// Reads a transcript prepared elsewhere; the audio is ignored.
pub struct FileTranscript {
    path: PathBuf,
}

impl FileTranscript {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Transcriber for FileTranscript {
    fn transcribe(&self, _audio: &WaveForm) -> Result<String> {
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read transcript {}", self.path.display()))?;
        log::info!(
            "Loaded transcript from {} ({} chars)",
            self.path.display(),
            text.chars().count()
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, start: f32) -> TimedWord {
        TimedWord {
            text: text.into(),
            start_time: start,
            end_time: start + 0.4,
        }
    }

    #[test]
    fn markers_every_ten_seconds() {
        let words = [
            word("so", 0.5),
            word("here", 3.0),
            word("is", 11.0),
            word("the", 11.2),
            word("point", 25.0),
        ];
        assert_eq!(
            format_transcript(&words),
            "[0.5s] so here\n[11.0s] is the\n[25.0s] point"
        );
        assert_eq!(format_transcript(&[]), "");
    }

    #[test]
    fn file_transcript_reads_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("talk.txt");
        std::fs::write(&path, "hello world").unwrap();
        let audio = WaveForm::new(vec![], 16000);
        assert_eq!(FileTranscript::new(&path).transcribe(&audio).unwrap(), "hello world");
        assert!(FileTranscript::new(dir.path().join("missing.txt"))
            .transcribe(&audio)
            .is_err());
    }
}
