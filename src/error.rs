//! Error types for the clip pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Audio could not be loaded, decoded, or scored.
#[derive(Debug, Error)]
pub enum SignalAnalysisError {
    #[error("audio extraction failed: {0}")]
    Extraction(String),

    #[error("audio decode failed: {0}")]
    Decode(String),

    #[error("no audio track found")]
    NoAudioTrack,

    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("invalid window duration: {0}")]
    InvalidWindow(f64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The subject detector could not process a frame. Never leaves the locator.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("frame has zero size ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },

    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("detector failed: {0}")]
    Detector(String),
}

/// Malformed crop planning input. Always a caller bug.
#[derive(Debug, Error, PartialEq)]
pub enum PlanningError {
    #[error("frame dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("target aspect must be finite and positive, got {0}")]
    InvalidAspect(f64),

    #[error("subject coordinate must be finite, got {0}")]
    InvalidSubject(f64),
}

/// ffmpeg / ffprobe subprocess failures.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    Ffmpeg {
        message: String,
        stderr: Option<String>,
    },

    #[error("FFprobe failed: {0}")]
    Probe(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    pub fn ffmpeg(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::Ffmpeg {
            message: message.into(),
            stderr,
        }
    }
}

/// A single segment could not be rendered.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid segment: {0}")]
    InvalidSegment(String),

    #[error("segment starts at {start:.2}s but the source is only {duration:.2}s long")]
    OutOfRange { start: f64, duration: f64 },

    #[error("crop planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error("no frames decoded for {start:.2}s-{end:.2}s")]
    EmptyClip { start: f64, end: f64 },

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Malformed inputs abort the whole batch; everything else is contained
    /// to the segment that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidSegment(_) | Self::Planning(_))
    }
}

/// The external segment proposer failed.
#[derive(Debug, Error)]
pub enum ProposerError {
    #[error("Gemini API key not configured (set GEMINI_API_KEY or [proposer].api_key)")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no content in response")]
    EmptyResponse,

    #[error("failed to parse segments: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid segment spec '{0}' (expected START:END:HEADLINE)")]
    InvalidSpec(String),

}
