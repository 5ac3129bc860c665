use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProposerKind {
    /// Ask Gemini for the most engaging segments of the transcript
    Gemini,
    /// Loudest window of the audio track
    Energy,
    /// Segments given with --segment
    Manual,
}

#[derive(Parser, Debug)]
#[command(
    name = "pulsepoint",
    about = "Cut vertical, captioned short clips out of long-form video"
)]
pub struct Cli {
    /// Input video file (MP4, MOV, MKV)
    pub input: PathBuf,

    /// Output directory for rendered clips
    #[arg(short, long, default_value = "reels")]
    pub output: PathBuf,

    /// Path to a TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// How segments are chosen. Defaults to manual when --segment is given.
    #[arg(short, long, value_enum)]
    pub proposer: Option<ProposerKind>,

    /// Segment as START:END:HEADLINE in seconds (repeatable)
    #[arg(short, long = "segment")]
    pub segments: Vec<String>,

    /// Use an existing transcript instead of running speech recognition
    #[arg(short, long)]
    pub transcript: Option<PathBuf>,

    /// Energy window length in seconds
    #[arg(long, default_value_t = 60.0)]
    pub window: f64,

    /// Print the loudest window of the given length and exit
    #[arg(long)]
    pub analyze: bool,

    /// Gemini model name
    #[arg(long, default_value = crate::propose::gemini::DEFAULT_MODEL)]
    pub model: String,

    /// Number of segments to request from Gemini
    #[arg(long, default_value_t = 3)]
    pub max_segments: usize,

    /// Whisper model: tiny, base, small, medium, large, or a path to a ggml .bin file
    #[arg(long, default_value = "base")]
    pub whisper_model: String,

    /// Transcription language (e.g. "en"). Auto-detected when omitted.
    #[arg(long)]
    pub language: Option<String>,

    /// Caption font file (TTF/OTF)
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Download the caption font from a URL
    #[arg(long)]
    pub font_url: Option<String>,

    /// Output height in pixels; width follows the 9:16 crop
    #[arg(long, default_value_t = 1920)]
    pub height: u32,

    /// Output frames per second
    #[arg(long, default_value_t = 24)]
    pub fps: u32,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// Encoder preset
    #[arg(long, default_value = "ultrafast")]
    pub preset: String,

    /// CRF quality (0-51, lower = better)
    #[arg(long, default_value_t = 23)]
    pub crf: u32,

    /// Encoder threads
    #[arg(long, default_value_t = 4)]
    pub threads: u32,

    /// Hide the per-clip progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl Cli {
    pub fn proposer_kind(&self) -> ProposerKind {
        match self.proposer {
            Some(kind) => kind,
            None if !self.segments.is_empty() => ProposerKind::Manual,
            None => ProposerKind::Gemini,
        }
    }
}
