use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::render::overlay::OverlayStyle;

const CONFIG_NAME: &str = "pulsepoint.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub overlay: OverlayStyle,
    #[serde(default)]
    pub proposer: ProposerConfig,
    #[serde(default)]
    pub transcribe: TranscribeConfig,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
    #[serde(default = "default_threads")]
    pub threads: u32,
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
    pub font: Option<PathBuf>,
    pub font_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_window")]
    pub window: f64,
    #[serde(default = "default_frame_length")]
    pub frame_length: usize,
    #[serde(default = "default_hop_length")]
    pub hop_length: usize,
}

#[derive(Debug, Deserialize)]
pub struct ProposerConfig {
    #[serde(default = "default_model")]
    pub model: String,
    pub api_key: Option<String>,
    #[serde(default = "default_max_segments")]
    pub max_segments: usize,
}

#[derive(Debug, Deserialize)]
pub struct TranscribeConfig {
    #[serde(default = "default_whisper_model")]
    pub model: String,
    pub language: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            height: default_height(),
            fps: default_fps(),
            codec: default_codec(),
            preset: default_preset(),
            crf: default_crf(),
            pix_fmt: default_pix_fmt(),
            threads: default_threads(),
            audio_bitrate: default_audio_bitrate(),
            font: None,
            font_url: None,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            frame_length: default_frame_length(),
            hop_length: default_hop_length(),
        }
    }
}

impl Default for ProposerConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            max_segments: default_max_segments(),
        }
    }
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            model: default_whisper_model(),
            language: None,
        }
    }
}

fn default_height() -> u32 { 1920 }
fn default_fps() -> u32 { 24 }
fn default_codec() -> String { "libx264".into() }
fn default_preset() -> String { "ultrafast".into() }
fn default_crf() -> u32 { 23 }
fn default_pix_fmt() -> String { "yuv420p".into() }
fn default_threads() -> u32 { 4 }
fn default_audio_bitrate() -> String { "192k".into() }
fn default_window() -> f64 { 60.0 }
fn default_frame_length() -> usize { crate::audio::energy::FRAME_LENGTH }
fn default_hop_length() -> usize { crate::audio::energy::HOP_LENGTH }
fn default_model() -> String { crate::propose::gemini::DEFAULT_MODEL.into() }
fn default_max_segments() -> usize { 3 }
fn default_whisper_model() -> String { "base".into() }

/// Explicit path, else `./pulsepoint.toml`, else the user config dirs.
pub fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_NAME);
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("pulsepoint").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("pulsepoint").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}
