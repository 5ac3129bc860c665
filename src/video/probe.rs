//! FFprobe video information.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::MediaError;
use crate::tools;

/// Video file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Display width in pixels (after rotation)
    pub width: u32,
    /// Display height in pixels (after rotation)
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Video codec
    pub codec: String,
    pub has_audio: bool,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: Option<StreamTags>,
    #[serde(default)]
    side_data_list: Option<Vec<SideData>>,
}

#[derive(Debug, Deserialize)]
struct StreamTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SideData {
    rotation: Option<f64>,
}

/// Probe a video file for information.
pub fn probe_video(path: impl AsRef<Path>) -> Result<VideoInfo, MediaError> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let output = Command::new(tools::ffprobe()?)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    if !output.status.success() {
        return Err(MediaError::Probe(format!(
            "{} ({})",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    info_from_probe(probe)
}

fn info_from_probe(probe: FfprobeOutput) -> Result<VideoInfo, MediaError> {
    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    let duration = probe
        .format
        .duration
        .as_deref()
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| MediaError::InvalidVideo("Unknown duration".to_string()))?;

    let (mut width, mut height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(MediaError::InvalidVideo("Missing frame dimensions".to_string())),
    };

    if is_quarter_turn(video) {
        std::mem::swap(&mut width, &mut height);
    }

    let fps = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_rate))
        .unwrap_or(30.0);

    Ok(VideoInfo {
        duration,
        width,
        height,
        fps,
        codec: video.codec_name.clone().unwrap_or_else(|| "unknown".to_string()),
        has_audio,
    })
}

fn is_quarter_turn(stream: &FfprobeStream) -> bool {
    let from_side_data = stream
        .side_data_list
        .iter()
        .flatten()
        .find_map(|s| s.rotation);
    let from_tag = stream
        .tags
        .as_ref()
        .and_then(|t| t.rotate.as_deref())
        .and_then(|r| r.parse::<f64>().ok());

    from_side_data
        .or(from_tag)
        .map(|deg| (deg.abs().round() as i64 % 180) == 90)
        .unwrap_or(false)
}

/// "30000/1001" -> 29.97
fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Read-only handle on the input video. Cheap to share across segment
/// renders; each render opens its own decoder processes.
#[derive(Debug, Clone)]
pub struct SourceVideo {
    pub path: PathBuf,
    pub info: VideoInfo,
}

impl SourceVideo {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MediaError> {
        let path = path.as_ref().to_path_buf();
        let info = probe_video(&path)?;
        log::info!(
            "Source: {} ({}x{} @ {:.2}fps, {:.1}s, codec={}, audio={})",
            path.display(),
            info.width,
            info.height,
            info.fps,
            info.duration,
            info.codec,
            info.has_audio
        );
        Ok(Self { path, info })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<VideoInfo, MediaError> {
        info_from_probe(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn parses_landscape_source() {
        let info = parse(
            r#"{
                "format": {"duration": "2040.5"},
                "streams": [
                    {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
                     "r_frame_rate": "30/1", "avg_frame_rate": "30000/1001"},
                    {"codec_type": "audio", "codec_name": "aac"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert!((info.fps - 29.97).abs() < 0.01);
        assert_eq!(info.duration, 2040.5);
        assert!(info.has_audio);
    }

    #[test]
    fn rotated_phone_video_swaps_dimensions() {
        let info = parse(
            r#"{
                "format": {"duration": "12.0"},
                "streams": [
                    {"codec_type": "video", "width": 1920, "height": 1080, "avg_frame_rate": "0/0",
                     "r_frame_rate": "24/1", "side_data_list": [{"rotation": -90}]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!((info.width, info.height), (1080, 1920));
        assert_eq!(info.fps, 24.0);
        assert!(!info.has_audio);
    }

    #[test]
    fn missing_video_stream_is_invalid() {
        let err = parse(r#"{"format": {"duration": "3.0"}, "streams": [{"codec_type": "audio"}]}"#)
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidVideo(_)));
    }

    #[test]
    fn rate_parsing() {
        assert_eq!(parse_rate("24/1"), Some(24.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("garbage"), None);
    }
}
