use std::io::Write;
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::error::MediaError;
use crate::tools::{self, StderrTail};
use crate::video::frame::Frame;

#[derive(Clone, Debug)]
pub struct EncodeSettings {
    pub fps: u32,
    pub codec: String,
    /// Only passed when set; not every codec understands it
    pub preset: Option<String>,
    pub crf: Option<u32>,
    pub pix_fmt: String,
    pub threads: u32,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            fps: 24,
            codec: "libx264".into(),
            preset: Some("ultrafast".into()),
            crf: Some(23),
            pix_fmt: "yuv420p".into(),
            threads: 4,
            audio_codec: "aac".into(),
            audio_bitrate: "192k".into(),
        }
    }
}

/// Source range whose audio is muxed under the encoded frames.
#[derive(Clone, Copy, Debug)]
pub struct AudioRange<'a> {
    pub source: &'a Path,
    pub start: f64,
    pub duration: f64,
}

/// ffmpeg process consuming raw RGB24 frames on stdin.
///
/// Stderr is drained in the background and kept for error reports.
/// Dropping an unfinished encoder kills the process; the caller owns
/// removal of whatever it wrote.
pub struct FfmpegEncoder {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr: Option<StderrTail>,
    frame_len: usize,
    frames_written: u64,
}

impl FfmpegEncoder {
    pub fn new(
        output_path: &Path,
        audio: AudioRange<'_>,
        width: u32,
        height: u32,
        settings: &EncodeSettings,
    ) -> Result<Self, MediaError> {
        Self::spawn(&tools::ffmpeg()?, output_path, audio, width, height, settings)
    }

    fn spawn(
        program: &Path,
        output_path: &Path,
        audio: AudioRange<'_>,
        width: u32,
        height: u32,
        settings: &EncodeSettings,
    ) -> Result<Self, MediaError> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-v".into(), "error".into(),
            "-f".into(), "rawvideo".into(),
            "-pixel_format".into(), "rgb24".into(),
            "-video_size".into(), format!("{}x{}", width, height),
            "-framerate".into(), settings.fps.to_string(),
            "-i".into(), "pipe:0".into(),
            "-ss".into(), format!("{:.3}", audio.start),
            "-t".into(), format!("{:.3}", audio.duration),
        ];

        let mut command = Command::new(program);
        command.args(&args).arg("-i").arg(audio.source);
        args.clear();

        args.extend([
            "-map".into(), "0:v:0".into(),
            "-map".into(), "1:a:0?".into(),
            "-c:v".into(), settings.codec.clone(),
            "-pix_fmt".into(), settings.pix_fmt.clone(),
            "-threads".into(), settings.threads.to_string(),
        ]);

        if let Some(ref preset) = settings.preset {
            args.extend(["-preset".to_string(), preset.clone()]);
        }
        if let Some(crf) = settings.crf {
            args.extend(["-crf".to_string(), crf.to_string()]);
        }

        args.extend([
            "-c:a".into(), settings.audio_codec.clone(),
            "-b:a".into(), settings.audio_bitrate.clone(),
            "-shortest".into(),
        ]);

        let mut child = command
            .args(&args)
            .arg(output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child.stdin.take();
        let stderr = StderrTail::capture(&mut child);

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            width,
            height,
            settings.fps,
            settings.codec
        );

        Ok(Self {
            child: Some(child),
            stdin,
            stderr: Some(stderr),
            frame_len: width as usize * height as usize * 3,
            frames_written: 0,
        })
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), MediaError> {
        if frame.data.len() != self.frame_len {
            return Err(MediaError::ffmpeg(
                format!(
                    "frame is {} bytes, encoder expects {}",
                    frame.data.len(),
                    self.frame_len
                ),
                None,
            ));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::ffmpeg("FFmpeg stdin not available", None))?;
        stdin.write_all(&frame.data)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Close stdin and wait for the muxer. Returns the number of frames written.
    pub fn finish(mut self) -> Result<u64, MediaError> {
        // Close stdin to signal EOF
        drop(self.stdin.take());

        let Some(mut child) = self.child.take() else {
            return Ok(self.frames_written);
        };
        let status = child.wait()?;
        let stderr = self.stderr.take().map(StderrTail::join).unwrap_or_default();

        if !status.success() {
            return Err(MediaError::ffmpeg(
                format!("encoder exited with {}", status),
                Some(stderr),
            ));
        }

        log::info!("FFmpeg encoding complete ({} frames)", self.frames_written);
        Ok(self.frames_written)
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        drop(self.stderr.take());
    }
}
