use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use super::frame::Frame;
use super::probe::SourceVideo;
use crate::error::MediaError;
use crate::tools::{self, StderrTail};

/// A time range of a source video. Decoding happens on demand; nothing is
/// held open between calls.
#[derive(Debug, Clone, Copy)]
pub struct SubClip<'a> {
    pub source: &'a SourceVideo,
    pub start: f64,
    pub end: f64,
}

impl<'a> SubClip<'a> {
    pub fn new(source: &'a SourceVideo, start: f64, end: f64) -> Self {
        Self { source, start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn midpoint(&self) -> f64 {
        self.start + self.duration() / 2.0
    }

    pub fn width(&self) -> u32 {
        self.source.info.width
    }

    pub fn height(&self) -> u32 {
        self.source.info.height
    }

    /// Decode the single frame at absolute time `t`.
    pub fn frame_at(&self, t: f64) -> Result<Frame, MediaError> {
        let (width, height) = (self.width(), self.height());
        let seek = format!("{:.3}", t);
        let output = Command::new(tools::ffmpeg()?)
            .args(["-v", "error", "-ss", seek.as_str(), "-i"])
            .arg(&self.source.path)
            .args(["-frames:v", "1", "-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        if !output.status.success() {
            return Err(MediaError::ffmpeg(
                format!("frame grab at {:.2}s failed", t),
                Some(String::from_utf8_lossy(&output.stderr).to_string()),
            ));
        }

        let expected = width as usize * height as usize * 3;
        if output.stdout.len() < expected {
            return Err(MediaError::ffmpeg(
                format!(
                    "frame grab at {:.2}s returned {} bytes, expected {}",
                    t,
                    output.stdout.len(),
                    expected
                ),
                None,
            ));
        }

        let mut data = output.stdout;
        data.truncate(expected);
        Ok(Frame::new(width, height, data))
    }

    /// Stream every frame of the range, resampled to `fps`.
    pub fn frames(&self, fps: u32) -> Result<FrameReader, MediaError> {
        FrameReader::open(
            &self.source.path,
            self.start,
            self.duration(),
            fps,
            self.width(),
            self.height(),
        )
    }
}

/// ffmpeg decoding subprocess emitting raw RGB24 frames on stdout.
///
/// Stderr is drained in the background, so a noisy decoder cannot stall the
/// frame stream. The child is killed if the reader is dropped before the
/// stream ends.
pub struct FrameReader {
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr: Option<StderrTail>,
    width: u32,
    height: u32,
    frames_read: u64,
}

impl FrameReader {
    pub fn open(
        path: &Path,
        start: f64,
        duration: f64,
        fps: u32,
        width: u32,
        height: u32,
    ) -> Result<Self, MediaError> {
        Self::spawn(&tools::ffmpeg()?, path, start, duration, fps, width, height)
    }

    fn spawn(
        program: &Path,
        path: &Path,
        start: f64,
        duration: f64,
        fps: u32,
        width: u32,
        height: u32,
    ) -> Result<Self, MediaError> {
        let seek = format!("{:.3}", start);
        let length = format!("{:.3}", duration);
        let rate = fps.to_string();
        let mut child = Command::new(program)
            .args(["-v", "error", "-ss", seek.as_str(), "-i"])
            .arg(path)
            .args([
                "-t",
                length.as_str(),
                "-an",
                "-r",
                rate.as_str(),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::ffmpeg("decoder stdout not available", None))?;
        let stderr = StderrTail::capture(&mut child);

        log::debug!(
            "Decoder started: {:.2}s +{:.2}s @ {}fps, {}x{}",
            start,
            duration,
            fps,
            width,
            height
        );

        Ok(Self {
            child: Some(child),
            stdout: Some(stdout),
            stderr: Some(stderr),
            width,
            height,
            frames_read: 0,
        })
    }

    /// `Ok(None)` at end of stream. A trailing partial frame is dropped.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, MediaError> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };
        let mut data = vec![0u8; self.width as usize * self.height as usize * 3];
        match stdout.read_exact(&mut data) {
            Ok(()) => {
                self.frames_read += 1;
                Ok(Some(Frame::new(self.width, self.height, data)))
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Wait for the decoder and surface its exit status.
    pub fn finish(mut self) -> Result<(), MediaError> {
        drop(self.stdout.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait()?;
        let stderr = self.stderr.take().map(StderrTail::join).unwrap_or_default();
        if !status.success() {
            return Err(MediaError::ffmpeg(
                format!("decoder exited with {}", status),
                Some(stderr),
            ));
        }
        Ok(())
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        drop(self.stdout.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        // The drain thread ends on its own once the pipe closes
        drop(self.stderr.take());
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    use crate::tools::{fake_tool, stderr_flood};

    fn spawn_fake(body: &str, width: u32, height: u32) -> (tempfile::TempDir, FrameReader) {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_tool(dir.path(), body);
        let reader = FrameReader::spawn(
            &program,
            Path::new("source.mp4"),
            0.0,
            1.0,
            24,
            width,
            height,
        )
        .unwrap();
        (dir, reader)
    }

    #[test]
    fn noisy_decoder_still_delivers_frames() {
        // Far more stderr than a pipe buffer holds, then one 4x4 frame
        let body = format!("{}
head -c 48 /dev/zero", stderr_flood(3000));
        let (_dir, mut reader) = spawn_fake(&body, 4, 4);

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let first = reader.next_frame().map(|f| f.map(|f| f.data.len()));
            let second = reader.next_frame().map(|f| f.is_some());
            let finished = reader.finish();
            let _ = tx.send((first, second, finished));
        });

        let (first, second, finished) = rx
            .recv_timeout(Duration::from_secs(20))
            .expect("decoder stalled on stderr");
        assert_eq!(first.unwrap(), Some(48));
        assert!(!second.unwrap());
        finished.unwrap();
    }

    #[test]
    fn failed_decoder_reports_stderr_tail() {
        let body = format!("{}
echo 'Invalid data found' >&2
exit 1", stderr_flood(3000));
        let (_dir, mut reader) = spawn_fake(&body, 4, 4);

        assert!(reader.next_frame().unwrap().is_none());
        match reader.finish() {
            Err(MediaError::Ffmpeg {
                stderr: Some(stderr),
                ..
            }) => {
                assert!(stderr.len() <= tools::STDERR_TAIL);
                assert!(stderr.contains("Invalid data found"));
            }
            other => panic!("expected an ffmpeg error, got {:?}", other),
        }
    }

    #[test]
    fn dropping_mid_stream_kills_the_decoder() {
        let (_dir, mut reader) = spawn_fake("while :; do head -c 48 /dev/zero; done", 4, 4);
        assert!(reader.next_frame().unwrap().is_some());
        drop(reader);
    }
}
