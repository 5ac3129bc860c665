// Resolves the ffmpeg/ffprobe binaries and drains their stderr.
// Order: PULSEPOINT_FFMPEG / PULSEPOINT_FFPROBE override, then PATH.

use std::env;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::process::Child;
use std::thread::JoinHandle;

use crate::error::MediaError;

/// Bytes of child stderr kept for error reports; older output is dropped.
pub const STDERR_TAIL: usize = 64 * 1024;

fn resolve(env_key: &str, name: &str) -> Option<PathBuf> {
    if let Ok(v) = env::var(env_key) {
        let p = PathBuf::from(v);
        if p.exists() {
            return Some(p);
        }
        log::warn!("{} points at a missing file, falling back to PATH", env_key);
    }
    which::which(name).ok()
}

pub fn ffmpeg() -> Result<PathBuf, MediaError> {
    resolve("PULSEPOINT_FFMPEG", "ffmpeg").ok_or(MediaError::FfmpegNotFound)
}

pub fn ffprobe() -> Result<PathBuf, MediaError> {
    resolve("PULSEPOINT_FFPROBE", "ffprobe").ok_or(MediaError::FfprobeNotFound)
}

/// Reads a child's stderr on a background thread so the child never stalls
/// on a full pipe. Only the last [`STDERR_TAIL`] bytes are kept.
pub struct StderrTail {
    handle: Option<JoinHandle<Vec<u8>>>,
}

impl StderrTail {
    /// Take the child's piped stderr, if any, and start draining it.
    pub fn capture(child: &mut Child) -> Self {
        let handle = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut tail = Vec::new();
                let mut buf = [0u8; 8192];
                loop {
                    match stderr.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            tail.extend_from_slice(&buf[..n]);
                            if tail.len() > STDERR_TAIL * 2 {
                                tail.drain(..tail.len() - STDERR_TAIL);
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(_) => break,
                    }
                }
                if tail.len() > STDERR_TAIL {
                    tail.drain(..tail.len() - STDERR_TAIL);
                }
                tail
            })
        });
        Self { handle }
    }

    /// Wait for the child to close stderr and return what was kept.
    /// Call after the child has exited or been killed.
    pub fn join(mut self) -> String {
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Some(Err(_)) => {
                log::warn!("stderr reader thread panicked");
                String::new()
            }
            None => String::new(),
        }
    }
}

/// True when both binaries are available. Used by tests that need real media.
#[cfg(test)]
pub fn media_tools_available() -> bool {
    ffmpeg().is_ok() && ffprobe().is_ok()
}

/// Write an executable shell script standing in for ffmpeg.
#[cfg(all(test, unix))]
pub fn fake_tool(dir: &std::path::Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-ffmpeg");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Shell loop printing `lines` decoder complaints to stderr.
#[cfg(all(test, unix))]
pub fn stderr_flood(lines: u32) -> String {
    format!(
        "i=0\nwhile [ $i -lt {} ]; do\n  echo \"[h264 @ 0x55d] error while decoding MB 12 7, bytestream -5\" >&2\n  i=$((i+1))\ndone",
        lines
    )
}
