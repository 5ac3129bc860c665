//! Render every proposed segment, one at a time, in proposer order.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::RenderError;
use crate::propose::Segment;
use crate::render::segment::{RenderSegment, RenderedClip};
use crate::video::probe::SourceVideo;

pub const MANIFEST_NAME: &str = "clips.json";

#[derive(Debug, Serialize)]
pub struct SegmentFailure {
    /// Zero-based position in the proposed list
    pub index: usize,
    pub segment: Segment,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub source: PathBuf,
    pub run_id: u64,
    pub clips: Vec<RenderedClip>,
    pub failures: Vec<SegmentFailure>,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

/// `reel_3_1718000000.mp4` for the third segment of run 1718000000.
pub fn clip_file_name(index: usize, run_id: u64) -> String {
    format!("reel_{}_{}.mp4", index + 1, run_id)
}

/// A failed segment is recorded and the batch moves on. Only a fatal
/// error (malformed input) stops the batch.
pub fn render_all(
    renderer: &dyn RenderSegment,
    source: &SourceVideo,
    segments: &[Segment],
    out_dir: &Path,
    run_id: u64,
) -> Result<BatchReport, RenderError> {
    let mut report = BatchReport {
        source: source.path.clone(),
        run_id,
        clips: Vec::with_capacity(segments.len()),
        failures: Vec::new(),
    };

    for (index, segment) in segments.iter().enumerate() {
        let output = out_dir.join(clip_file_name(index, run_id));
        log::info!(
            "Segment {}/{}: {:.2}s-{:.2}s ({:.1}s) {:?}",
            index + 1,
            segments.len(),
            segment.start_time,
            segment.end_time,
            segment.duration(),
            segment.headline
        );

        match renderer.render(source, segment, &output) {
            Ok(clip) => report.clips.push(clip),
            Err(e) if e.is_fatal() => {
                log::error!("Segment {} is malformed: {}", index + 1, e);
                return Err(e);
            }
            Err(e) => {
                log::warn!("Segment {} failed: {}", index + 1, e);
                if let RenderError::Media(crate::error::MediaError::Ffmpeg {
                    stderr: Some(ref stderr),
                    ..
                }) = e
                {
                    log::debug!("ffmpeg stderr:\n{}", stderr.trim());
                }
                report.failures.push(SegmentFailure {
                    index,
                    segment: segment.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    log::info!(
        "Rendered {} of {} segment(s)",
        report.clips.len(),
        segments.len()
    );
    Ok(report)
}

/// Write `clips.json` describing the batch into `out_dir`.
pub fn write_manifest(report: &BatchReport, out_dir: &Path) -> Result<PathBuf> {
    let path = out_dir.join(MANIFEST_NAME);
    let json = serde_json::to_string_pretty(report).context("Failed to serialize manifest")?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write manifest {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::error::{MediaError, ProposerError};
    use crate::propose::{propose_or_fallback, SegmentProposer};
    use crate::video::probe::VideoInfo;

    /// Writes a placeholder file per segment, failing on chosen indices.
    struct FakeRenderer {
        fail_at: Vec<usize>,
        fatal_at: Option<usize>,
        calls: RefCell<usize>,
    }

    impl FakeRenderer {
        fn new(fail_at: Vec<usize>) -> Self {
            Self {
                fail_at,
                fatal_at: None,
                calls: RefCell::new(0),
            }
        }
    }

    impl RenderSegment for FakeRenderer {
        fn render(
            &self,
            _source: &SourceVideo,
            segment: &Segment,
            output: &Path,
        ) -> Result<RenderedClip, RenderError> {
            let call = {
                let mut calls = self.calls.borrow_mut();
                *calls += 1;
                *calls - 1
            };
            if self.fatal_at == Some(call) {
                return Err(RenderError::InvalidSegment("negative duration".into()));
            }
            if self.fail_at.contains(&call) {
                return Err(MediaError::ffmpeg("encoder exited with 1", Some("boom".into())).into());
            }
            std::fs::write(output, b"clip")?;
            Ok(RenderedClip {
                path: output.to_path_buf(),
                segment: segment.clone(),
                width: 1080,
                height: 1920,
                frames: 24,
            })
        }
    }

    fn source() -> SourceVideo {
        SourceVideo {
            path: PathBuf::from("talk.mp4"),
            info: VideoInfo {
                duration: 2040.0,
                width: 1920,
                height: 1080,
                fps: 30.0,
                codec: "h264".into(),
                has_audio: true,
            },
        }
    }

    fn three_segments() -> Vec<Segment> {
        vec![
            Segment::new(100.0, 150.0, "A", "a"),
            Segment::new(500.0, 545.0, "B", "b"),
            Segment::new(1000.0, 1040.0, "C", "c"),
        ]
    }

    #[test]
    fn one_failure_does_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let report =
            render_all(&FakeRenderer::new(vec![1]), &source(), &three_segments(), dir.path(), 42)
                .unwrap();

        let headlines: Vec<&str> = report.clips.iter().map(|c| c.segment.headline.as_str()).collect();
        assert_eq!(headlines, vec!["A", "C"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(report.failures[0].segment.headline, "B");

        assert!(dir.path().join("reel_1_42.mp4").exists());
        assert!(!dir.path().join("reel_2_42.mp4").exists());
        assert!(dir.path().join("reel_3_42.mp4").exists());
    }

    #[test]
    fn fatal_error_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FakeRenderer {
            fatal_at: Some(1),
            ..FakeRenderer::new(vec![])
        };
        let err = render_all(&renderer, &source(), &three_segments(), dir.path(), 1).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(*renderer.calls.borrow(), 2);
    }

    #[test]
    fn proposer_failure_still_renders_one_clip() {
        struct Down;
        impl SegmentProposer for Down {
            fn name(&self) -> &str {
                "down"
            }
            fn propose(&self, _t: &str) -> Result<Vec<Segment>, ProposerError> {
                Err(ProposerError::MissingApiKey)
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let segments = propose_or_fallback(&Down, "transcript");
        let report =
            render_all(&FakeRenderer::new(vec![]), &source(), &segments, dir.path(), 7).unwrap();
        assert_eq!(report.clips.len(), 1);
        assert_eq!(report.clips[0].segment, Segment::fallback());
    }

    #[test]
    fn manifest_lists_clips_and_failures() {
        let dir = tempfile::tempdir().unwrap();
        let report =
            render_all(&FakeRenderer::new(vec![2]), &source(), &three_segments(), dir.path(), 9)
                .unwrap();
        let path = write_manifest(&report, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), MANIFEST_NAME);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["run_id"], 9);
        assert_eq!(json["clips"].as_array().unwrap().len(), 2);
        assert_eq!(json["clips"][1]["segment"]["headline"], "B");
        assert_eq!(json["failures"][0]["index"], 2);
    }

    #[test]
    fn file_names_are_one_based() {
        assert_eq!(clip_file_name(0, 1718000000), "reel_1_1718000000.mp4");
    }
}
