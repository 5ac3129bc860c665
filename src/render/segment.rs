//! One segment in, one vertical captioned clip out.

use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use super::overlay::OverlayCompositor;
use super::pipeline::{CaptionStage, CropStage, FramePipeline, RescaleStage};
use crate::encode::ffmpeg::{AudioRange, EncodeSettings, FfmpegEncoder};
use crate::error::{MediaError, RenderError};
use crate::propose::Segment;
use crate::reframe::crop::{self, CropWindow, TARGET_ASPECT};
use crate::reframe::subject::SubjectLocator;
use crate::video::probe::SourceVideo;
use crate::video::reader::{FrameReader, SubClip};

#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub output_height: u32,
    pub target_aspect: f64,
    pub encode: EncodeSettings,
    /// Frames transformed in parallel before being handed to the encoder
    pub batch_size: usize,
    pub show_progress: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            output_height: 1920,
            target_aspect: TARGET_ASPECT,
            encode: EncodeSettings::default(),
            batch_size: 16,
            show_progress: true,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RenderedClip {
    pub path: PathBuf,
    pub segment: Segment,
    pub width: u32,
    pub height: u32,
    pub frames: u64,
}

pub trait RenderSegment {
    fn render(
        &self,
        source: &SourceVideo,
        segment: &Segment,
        output: &Path,
    ) -> Result<RenderedClip, RenderError>;
}

pub struct SegmentRenderer {
    locator: SubjectLocator,
    compositor: OverlayCompositor,
    settings: RenderSettings,
}

impl SegmentRenderer {
    pub fn new(
        locator: SubjectLocator,
        compositor: OverlayCompositor,
        settings: RenderSettings,
    ) -> Self {
        Self {
            locator,
            compositor,
            settings,
        }
    }

    /// Crop to the window, scale to the output size, burn in the headline.
    fn clip_pipeline(
        &self,
        window: CropWindow,
        out_w: u32,
        out_h: u32,
        headline: &str,
    ) -> FramePipeline {
        let caption = self.compositor.prepare(headline, out_w);
        FramePipeline::new()
            .with_stage(CropStage(window))
            .with_stage(RescaleStage {
                width: out_w,
                height: out_h,
            })
            .with_stage(CaptionStage(caption))
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.settings.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total);
        match ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
        {
            Ok(style) => pb.set_style(style.progress_chars("=>-")),
            Err(e) => log::debug!("Progress template rejected: {}", e),
        }
        pb
    }

    /// Decode, transform and encode every frame of the clip.
    fn stream(
        &self,
        reader: &mut FrameReader,
        pipeline: &FramePipeline,
        encoder: &mut FfmpegEncoder,
        pb: &ProgressBar,
    ) -> Result<(), MediaError> {
        let batch_size = self.settings.batch_size.max(1);
        loop {
            let mut batch = Vec::with_capacity(batch_size);
            while batch.len() < batch_size {
                match reader.next_frame()? {
                    Some(frame) => batch.push(frame),
                    None => break,
                }
            }
            if batch.is_empty() {
                return Ok(());
            }
            let done = batch.len() < batch_size;
            for frame in pipeline.run_batch(batch) {
                encoder.write_frame(&frame)?;
                pb.inc(1);
            }
            if done {
                return Ok(());
            }
        }
    }
}

/// Validate a segment and clamp its end to the source duration.
fn clamp_segment(segment: &Segment, duration: f64) -> Result<(f64, f64), RenderError> {
    let (start, end) = (segment.start_time, segment.end_time);
    if !start.is_finite() || !end.is_finite() {
        return Err(RenderError::InvalidSegment(format!(
            "non-finite bounds {}..{}",
            start, end
        )));
    }
    if start < 0.0 || end <= start {
        return Err(RenderError::InvalidSegment(format!(
            "bounds {:.2}..{:.2} are negative or inverted",
            start, end
        )));
    }
    if start >= duration {
        return Err(RenderError::OutOfRange { start, duration });
    }
    if end > duration {
        log::info!("Clamping segment end {:.2}s to source duration {:.2}s", end, duration);
    }
    Ok((start, end.min(duration)))
}

impl RenderSegment for SegmentRenderer {
    fn render(
        &self,
        source: &SourceVideo,
        segment: &Segment,
        output: &Path,
    ) -> Result<RenderedClip, RenderError> {
        let (start, end) = clamp_segment(segment, source.info.duration)?;
        let clip = SubClip::new(source, start, end);
        log::info!(
            "Rendering {:.2}s-{:.2}s {:?} -> {}",
            start,
            end,
            segment.headline,
            output.display()
        );

        // Subject position is computed once per segment and held for every frame
        let midpoint = clip.frame_at(clip.midpoint())?;
        let subject = self.locator.locate(&midpoint);
        drop(midpoint);

        let window = crop::plan(
            clip.width(),
            clip.height(),
            self.settings.target_aspect,
            subject,
        )?;
        let (out_w, out_h) = crop::output_size(&window, self.settings.output_height);
        log::info!(
            "Crop x={}..{} of {}x{}, output {}x{}",
            window.x1,
            window.x2,
            clip.width(),
            clip.height(),
            out_w,
            out_h
        );

        let pipeline = self.clip_pipeline(window, out_w, out_h, &segment.headline);
        log::debug!("Frame stages: {}", pipeline.stage_names().join(" -> "));

        // Written under a hidden name next to the destination; removed on drop
        // unless persisted.
        let out_dir = match output.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let partial = tempfile::Builder::new()
            .prefix(".reel-")
            .suffix(".mp4")
            .tempfile_in(out_dir)?;

        let fps = self.settings.encode.fps.max(1);
        let mut encoder = FfmpegEncoder::new(
            partial.path(),
            AudioRange {
                source: &source.path,
                start,
                duration: clip.duration(),
            },
            out_w,
            out_h,
            &self.settings.encode,
        )?;
        let mut reader = clip.frames(fps)?;

        let expected = (clip.duration() * fps as f64).ceil() as u64;
        let pb = self.progress_bar(expected);

        if let Err(e) = self.stream(&mut reader, &pipeline, &mut encoder, &pb) {
            pb.abandon();
            drop(reader);
            // A dead encoder shows up as a broken pipe; its own exit status
            // carries the useful message.
            return Err(match encoder.finish() {
                Err(encode_err) => encode_err.into(),
                Ok(_) => e.into(),
            });
        }
        pb.finish_and_clear();

        log::debug!("Decoded {} frames", reader.frames_read());
        reader.finish()?;
        let frames = encoder.finish()?;
        if frames == 0 {
            return Err(RenderError::EmptyClip { start, end });
        }

        partial.persist(output).map_err(|e| RenderError::Io(e.error))?;
        log::info!("Wrote {} ({} frames)", output.display(), frames);

        Ok(RenderedClip {
            path: output.to_path_buf(),
            segment: segment.clone(),
            width: out_w,
            height: out_h,
            frames,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::sync::Arc;

    use crate::reframe::subject::SubjectPosition;
    use crate::render::overlay::OverlayStyle;
    use crate::render::text::BlockGlyphs;
    use crate::tools;
    use crate::video::frame::Frame;
    use crate::video::probe::{probe_video, VideoInfo};

    fn renderer(encode: EncodeSettings, output_height: u32) -> SegmentRenderer {
        SegmentRenderer::new(
            SubjectLocator::default(),
            OverlayCompositor::new(
                Arc::new(BlockGlyphs),
                OverlayStyle {
                    font_size: 24.0,
                    top_offset: 40,
                    outline: 3,
                    ..OverlayStyle::default()
                },
            ),
            RenderSettings {
                output_height,
                encode,
                batch_size: 8,
                show_progress: false,
                ..RenderSettings::default()
            },
        )
    }

    /// Encoder settings that work with any ffmpeg build.
    fn portable() -> EncodeSettings {
        EncodeSettings {
            codec: "mpeg4".into(),
            preset: None,
            crf: None,
            ..EncodeSettings::default()
        }
    }

    fn synthetic_source(dir: &Path, seconds: u32) -> SourceVideo {
        lavfi_source(dir, "testsrc=size=640x360:rate=24", seconds)
    }

    fn lavfi_source(dir: &Path, video: &str, seconds: u32) -> SourceVideo {
        let path = dir.join("source.mp4");
        let status = Command::new(tools::ffmpeg().unwrap())
            .args(["-y", "-v", "error", "-f", "lavfi", "-i"])
            .arg(format!("{}:duration={}", video, seconds))
            .args(["-f", "lavfi", "-i"])
            .arg(format!("sine=frequency=440:duration={}", seconds))
            .args(["-c:v", "mpeg4", "-c:a", "aac", "-shortest"])
            .arg(&path)
            .status()
            .unwrap();
        assert!(status.success());
        SourceVideo::open(&path).unwrap()
    }

    fn fake_source(duration: f64) -> SourceVideo {
        SourceVideo {
            path: PathBuf::from("/nonexistent/source.mp4"),
            info: VideoInfo {
                duration,
                width: 1920,
                height: 1080,
                fps: 30.0,
                codec: "h264".into(),
                has_audio: true,
            },
        }
    }

    #[test]
    fn malformed_segments_are_fatal() {
        let r = renderer(portable(), 640);
        let source = fake_source(100.0);
        let out = Path::new("unused.mp4");

        for (start, end) in [(10.0, 5.0), (-1.0, 5.0), (f64::NAN, 5.0), (3.0, 3.0)] {
            let err = r
                .render(&source, &Segment::new(start, end, "X", ""), out)
                .unwrap_err();
            assert!(err.is_fatal(), "{:?}", err);
        }
    }

    #[test]
    fn segment_past_the_end_is_contained() {
        let err = renderer(portable(), 640)
            .render(&fake_source(100.0), &Segment::new(150.0, 200.0, "X", ""), Path::new("x.mp4"))
            .unwrap_err();
        assert!(matches!(err, RenderError::OutOfRange { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn clamps_end_to_duration() {
        let seg = Segment::new(90.0, 150.0, "X", "");
        assert_eq!(clamp_segment(&seg, 100.0).unwrap(), (90.0, 100.0));
    }

    fn is_yellow(px: [u8; 3]) -> bool {
        px[0] > 170 && px[1] > 170 && px[2] < 110
    }

    /// Near-yellow pixels in rows `from..to`.
    fn yellow_in_rows(frame: &Frame, from: u32, to: u32) -> usize {
        (from..to.min(frame.height))
            .flat_map(|y| (0..frame.width).map(move |x| (x, y)))
            .filter(|&(x, y)| is_yellow(frame.pixel(x, y)))
            .count()
    }

    #[test]
    fn pipeline_burns_headline_into_frames() {
        let r = renderer(portable(), 640);
        let window = crop::plan(1920, 1080, TARGET_ASPECT, SubjectPosition::Unknown).unwrap();
        let (out_w, out_h) = crop::output_size(&window, 640);
        let pipeline = r.clip_pipeline(window, out_w, out_h, "HELLO");
        assert_eq!(pipeline.stage_names(), vec!["crop", "rescale", "caption"]);

        let out = pipeline.run(Frame::filled(1920, 1080, [20, 60, 200]));
        assert_eq!((out.width, out.height), (360, 640));

        // 24px blocks: "HELLO" is 60px wide from x=150, baseline at y=40
        assert_eq!(out.pixel(155, 35), [255, 255, 0]);
        assert!(yellow_in_rows(&out, 0, 60) > 500);
        assert_eq!(yellow_in_rows(&out, 60, 640), 0);
    }

    #[test]
    fn caption_reaches_encoded_clip() {
        if !tools::media_tools_available() {
            eprintln!("ffmpeg/ffprobe not found, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let source = lavfi_source(dir.path(), "color=c=0x1440C8:size=640x360:rate=24", 4);
        let out = dir.path().join("reel_1.mp4");
        let clip = renderer(portable(), 640)
            .render(&source, &Segment::new(0.5, 3.0, "HELLO WORLD", ""), &out)
            .unwrap();

        let encoded = SourceVideo::open(&clip.path).unwrap();
        let frame = SubClip::new(&encoded, 0.0, encoded.info.duration)
            .frame_at(1.0)
            .unwrap();
        assert_eq!((frame.width, frame.height), (360, 640));
        assert!(yellow_in_rows(&frame, 10, 55) > 200);
        assert_eq!(yellow_in_rows(&frame, 100, 640), 0);
    }

    #[test]
    fn renders_vertical_clip() {
        if !tools::media_tools_available() {
            eprintln!("ffmpeg/ffprobe not found, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let source = synthetic_source(dir.path(), 12);
        let r = renderer(portable(), 640);

        let segments = [
            Segment::new(1.0, 3.0, "A", "first"),
            Segment::new(5.0, 7.5, "B", "second"),
            Segment::new(10.0, 30.0, "C", "past the end"),
        ];
        let mut paths = Vec::new();
        for (i, segment) in segments.iter().enumerate() {
            let out = dir.path().join(format!("reel_{}.mp4", i + 1));
            let clip = r.render(&source, segment, &out).unwrap();
            assert_eq!((clip.width, clip.height), (360, 640));
            assert_eq!(&clip.segment, segment);

            let expected = (segment.end_time.min(12.0) - segment.start_time) * 24.0;
            assert!(
                (clip.frames as f64 - expected).abs() <= 1.0,
                "{} frames, expected {}",
                clip.frames,
                expected
            );

            let info = probe_video(&clip.path).unwrap();
            assert_eq!((info.width, info.height), (360, 640));
            assert!(info.has_audio);
            let length = segment.end_time.min(12.0) - segment.start_time;
            assert!((info.duration - length).abs() < 0.2, "{} vs {}", info.duration, length);
            paths.push(clip.path);
        }
        paths.dedup();
        assert_eq!(paths.len(), 3);

        // No hidden partial files remain
        let hidden = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".reel-"))
            .count();
        assert_eq!(hidden, 0);
    }

    #[test]
    fn failed_encode_leaves_no_file() {
        if !tools::media_tools_available() {
            eprintln!("ffmpeg/ffprobe not found, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let source = synthetic_source(dir.path(), 4);
        let out_dir = dir.path().join("out");
        std::fs::create_dir(&out_dir).unwrap();

        let broken = EncodeSettings {
            codec: "no-such-codec".into(),
            ..portable()
        };
        let err = renderer(broken, 640)
            .render(&source, &Segment::new(0.5, 2.0, "X", ""), &out_dir.join("reel_1.mp4"))
            .unwrap_err();
        assert!(matches!(err, RenderError::Media(_)), "{:?}", err);
        assert!(!err.is_fatal());
        assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0);
    }
}
