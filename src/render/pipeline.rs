use rayon::prelude::*;

use super::overlay::PreparedCaption;
use crate::reframe::crop::CropWindow;
use crate::video::frame::Frame;

/// A pure per-frame step. Implementations hold no mutable state, so frames
/// can go through the same transform on several threads at once.
pub trait FrameTransform: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, frame: Frame) -> Frame;
}

pub struct CropStage(pub CropWindow);

impl FrameTransform for CropStage {
    fn name(&self) -> &'static str {
        "crop"
    }

    fn apply(&self, frame: Frame) -> Frame {
        let window = &self.0;
        if window.x2 > frame.width || window.y2 > frame.height || !frame.is_well_formed() {
            log::warn!(
                "Crop {}..{} does not fit a {}x{} frame, passing through",
                window.x1,
                window.x2,
                frame.width,
                frame.height
            );
            return frame;
        }
        frame.crop(window)
    }
}

pub struct RescaleStage {
    pub width: u32,
    pub height: u32,
}

impl FrameTransform for RescaleStage {
    fn name(&self) -> &'static str {
        "rescale"
    }

    fn apply(&self, frame: Frame) -> Frame {
        frame.resize(self.width, self.height)
    }
}

pub struct CaptionStage(pub PreparedCaption);

impl FrameTransform for CaptionStage {
    fn name(&self) -> &'static str {
        "caption"
    }

    fn apply(&self, mut frame: Frame) -> Frame {
        self.0.apply_in_place(&mut frame);
        frame
    }
}

#[derive(Default)]
pub struct FramePipeline {
    stages: Vec<Box<dyn FrameTransform>>,
}

impl FramePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: impl FrameTransform + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn run(&self, frame: Frame) -> Frame {
        self.stages.iter().fold(frame, |f, stage| stage.apply(f))
    }

    /// Transform a batch in parallel. Output order matches input order.
    pub fn run_batch(&self, frames: Vec<Frame>) -> Vec<Frame> {
        frames.into_par_iter().map(|f| self.run(f)).collect()
    }
}
