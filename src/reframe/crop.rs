//! Horizontal crop window computation for vertical reframing.
//!
//! Only the x extent is ever reduced. The window keeps the full source
//! height so a wide source becomes a tall one without vertical cropping.

use serde::Serialize;

use super::subject::SubjectPosition;
use crate::error::PlanningError;

/// Portrait 9:16.
pub const TARGET_ASPECT: f64 = 9.0 / 16.0;

/// Pixel bounds of a crop. Invariant: `0 <= x1 < x2 <= source_width`,
/// `y1 == 0`, `y2 == source_height`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CropWindow {
    pub x1: u32,
    pub x2: u32,
    pub y1: u32,
    pub y2: u32,
}

impl CropWindow {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}

/// Compute the crop window for a frame.
///
/// The window is centered on the subject (or the frame when the subject is
/// unknown) and then clamped to the frame, so a subject near an edge is
/// followed as far as the bounds allow.
pub fn plan(
    frame_width: u32,
    frame_height: u32,
    target_aspect: f64,
    subject: SubjectPosition,
) -> Result<CropWindow, PlanningError> {
    if frame_width == 0 || frame_height == 0 {
        return Err(PlanningError::InvalidDimensions {
            width: frame_width,
            height: frame_height,
        });
    }
    if !target_aspect.is_finite() || target_aspect <= 0.0 {
        return Err(PlanningError::InvalidAspect(target_aspect));
    }

    let width = frame_width as i64;
    let target_width = ((frame_height as f64 * target_aspect).round() as i64).max(1);

    if target_width >= width {
        return Ok(CropWindow {
            x1: 0,
            x2: frame_width,
            y1: 0,
            y2: frame_height,
        });
    }

    let center = match subject {
        SubjectPosition::Located(x) => {
            if !x.is_finite() {
                return Err(PlanningError::InvalidSubject(x));
            }
            x.clamp(0.0, 1.0) * width as f64
        }
        SubjectPosition::Unknown => width as f64 / 2.0,
    };

    let mut x1 = (center - target_width as f64 / 2.0).round() as i64;
    if x1 < 0 {
        x1 = 0;
    }
    if x1 + target_width > width {
        x1 = width - target_width;
    }

    Ok(CropWindow {
        x1: x1 as u32,
        x2: (x1 + target_width) as u32,
        y1: 0,
        y2: frame_height,
    })
}

/// Output size for a crop rescaled to `output_height`, keeping the crop's
/// aspect. Width is rounded to the nearest even value for 4:2:0 encoders.
pub fn output_size(crop: &CropWindow, output_height: u32) -> (u32, u32) {
    let height = output_height.max(2) & !1;
    let width =
        (height as f64 * crop.width() as f64 / crop.height().max(1) as f64).round() as u32;
    ((width & !1).max(2), height)
}
