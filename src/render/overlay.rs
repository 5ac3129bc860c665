//! Headline caption burned into every output frame.
//!
//! The caption is drawn twice: a dilated dark outline first, then the
//! bright fill on top. It is centered horizontally on its measured width
//! with the baseline at a fixed distance from the top edge.

use std::sync::Arc;

use serde::Deserialize;

use super::text::{CoverageMask, GlyphSource, TextOverlay};
use crate::video::frame::Frame;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    pub font_size: f32,
    /// Baseline distance from the top edge in pixels
    pub top_offset: u32,
    /// Outline radius in pixels
    pub outline: u32,
    pub color: [u8; 3],
    pub outline_color: [u8; 3],
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            font_size: 64.0,
            top_offset: 100,
            outline: 5,
            color: [255, 255, 0],
            outline_color: [0, 0, 0],
        }
    }
}

pub struct OverlayCompositor {
    text: TextOverlay,
    style: OverlayStyle,
}

impl OverlayCompositor {
    pub fn new(glyphs: Arc<dyn GlyphSource>, style: OverlayStyle) -> Self {
        Self {
            text: TextOverlay::new(glyphs, style.font_size),
            style,
        }
    }

    /// Rasterise `caption` for frames `frame_width` pixels wide. The result
    /// is reused for every frame of a clip.
    pub fn prepare(&self, caption: &str, frame_width: u32) -> PreparedCaption {
        let fill = self.text.rasterize_line(caption);
        if fill.is_empty() {
            return PreparedCaption::empty(&self.style);
        }

        let radius = self.style.outline as usize;
        let outline = dilate(&fill, radius);
        let pad = radius as i32;

        let text_width = self.text.measure_width(caption) as i32;
        let pen_x = (frame_width as i32 - text_width) / 2;
        let left = pen_x - fill.origin_x - pad;
        let top = self.style.top_offset as i32 - fill.baseline - pad;

        // Fill mask shifted into the padded outline coordinates
        let mut padded_fill = vec![0u8; outline.width * outline.height];
        for y in 0..fill.height {
            let row = (y + radius) * outline.width + radius;
            padded_fill[row..row + fill.width]
                .copy_from_slice(&fill.data[y * fill.width..(y + 1) * fill.width]);
        }

        log::debug!(
            "Caption {:?}: {}px wide, mask {}x{} at ({}, {})",
            caption,
            text_width,
            outline.width,
            outline.height,
            left,
            top
        );

        PreparedCaption {
            left,
            top,
            width: outline.width,
            height: outline.height,
            fill: padded_fill,
            outline: outline.data,
            color: self.style.color,
            outline_color: self.style.outline_color,
        }
    }

    /// Return a captioned copy of `frame`; the input is left untouched.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn compose(&self, frame: &Frame, caption: &str) -> Frame {
        self.prepare(caption, frame.width).apply(frame)
    }
}

/// A caption rasterised once and positioned for a given frame width.
#[derive(Clone, Debug)]
pub struct PreparedCaption {
    left: i32,
    top: i32,
    width: usize,
    height: usize,
    fill: Vec<u8>,
    outline: Vec<u8>,
    color: [u8; 3],
    outline_color: [u8; 3],
}

impl PreparedCaption {
    fn empty(style: &OverlayStyle) -> Self {
        Self {
            left: 0,
            top: 0,
            width: 0,
            height: 0,
            fill: Vec::new(),
            outline: Vec::new(),
            color: style.color,
            outline_color: style.outline_color,
        }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn apply(&self, frame: &Frame) -> Frame {
        let mut out = frame.clone();
        self.apply_in_place(&mut out);
        out
    }

    /// Blend into `frame`. Parts falling outside the frame are clipped.
    pub fn apply_in_place(&self, frame: &mut Frame) {
        if self.width == 0 || !frame.is_well_formed() {
            return;
        }
        self.blend(frame, &self.outline, self.outline_color);
        self.blend(frame, &self.fill, self.color);
    }

    fn blend(&self, frame: &mut Frame, mask: &[u8], color: [u8; 3]) {
        let fw = frame.width as i32;
        let fh = frame.height as i32;
        for my in 0..self.height {
            let py = self.top + my as i32;
            if py < 0 || py >= fh {
                continue;
            }
            for mx in 0..self.width {
                let alpha = mask[my * self.width + mx] as u32;
                if alpha == 0 {
                    continue;
                }
                let px = self.left + mx as i32;
                if px < 0 || px >= fw {
                    continue;
                }
                let idx = ((py * fw + px) * 3) as usize;
                for c in 0..3 {
                    let dst = frame.data[idx + c] as u32;
                    let src = color[c] as u32;
                    frame.data[idx + c] = ((src * alpha + dst * (255 - alpha) + 127) / 255) as u8;
                }
            }
        }
    }
}

/// Max filter over a disc of `radius`. The result is padded by `radius`
/// on every side.
fn dilate(mask: &CoverageMask, radius: usize) -> CoverageMask {
    let width = mask.width + radius * 2;
    let height = mask.height + radius * 2;
    let r = radius as i32;
    let offsets: Vec<(i32, i32)> = (-r..=r)
        .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
        .filter(|(dx, dy)| dx * dx + dy * dy <= r * r)
        .collect();

    let mut data = vec![0u8; width * height];
    for y in 0..mask.height {
        for x in 0..mask.width {
            let alpha = mask.get(x, y);
            if alpha == 0 {
                continue;
            }
            let cx = (x + radius) as i32;
            let cy = (y + radius) as i32;
            for &(dx, dy) in &offsets {
                let idx = (cy + dy) as usize * width + (cx + dx) as usize;
                data[idx] = data[idx].max(alpha);
            }
        }
    }

    CoverageMask {
        width,
        height,
        origin_x: mask.origin_x + r,
        baseline: mask.baseline + r,
        data,
    }
}
