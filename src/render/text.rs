use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use fontdue::{Font, FontSettings};

/// Bold sans faces commonly present on Linux, macOS and Windows hosts.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSansBold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// One rasterised glyph. `coverage` is `width * height` alpha values.
#[derive(Clone, Debug, Default)]
pub struct Glyph {
    pub width: usize,
    pub height: usize,
    /// Left bearing from the pen position
    pub xmin: i32,
    /// Bitmap bottom relative to the baseline, positive upward
    pub ymin: i32,
    pub advance: f32,
    pub coverage: Vec<u8>,
}

pub trait GlyphSource: Send + Sync {
    fn glyph(&self, ch: char, px: f32) -> Glyph;
}

impl GlyphSource for Font {
    fn glyph(&self, ch: char, px: f32) -> Glyph {
        let (metrics, bitmap) = self.rasterize(ch, px);
        Glyph {
            width: metrics.width,
            height: metrics.height,
            xmin: metrics.xmin,
            ymin: metrics.ymin,
            advance: metrics.advance_width,
            coverage: bitmap,
        }
    }
}

/// Alpha mask of a rendered line.
///
/// `origin_x` is the pen start and `baseline` the baseline row, both in
/// mask coordinates.
#[derive(Clone, Debug, Default)]
pub struct CoverageMask {
    pub width: usize,
    pub height: usize,
    pub origin_x: i32,
    pub baseline: i32,
    pub data: Vec<u8>,
}

impl CoverageMask {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }
}

#[derive(Clone)]
pub struct TextOverlay {
    glyphs: Arc<dyn GlyphSource>,
    font_size: f32,
}

impl TextOverlay {
    pub fn new(glyphs: Arc<dyn GlyphSource>, font_size: f32) -> Self {
        Self { glyphs, font_size }
    }

    /// Measure the width of rendered text in pixels.
    pub fn measure_width(&self, text: &str) -> u32 {
        let width: f32 = text
            .chars()
            .map(|ch| self.glyphs.glyph(ch, self.font_size).advance)
            .sum();
        width.ceil() as u32
    }

    /// Rasterise a single line. No wrapping; the mask is as wide as the text.
    pub fn rasterize_line(&self, text: &str) -> CoverageMask {
        let mut placed = Vec::new();
        let mut pen = 0.0f32;
        let (mut left, mut right) = (0i32, 0i32);
        let (mut top, mut bottom) = (0i32, 0i32);

        for ch in text.chars() {
            let glyph = self.glyphs.glyph(ch, self.font_size);
            let gx = pen.round() as i32 + glyph.xmin;
            // Rows above the baseline are negative
            let gy = -(glyph.height as i32) - glyph.ymin;
            if glyph.width > 0 && glyph.height > 0 {
                left = left.min(gx);
                right = right.max(gx + glyph.width as i32);
                top = top.min(gy);
                bottom = bottom.max(gy + glyph.height as i32);
            }
            pen += glyph.advance;
            placed.push((gx, gy, glyph));
        }
        right = right.max(pen.ceil() as i32);

        let width = (right - left).max(0) as usize;
        let height = (bottom - top).max(0) as usize;
        let mut data = vec![0u8; width * height];

        for (gx, gy, glyph) in &placed {
            let ox = (gx - left) as usize;
            let oy = (gy - top) as usize;
            for row in 0..glyph.height {
                for col in 0..glyph.width {
                    let alpha = glyph.coverage[row * glyph.width + col];
                    let idx = (oy + row) * width + ox + col;
                    data[idx] = data[idx].max(alpha);
                }
            }
        }

        CoverageMask {
            width,
            height,
            origin_x: -left,
            baseline: -top,
            data,
        }
    }
}

/// Load a font file, fetching it first when only a URL is given. Without
/// either, the first readable system font is used.
pub fn load_font(path: Option<&Path>, url: Option<&str>) -> Result<Font> {
    let bytes = if let Some(path) = path {
        std::fs::read(path).with_context(|| format!("Failed to read font {}", path.display()))?
    } else if let Some(url) = url {
        load_font_from_url(url)?
    } else {
        let found = SYSTEM_FONTS
            .iter()
            .find_map(|p| std::fs::read(p).ok().map(|bytes| (p, bytes)));
        match found {
            Some((p, bytes)) => {
                log::info!("Using system font {}", p);
                bytes
            }
            None => anyhow::bail!("No usable system font found; pass --font or --font-url"),
        }
    };

    Font::from_bytes(bytes, FontSettings::default())
        .map_err(|e| anyhow::anyhow!("Failed to parse font: {}", e))
}

pub fn load_font_from_url(url: &str) -> Result<Vec<u8>> {
    log::info!("Downloading font from {}", url);
    let response = reqwest::blocking::get(url)
        .with_context(|| format!("Failed to fetch font from {}", url))?
        .error_for_status()
        .with_context(|| format!("Font download failed: {}", url))?;
    let bytes = response.bytes().context("Failed to read font body")?;
    Ok(bytes.to_vec())
}

/// Solid rectangular glyphs, for tests that must not depend on installed fonts.
#[cfg(test)]
pub(crate) struct BlockGlyphs;

#[cfg(test)]
impl GlyphSource for BlockGlyphs {
    fn glyph(&self, ch: char, px: f32) -> Glyph {
        let advance = (px * 0.5).round();
        if ch == ' ' {
            return Glyph {
                advance,
                ..Glyph::default()
            };
        }
        let width = (advance as usize).saturating_sub(2).max(1);
        let height = px.round() as usize;
        Glyph {
            width,
            height,
            xmin: 1,
            // 20% descender
            ymin: -((px * 0.2).round() as i32),
            advance,
            coverage: vec![255; width * height],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay(px: f32) -> TextOverlay {
        TextOverlay::new(Arc::new(BlockGlyphs), px)
    }

    #[test]
    fn measure_sums_advances() {
        let text = overlay(20.0);
        assert_eq!(text.measure_width("abcd"), 40);
        assert_eq!(text.measure_width("a b"), 30);
        assert_eq!(text.measure_width(""), 0);
    }

    #[test]
    fn line_mask_covers_all_glyphs() {
        let mask = overlay(20.0).rasterize_line("ab");
        assert_eq!(mask.width, 20);
        assert_eq!(mask.height, 20);
        assert_eq!(mask.baseline, 16);
        assert_eq!(mask.origin_x, 0);

        // Bearing column is empty, glyph body is solid
        assert_eq!(mask.get(0, 5), 0);
        assert_eq!(mask.get(1, 5), 255);
        assert_eq!(mask.get(9, 5), 0);
        assert_eq!(mask.get(11, 5), 255);
    }

    #[test]
    fn empty_text_gives_empty_mask() {
        assert!(overlay(20.0).rasterize_line("").is_empty());
        let spaces = overlay(20.0).rasterize_line("  ");
        assert_eq!(spaces.height, 0);
    }
}
