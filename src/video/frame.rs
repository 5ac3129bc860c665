use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};

use crate::error::DetectionError;
use crate::reframe::crop::CropWindow;

/// One decoded video frame, packed RGB24, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(byte_len(width, height))
            .collect();
        Self::new(width, height, data)
    }

    pub fn byte_len(&self) -> usize {
        byte_len(self.width, self.height)
    }

    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.byte_len()
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = ((y * self.width + x) * 3) as usize;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// Copy out the window's pixels. The window must lie inside the frame.
    pub fn crop(&self, window: &CropWindow) -> Frame {
        let out_w = window.width();
        let out_h = window.height();
        let row_bytes = out_w as usize * 3;
        let mut data = Vec::with_capacity(row_bytes * out_h as usize);
        for y in window.y1..window.y2 {
            let start = ((y * self.width + window.x1) * 3) as usize;
            data.extend_from_slice(&self.data[start..start + row_bytes]);
        }
        Frame::new(out_w, out_h, data)
    }

    pub fn resize(&self, width: u32, height: u32) -> Frame {
        if width == self.width && height == self.height {
            return self.clone();
        }
        match RgbImage::from_raw(self.width, self.height, self.data.clone()) {
            Some(img) => {
                let resized = imageops::resize(&img, width, height, FilterType::Triangle);
                Frame::new(width, height, resized.into_raw())
            }
            None => {
                log::warn!(
                    "Cannot resize malformed {}x{} frame ({} bytes)",
                    self.width,
                    self.height,
                    self.data.len()
                );
                Frame::filled(width, height, [0, 0, 0])
            }
        }
    }

    /// Luma (BT.601) view used by the subject detector.
    pub fn to_luma(&self) -> Result<GrayImage, DetectionError> {
        if self.width == 0 || self.height == 0 {
            return Err(DetectionError::EmptyFrame {
                width: self.width,
                height: self.height,
            });
        }
        let img = RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or(
            DetectionError::BufferSize {
                expected: self.byte_len(),
                actual: self.data.len(),
            },
        )?;
        Ok(imageops::grayscale(&img))
    }
}

fn byte_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}
