//! Primary-subject estimation on a single frame.
//!
//! The locator runs once per segment on the frame at the segment midpoint.
//! The resulting position is reused for every output frame of that segment,
//! which keeps the crop still.

use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::error::DetectionError;
use crate::video::frame::Frame;

/// Normalized horizontal subject position, or unknown.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SubjectPosition {
    /// Box center divided by frame width, in `[0, 1]`
    Located(f64),
    Unknown,
}

/// Axis-aligned box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn center_x(&self) -> f64 {
        self.x as f64 + self.width as f64 / 2.0
    }
}

/// Candidate subject boxes from a luma image, in detection order.
pub trait SubjectDetector: Send + Sync {
    fn detect(&self, luma: &GrayImage) -> Result<Vec<BoundingBox>, DetectionError>;
}

/// Edge-density blob detector.
///
/// Works on a small grid: gradient magnitude is thresholded, then
/// 8-connected regions become candidate boxes. Textured, high-contrast
/// regions (faces, people, props) stand out from flat backgrounds.
pub struct SaliencyDetector {
    /// Processing grid width in pixels
    pub grid_width: u32,
    /// Minimum gradient magnitude counted as an edge (0-510)
    pub noise_floor: f32,
    /// Components with fewer grid pixels are ignored
    pub min_component: usize,
}

impl Default for SaliencyDetector {
    fn default() -> Self {
        Self {
            grid_width: 64,
            noise_floor: 12.0,
            min_component: 6,
        }
    }
}

impl SubjectDetector for SaliencyDetector {
    fn detect(&self, luma: &GrayImage) -> Result<Vec<BoundingBox>, DetectionError> {
        let (width, height) = luma.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectionError::EmptyFrame { width, height });
        }

        let grid_w = self.grid_width.clamp(1, width);
        let grid_h = ((height as f64 * grid_w as f64 / width as f64).round() as u32).max(1);
        let small = imageops::resize(luma, grid_w, grid_h, FilterType::Triangle);

        let magnitude = gradient_magnitude(&small);
        let threshold = edge_threshold(&magnitude).max(self.noise_floor);
        let active: Vec<bool> = magnitude.iter().map(|&m| m > threshold).collect();

        let scale_x = width as f64 / grid_w as f64;
        let scale_y = height as f64 / grid_h as f64;

        let boxes = connected_boxes(&active, grid_w as usize, grid_h as usize, self.min_component)
            .into_iter()
            .map(|(x0, y0, x1, y1)| {
                let left = (x0 as f64 * scale_x).floor() as u32;
                let top = (y0 as f64 * scale_y).floor() as u32;
                let right = (((x1 + 1) as f64 * scale_x).ceil() as u32).min(width);
                let bottom = (((y1 + 1) as f64 * scale_y).ceil() as u32).min(height);
                BoundingBox {
                    x: left,
                    y: top,
                    width: right - left,
                    height: bottom - top,
                }
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Saliency: grid {}x{}, threshold {:.1}, {} candidates",
            grid_w,
            grid_h,
            threshold,
            boxes.len()
        );
        Ok(boxes)
    }
}

/// |dx| + |dy| with forward differences; the last row/column repeat.
fn gradient_magnitude(img: &GrayImage) -> Vec<f32> {
    let (w, h) = img.dimensions();
    let mut out = Vec::with_capacity((w * h) as usize);
    for y in 0..h {
        for x in 0..w {
            let p = img.get_pixel(x, y)[0] as f32;
            let right = img.get_pixel((x + 1).min(w - 1), y)[0] as f32;
            let down = img.get_pixel(x, (y + 1).min(h - 1))[0] as f32;
            out.push((right - p).abs() + (down - p).abs());
        }
    }
    out
}

/// mean + one standard deviation
fn edge_threshold(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    (mean + var.sqrt()) as f32
}

/// 8-connected components as inclusive `(x0, y0, x1, y1)` grid boxes,
/// ordered by their first pixel in row-major scan.
fn connected_boxes(
    active: &[bool],
    w: usize,
    h: usize,
    min_component: usize,
) -> Vec<(usize, usize, usize, usize)> {
    let mut seen = vec![false; active.len()];
    let mut boxes = Vec::new();
    let mut stack = Vec::new();

    for start in 0..active.len() {
        if !active[start] || seen[start] {
            continue;
        }
        seen[start] = true;
        stack.push(start);

        let (mut x0, mut y0) = (start % w, start / w);
        let (mut x1, mut y1) = (x0, y0);
        let mut count = 0usize;

        while let Some(idx) = stack.pop() {
            count += 1;
            let (x, y) = (idx % w, idx / w);
            x0 = x0.min(x);
            x1 = x1.max(x);
            y0 = y0.min(y);
            y1 = y1.max(y);

            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                        continue;
                    }
                    let n = ny as usize * w + nx as usize;
                    if active[n] && !seen[n] {
                        seen[n] = true;
                        stack.push(n);
                    }
                }
            }
        }

        if count >= min_component {
            boxes.push((x0, y0, x1, y1));
        }
    }

    boxes
}

/// Runs detectors in order; the first non-empty answer wins.
///
/// An error from one detector moves on to the next. The chain only fails
/// when every detector failed.
pub struct DetectorChain {
    detectors: Vec<Box<dyn SubjectDetector>>,
}

impl DetectorChain {
    pub fn new(detectors: Vec<Box<dyn SubjectDetector>>) -> Self {
        Self { detectors }
    }

    /// Faces first when built with the `faces` feature, then saliency.
    pub fn standard() -> Self {
        #[allow(unused_mut)]
        let mut detectors: Vec<Box<dyn SubjectDetector>> = Vec::new();
        #[cfg(feature = "faces")]
        {
            match super::face::FaceDetector::discover() {
                Ok(faces) => detectors.push(Box::new(faces)),
                Err(e) => log::warn!("Face detection unavailable: {}", e),
            }
        }
        detectors.push(Box::new(SaliencyDetector::default()));
        Self::new(detectors)
    }
}

impl SubjectDetector for DetectorChain {
    fn detect(&self, luma: &GrayImage) -> Result<Vec<BoundingBox>, DetectionError> {
        let mut failures = Vec::new();
        for detector in &self.detectors {
            match detector.detect(luma) {
                Ok(boxes) if !boxes.is_empty() => return Ok(boxes),
                Ok(_) => {}
                Err(e) => {
                    log::debug!("Detector failed, trying the next: {}", e);
                    failures.push(e.to_string());
                }
            }
        }
        if !failures.is_empty() && failures.len() == self.detectors.len() {
            return Err(DetectionError::Detector(failures.join("; ")));
        }
        Ok(Vec::new())
    }
}

/// Picks the largest detected box on a frame and reports its horizontal center.
pub struct SubjectLocator {
    detector: Box<dyn SubjectDetector>,
}

impl Default for SubjectLocator {
    fn default() -> Self {
        Self::new(Box::new(DetectorChain::standard()))
    }
}

impl SubjectLocator {
    pub fn new(detector: Box<dyn SubjectDetector>) -> Self {
        Self { detector }
    }

    /// Never fails: detector errors and empty results are `Unknown`.
    pub fn locate(&self, frame: &Frame) -> SubjectPosition {
        match self.try_locate(frame) {
            Ok(position) => position,
            Err(e) => {
                log::warn!("Subject detection failed: {}", e);
                SubjectPosition::Unknown
            }
        }
    }

    fn try_locate(&self, frame: &Frame) -> Result<SubjectPosition, DetectionError> {
        let luma = frame.to_luma()?;
        let boxes = self.detector.detect(&luma)?;

        // Strict comparison keeps the first of equally large boxes.
        let mut largest: Option<&BoundingBox> = None;
        for b in &boxes {
            if largest.map_or(true, |best| b.area() > best.area()) {
                largest = Some(b);
            }
        }

        Ok(match largest {
            Some(b) => {
                let x = (b.center_x() / frame.width as f64).clamp(0.0, 1.0);
                log::info!(
                    "Subject at x={:.3} (box {}x{} of {} candidates)",
                    x,
                    b.width,
                    b.height,
                    boxes.len()
                );
                SubjectPosition::Located(x)
            }
            None => {
                log::info!("No subject found, centering crop");
                SubjectPosition::Unknown
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_rects(width: u32, height: u32, rects: &[(u32, u32, u32, u32)]) -> Frame {
        let mut data = vec![20u8; (width * height * 3) as usize];
        for &(rx, ry, rw, rh) in rects {
            for y in ry..ry + rh {
                for x in rx..rx + rw {
                    let idx = ((y * width + x) * 3) as usize;
                    data[idx..idx + 3].copy_from_slice(&[235, 235, 235]);
                }
            }
        }
        Frame::new(width, height, data)
    }

    struct FixedBoxes(Vec<BoundingBox>);

    impl SubjectDetector for FixedBoxes {
        fn detect(&self, _luma: &GrayImage) -> Result<Vec<BoundingBox>, DetectionError> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl SubjectDetector for Broken {
        fn detect(&self, _luma: &GrayImage) -> Result<Vec<BoundingBox>, DetectionError> {
            Err(DetectionError::Detector("model exploded".into()))
        }
    }

    fn bbox(x: u32, width: u32, height: u32) -> BoundingBox {
        BoundingBox {
            x,
            y: 0,
            width,
            height,
        }
    }

    #[test]
    fn finds_bright_subject() {
        let frame = frame_with_rects(320, 180, &[(200, 40, 60, 100)]);
        match SubjectLocator::default().locate(&frame) {
            SubjectPosition::Located(x) => assert!((x - 230.0 / 320.0).abs() < 0.05, "x={}", x),
            other => panic!("expected a subject, got {:?}", other),
        }
    }

    #[test]
    fn largest_subject_wins() {
        let frame = frame_with_rects(320, 180, &[(20, 70, 20, 20), (180, 20, 90, 140)]);
        match SubjectLocator::default().locate(&frame) {
            SubjectPosition::Located(x) => assert!((x - 225.0 / 320.0).abs() < 0.05, "x={}", x),
            other => panic!("expected a subject, got {:?}", other),
        }
    }

    #[test]
    fn flat_frame_is_unknown() {
        let frame = frame_with_rects(320, 180, &[]);
        assert_eq!(SubjectLocator::default().locate(&frame), SubjectPosition::Unknown);
    }

    #[test]
    fn equal_areas_keep_first() {
        let locator = SubjectLocator::new(Box::new(FixedBoxes(vec![
            bbox(0, 10, 10),
            bbox(80, 10, 10),
            bbox(40, 5, 5),
        ])));
        let frame = frame_with_rects(100, 100, &[]);
        assert_eq!(locator.locate(&frame), SubjectPosition::Located(0.05));
    }

    #[test]
    fn detector_errors_become_unknown() {
        let locator = SubjectLocator::new(Box::new(Broken));
        let frame = frame_with_rects(64, 64, &[]);
        assert_eq!(locator.locate(&frame), SubjectPosition::Unknown);

        let malformed = Frame::new(64, 64, vec![0; 10]);
        assert_eq!(SubjectLocator::default().locate(&malformed), SubjectPosition::Unknown);
    }

    #[test]
    fn chain_takes_first_non_empty_answer() {
        let chain = DetectorChain::new(vec![
            Box::new(Broken),
            Box::new(FixedBoxes(vec![])),
            Box::new(FixedBoxes(vec![bbox(70, 20, 20)])),
            Box::new(FixedBoxes(vec![bbox(0, 90, 90)])),
        ]);
        let luma = GrayImage::new(100, 100);
        assert_eq!(chain.detect(&luma).unwrap(), vec![bbox(70, 20, 20)]);

        // A face-style detector that finds something beats the larger fallback box
        let locator = SubjectLocator::new(Box::new(chain));
        assert_eq!(
            locator.locate(&frame_with_rects(100, 100, &[])),
            SubjectPosition::Located(0.8)
        );
    }

    #[test]
    fn chain_fails_only_when_every_detector_fails() {
        let luma = GrayImage::new(10, 10);
        let all_broken = DetectorChain::new(vec![Box::new(Broken), Box::new(Broken)]);
        match all_broken.detect(&luma) {
            Err(DetectionError::Detector(msg)) => assert!(msg.contains("model exploded")),
            other => panic!("expected a detector error, got {:?}", other),
        }

        let one_empty = DetectorChain::new(vec![Box::new(Broken), Box::new(FixedBoxes(vec![]))]);
        assert!(one_empty.detect(&luma).unwrap().is_empty());
    }

    #[test]
    fn components_follow_scan_order() {
        #[rustfmt::skip]
        let active = vec![
            false, false, false, true,
            true,  false, false, true,
            true,  false, false, false,
        ];
        let boxes = connected_boxes(&active, 4, 3, 1);
        assert_eq!(boxes, vec![(3, 0, 3, 1), (0, 1, 0, 2)]);
    }
}
