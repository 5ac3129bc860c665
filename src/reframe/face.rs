//! Frontal-face detection with an OpenCV Haar cascade.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::GrayImage;
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;

use super::subject::{BoundingBox, SubjectDetector};
use crate::error::DetectionError;

const CASCADE_FILE: &str = "haarcascade_frontalface_default.xml";

/// Where distribution packages put the stock cascades.
const CASCADE_DIRS: &[&str] = &[
    "/usr/share/opencv4/haarcascades",
    "/usr/share/opencv/haarcascades",
    "/usr/local/share/opencv4/haarcascades",
    "/usr/local/share/opencv/haarcascades",
    "/opt/homebrew/share/opencv4/haarcascades",
];

fn detector_error(e: opencv::Error) -> DetectionError {
    DetectionError::Detector(e.to_string())
}

pub struct FaceDetector {
    // detect_multi_scale needs &mut self
    classifier: Mutex<CascadeClassifier>,
    pub scale_factor: f64,
    pub min_neighbors: i32,
}

impl FaceDetector {
    pub fn new(cascade: &Path) -> Result<Self, DetectionError> {
        if !cascade.is_file() {
            return Err(DetectionError::Detector(format!(
                "cascade not found: {}",
                cascade.display()
            )));
        }
        let classifier =
            CascadeClassifier::new(&cascade.to_string_lossy()).map_err(detector_error)?;
        if classifier.empty().map_err(detector_error)? {
            return Err(DetectionError::Detector(format!(
                "cascade failed to load: {}",
                cascade.display()
            )));
        }
        log::info!("Face cascade: {}", cascade.display());
        Ok(Self {
            classifier: Mutex::new(classifier),
            scale_factor: 1.1,
            min_neighbors: 5,
        })
    }

    /// `PULSEPOINT_FACE_CASCADE`, else the stock frontal-face cascade from
    /// the usual install locations.
    pub fn discover() -> Result<Self, DetectionError> {
        let path = cascade_path().ok_or_else(|| {
            DetectionError::Detector(format!("{} not found; set PULSEPOINT_FACE_CASCADE", CASCADE_FILE))
        })?;
        Self::new(&path)
    }
}

fn cascade_path() -> Option<PathBuf> {
    if let Ok(v) = std::env::var("PULSEPOINT_FACE_CASCADE") {
        return Some(PathBuf::from(v));
    }
    CASCADE_DIRS
        .iter()
        .map(|dir| Path::new(dir).join(CASCADE_FILE))
        .find(|p| p.is_file())
}

impl SubjectDetector for FaceDetector {
    fn detect(&self, luma: &GrayImage) -> Result<Vec<BoundingBox>, DetectionError> {
        let (width, height) = luma.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectionError::EmptyFrame { width, height });
        }

        let mat = Mat::new_rows_cols_with_data(height as i32, width as i32, luma.as_raw())
            .map_err(detector_error)?;
        let mut faces = Vector::<Rect>::new();
        {
            let mut classifier = self
                .classifier
                .lock()
                .map_err(|_| DetectionError::Detector("cascade lock poisoned".into()))?;
            classifier
                .detect_multi_scale(
                    &*mat,
                    &mut faces,
                    self.scale_factor,
                    self.min_neighbors,
                    0,
                    Size::default(),
                    Size::default(),
                )
                .map_err(detector_error)?;
        }

        let boxes: Vec<BoundingBox> = faces
            .iter()
            .filter(|r| r.width > 0 && r.height > 0)
            .map(|r| BoundingBox {
                x: r.x.max(0) as u32,
                y: r.y.max(0) as u32,
                width: r.width as u32,
                height: r.height as u32,
            })
            .collect();
        log::debug!("Faces: {} on {}x{}", boxes.len(), width, height);
        Ok(boxes)
    }
}
