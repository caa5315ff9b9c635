//! Detector/encoder capability used by the encoding store and the recognition loop.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Detection;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Finds faces in an image and returns a region and encoding for each.
///
/// An image with no faces yields an empty list, not an error.
pub trait FaceEncoder {
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<Detection>, EncodeError>;
}

/// SCRFD detection followed by ArcFace encoding of every detected box.
pub struct OnnxEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxEncoder {
    /// Load both models from `model_dir`. Fails fast if either is missing.
    pub fn load(model_dir: &Path) -> Result<Self, EncodeError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceEncoder for OnnxEncoder {
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<Detection>, EncodeError> {
        let boxes = self.detector.detect(image)?;
        let mut detections = Vec::with_capacity(boxes.len());

        for face in &boxes {
            let region = face.to_region(image.width(), image.height());
            if region.is_empty() {
                tracing::debug!(score = face.score, "skipping face box outside the frame");
                continue;
            }
            let encoding = self.recognizer.extract(image, &region)?;
            detections.push(Detection { region, encoding });
        }

        Ok(detections)
    }
}
