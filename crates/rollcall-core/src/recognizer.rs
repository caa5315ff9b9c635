//! ArcFace face encoder via ONNX Runtime.
//!
//! Crops the detected face box (squared, with a small margin), resizes the
//! crop to 112x112 and extracts an L2-normalised 512-dimensional encoding
//! with the w600k_r50 model.

use crate::types::{Embedding, FaceRegion};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_INPUT_SIZE: u32 = 112;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5;
const ARCFACE_EMBEDDING_DIM: usize = 512;
/// Fraction of the box side added on each edge before cropping.
const CROP_MARGIN: f32 = 0.1;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0} — download w600k_r50.onnx from insightface into the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face region is empty")]
    EmptyRegion,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based face encoder.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Extract an encoding for one face region of an RGB frame.
    pub fn extract(&mut self, frame: &RgbImage, region: &FaceRegion) -> Result<Embedding, RecognizerError> {
        let crop = crop_face(frame, region).ok_or(RecognizerError::EmptyRegion)?;
        let input = preprocess(&crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding::new(l2_normalize(raw)))
    }
}

/// Square crop around the region, expanded by `CROP_MARGIN` and clipped to the
/// frame, resized to the model input size. `None` if nothing remains.
fn crop_face(frame: &RgbImage, region: &FaceRegion) -> Option<RgbImage> {
    if region.is_empty() {
        return None;
    }

    let side = region.width().max(region.height()) as f32 * (1.0 + 2.0 * CROP_MARGIN);
    let cx = (region.left + region.right) as f32 / 2.0;
    let cy = (region.top + region.bottom) as f32 / 2.0;

    let x0 = (cx - side / 2.0).max(0.0) as u32;
    let y0 = (cy - side / 2.0).max(0.0) as u32;
    let x1 = ((cx + side / 2.0) as u32).min(frame.width());
    let y1 = ((cy + side / 2.0) as u32).min(frame.height());
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let view = imageops::crop_imm(frame, x0, y0, x1 - x0, y1 - y0);
    Some(imageops::resize(&*view, ARCFACE_INPUT_SIZE, ARCFACE_INPUT_SIZE, FilterType::Triangle))
}

/// Convert a 112x112 RGB crop into a normalised NCHW tensor.
fn preprocess(crop: &RgbImage) -> Array4<f32> {
    let size = ARCFACE_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_preprocess_shape_and_channels() {
        let mut crop = RgbImage::from_pixel(112, 112, Rgb([0, 128, 255]));
        crop.put_pixel(5, 7, Rgb([255, 255, 255]));
        let tensor = preprocess(&crop);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
        assert!((tensor[[0, 0, 0, 0]] + 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 0]] - 0.5 / 127.5).abs() < 1e-6);
        assert!((tensor[[0, 2, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 0, 7, 5]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_crop_face_output_size() {
        let frame = RgbImage::from_pixel(640, 480, Rgb([90, 90, 90]));
        let region = FaceRegion { top: 100, right: 300, bottom: 260, left: 180 };
        let crop = crop_face(&frame, &region).unwrap();
        assert_eq!(crop.dimensions(), (112, 112));
    }

    #[test]
    fn test_crop_face_at_frame_edge() {
        let frame = RgbImage::from_pixel(200, 200, Rgb([10, 20, 30]));
        let region = FaceRegion { top: 0, right: 200, bottom: 60, left: 150 };
        let crop = crop_face(&frame, &region).unwrap();
        assert_eq!(crop.dimensions(), (112, 112));
        assert_eq!(crop.get_pixel(56, 56), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_crop_face_empty_region() {
        let frame = RgbImage::new(100, 100);
        let region = FaceRegion { top: 10, right: 10, bottom: 50, left: 10 };
        assert!(crop_face(&frame, &region).is_none());
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
