use serde::{Deserialize, Serialize};

/// Pixel-space bounding box of a detected face, in `(top, right, bottom, left)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceRegion {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Face encoding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance between two encodings.
    ///
    /// Returns `None` when the dimensions differ; such encodings were produced
    /// by different models and are never comparable.
    pub fn euclidean_distance(&self, other: &Embedding) -> Option<f32> {
        if self.values.len() != other.values.len() {
            return None;
        }
        Some(
            self.values
                .iter()
                .zip(other.values.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f32>()
                .sqrt(),
        )
    }
}

/// A reference identity loaded from the known-faces directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownIdentity {
    /// Identity name, taken from the reference image's file stem.
    pub name: String,
    pub encoding: Embedding,
}

/// One face found in a frame. Discarded once the frame is processed.
#[derive(Debug, Clone)]
pub struct Detection {
    pub region: FaceRegion,
    pub encoding: Embedding,
}

/// Result of matching a probe encoding against the known identities.
#[derive(Debug, Clone)]
pub struct MatchResult<'a> {
    pub matched: bool,
    pub identity: Option<&'a KnownIdentity>,
    /// Distance to the accepted identity, or to the closest one when unmatched.
    /// `None` when nothing comparable was found.
    pub distance: Option<f32>,
}

impl<'a> MatchResult<'a> {
    pub fn unknown(distance: Option<f32>) -> Self {
        Self {
            matched: false,
            identity: None,
            distance,
        }
    }

    /// Name of the matched identity, if any.
    pub fn name(&self) -> Option<&'a str> {
        self.identity.map(|id| id.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new(vec![0.5, 0.5, 0.0]);
        assert_eq!(a.euclidean_distance(&a), Some(0.0));
    }

    #[test]
    fn test_euclidean_distance_unit_axes() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        let d = a.euclidean_distance(&b).unwrap();
        assert!((d - 2.0f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_dimension_mismatch() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert_eq!(a.euclidean_distance(&b), None);
    }

    #[test]
    fn test_region_dimensions() {
        let r = FaceRegion { top: 10, right: 110, bottom: 60, left: 30 };
        assert_eq!(r.width(), 80);
        assert_eq!(r.height(), 50);
        assert!(!r.is_empty());

        let collapsed = FaceRegion { top: 10, right: 5, bottom: 60, left: 30 };
        assert!(collapsed.is_empty());
    }
}
