//! Reference-photo store backed by a directory of `<name>.<ext>` images.
//!
//! Each image must contain exactly one detectable face. Images with no face
//! or several faces are rejected at enrollment and skipped (with a warning)
//! at load time, so every known identity has one unambiguous encoding.

use crate::encoder::{EncodeError, FaceEncoder};
use crate::types::{Embedding, KnownIdentity};
use image::RgbImage;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File extensions accepted as reference photos.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("known-faces directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid identity name {0:?}: must be non-empty and contain no path separators or leading dot")]
    InvalidName(String),
    #[error("{0:?} is already enrolled (pass replace to overwrite)")]
    AlreadyEnrolled(String),
    #[error("no face detected in reference photo")]
    NoFace,
    #[error("reference photo contains {0} faces, expected exactly one")]
    MultipleFaces(usize),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// One reference image on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferencePhoto {
    pub name: String,
    pub path: PathBuf,
}

/// Directory of reference photos, one per identity.
#[derive(Debug, Clone)]
pub struct EncodingStore {
    dir: PathBuf,
}

impl EncodingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.dir.clone(),
            source,
        }
    }

    /// Reference photos in the directory, sorted by file name.
    ///
    /// A missing directory is treated as empty. When two files share a stem
    /// (`Alice.jpg`, `Alice.png`) only the first in sort order is returned.
    pub fn list(&self) -> Result<Vec<ReferencePhoto>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(|e| self.io_err(e))? {
            let path = entry.map_err(|e| self.io_err(e))?.path();
            if path.is_file() && has_image_extension(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut seen = HashSet::new();
        let mut photos = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                tracing::warn!(path = %path.display(), "skipping reference photo with non UTF-8 name");
                continue;
            };
            if !seen.insert(name.clone()) {
                tracing::warn!(name = %name, path = %path.display(), "duplicate identity name, skipping");
                continue;
            }
            photos.push(ReferencePhoto { name, path });
        }
        Ok(photos)
    }

    /// Encode every reference photo into the known-identity set.
    ///
    /// The returned order is the file-name order of [`list`](Self::list), which
    /// is the order the first-match matcher scans.
    pub fn load<E: FaceEncoder>(&self, encoder: &mut E) -> Result<Vec<KnownIdentity>, StoreError> {
        let photos = self.list()?;
        let mut known = Vec::with_capacity(photos.len());

        for photo in &photos {
            let image = match read_rgb(&photo.path) {
                Ok(image) => image,
                Err(e) => {
                    tracing::warn!(path = %photo.path.display(), error = %e, "skipping unreadable reference photo");
                    continue;
                }
            };

            match single_face(encoder, &image) {
                Ok(encoding) => known.push(KnownIdentity {
                    name: photo.name.clone(),
                    encoding,
                }),
                Err(e @ (StoreError::NoFace | StoreError::MultipleFaces(_))) => {
                    tracing::warn!(name = %photo.name, path = %photo.path.display(), error = %e, "skipping reference photo");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            dir = %self.dir.display(),
            photos = photos.len(),
            loaded = known.len(),
            "known identities loaded"
        );
        Ok(known)
    }

    /// Validate and save a new reference photo as `<name>.jpg`.
    ///
    /// The image must contain exactly one face. Returns the identity that
    /// would be loaded from the saved file.
    pub fn enroll<E: FaceEncoder>(
        &self,
        name: &str,
        image: &RgbImage,
        encoder: &mut E,
        replace: bool,
    ) -> Result<KnownIdentity, StoreError> {
        let name = validate_name(name)?;

        let existing = self.list()?.into_iter().find(|p| p.name == name);
        if let Some(photo) = &existing {
            if !replace {
                return Err(StoreError::AlreadyEnrolled(name));
            }
            tracing::info!(name = %name, path = %photo.path.display(), "replacing reference photo");
        }

        let encoding = single_face(encoder, image)?;

        std::fs::create_dir_all(&self.dir).map_err(|e| self.io_err(e))?;
        let path = self.dir.join(format!("{name}.jpg"));
        image.save(&path).map_err(|source| StoreError::Image {
            path: path.clone(),
            source,
        })?;

        // The old photo goes only once the new one is on disk.
        if let Some(photo) = existing.filter(|p| p.path != path) {
            std::fs::remove_file(&photo.path).map_err(|e| self.io_err(e))?;
        }

        tracing::info!(name = %name, path = %path.display(), "reference photo saved");
        Ok(KnownIdentity { name, encoding })
    }
}

/// Encode `image` and require exactly one face.
fn single_face<E: FaceEncoder>(encoder: &mut E, image: &RgbImage) -> Result<Embedding, StoreError> {
    let mut detections = encoder.encode(image)?;
    match detections.len() {
        0 => Err(StoreError::NoFace),
        1 => Ok(detections.remove(0).encoding),
        n => Err(StoreError::MultipleFaces(n)),
    }
}

/// Trim and check an identity name for use as a file stem.
pub fn validate_name(name: &str) -> Result<String, StoreError> {
    let trimmed = name.trim();
    let invalid = trimmed.is_empty()
        || trimmed.starts_with('.')
        || trimmed.contains(['/', '\\'])
        || trimmed.chars().any(char::is_control);
    if invalid {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Decode an image file into RGB8.
pub fn read_rgb(path: &Path) -> Result<RgbImage, StoreError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| StoreError::Image {
            path: path.to_path_buf(),
            source,
        })
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|ok| e.eq_ignore_ascii_case(ok)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Detection, FaceRegion};
    use image::Rgb;

    /// Reports one face per distinct non-black pixel column colour in row 0,
    /// encoded as the colour itself. Black images have no faces.
    struct ColourEncoder;

    impl FaceEncoder for ColourEncoder {
        fn encode(&mut self, image: &RgbImage) -> Result<Vec<Detection>, EncodeError> {
            let mut colours: Vec<Rgb<u8>> = Vec::new();
            for x in 0..image.width() {
                let p = *image.get_pixel(x, 0);
                if p != Rgb([0, 0, 0]) && !colours.contains(&p) {
                    colours.push(p);
                }
            }
            Ok(colours
                .into_iter()
                .map(|c| Detection {
                    region: FaceRegion { top: 0, right: image.width(), bottom: image.height(), left: 0 },
                    encoding: Embedding::new(c.0.iter().map(|&v| v as f32 / 255.0).collect()),
                })
                .collect())
        }
    }

    fn solid(colour: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(8, 8, Rgb(colour))
    }

    fn two_faces() -> RgbImage {
        let mut img = solid([255, 0, 0]);
        img.put_pixel(7, 0, Rgb([0, 0, 255]));
        img
    }

    #[test]
    fn test_load_sorted_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        solid([0, 0, 255]).save(dir.path().join("Bob.png")).unwrap();
        solid([255, 0, 0]).save(dir.path().join("Alice.png")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a photo").unwrap();

        let known = EncodingStore::new(dir.path()).load(&mut ColourEncoder).unwrap();
        let names: Vec<&str> = known.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, ["Alice", "Bob"]);
        assert_eq!(known[0].encoding.values, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_load_skips_photos_without_exactly_one_face() {
        let dir = tempfile::tempdir().unwrap();
        solid([255, 0, 0]).save(dir.path().join("Alice.png")).unwrap();
        solid([0, 0, 0]).save(dir.path().join("Nobody.png")).unwrap();
        two_faces().save(dir.path().join("Pair.png")).unwrap();
        std::fs::write(dir.path().join("Broken.jpg"), b"not a jpeg").unwrap();

        let known = EncodingStore::new(dir.path()).load(&mut ColourEncoder).unwrap();
        assert_eq!(known.len(), 1);
        assert_eq!(known[0].name, "Alice");
    }

    #[test]
    fn test_list_dedupes_stems() {
        let dir = tempfile::tempdir().unwrap();
        solid([255, 0, 0]).save(dir.path().join("Alice.jpg")).unwrap();
        solid([0, 255, 0]).save(dir.path().join("Alice.png")).unwrap();

        let photos = EncodingStore::new(dir.path()).list().unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].path, dir.path().join("Alice.jpg"));
    }

    #[test]
    fn test_list_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncodingStore::new(dir.path().join("absent"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_enroll_saves_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncodingStore::new(dir.path().join("known_faces"));

        let identity = store.enroll("  Alice ", &solid([255, 0, 0]), &mut ColourEncoder, false).unwrap();
        assert_eq!(identity.name, "Alice");
        assert!(dir.path().join("known_faces").join("Alice.jpg").exists());
    }

    #[test]
    fn test_enroll_rejects_face_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncodingStore::new(dir.path());

        let none = store.enroll("Alice", &solid([0, 0, 0]), &mut ColourEncoder, false);
        assert!(matches!(none, Err(StoreError::NoFace)));

        let many = store.enroll("Alice", &two_faces(), &mut ColourEncoder, false);
        assert!(matches!(many, Err(StoreError::MultipleFaces(2))));

        assert!(store.list().unwrap().is_empty(), "rejected photos are not saved");
    }

    #[test]
    fn test_enroll_existing_requires_replace() {
        let dir = tempfile::tempdir().unwrap();
        solid([0, 255, 0]).save(dir.path().join("Alice.png")).unwrap();
        let store = EncodingStore::new(dir.path());

        let again = store.enroll("Alice", &solid([255, 0, 0]), &mut ColourEncoder, false);
        assert!(matches!(again, Err(StoreError::AlreadyEnrolled(_))));

        store.enroll("Alice", &solid([255, 0, 0]), &mut ColourEncoder, true).unwrap();
        let photos = store.list().unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].path, dir.path().join("Alice.jpg"));
    }

    #[test]
    fn test_enroll_replace_failure_keeps_existing() {
        let dir = tempfile::tempdir().unwrap();
        solid([0, 255, 0]).save(dir.path().join("Alice.png")).unwrap();
        // A directory where the new photo would go makes the save fail.
        std::fs::create_dir(dir.path().join("Alice.jpg")).unwrap();
        let store = EncodingStore::new(dir.path());

        let result = store.enroll("Alice", &solid([255, 0, 0]), &mut ColourEncoder, true);
        assert!(matches!(result, Err(StoreError::Image { .. })));

        let photos = store.list().unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].path, dir.path().join("Alice.png"));
    }

    #[test]
    fn test_enroll_replace_same_path_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncodingStore::new(dir.path());
        store.enroll("Alice", &solid([0, 255, 0]), &mut ColourEncoder, false).unwrap();

        store.enroll("Alice", &solid([255, 0, 0]), &mut ColourEncoder, true).unwrap();

        let photos = store.list().unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].path, dir.path().join("Alice.jpg"));
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name(" Ada Lovelace ").unwrap(), "Ada Lovelace");
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name("../etc/passwd").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name(".hidden").is_err());
    }
}
