//! Frame source that replays still images from a directory, in file-name order.
//!
//! Stands in for a webcam when testing a known-faces set against recorded
//! frames. The stream ends after the last image; an unreadable image is a
//! frame acquisition failure, like a camera read error.

use image::RgbImage;
use rollcall_core::session::{FrameSource, FrameSourceError};
use rollcall_core::store::IMAGE_EXTENSIONS;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("replay directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("replay directory {0} contains no images")]
    Empty(PathBuf),
}

pub struct ReplayFeed {
    pending: VecDeque<PathBuf>,
    released: bool,
}

impl ReplayFeed {
    pub fn open(dir: &Path) -> Result<Self, ReplayError> {
        let io_err = |source| ReplayError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut frames = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|ok| e.eq_ignore_ascii_case(ok)));
            if path.is_file() && is_image {
                frames.push(path);
            }
        }
        if frames.is_empty() {
            return Err(ReplayError::Empty(dir.to_path_buf()));
        }
        frames.sort();

        tracing::info!(dir = %dir.display(), frames = frames.len(), "replay feed opened");
        Ok(Self {
            pending: frames.into(),
            released: false,
        })
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl FrameSource for ReplayFeed {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, FrameSourceError> {
        if self.released {
            return Err(FrameSourceError("replay feed already released".into()));
        }
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };
        tracing::debug!(path = %path.display(), "replaying frame");
        image::open(&path)
            .map(|img| Some(img.to_rgb8()))
            .map_err(|e| FrameSourceError(format!("{}: {e}", path.display())))
    }

    fn release(&mut self) {
        self.released = true;
        self.pending.clear();
    }
}
