//! Offline playback source that replays a directory of images.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::warn;

use crate::source::CaptureSource;
use crate::types::{CaptureError, ImageBuf};

/// Plays back still images from a directory in sorted filename order,
/// looping when the end is reached. Stands in for a recorded drive when
/// iterating on the pipeline offline.
#[derive(Debug)]
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    next: usize,
    fps: f64,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, fps: f64) -> Result<Self, CaptureError> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("reading image directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("png") | Some("jpg") | Some("jpeg")
                )
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CaptureError::EmptySequence {
                dir: dir.to_path_buf(),
            });
        }

        Ok(Self {
            files,
            next: 0,
            fps,
        })
    }

    /// Number of images in the playlist.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl CaptureSource for ImageSequenceSource {
    fn read(&mut self) -> Result<ImageBuf, CaptureError> {
        let path = self.files[self.next].clone();
        // Advance before decoding so one corrupt file cannot wedge playback.
        self.next = (self.next + 1) % self.files.len();

        let img = image::open(&path)
            .with_context(|| format!("decoding {}", path.display()))
            .map_err(|err| {
                warn!("skipping unreadable frame {}: {err:#}", path.display());
                err
            })?;
        Ok(ImageBuf::new(img.to_rgb8()))
    }

    fn nominal_fps(&self) -> f64 {
        self.fps
    }
}
