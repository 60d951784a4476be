//! Shared data types exposed by the frame ingest layer.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use thiserror::Error;

/// Reference-counted image buffer shared across pipeline stages.
///
/// Cloning an `ImageBuf` clones the handle, not the pixels, so a frame can sit
/// in several queues at once without copies.
#[derive(Clone)]
pub struct ImageBuf {
    pixels: Arc<RgbImage>,
}

impl ImageBuf {
    pub fn new(image: RgbImage) -> Self {
        Self {
            pixels: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Whether the buffer holds zero pixels.
    pub fn is_empty(&self) -> bool {
        self.pixels.width() == 0 || self.pixels.height() == 0
    }

    /// Borrow the underlying pixel data.
    pub fn as_rgb(&self) -> &RgbImage {
        &self.pixels
    }

    /// Whether two handles share the same underlying buffer.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.pixels, &b.pixels)
    }
}

impl From<RgbImage> for ImageBuf {
    fn from(image: RgbImage) -> Self {
        Self::new(image)
    }
}

impl std::fmt::Debug for ImageBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBuf")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// One captured frame as it travels down the fast stream.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Monotonic timestamp taken when the frame was captured.
    pub capture_time: Instant,
    /// Monotonic sequence number assigned by the camera stage.
    pub sequence_id: u64,
    /// Shared image data.
    pub image: ImageBuf,
}

#[derive(Debug, Error)]
/// Errors that can arise while opening or driving a capture source.
pub enum CaptureError {
    #[error("failed to open video source {spec:?}")]
    Open { spec: String },
    #[error("no playable images found in {dir:?}")]
    EmptySequence { dir: PathBuf },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
