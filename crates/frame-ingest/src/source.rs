//! The capture abstraction consumed by the camera stage.

use std::path::Path;

use crate::sequence::ImageSequenceSource;
use crate::synthetic::SyntheticSource;
use crate::types::{CaptureError, ImageBuf};

/// A device that produces one image per call.
///
/// Implementations may block for a few milliseconds while waiting on the
/// underlying device; they must never block indefinitely. A transient read
/// failure is reported as `Err` and the caller is expected to retry.
pub trait CaptureSource: Send {
    /// Read the next image from the source.
    fn read(&mut self) -> Result<ImageBuf, CaptureError>;

    /// Frame rate the source claims to deliver. Sources without a meaningful
    /// rate report `0.0` and leave pacing entirely to the caller.
    fn nominal_fps(&self) -> f64;
}

/// Open a capture source from a configuration spec string.
///
/// `"synthetic"` selects the procedural source; a directory path selects
/// image-sequence playback. Anything else is an open error, reported before
/// any pipeline thread spawns.
pub fn open_source(
    spec: &str,
    width: u32,
    height: u32,
    fps: f64,
) -> Result<Box<dyn CaptureSource>, CaptureError> {
    if spec.eq_ignore_ascii_case("synthetic") {
        return Ok(Box::new(SyntheticSource::new(width, height, fps)));
    }

    let path = Path::new(spec);
    if path.is_dir() {
        return Ok(Box::new(ImageSequenceSource::open(path, fps)?));
    }

    Err(CaptureError::Open {
        spec: spec.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_spec_is_case_insensitive() {
        assert!(open_source("Synthetic", 64, 48, 30.0).is_ok());
    }

    #[test]
    fn unknown_spec_is_an_open_error() {
        match open_source("/definitely/not/a/real/source", 64, 48, 30.0) {
            Err(err) => assert!(matches!(err, CaptureError::Open { .. })),
            Ok(_) => panic!("expected an error"),
        }
    }
}
