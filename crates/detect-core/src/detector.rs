//! Trait for object detection inference backends.

use thiserror::Error;

use crate::synthetic::SyntheticDetector;
use crate::types::{Detection, PreprocessedFrame};

#[derive(Debug, Error)]
/// Errors surfaced by detector backends.
pub enum DetectorError {
    #[error("unknown detector backend {name:?}")]
    UnknownBackend { name: String },
    #[error(transparent)]
    Inference(#[from] anyhow::Error),
}

/// An inference backend the pipeline consults through a narrow interface.
///
/// Implementations receive a preprocessed frame and return boxes in that
/// frame's coordinate space. They must tolerate being called at arbitrary
/// intervals and hold no state visible to the pipeline across calls.
pub trait Detector: Send {
    fn detect(
        &mut self,
        frame: &PreprocessedFrame,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>, DetectorError>;
}

/// Construct a detector from a configured backend name.
pub fn open_detector(backend: &str) -> Result<Box<dyn Detector>, DetectorError> {
    match backend {
        "synthetic" => Ok(Box::new(SyntheticDetector::default())),
        other => Err(DetectorError::UnknownBackend {
            name: other.to_string(),
        }),
    }
}
