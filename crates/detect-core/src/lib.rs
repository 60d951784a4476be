//! Detector abstraction layer.
//!
//! Inference is an external collaborator as far as the pipeline is concerned:
//! it is handed a [`PreprocessedFrame`] and returns [`Detections`] in that
//! frame's coordinate space, holding no pipeline-visible state between calls.
//! The built-in [`SyntheticDetector`] implements the contract with a plain
//! luminance threshold so the end-to-end path can run without a model file.

pub use detector::{open_detector, Detector, DetectorError};
pub use labels::class_name;
pub use synthetic::SyntheticDetector;
pub use types::{BBox, Detection, Detections, PixelRect, PreprocessInfo, PreprocessedFrame};

mod detector;
mod labels;
mod synthetic;
mod types;
