//! Frame acquisition layer for the perception pipeline.
//!
//! The pipeline never talks to a concrete camera driver directly; it consumes
//! the [`CaptureSource`] trait, which hands out one image per call. Two
//! built-in sources cover development and offline replay:
//! - [`SyntheticSource`]: a procedural road scene with moving bright boxes,
//!   useful for exercising the whole pipeline without hardware.
//! - [`ImageSequenceSource`]: plays back a directory of image files in sorted
//!   order, looping.

pub use source::{open_source, CaptureSource};
pub use synthetic::SyntheticSource;
pub use types::{CaptureError, Frame, ImageBuf};

mod sequence;
mod source;
mod synthetic;
mod types;

pub use sequence::ImageSequenceSource;
