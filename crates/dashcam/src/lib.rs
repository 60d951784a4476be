//! Dashcam perception pipeline library surface.
//!
//! The binary in `main.rs` is a thin wrapper; everything it does is reachable
//! from here so integration tests can build and drive pipelines directly.

pub mod cli;
pub mod perception;
