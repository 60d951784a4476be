//! Real-time perception pipeline: capture → preprocess → detect → track →
//! visualize, with end-to-end latency bounded by design.
//!
//! The pipeline runs two streams. The fast stream (camera → preprocess →
//! tracking → visualization) moves every frame at camera rate through bounded
//! queues that shed load by dropping. The slow stream (preprocess → inference)
//! runs at detector speed over single-slot latest-value stores, so a slow
//! model increases detection staleness instead of queueing delay.
//!
//! Submodules:
//! - `config`: TOML configuration and validation.
//! - `stop`: cooperative stop signal and read-only tokens.
//! - `runner`: owned worker threads with local stop flags.
//! - `queue`: bounded FIFO with drop policies and counters.
//! - `latest`: single-slot overwriting register with a version counter.
//! - `metrics`: per-stage lock-free counters and the registry.
//! - `stage`: the start/stop lifecycle shared by every stage.
//! - `camera` / `preprocess` / `inference` / `tracking`: the stages.
//! - `world`: tracker output types handed to the visualization sink.
//! - `sink`: the visualization sink seam and the built-in track logger.
//! - `dashboard`: ANSI metrics dashboard and CSV recorder.
//! - `pipeline`: wiring, startup/shutdown ordering, and the control loop.

pub use config::{AppConfig, DropPolicy};
pub use pipeline::{run, Pipeline, PipelineOptions};

pub mod camera;
pub mod config;
pub mod dashboard;
pub mod inference;
pub mod latest;
pub mod metrics;
pub mod pipeline;
pub mod preprocess;
pub mod queue;
pub mod runner;
pub mod sink;
pub mod stage;
pub mod stop;
pub mod tracking;
pub mod world;
