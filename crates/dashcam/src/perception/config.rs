//! TOML configuration for the pipeline.
//!
//! Every field has a default, unknown keys are ignored, and `validate`
//! rejects out-of-range values with a path-qualified message before any
//! stage thread spawns.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

/// Behaviour of a bounded queue when it is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Discard the queue head to make room for the incoming item.
    DropOldest,
    /// Reject the incoming item and keep the queue unchanged.
    DropNewest,
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub camera: CameraConfig,
    pub preprocess: PreprocessConfig,
    pub buffering: BufferingConfig,
    pub inference: InferenceConfig,
    pub tracking: TrackingConfig,
    pub visualization: VisualizationConfig,
    pub metrics: MetricsConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Capture source selector: `"synthetic"` or a directory of images.
    pub source: String,
    /// Requested capture width in pixels.
    pub width: u32,
    /// Requested capture height in pixels.
    pub height: u32,
    /// Target capture rate.
    pub fps: u32,
    pub flip_vertical: bool,
    pub flip_horizontal: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: "synthetic".to_string(),
            width: 1280,
            height: 720,
            fps: 30,
            flip_vertical: false,
            flip_horizontal: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Width of the detector input the crop is resized to.
    pub resize_width: u32,
    /// Height of the detector input the crop is resized to.
    pub resize_height: u32,
    pub crop_roi: RoiConfig,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            resize_width: 640,
            resize_height: 360,
            crop_roi: RoiConfig::default(),
        }
    }
}

/// Crop region applied before the resize. Values are raw pixels unless
/// `normalized` is set, in which case they are fractions of the image size.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RoiConfig {
    pub enabled: bool,
    pub normalized: bool,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct BufferingConfig {
    pub queues: QueuesConfig,
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct QueuesConfig {
    pub camera_to_preprocess: QueueConfig,
    pub preprocess_to_tracking: QueueConfig,
    pub tracking_to_visualization: QueueConfig,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    pub drop_policy: DropPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 4,
            drop_policy: DropPolicy::DropOldest,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub enabled: bool,
    /// Detector backend name understood by `detect_core::open_detector`.
    pub backend: String,
    /// Upper bound on inference invocations per second.
    pub target_fps: f64,
    /// Detections below this confidence are discarded by the backend.
    pub confidence_threshold: f32,
    pub model: ModelConfig,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: "synthetic".to_string(),
            target_fps: 10.0,
            confidence_threshold: 0.5,
            model: ModelConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: String,
    pub input_width: u32,
    pub input_height: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            input_width: 640,
            input_height: 360,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Minimum IoU for a detection to update an existing track.
    pub iou_threshold: f32,
    /// Tracks missing for more than this many frames are evicted.
    pub max_missed_frames: u32,
    /// Age at which a track is considered confirmed.
    pub min_confirmed_frames: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            max_missed_frames: 5,
            min_confirmed_frames: 3,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct VisualizationConfig {
    pub enabled: bool,
    pub show_boxes: bool,
    pub show_track_ids: bool,
    pub show_confidence: bool,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            show_boxes: true,
            show_track_ids: true,
            show_confidence: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Render the ANSI dashboard to stdout.
    pub enable_console_log: bool,
    /// Dashboard refresh and CSV sampling interval.
    pub log_interval_ms: u64,
    pub record_csv: CsvMetricsConfig,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enable_console_log: true,
            log_interval_ms: 1000,
            record_csv: CsvMetricsConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CsvMetricsConfig {
    pub enabled: bool,
    pub output_path: PathBuf,
}

impl Default for CsvMetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_path: PathBuf::from("logs/metrics.csv"),
        }
    }
}

fn config_err(path: &str, msg: &str) -> anyhow::Error {
    anyhow!("config error at '{path}': {msg}")
}

impl AppConfig {
    /// Load a configuration file without validating it.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing TOML configuration")
    }

    /// Reject out-of-range values. Called once before the pipeline builds any
    /// resource, so a bad file can never leave threads half-started.
    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(config_err("camera", "width/height must be > 0"));
        }
        if self.camera.fps == 0 {
            return Err(config_err("camera.fps", "must be > 0"));
        }
        if self.camera.source.is_empty() {
            return Err(config_err("camera.source", "must not be empty"));
        }

        if self.preprocess.resize_width == 0 || self.preprocess.resize_height == 0 {
            return Err(config_err(
                "preprocess",
                "resize_width/resize_height must be > 0",
            ));
        }
        let roi = &self.preprocess.crop_roi;
        if roi.enabled {
            if roi.width <= 0.0 || roi.height <= 0.0 {
                return Err(config_err(
                    "preprocess.crop_roi",
                    "width/height must be > 0 when enabled",
                ));
            }
            if roi.x < 0.0 || roi.y < 0.0 {
                return Err(config_err("preprocess.crop_roi", "x/y must be >= 0"));
            }
            if roi.normalized
                && (roi.x > 1.0 || roi.y > 1.0 || roi.width > 1.0 || roi.height > 1.0)
            {
                return Err(config_err(
                    "preprocess.crop_roi",
                    "normalized values must lie in [0, 1]",
                ));
            }
        }

        for (path, queue) in [
            (
                "buffering.queues.camera_to_preprocess",
                &self.buffering.queues.camera_to_preprocess,
            ),
            (
                "buffering.queues.preprocess_to_tracking",
                &self.buffering.queues.preprocess_to_tracking,
            ),
            (
                "buffering.queues.tracking_to_visualization",
                &self.buffering.queues.tracking_to_visualization,
            ),
        ] {
            if queue.capacity < 1 {
                return Err(config_err(path, "capacity must be >= 1"));
            }
        }

        if self.inference.enabled {
            if self.inference.target_fps <= 0.0 {
                return Err(config_err("inference.target_fps", "must be > 0"));
            }
            if !(0.0..=1.0).contains(&self.inference.confidence_threshold) {
                return Err(config_err(
                    "inference.confidence_threshold",
                    "must lie in [0, 1]",
                ));
            }
            if self.inference.backend.is_empty() {
                return Err(config_err("inference.backend", "must not be empty"));
            }
            if self.inference.model.input_width == 0 || self.inference.model.input_height == 0 {
                return Err(config_err(
                    "inference.model",
                    "input_width/input_height must be > 0",
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.tracking.iou_threshold) {
            return Err(config_err("tracking.iou_threshold", "must lie in [0, 1]"));
        }
        if self.tracking.min_confirmed_frames < 1 {
            return Err(config_err("tracking.min_confirmed_frames", "must be >= 1"));
        }

        if self.metrics.log_interval_ms == 0 {
            return Err(config_err("metrics.log_interval_ms", "must be > 0"));
        }
        if self.metrics.record_csv.enabled && self.metrics.record_csv.output_path.as_os_str().is_empty()
        {
            return Err(config_err(
                "metrics.record_csv.output_path",
                "must not be empty when recording is enabled",
            ));
        }

        Ok(())
    }
}
