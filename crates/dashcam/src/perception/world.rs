//! Tracker output delivered to the visualization sink.

use std::time::Instant;

use detect_core::BBox;
use frame_ingest::Frame;

/// A persistent object hypothesis maintained across frames.
#[derive(Clone, Debug)]
pub struct Track {
    /// Unique within a pipeline run; never reused after eviction.
    pub id: u64,
    /// Current box in raw-image pixel coordinates.
    pub bbox: BBox,
    pub class_id: i32,
    pub confidence: f32,
    /// Frame that last matched a detection to this track.
    pub last_update_frame_id: u64,
    /// Iterations since the track was created.
    pub age_frames: u32,
    /// Consecutive iterations without a matching detection.
    pub missed_frames: u32,
    /// Set once the track has survived to `min_confirmed_frames`.
    pub confirmed: bool,
}

/// Everything the tracker knows at one frame.
#[derive(Clone, Debug)]
pub struct WorldState {
    /// `sequence_id` of the frame this state was computed for.
    pub frame_id: u64,
    pub timestamp: Instant,
    pub tracks: Vec<Track>,
    /// Provenance of the detections in effect: 0 while none have arrived,
    /// otherwise a frame id ≤ `frame_id` (detections never come from the
    /// future).
    pub detections_source_frame_id: u64,
    pub detections_inference_time: Option<Instant>,
}

/// A frame paired with the world state computed for it.
#[derive(Clone, Debug)]
pub struct RenderFrame {
    pub frame: Frame,
    pub world: WorldState,
}

impl WorldState {
    /// Frame-index lag between this state and the detections it used.
    pub fn staleness_frames(&self) -> u64 {
        if self.detections_source_frame_id == 0 {
            return 0;
        }
        self.frame_id
            .saturating_sub(self.detections_source_frame_id)
    }
}
