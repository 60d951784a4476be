//! Tracking stage: reconciles the fast stream with possibly-stale detections.
//!
//! Tracking consumes every frame at camera rate and opportunistically samples
//! the detections register. Nothing ever waits for "matching" detections,
//! since that would forfeit the latency bound. Staleness is reported in the
//! emitted world state instead of prevented.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use detect_core::{BBox, Detections, PreprocessInfo};
use frame_ingest::Frame;

use super::config::TrackingConfig;
use super::latest::LatestStore;
use super::metrics::StageMetrics;
use super::queue::BoundedQueue;
use super::runner::ThreadRunner;
use super::stage::{Stage, IDLE_WAIT};
use super::stop::StopToken;
use super::world::{RenderFrame, Track, WorldState};

/// Greedy IoU association and track lifecycle, free of any threading so the
/// rules are testable one iteration at a time.
pub struct IouTracker {
    cfg: TrackingConfig,
    tracks: Vec<Track>,
    next_id: u64,
}

impl IouTracker {
    pub fn new(cfg: TrackingConfig) -> Self {
        Self {
            cfg,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    /// Advance one frame. `fresh` carries detections only when they are new
    /// this iteration; tracks age regardless, so eviction stays time-bounded
    /// even when inference stalls.
    ///
    /// Returns a snapshot of the live tracks after the update.
    pub fn step(&mut self, frame_id: u64, fresh: Option<&Detections>) -> Vec<Track> {
        for track in &mut self.tracks {
            track.age_frames += 1;
            track.missed_frames += 1;
        }

        if let Some(detections) = fresh {
            self.associate(frame_id, detections);
        }

        let max_missed = self.cfg.max_missed_frames;
        self.tracks.retain(|track| track.missed_frames <= max_missed);

        self.tracks.clone()
    }

    /// Greedy max-IoU assignment, detections in list order, same class only.
    /// Each track takes at most one detection per iteration; on an IoU tie
    /// the first track encountered wins.
    fn associate(&mut self, frame_id: u64, detections: &Detections) {
        let mut used = vec![false; self.tracks.len()];

        for det in &detections.items {
            let raw_box = map_to_raw(&det.bbox, &detections.preprocess_info);

            let mut best: Option<usize> = None;
            let mut best_iou = 0.0f32;
            for (i, track) in self.tracks.iter().enumerate() {
                if used[i] || track.class_id != det.class_id {
                    continue;
                }
                let iou = track.bbox.iou(&raw_box);
                if iou > best_iou {
                    best_iou = iou;
                    best = Some(i);
                }
            }

            match best {
                Some(i) if best_iou >= self.cfg.iou_threshold => {
                    let track = &mut self.tracks[i];
                    track.bbox = raw_box;
                    track.confidence = det.confidence;
                    track.class_id = det.class_id;
                    track.last_update_frame_id = frame_id;
                    track.missed_frames = 0;
                    track.confirmed = track.age_frames >= self.cfg.min_confirmed_frames;
                    used[i] = true;
                }
                _ => {
                    self.tracks.push(Track {
                        id: self.next_id,
                        bbox: raw_box,
                        class_id: det.class_id,
                        confidence: det.confidence,
                        last_update_frame_id: frame_id,
                        age_frames: 1,
                        missed_frames: 0,
                        confirmed: self.cfg.min_confirmed_frames <= 1,
                    });
                    self.next_id += 1;
                    used.push(true);
                }
            }
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

/// Map a detection box from preprocessed-frame coordinates back to raw-image
/// pixels using the recorded crop and resize.
pub(crate) fn map_to_raw(bbox: &BBox, info: &PreprocessInfo) -> BBox {
    let denom_w = if info.resize_width == 0 {
        1.0
    } else {
        info.resize_width as f32
    };
    let denom_h = if info.resize_height == 0 {
        1.0
    } else {
        info.resize_height as f32
    };
    let sx = info.roi.width as f32 / denom_w;
    let sy = info.roi.height as f32 / denom_h;

    BBox::new(
        info.roi.x as f32 + bbox.x * sx,
        info.roi.y as f32 + bbox.y * sy,
        bbox.w * sx,
        bbox.h * sy,
    )
}

pub struct TrackingStage {
    cfg: TrackingConfig,
    input: Arc<BoundedQueue<Frame>>,
    detections_in: Arc<LatestStore<Detections>>,
    out: Arc<BoundedQueue<RenderFrame>>,
    metrics: Arc<StageMetrics>,
    runner: ThreadRunner,
    started: bool,
}

impl TrackingStage {
    pub fn new(
        cfg: TrackingConfig,
        input: Arc<BoundedQueue<Frame>>,
        detections_in: Arc<LatestStore<Detections>>,
        out: Arc<BoundedQueue<RenderFrame>>,
        metrics: Arc<StageMetrics>,
    ) -> Self {
        Self {
            cfg,
            input,
            detections_in,
            out,
            metrics,
            runner: ThreadRunner::new("tracking"),
            started: false,
        }
    }
}

impl Stage for TrackingStage {
    fn name(&self) -> &str {
        self.runner.name()
    }

    fn start(&mut self, global: StopToken) -> Result<()> {
        if self.started {
            bail!("tracking stage already started");
        }
        self.started = true;

        let worker = TrackingWorker {
            tracker: IouTracker::new(self.cfg.clone()),
            input: self.input.clone(),
            detections_in: self.detections_in.clone(),
            out: self.out.clone(),
            metrics: self.metrics.clone(),
            cached: None,
            last_version: 0,
        };
        self.runner.start(global, move |g, l| worker.run(g, l))
    }

    fn stop(&mut self) {
        self.runner.request_stop();
        self.runner.join();
    }
}

struct TrackingWorker {
    tracker: IouTracker,
    input: Arc<BoundedQueue<Frame>>,
    detections_in: Arc<LatestStore<Detections>>,
    out: Arc<BoundedQueue<RenderFrame>>,
    metrics: Arc<StageMetrics>,
    /// Detections in effect between register updates.
    cached: Option<Detections>,
    last_version: u64,
}

impl TrackingWorker {
    fn run(mut self, global: StopToken, local: Arc<AtomicBool>) {
        while !global.stop_requested() && !local.load(Ordering::Relaxed) {
            let Some(frame) = self.input.try_pop_for(IDLE_WAIT) else {
                continue;
            };
            let started = Instant::now();

            let fresh = self.sample_detections(frame.sequence_id);
            let detections = if fresh { self.cached.as_ref() } else { None };
            let tracks = self.tracker.step(frame.sequence_id, detections);

            let world = WorldState {
                frame_id: frame.sequence_id,
                timestamp: Instant::now(),
                tracks,
                detections_source_frame_id: self
                    .cached
                    .as_ref()
                    .map(|d| d.source_frame_id)
                    .unwrap_or(0),
                detections_inference_time: self.cached.as_ref().map(|d| d.inference_time),
            };

            self.out.try_push(RenderFrame { frame, world });
            self.metrics.on_item(started.elapsed().as_nanos() as u64);
        }
    }

    /// Refresh the cache when the register advanced; report whether this
    /// iteration sees new detections.
    ///
    /// Detections derived from a frame newer than the one being processed are
    /// left in the register until the fast stream catches up, so emitted
    /// provenance never points at the future. With a realistically slow
    /// detector this never triggers; it matters when tracking briefly lags a
    /// fast one.
    fn sample_detections(&mut self, frame_id: u64) -> bool {
        let version = self.detections_in.version();
        if version == self.last_version {
            return false;
        }
        match self.detections_in.read_latest() {
            Some(detections) if detections.source_frame_id <= frame_id => {
                self.last_version = version;
                self.cached = Some(detections);
                true
            }
            Some(_) => false,
            None => {
                self.last_version = version;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use detect_core::Detection;

    use super::*;

    fn cfg(iou: f32, max_missed: u32, min_confirmed: u32) -> TrackingConfig {
        TrackingConfig {
            iou_threshold: iou,
            max_missed_frames: max_missed,
            min_confirmed_frames: min_confirmed,
        }
    }

    fn identity_info(width: u32, height: u32) -> PreprocessInfo {
        PreprocessInfo {
            roi_applied: false,
            roi: detect_core::PixelRect::new(0, 0, width, height),
            resize_width: width,
            resize_height: height,
        }
    }

    fn detections_at(frame_id: u64, boxes: &[(f32, f32, f32, f32)]) -> Detections {
        Detections {
            inference_time: Instant::now(),
            source_frame_id: frame_id,
            preprocess_info: identity_info(640, 480),
            items: boxes
                .iter()
                .map(|&(x, y, w, h)| Detection {
                    bbox: BBox::new(x, y, w, h),
                    class_id: 2,
                    confidence: 0.9,
                })
                .collect(),
        }
    }

    #[test]
    fn identity_mapping_leaves_boxes_unchanged() {
        let info = identity_info(640, 480);
        let b = BBox::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(map_to_raw(&b, &info), b);
    }

    #[test]
    fn roi_mapping_offsets_and_scales() {
        let info = PreprocessInfo {
            roi_applied: true,
            roi: detect_core::PixelRect::new(100, 200, 320, 240),
            resize_width: 160,
            resize_height: 120,
        };
        // Scale is 2x in both axes.
        let mapped = map_to_raw(&BBox::new(10.0, 20.0, 30.0, 40.0), &info);
        assert_eq!(mapped, BBox::new(120.0, 240.0, 60.0, 80.0));
    }

    #[test]
    fn zero_resize_dimensions_do_not_divide_by_zero() {
        let info = PreprocessInfo {
            roi_applied: true,
            roi: detect_core::PixelRect::new(0, 0, 100, 100),
            resize_width: 0,
            resize_height: 0,
        };
        let mapped = map_to_raw(&BBox::new(1.0, 2.0, 3.0, 4.0), &info);
        assert!(mapped.x.is_finite() && mapped.w.is_finite());
    }

    #[test]
    fn overlapping_detection_updates_the_same_track() {
        // Two successive detection sets with IoU 0.8 between them: one track,
        // aged twice, matched, confirmed at min_confirmed_frames = 2.
        let mut tracker = IouTracker::new(cfg(0.3, 5, 2));

        let first = detections_at(1, &[(100.0, 100.0, 50.0, 50.0)]);
        let tracks = tracker.step(1, Some(&first));
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].age_frames, 1);
        assert!(!tracks[0].confirmed);

        // Shift by 10% of the width: IoU ≈ 0.8.
        let second = detections_at(2, &[(105.0, 100.0, 50.0, 50.0)]);
        let tracks = tracker.step(2, Some(&second));
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].age_frames, 2);
        assert_eq!(tracks[0].missed_frames, 0);
        assert!(tracks[0].confirmed);
        assert_eq!(tracks[0].last_update_frame_id, 2);
    }

    #[test]
    fn unmatched_track_is_evicted_after_max_missed_frames() {
        let mut tracker = IouTracker::new(cfg(0.3, 3, 1));
        tracker.step(0, Some(&detections_at(0, &[(10.0, 10.0, 20.0, 20.0)])));
        assert_eq!(tracker.track_count(), 1);

        for frame_id in 1..=3 {
            let tracks = tracker.step(frame_id, None);
            assert_eq!(tracks.len(), 1, "still within the missed budget");
        }
        let tracks = tracker.step(4, None);
        assert!(tracks.is_empty(), "missed_frames exceeded the budget");
    }

    #[test]
    fn no_track_outlives_the_missed_budget() {
        let mut tracker = IouTracker::new(cfg(0.3, 2, 1));
        tracker.step(0, Some(&detections_at(0, &[(0.0, 0.0, 10.0, 10.0)])));
        for frame_id in 1..20 {
            for track in tracker.step(frame_id, None) {
                assert!(track.missed_frames <= 2);
            }
        }
    }

    #[test]
    fn young_tracks_are_not_confirmed() {
        let mut tracker = IouTracker::new(cfg(0.3, 5, 3));
        let tracks = tracker.step(1, Some(&detections_at(1, &[(0.0, 0.0, 10.0, 10.0)])));
        assert!(!tracks[0].confirmed);
        assert!(tracks[0].age_frames < 3);
    }

    #[test]
    fn min_confirmed_of_one_confirms_immediately() {
        let mut tracker = IouTracker::new(cfg(0.3, 5, 1));
        let tracks = tracker.step(1, Some(&detections_at(1, &[(0.0, 0.0, 10.0, 10.0)])));
        assert!(tracks[0].confirmed);
    }

    #[test]
    fn one_detection_updates_at_most_one_track() {
        let mut tracker = IouTracker::new(cfg(0.1, 5, 1));
        // Two overlapping tracks of the same class.
        tracker.step(
            1,
            Some(&detections_at(
                1,
                &[(0.0, 0.0, 20.0, 20.0), (5.0, 0.0, 20.0, 20.0)],
            )),
        );
        assert_eq!(tracker.track_count(), 2);

        // One detection overlapping both: exactly one track is refreshed.
        let tracks = tracker.step(2, Some(&detections_at(2, &[(2.0, 0.0, 20.0, 20.0)])));
        let refreshed: Vec<_> = tracks.iter().filter(|t| t.missed_frames == 0).collect();
        assert_eq!(refreshed.len(), 1);
    }

    #[test]
    fn duplicate_detections_spawn_instead_of_double_updating() {
        let mut tracker = IouTracker::new(cfg(0.3, 5, 1));
        tracker.step(1, Some(&detections_at(1, &[(0.0, 0.0, 20.0, 20.0)])));

        // Both detections overlap the single track; the second must spawn.
        let tracks = tracker.step(
            2,
            Some(&detections_at(
                2,
                &[(1.0, 0.0, 20.0, 20.0), (0.0, 1.0, 20.0, 20.0)],
            )),
        );
        assert_eq!(tracks.len(), 2);
    }

    #[test]
    fn association_is_gated_by_class() {
        let mut tracker = IouTracker::new(cfg(0.3, 5, 1));
        tracker.step(1, Some(&detections_at(1, &[(0.0, 0.0, 20.0, 20.0)])));

        let mut other_class = detections_at(2, &[(0.0, 0.0, 20.0, 20.0)]);
        other_class.items[0].class_id = 7;
        let tracks = tracker.step(2, Some(&other_class));
        // Same box, different class: a second track appears.
        assert_eq!(tracks.len(), 2);
        let ids: Vec<i32> = tracks.iter().map(|t| t.class_id).collect();
        assert!(ids.contains(&2) && ids.contains(&7));
    }

    #[test]
    fn weak_overlap_spawns_a_new_track() {
        let mut tracker = IouTracker::new(cfg(0.9, 5, 1));
        tracker.step(1, Some(&detections_at(1, &[(0.0, 0.0, 20.0, 20.0)])));
        // IoU ≈ 0.5 is below the 0.9 threshold.
        let tracks = tracker.step(2, Some(&detections_at(2, &[(7.0, 0.0, 20.0, 20.0)])));
        assert_eq!(tracks.len(), 2);
    }

    #[test]
    fn track_ids_are_never_reused() {
        let mut tracker = IouTracker::new(cfg(0.3, 0, 1));
        let first = tracker.step(1, Some(&detections_at(1, &[(0.0, 0.0, 10.0, 10.0)])));
        let first_id = first[0].id;

        // Evict, then spawn again far away.
        tracker.step(2, None);
        let second = tracker.step(3, Some(&detections_at(3, &[(500.0, 300.0, 10.0, 10.0)])));
        assert!(second[0].id > first_id);
    }

    #[test]
    fn detections_from_ahead_of_the_fast_stream_are_deferred() {
        use crate::perception::config::DropPolicy;
        use crate::perception::metrics::Metrics;

        let metrics = Metrics::new();
        let store = Arc::new(LatestStore::new());
        let mut worker = TrackingWorker {
            tracker: IouTracker::new(cfg(0.3, 5, 1)),
            input: Arc::new(BoundedQueue::new(4, DropPolicy::DropOldest)),
            detections_in: store.clone(),
            out: Arc::new(BoundedQueue::new(4, DropPolicy::DropOldest)),
            metrics: metrics.make_stage("tracking"),
            cached: None,
            last_version: 0,
        };

        store.write(detections_at(10, &[(0.0, 0.0, 10.0, 10.0)]));

        // The fast stream is still at frame 5: leave the result unread.
        assert!(!worker.sample_detections(5));
        assert!(worker.cached.is_none());

        // Once the stream catches up the same write becomes visible.
        assert!(worker.sample_detections(10));
        assert_eq!(worker.cached.as_ref().unwrap().source_frame_id, 10);

        // And it is only reported fresh once.
        assert!(!worker.sample_detections(11));
    }

    #[test]
    fn aging_happens_even_while_detections_repeat() {
        let mut tracker = IouTracker::new(cfg(0.3, 5, 3));
        tracker.step(1, Some(&detections_at(1, &[(0.0, 0.0, 10.0, 10.0)])));
        // Iterations with no fresh detections still age the track.
        tracker.step(2, None);
        let tracks = tracker.step(3, None);
        assert_eq!(tracks[0].age_frames, 3);
        assert_eq!(tracks[0].missed_frames, 2);
    }
}
