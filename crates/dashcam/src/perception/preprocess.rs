//! Preprocess stage: the fork between the fast and slow streams.
//!
//! Every frame is forwarded unchanged to tracking (fast path) and a cropped,
//! resized copy is published to the inference latest-store (slow path). The
//! fast path is a handle clone and a queue push; it can never be held up by
//! the slow path's pixel work, which completes before the next pop either
//! way.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use detect_core::{PixelRect, PreprocessInfo, PreprocessedFrame};
use frame_ingest::{Frame, ImageBuf};
use image::imageops::{self, FilterType};

use super::config::{PreprocessConfig, RoiConfig};
use super::latest::LatestStore;
use super::metrics::StageMetrics;
use super::queue::BoundedQueue;
use super::runner::ThreadRunner;
use super::stage::{Stage, IDLE_WAIT};
use super::stop::StopToken;

pub struct PreprocessStage {
    cfg: PreprocessConfig,
    input: Arc<BoundedQueue<Frame>>,
    fast_out: Arc<BoundedQueue<Frame>>,
    slow_out: Arc<LatestStore<PreprocessedFrame>>,
    metrics: Arc<StageMetrics>,
    runner: ThreadRunner,
    started: bool,
}

impl PreprocessStage {
    pub fn new(
        cfg: PreprocessConfig,
        input: Arc<BoundedQueue<Frame>>,
        fast_out: Arc<BoundedQueue<Frame>>,
        slow_out: Arc<LatestStore<PreprocessedFrame>>,
        metrics: Arc<StageMetrics>,
    ) -> Self {
        Self {
            cfg,
            input,
            fast_out,
            slow_out,
            metrics,
            runner: ThreadRunner::new("preprocess"),
            started: false,
        }
    }
}

impl Stage for PreprocessStage {
    fn name(&self) -> &str {
        self.runner.name()
    }

    fn start(&mut self, global: StopToken) -> Result<()> {
        if self.started {
            bail!("preprocess stage already started");
        }
        self.started = true;

        let cfg = self.cfg.clone();
        let input = self.input.clone();
        let fast_out = self.fast_out.clone();
        let slow_out = self.slow_out.clone();
        let metrics = self.metrics.clone();

        self.runner.start(global, move |g, l| {
            run_loop(&cfg, &input, &fast_out, &slow_out, &metrics, g, l)
        })
    }

    fn stop(&mut self) {
        self.runner.request_stop();
        self.runner.join();
    }
}

fn run_loop(
    cfg: &PreprocessConfig,
    input: &BoundedQueue<Frame>,
    fast_out: &BoundedQueue<Frame>,
    slow_out: &LatestStore<PreprocessedFrame>,
    metrics: &StageMetrics,
    global: StopToken,
    local: Arc<AtomicBool>,
) {
    while !global.stop_requested() && !local.load(Ordering::Relaxed) {
        // Timeout is the idle heartbeat, not an error.
        let Some(frame) = input.try_pop_for(IDLE_WAIT) else {
            continue;
        };
        let started = Instant::now();
        process_frame(cfg, frame, fast_out, slow_out);
        metrics.on_item(started.elapsed().as_nanos() as u64);
    }
}

/// Fork one frame: fast path first, then the crop/resize for inference.
fn process_frame(
    cfg: &PreprocessConfig,
    frame: Frame,
    fast_out: &BoundedQueue<Frame>,
    slow_out: &LatestStore<PreprocessedFrame>,
) {
    fast_out.try_push(frame.clone());

    let raw = frame.image.as_rgb();
    let (roi_applied, roi) = compute_roi(&cfg.crop_roi, raw.width(), raw.height());

    let view = imageops::crop_imm(raw, roi.x, roi.y, roi.width, roi.height).to_image();
    let resized = imageops::resize(
        &view,
        cfg.resize_width,
        cfg.resize_height,
        FilterType::Triangle,
    );

    slow_out.write(PreprocessedFrame {
        source_frame_id: frame.sequence_id,
        capture_time: frame.capture_time,
        preprocess_time: Instant::now(),
        image: ImageBuf::new(resized),
        info: PreprocessInfo {
            roi_applied,
            roi,
            resize_width: cfg.resize_width,
            resize_height: cfg.resize_height,
        },
    });
}

/// Resolve the configured crop against an image of `width` x `height`.
///
/// Normalized coordinates are scaled up; everything is clamped to the image
/// bounds; a rectangle that clamps to nothing falls back to the bottom half,
/// which for a dashcam is where the road is.
pub(crate) fn compute_roi(cfg: &RoiConfig, width: u32, height: u32) -> (bool, PixelRect) {
    let full = PixelRect::new(0, 0, width, height);
    if !cfg.enabled {
        return (false, full);
    }

    let (x, y, w, h) = if cfg.normalized {
        (
            cfg.x * width as f32,
            cfg.y * height as f32,
            cfg.width * width as f32,
            cfg.height * height as f32,
        )
    } else {
        (cfg.x, cfg.y, cfg.width, cfg.height)
    };

    let x = (x.max(0.0) as u32).min(width);
    let y = (y.max(0.0) as u32).min(height);
    let w = (w.max(0.0) as u32).min(width - x);
    let h = (h.max(0.0) as u32).min(height - y);

    let rect = PixelRect::new(x, y, w, h);
    if rect.is_empty() {
        let half = height / 2;
        return (true, PixelRect::new(0, half, width, height - half));
    }
    (true, rect)
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::perception::config::DropPolicy;

    fn roi(enabled: bool, normalized: bool, x: f32, y: f32, w: f32, h: f32) -> RoiConfig {
        RoiConfig {
            enabled,
            normalized,
            x,
            y,
            width: w,
            height: h,
        }
    }

    #[test]
    fn disabled_roi_covers_the_full_image() {
        let (applied, rect) = compute_roi(&roi(false, false, 5.0, 5.0, 5.0, 5.0), 100, 80);
        assert!(!applied);
        assert_eq!(rect, PixelRect::new(0, 0, 100, 80));
    }

    #[test]
    fn pixel_roi_is_taken_directly() {
        let (applied, rect) = compute_roi(&roi(true, false, 10.0, 20.0, 30.0, 40.0), 100, 80);
        assert!(applied);
        assert_eq!(rect, PixelRect::new(10, 20, 30, 40));
    }

    #[test]
    fn normalized_roi_scales_with_the_image() {
        let (_, rect) = compute_roi(&roi(true, true, 0.25, 0.5, 0.5, 0.5), 200, 100);
        assert_eq!(rect, PixelRect::new(50, 50, 100, 50));
    }

    #[test]
    fn oversized_roi_is_clamped() {
        let (_, rect) = compute_roi(&roi(true, false, 80.0, 60.0, 500.0, 500.0), 100, 80);
        assert_eq!(rect, PixelRect::new(80, 60, 20, 20));
    }

    #[test]
    fn empty_clamp_falls_back_to_the_bottom_half() {
        let (applied, rect) = compute_roi(&roi(true, false, 100.0, 0.0, 50.0, 50.0), 100, 80);
        assert!(applied);
        assert_eq!(rect, PixelRect::new(0, 40, 100, 40));
    }

    #[test]
    fn fork_publishes_both_streams() {
        let cfg = PreprocessConfig {
            resize_width: 32,
            resize_height: 16,
            crop_roi: roi(true, false, 0.0, 32.0, 64.0, 32.0),
        };
        let fast = BoundedQueue::new(4, DropPolicy::DropOldest);
        let slow = LatestStore::new();

        let frame = Frame {
            capture_time: Instant::now(),
            sequence_id: 42,
            image: ImageBuf::new(RgbImage::from_pixel(64, 64, Rgb([128; 3]))),
        };
        process_frame(&cfg, frame.clone(), &fast, &slow);

        // Fast path: the identical frame, pixels shared with the input.
        let forwarded = fast.try_pop().expect("fast path frame");
        assert_eq!(forwarded.sequence_id, 42);
        assert!(ImageBuf::ptr_eq(&forwarded.image, &frame.image));

        // Slow path: resized crop plus the mapping geometry.
        assert_eq!(slow.version(), 1);
        let pf = slow.read_latest().expect("slow path frame");
        assert_eq!(pf.source_frame_id, 42);
        assert_eq!(pf.image.width(), 32);
        assert_eq!(pf.image.height(), 16);
        assert!(pf.info.roi_applied);
        assert_eq!(pf.info.roi, PixelRect::new(0, 32, 64, 32));
        assert_eq!(pf.info.resize_width, 32);
        assert_eq!(pf.info.resize_height, 16);
    }
}
