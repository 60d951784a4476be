//! Camera stage: paces a capture source and emits timestamped frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use frame_ingest::{CaptureSource, Frame, ImageBuf};
use image::imageops;
use tracing::{debug, warn};

use super::config::CameraConfig;
use super::metrics::StageMetrics;
use super::queue::BoundedQueue;
use super::runner::ThreadRunner;
use super::stage::{Stage, IDLE_WAIT};
use super::stop::StopToken;

/// Rates outside this range are treated as a misreporting source.
const MAX_PLAUSIBLE_FPS: f64 = 1000.0;
/// How far the tick schedule may fall behind before it resets instead of
/// sprinting to catch up.
const CATCH_UP_LIMIT: Duration = Duration::from_millis(100);

/// Produces [`Frame`]s at a target rate. Drops at the output queue are the
/// expected overload response, never an error.
pub struct CameraStage {
    cfg: CameraConfig,
    source: Option<Box<dyn CaptureSource>>,
    out: Arc<BoundedQueue<Frame>>,
    metrics: Arc<StageMetrics>,
    runner: ThreadRunner,
}

impl CameraStage {
    pub fn new(
        cfg: CameraConfig,
        source: Box<dyn CaptureSource>,
        out: Arc<BoundedQueue<Frame>>,
        metrics: Arc<StageMetrics>,
    ) -> Self {
        Self {
            cfg,
            source: Some(source),
            out,
            metrics,
            runner: ThreadRunner::new("camera"),
        }
    }
}

impl Stage for CameraStage {
    fn name(&self) -> &str {
        self.runner.name()
    }

    fn start(&mut self, global: StopToken) -> Result<()> {
        let Some(source) = self.source.take() else {
            bail!("camera stage already started");
        };
        let worker = CameraWorker {
            cfg: self.cfg.clone(),
            source,
            out: self.out.clone(),
            metrics: self.metrics.clone(),
        };
        self.runner.start(global, move |g, l| worker.run(g, l))
    }

    fn stop(&mut self) {
        self.runner.request_stop();
        self.runner.join();
    }
}

struct CameraWorker {
    cfg: CameraConfig,
    source: Box<dyn CaptureSource>,
    out: Arc<BoundedQueue<Frame>>,
    metrics: Arc<StageMetrics>,
}

impl CameraWorker {
    fn run(mut self, global: StopToken, local: Arc<AtomicBool>) {
        let fps = effective_fps(self.source.nominal_fps(), f64::from(self.cfg.fps));
        let period = Duration::from_secs_f64(1.0 / fps);
        debug!("camera pacing at {fps:.1} fps");

        let mut next_tick = Instant::now();
        let mut next_id: u64 = 1;
        let mut failure_streak: u32 = 0;

        while !global.stop_requested() && !local.load(Ordering::Relaxed) {
            // Monotonic tick schedule: sleep when ahead, reset when the
            // backlog exceeds the catch-up limit.
            let now = Instant::now();
            if now < next_tick {
                thread::sleep(next_tick - now);
            } else if now.duration_since(next_tick) > CATCH_UP_LIMIT {
                next_tick = now;
            }
            next_tick += period;

            let started = Instant::now();
            let image = match self.source.read() {
                Ok(image) if !image.is_empty() => {
                    failure_streak = 0;
                    image
                }
                Ok(_) => {
                    transient_failure(&mut failure_streak, "capture returned an empty image");
                    thread::sleep(IDLE_WAIT);
                    continue;
                }
                Err(err) => {
                    transient_failure(&mut failure_streak, &format!("capture read failed: {err}"));
                    thread::sleep(IDLE_WAIT);
                    continue;
                }
            };

            let image = apply_flips(image, self.cfg.flip_vertical, self.cfg.flip_horizontal);

            let frame = Frame {
                capture_time: Instant::now(),
                sequence_id: next_id,
                image,
            };
            next_id += 1;

            // Backpressure shows up in the queue's drop counter; the camera
            // keeps its pace either way.
            self.out.try_push(frame);
            self.metrics.on_item(started.elapsed().as_nanos() as u64);
        }
    }
}

fn transient_failure(streak: &mut u32, message: &str) {
    if *streak == 0 {
        warn!("{message}; retrying");
    } else {
        debug!("{message} (streak {streak})");
    }
    *streak = streak.saturating_add(1);
}

/// Pick the pacing rate: the source's reported rate when plausible, else the
/// configured rate, else a safe 30 fps.
fn effective_fps(reported: f64, configured: f64) -> f64 {
    let plausible = |fps: f64| fps.is_finite() && fps > 0.0 && fps <= MAX_PLAUSIBLE_FPS;
    if plausible(reported) {
        reported
    } else if plausible(configured) {
        configured
    } else {
        30.0
    }
}

fn apply_flips(image: ImageBuf, vertical: bool, horizontal: bool) -> ImageBuf {
    if !vertical && !horizontal {
        return image;
    }
    let mut pixels = image.as_rgb().clone();
    if vertical {
        pixels = imageops::flip_vertical(&pixels);
    }
    if horizontal {
        pixels = imageops::flip_horizontal(&pixels);
    }
    ImageBuf::new(pixels)
}
