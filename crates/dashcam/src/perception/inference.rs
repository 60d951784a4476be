//! Inference stage: version-polled consumer of the slow stream.
//!
//! The loop polls the preprocessed-frame store's version instead of waiting
//! on it. A new frame arriving mid-inference simply overwrites the slot; the
//! next iteration consumes the newest one and skips every intermediate frame,
//! which bounds staleness by one inference duration rather than queue depth.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use detect_core::{Detections, Detector, PreprocessedFrame};
use tracing::{debug, warn};

use super::config::InferenceConfig;
use super::latest::LatestStore;
use super::metrics::StageMetrics;
use super::runner::ThreadRunner;
use super::stage::{Stage, IDLE_WAIT};
use super::stop::StopToken;

pub struct InferenceStage {
    cfg: InferenceConfig,
    detector: Option<Box<dyn Detector>>,
    input: Arc<LatestStore<PreprocessedFrame>>,
    output: Arc<LatestStore<Detections>>,
    metrics: Arc<StageMetrics>,
    runner: ThreadRunner,
}

impl InferenceStage {
    pub fn new(
        cfg: InferenceConfig,
        detector: Box<dyn Detector>,
        input: Arc<LatestStore<PreprocessedFrame>>,
        output: Arc<LatestStore<Detections>>,
        metrics: Arc<StageMetrics>,
    ) -> Self {
        Self {
            cfg,
            detector: Some(detector),
            input,
            output,
            metrics,
            runner: ThreadRunner::new("inference"),
        }
    }
}

impl Stage for InferenceStage {
    fn name(&self) -> &str {
        self.runner.name()
    }

    fn start(&mut self, global: StopToken) -> Result<()> {
        let Some(detector) = self.detector.take() else {
            bail!("inference stage already started");
        };
        let worker = InferenceWorker {
            cfg: self.cfg.clone(),
            detector,
            input: self.input.clone(),
            output: self.output.clone(),
            metrics: self.metrics.clone(),
        };
        self.runner.start(global, move |g, l| worker.run(g, l))
    }

    fn stop(&mut self) {
        self.runner.request_stop();
        self.runner.join();
    }
}

struct InferenceWorker {
    cfg: InferenceConfig,
    detector: Box<dyn Detector>,
    input: Arc<LatestStore<PreprocessedFrame>>,
    output: Arc<LatestStore<Detections>>,
    metrics: Arc<StageMetrics>,
}

impl InferenceWorker {
    fn run(mut self, global: StopToken, local: Arc<AtomicBool>) {
        let min_interval = if self.cfg.target_fps > 0.0 {
            Duration::from_secs_f64(1.0 / self.cfg.target_fps)
        } else {
            Duration::ZERO
        };

        let mut last_seen: u64 = 0;
        let mut last_run: Option<Instant> = None;
        let mut failure_streak: u32 = 0;

        while !global.stop_requested() && !local.load(Ordering::Relaxed) {
            let version = self.input.version();
            if version == last_seen {
                thread::sleep(IDLE_WAIT);
                continue;
            }
            if let Some(prev) = last_run {
                if prev.elapsed() < min_interval {
                    thread::sleep(IDLE_WAIT);
                    continue;
                }
            }
            let Some(frame) = self.input.read_latest() else {
                thread::sleep(IDLE_WAIT);
                continue;
            };

            let started = Instant::now();
            // Claim the version before running so a frame published while the
            // detector is busy is picked up immediately afterwards.
            last_seen = version;

            let detections = match self
                .detector
                .detect(&frame, self.cfg.confidence_threshold)
            {
                Ok(items) => {
                    failure_streak = 0;
                    Detections {
                        inference_time: Instant::now(),
                        source_frame_id: frame.source_frame_id,
                        preprocess_info: frame.info,
                        items,
                    }
                }
                Err(err) => {
                    // Degrade to an empty result with correct provenance; the
                    // pipeline never tears down on a data-path error.
                    if failure_streak == 0 {
                        warn!("detector failed: {err}; emitting empty detections");
                    } else {
                        debug!("detector failed again (streak {failure_streak}): {err}");
                    }
                    failure_streak = failure_streak.saturating_add(1);
                    Detections::empty_for(&frame)
                }
            };

            self.output.write(detections);
            last_run = Some(started);
            self.metrics.on_item(started.elapsed().as_nanos() as u64);
        }
    }
}
