//! Pipeline wiring, lifecycle ordering, and the main control loop.
//!
//! Consumers start before producers so every edge has a reader before the
//! first item arrives; producers stop before consumers so queues drain
//! naturally and a stopped reader never forces its upstream to fill and drop
//! during shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once, OnceLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use detect_core::{open_detector, Detections, PreprocessedFrame};
use frame_ingest::{open_source, Frame};
use tracing::{info, warn};

use super::camera::CameraStage;
use super::config::AppConfig;
use super::dashboard::{MetricsReporter, QueueView};
use super::inference::InferenceStage;
use super::latest::LatestStore;
use super::metrics::Metrics;
use super::preprocess::PreprocessStage;
use super::queue::BoundedQueue;
use super::sink::{NullSink, RenderSink, TrackLogSink};
use super::stage::{Stage, IDLE_WAIT};
use super::stop::{StopSignal, StopToken};
use super::tracking::TrackingStage;
use super::world::RenderFrame;

#[derive(Clone, Debug, Default)]
pub struct PipelineOptions {
    /// Wall-clock limit after which the pipeline stops on its own.
    pub run_limit: Option<Duration>,
}

/// A fully wired pipeline: resources, stages, and the global stop signal.
pub struct Pipeline {
    global: StopSignal,
    metrics: Arc<Metrics>,

    camera_to_preprocess: Arc<BoundedQueue<Frame>>,
    preprocess_to_tracking: Arc<BoundedQueue<Frame>>,
    tracking_to_visualization: Arc<BoundedQueue<RenderFrame>>,

    camera: CameraStage,
    preprocess: PreprocessStage,
    inference: Option<InferenceStage>,
    tracking: TrackingStage,
    reporter: Option<MetricsReporter>,
}

impl Pipeline {
    /// Construct every resource and stage from a validated configuration.
    ///
    /// All fallible work (validation, opening the capture source and the
    /// detector) happens here, before any thread spawns.
    pub fn build(cfg: &AppConfig) -> Result<Self> {
        cfg.validate()?;

        let metrics = Arc::new(Metrics::new());
        let queues = &cfg.buffering.queues;

        let camera_to_preprocess = Arc::new(BoundedQueue::new(
            queues.camera_to_preprocess.capacity,
            queues.camera_to_preprocess.drop_policy,
        ));
        let preprocess_to_tracking = Arc::new(BoundedQueue::new(
            queues.preprocess_to_tracking.capacity,
            queues.preprocess_to_tracking.drop_policy,
        ));
        let tracking_to_visualization = Arc::new(BoundedQueue::new(
            queues.tracking_to_visualization.capacity,
            queues.tracking_to_visualization.drop_policy,
        ));
        let preprocessed_latest: Arc<LatestStore<PreprocessedFrame>> =
            Arc::new(LatestStore::new());
        let detections_latest: Arc<LatestStore<Detections>> = Arc::new(LatestStore::new());

        let source = open_source(
            &cfg.camera.source,
            cfg.camera.width,
            cfg.camera.height,
            f64::from(cfg.camera.fps),
        )
        .with_context(|| format!("opening capture source {:?}", cfg.camera.source))?;

        let camera = CameraStage::new(
            cfg.camera.clone(),
            source,
            camera_to_preprocess.clone(),
            metrics.make_stage("camera"),
        );
        let preprocess = PreprocessStage::new(
            cfg.preprocess.clone(),
            camera_to_preprocess.clone(),
            preprocess_to_tracking.clone(),
            preprocessed_latest.clone(),
            metrics.make_stage("preprocess"),
        );
        let inference = if cfg.inference.enabled {
            let detector = open_detector(&cfg.inference.backend)
                .with_context(|| format!("opening detector {:?}", cfg.inference.backend))?;
            Some(InferenceStage::new(
                cfg.inference.clone(),
                detector,
                preprocessed_latest.clone(),
                detections_latest.clone(),
                metrics.make_stage("inference"),
            ))
        } else {
            info!("inference disabled; tracking will run without detections");
            None
        };
        let tracking = TrackingStage::new(
            cfg.tracking.clone(),
            preprocess_to_tracking.clone(),
            detections_latest,
            tracking_to_visualization.clone(),
            metrics.make_stage("tracking"),
        );

        let reporter = MetricsReporter::new(
            cfg.metrics.clone(),
            metrics.clone(),
            vec![
                QueueView::of("camera -> preprocess", camera_to_preprocess.clone()),
                QueueView::of("preprocess -> tracking", preprocess_to_tracking.clone()),
                QueueView::of(
                    "tracking -> visualization",
                    tracking_to_visualization.clone(),
                ),
            ],
        );
        let reporter = reporter.is_active().then_some(reporter);

        Ok(Self {
            global: StopSignal::new(),
            metrics,
            camera_to_preprocess,
            preprocess_to_tracking,
            tracking_to_visualization,
            camera,
            preprocess,
            inference,
            tracking,
            reporter,
        })
    }

    /// Start consumers before producers: tracking, inference, preprocess,
    /// camera, then the metrics observer.
    pub fn start(&mut self) -> Result<()> {
        let token = self.global.token();

        self.tracking.start(token.clone())?;
        if let Some(inference) = self.inference.as_mut() {
            inference.start(token.clone())?;
        }
        self.preprocess.start(token.clone())?;
        self.camera.start(token.clone())?;
        if let Some(reporter) = self.reporter.as_mut() {
            reporter.start(token)?;
        }

        info!("pipeline started");
        Ok(())
    }

    pub fn token(&self) -> StopToken {
        self.global.token()
    }

    pub fn request_stop(&self) {
        self.global.request_stop();
    }

    pub fn stop_requested(&self) -> bool {
        self.global.stop_requested()
    }

    /// The queue the visualization side pops render frames from.
    pub fn render_output(&self) -> Arc<BoundedQueue<RenderFrame>> {
        self.tracking_to_visualization.clone()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Stop producers before consumers: camera, preprocess, inference,
    /// tracking, then the observer. Also raises the global stop so every
    /// worker exits at its next loop head.
    pub fn shutdown(&mut self) {
        self.global.request_stop();

        self.camera.stop();
        self.preprocess.stop();
        if let Some(inference) = self.inference.as_mut() {
            inference.stop();
        }
        self.tracking.stop();
        if let Some(reporter) = self.reporter.as_mut() {
            reporter.stop();
        }

        info!(
            "pipeline stopped; queue drops: camera→preprocess {}, preprocess→tracking {}, tracking→visualization {}",
            self.camera_to_preprocess.drops_total(),
            self.preprocess_to_tracking.drops_total(),
            self.tracking_to_visualization.drops_total(),
        );
    }
}

/// Run the pipeline until an interrupt, a stop request, or the run limit.
pub fn run(cfg: AppConfig, options: PipelineOptions) -> Result<()> {
    let mut pipeline = Pipeline::build(&cfg)?;
    let sigint = sigint_flag();

    let mut sink: Box<dyn RenderSink> = if cfg.visualization.enabled {
        Box::new(TrackLogSink::new(cfg.visualization.clone()))
    } else {
        Box::new(NullSink)
    };

    pipeline.start()?;
    let started = Instant::now();
    let render_out = pipeline.render_output();

    while !pipeline.stop_requested() {
        if sigint.load(Ordering::Relaxed) {
            info!("interrupt received; shutting down");
            pipeline.request_stop();
            break;
        }
        if let Some(limit) = options.run_limit {
            if started.elapsed() >= limit {
                info!("run limit reached; shutting down");
                pipeline.request_stop();
                break;
            }
        }

        if let Some(frame) = render_out.try_pop_for(IDLE_WAIT) {
            if let Err(err) = sink.present(&frame) {
                warn!("visualization sink error: {err:#}");
            }
        }
    }

    pipeline.shutdown();
    Ok(())
}

/// Process-wide SIGINT flag; the handler is installed once and shared by
/// every run in this process.
fn sigint_flag() -> Arc<AtomicBool> {
    static INSTALL: Once = Once::new();
    static FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    let flag = FLAG
        .get_or_init(|| Arc::new(AtomicBool::new(false)))
        .clone();
    INSTALL.call_once(|| {
        let handler_flag = flag.clone();
        if let Err(err) = ctrlc::set_handler(move || {
            handler_flag.store(true, Ordering::SeqCst);
        }) {
            warn!("failed to install Ctrl+C handler: {err}");
        }
    });
    flag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_rejects_invalid_configuration_before_spawning() {
        let cfg = AppConfig::from_toml_str("[camera]\nfps = 0\n").unwrap();
        assert!(Pipeline::build(&cfg).is_err());
    }

    #[test]
    fn build_rejects_unknown_sources_and_backends() {
        let cfg = AppConfig::from_toml_str("[camera]\nsource = \"/nope\"\n").unwrap();
        assert!(Pipeline::build(&cfg).is_err());

        let cfg = AppConfig::from_toml_str("[inference]\nbackend = \"tensorrt\"\n").unwrap();
        assert!(Pipeline::build(&cfg).is_err());
    }
}
