//! Terminal metrics dashboard and CSV recorder.
//!
//! Reads the lock-free stage counters and the queue counters on an interval,
//! derives rates from deltas, and renders an ANSI table to stdout. The same
//! samples optionally append to a CSV file for offline analysis.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::warn;

use super::config::MetricsConfig;
use super::metrics::{now_ns, Metrics, StageMetrics};
use super::queue::BoundedQueue;
use super::runner::ThreadRunner;
use super::stage::Stage;
use super::stop::StopToken;

const ANSI_RESET: &str = "\x1b[0m";
const ANSI_RED: &str = "\x1b[31m";
const ANSI_GREEN: &str = "\x1b[32m";
const ANSI_YELLOW: &str = "\x1b[33m";

/// Type-erased view over one queue so differently-typed edges can share a
/// dashboard row.
pub struct QueueView {
    name: String,
    capacity: usize,
    size: Box<dyn Fn() -> usize + Send>,
    drops: Box<dyn Fn() -> u64 + Send>,
}

impl QueueView {
    pub fn of<T: Send + 'static>(name: impl Into<String>, queue: Arc<BoundedQueue<T>>) -> Self {
        let capacity = queue.capacity();
        let size_q = queue.clone();
        Self {
            name: name.into(),
            capacity,
            size: Box::new(move || size_q.len()),
            drops: Box::new(move || queue.drops_total()),
        }
    }
}

/// Periodic observer thread driving the ANSI dashboard and the CSV file.
pub struct MetricsReporter {
    cfg: MetricsConfig,
    metrics: Arc<Metrics>,
    queues: Option<Vec<QueueView>>,
    runner: ThreadRunner,
}

impl MetricsReporter {
    pub fn new(cfg: MetricsConfig, metrics: Arc<Metrics>, queues: Vec<QueueView>) -> Self {
        Self {
            cfg,
            metrics,
            queues: Some(queues),
            runner: ThreadRunner::new("metrics-reporter"),
        }
    }

    /// Whether the configuration asks for any reporting at all.
    pub fn is_active(&self) -> bool {
        self.cfg.enable_console_log || self.cfg.record_csv.enabled
    }
}

impl Stage for MetricsReporter {
    fn name(&self) -> &str {
        self.runner.name()
    }

    fn start(&mut self, global: StopToken) -> Result<()> {
        let Some(queues) = self.queues.take() else {
            bail!("metrics reporter already started");
        };
        let worker = ReporterWorker {
            cfg: self.cfg.clone(),
            metrics: self.metrics.clone(),
            queues,
        };
        self.runner.start(global, move |g, l| worker.run(g, l))
    }

    fn stop(&mut self) {
        self.runner.request_stop();
        self.runner.join();
    }
}

#[derive(Clone, Copy, Default)]
struct StagePrev {
    count: u64,
    work_ns: u64,
}

/// One derived sample for a stage over the last interval.
struct StageSample {
    name: String,
    fps: f64,
    busy: f64,
    avg_latency_ms: f64,
    since_last_ms: f64,
    count: u64,
}

struct ReporterWorker {
    cfg: MetricsConfig,
    metrics: Arc<Metrics>,
    queues: Vec<QueueView>,
}

impl ReporterWorker {
    fn run(self, global: StopToken, local: Arc<AtomicBool>) {
        let interval = Duration::from_millis(self.cfg.log_interval_ms);
        let mut csv = CsvWriter::open_if(&self.cfg);
        let mut prev_stages: Vec<StagePrev> = Vec::new();
        let mut prev_qdrops: Vec<u64> = self.queues.iter().map(|q| (q.drops)()).collect();
        let mut last_tick = Instant::now();

        if self.cfg.enable_console_log {
            print!("\x1b[2J\x1b[H");
            let _ = std::io::stdout().flush();
        }

        while !global.stop_requested() && !local.load(Ordering::Relaxed) {
            // Sleep in short slices so a stop request lands promptly even
            // with a long reporting interval.
            let wake = Instant::now() + interval;
            while Instant::now() < wake {
                if global.stop_requested() || local.load(Ordering::Relaxed) {
                    return;
                }
                thread::sleep(Duration::from_millis(20).min(interval));
            }

            let now = Instant::now();
            let dt = now.duration_since(last_tick).as_secs_f64();
            last_tick = now;
            if dt <= 0.0 {
                continue;
            }

            let stages = self.metrics.stages();
            prev_stages.resize(stages.len(), StagePrev::default());
            let samples: Vec<StageSample> = stages
                .iter()
                .zip(prev_stages.iter_mut())
                .map(|(stage, prev)| sample_stage(stage, prev, dt))
                .collect();

            if self.cfg.enable_console_log {
                self.render(&samples, &mut prev_qdrops, dt);
            }
            if let Some(writer) = csv.as_mut() {
                writer.append(&samples);
            }
        }
    }

    fn render(&self, samples: &[StageSample], prev_qdrops: &mut [u64], dt: f64) {
        let mut out = String::with_capacity(1024);
        out.push_str("\x1b[H");
        out.push_str("PERCEPTION PIPELINE\n\n");
        out.push_str(&format!(
            "{:<14}{:>8}{:>8}{:>10}{:>10}\n",
            "STAGE", "FPS", "BUSY%", "LAT(ms)", "LAST(ms)"
        ));
        out.push_str(&"-".repeat(50));
        out.push('\n');

        for s in samples {
            let busy_color = utilization_color(s.busy);
            out.push_str(&format!(
                "{:<14}{:>8.1}{}{:>8.1}{}{:>10.2}{:>10.1}\x1b[K\n",
                s.name,
                s.fps,
                busy_color,
                s.busy * 100.0,
                ANSI_RESET,
                s.avg_latency_ms,
                s.since_last_ms,
            ));
        }

        out.push_str("\nQUEUES\n");
        for (queue, prev) in self.queues.iter().zip(prev_qdrops.iter_mut()) {
            let used = (queue.size)();
            let frac = if queue.capacity == 0 {
                0.0
            } else {
                used as f64 / queue.capacity as f64
            };
            let drops = (queue.drops)();
            let drops_per_sec = (drops - *prev) as f64 / dt;
            *prev = drops;

            out.push_str(&format!(
                "{:<26}{}{}{} {}/{}  drops {:>7.1}/s (total {})\x1b[K\n",
                queue.name,
                utilization_color(frac),
                bar(used, queue.capacity, 12),
                ANSI_RESET,
                used,
                queue.capacity,
                drops_per_sec,
                drops,
            ));
        }

        print!("{out}");
        let _ = std::io::stdout().flush();
    }
}

fn sample_stage(stage: &StageMetrics, prev: &mut StagePrev, dt: f64) -> StageSample {
    let count = stage.count.load(Ordering::Relaxed);
    let work_ns = stage.work_ns_total.load(Ordering::Relaxed);

    let fps = (count.saturating_sub(prev.count)) as f64 / dt;
    let busy = ((work_ns.saturating_sub(prev.work_ns)) as f64 / (dt * 1e9)).clamp(0.0, 1.0);
    prev.count = count;
    prev.work_ns = work_ns;

    let last_event = stage.last_event_ns.load(Ordering::Relaxed);
    let since_last_ms = (now_ns().saturating_sub(last_event)) as f64 / 1e6;

    StageSample {
        name: stage.name().to_string(),
        fps,
        busy,
        avg_latency_ms: stage.avg_latency_ns.load(Ordering::Relaxed) as f64 / 1e6,
        since_last_ms,
        count,
    }
}

fn utilization_color(frac: f64) -> &'static str {
    if frac > 0.85 {
        ANSI_RED
    } else if frac > 0.60 {
        ANSI_YELLOW
    } else {
        ANSI_GREEN
    }
}

fn bar(used: usize, capacity: usize, width: usize) -> String {
    if capacity == 0 {
        return ".".repeat(width);
    }
    let filled = (used * width) / capacity;
    let mut s = String::with_capacity(width);
    for i in 0..width {
        s.push(if i < filled { 'I' } else { '_' });
    }
    s
}

struct CsvWriter {
    out: BufWriter<File>,
    failed: bool,
}

impl CsvWriter {
    fn open_if(cfg: &MetricsConfig) -> Option<Self> {
        if !cfg.record_csv.enabled {
            return None;
        }
        match Self::open(cfg) {
            Ok(writer) => Some(writer),
            Err(err) => {
                warn!("metrics CSV disabled: {err:#}");
                None
            }
        }
    }

    fn open(cfg: &MetricsConfig) -> Result<Self> {
        let path = &cfg.record_csv.output_path;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let file =
            File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut out = BufWriter::new(file);
        writeln!(
            out,
            "timestamp_ms,stage,fps,busy_pct,avg_latency_ms,items_total"
        )?;
        Ok(Self { out, failed: false })
    }

    fn append(&mut self, samples: &[StageSample]) {
        if self.failed {
            return;
        }
        let timestamp_ms = Utc::now().timestamp_millis();
        for s in samples {
            if writeln!(
                self.out,
                "{},{},{:.2},{:.1},{:.3},{}",
                timestamp_ms,
                s.name,
                s.fps,
                s.busy * 100.0,
                s.avg_latency_ms,
                s.count
            )
            .is_err()
            {
                warn!("metrics CSV write failed; recording stops");
                self.failed = true;
                return;
            }
        }
        let _ = self.out.flush();
    }
}
