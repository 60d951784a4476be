//! Per-stage performance counters readable without locks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use parking_lot::Mutex;

/// Monotonic nanoseconds since the first call in this process.
pub fn now_ns() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

/// Counters one stage updates on its data path and dashboards read from any
/// thread. Each field is independently consistent; cross-field snapshots are
/// best-effort, which is fine for observability.
pub struct StageMetrics {
    name: String,
    pub count: AtomicU64,
    pub avg_latency_ns: AtomicU64,
    pub last_event_ns: AtomicU64,
    pub work_ns_total: AtomicU64,
}

impl StageMetrics {
    fn new(name: String) -> Self {
        Self {
            name,
            count: AtomicU64::new(0),
            avg_latency_ns: AtomicU64::new(0),
            last_event_ns: AtomicU64::new(now_ns()),
            work_ns_total: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record one completed unit of work.
    ///
    /// The latency average is an EMA weighted 7/8 old, 1/8 new; the first
    /// sample is taken directly. The read-modify-write is not atomic as a
    /// whole; concurrent updaters may lose a sample, which observability
    /// tolerates.
    pub fn on_item(&self, latency_ns: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);

        let prev = self.avg_latency_ns.load(Ordering::Relaxed);
        let next = if prev == 0 {
            latency_ns
        } else {
            (prev * 7 + latency_ns) / 8
        };
        self.avg_latency_ns.store(next, Ordering::Relaxed);

        self.work_ns_total.fetch_add(latency_ns, Ordering::Relaxed);
        self.last_event_ns.store(now_ns(), Ordering::Relaxed);
    }
}

/// Registry owning every stage's metrics for the lifetime of a pipeline run.
/// Handles are `Arc`s, so dashboards can key on pointer identity.
#[derive(Default)]
pub struct Metrics {
    stages: Mutex<Vec<Arc<StageMetrics>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make_stage(&self, name: impl Into<String>) -> Arc<StageMetrics> {
        let stage = Arc::new(StageMetrics::new(name.into()));
        self.stages.lock().push(stage.clone());
        stage
    }

    pub fn stages(&self) -> Vec<Arc<StageMetrics>> {
        self.stages.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_is_taken_directly() {
        let metrics = Metrics::new();
        let stage = metrics.make_stage("camera");
        stage.on_item(1_000);
        assert_eq!(stage.count.load(Ordering::Relaxed), 1);
        assert_eq!(stage.avg_latency_ns.load(Ordering::Relaxed), 1_000);
        assert_eq!(stage.work_ns_total.load(Ordering::Relaxed), 1_000);
    }

    #[test]
    fn average_moves_with_one_eighth_weight() {
        let metrics = Metrics::new();
        let stage = metrics.make_stage("tracking");
        stage.on_item(800);
        stage.on_item(1_600);
        // (800 * 7 + 1600) / 8 = 900
        assert_eq!(stage.avg_latency_ns.load(Ordering::Relaxed), 900);
        assert_eq!(stage.work_ns_total.load(Ordering::Relaxed), 2_400);
        assert_eq!(stage.count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn last_event_advances() {
        let metrics = Metrics::new();
        let stage = metrics.make_stage("inference");
        let before = stage.last_event_ns.load(Ordering::Relaxed);
        std::thread::sleep(std::time::Duration::from_millis(2));
        stage.on_item(10);
        assert!(stage.last_event_ns.load(Ordering::Relaxed) > before);
    }

    #[test]
    fn registry_hands_out_stable_handles() {
        let metrics = Metrics::new();
        let a = metrics.make_stage("a");
        let b = metrics.make_stage("b");
        let listed = metrics.stages();
        assert_eq!(listed.len(), 2);
        assert!(Arc::ptr_eq(&listed[0], &a));
        assert!(Arc::ptr_eq(&listed[1], &b));
    }

    #[test]
    fn now_ns_is_monotonic() {
        let a = now_ns();
        let b = now_ns();
        assert!(b >= a);
    }
}
