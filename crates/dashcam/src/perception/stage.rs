//! Lifecycle shared by every pipeline stage.

use std::time::Duration;

use anyhow::Result;

use super::stop::StopToken;

/// Bounded wait used by consumers when their input is empty, and by polling
/// loops between version checks. Short enough that stop requests are observed
/// promptly, long enough to avoid spinning.
pub const IDLE_WAIT: Duration = Duration::from_millis(5);

/// A stage owns one worker thread and a stable name.
///
/// Every stage body follows the same loop contract: while neither the global
/// nor the local stop flag is set, attempt one unit of work with a short
/// bounded wait, and on success record the elapsed time with
/// [`StageMetrics::on_item`](super::metrics::StageMetrics::on_item).
pub trait Stage {
    fn name(&self) -> &str;

    /// Launch the worker exactly once. A second call is an error.
    fn start(&mut self, global: StopToken) -> Result<()>;

    /// Request a local stop and join the worker.
    fn stop(&mut self);
}
