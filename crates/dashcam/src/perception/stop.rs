//! Cooperative shutdown primitive.
//!
//! The pipeline owns one [`StopSignal`] representing a global stop request.
//! Every worker receives a [`StopToken`], a read-only view of that flag, and
//! additionally observes the local flag managed by its
//! [`ThreadRunner`](super::runner::ThreadRunner); it exits when either is set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Owner side of a stop request.
#[derive(Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a read-only view of the flag.
    pub fn token(&self) -> StopToken {
        StopToken {
            flag: self.flag.clone(),
        }
    }

    /// Request a stop. Idempotent; once set the flag never clears.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn stop_requested(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Read-only capability observing a [`StopSignal`].
#[derive(Clone)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn stop_requested(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl Default for StopToken {
    /// A token that is never signalled; useful for driving a worker in tests.
    fn default() -> Self {
        StopSignal::new().token()
    }
}
