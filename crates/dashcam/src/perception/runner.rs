//! Owned worker threads with consistent start/stop behaviour.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{bail, Context, Result};

use super::stop::StopToken;

/// Owns one worker thread and the local stop flag that addresses only it.
///
/// The runner is a stable resource anchor: it is neither cloneable nor
/// restartable, and dropping it requests a stop and joins, so no detached
/// thread can outlive its owner.
pub struct ThreadRunner {
    name: String,
    handle: Option<JoinHandle<()>>,
    local_stop: Arc<AtomicBool>,
    global: StopToken,
}

impl ThreadRunner {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: None,
            local_stop: Arc::new(AtomicBool::new(false)),
            global: StopToken::default(),
        }
    }

    /// Spawn the worker. The body receives the global stop token and the
    /// runner's local flag and must return when either is set.
    ///
    /// Starting twice is an invariant violation and surfaces as an error.
    pub fn start<F>(&mut self, global: StopToken, body: F) -> Result<()>
    where
        F: FnOnce(StopToken, Arc<AtomicBool>) + Send + 'static,
    {
        if self.handle.is_some() {
            bail!("thread runner {:?} already started", self.name);
        }

        self.global = global.clone();
        let local = self.local_stop.clone();
        // Hand the current tracing dispatcher to the worker so stage logs keep
        // flowing through whatever subscriber the process installed.
        let dispatch = tracing::dispatcher::get_default(|current| current.clone());

        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                tracing::dispatcher::with_default(&dispatch, move || body(global, local))
            })
            .with_context(|| format!("spawning thread {:?}", self.name))?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Request this worker to stop. Does not join and does not affect others.
    pub fn request_stop(&self) {
        self.local_stop.store(true, Ordering::Relaxed);
    }

    /// True when either the global or the local stop flag is set.
    pub fn stop_requested(&self) -> bool {
        self.global.stop_requested() || self.local_stop.load(Ordering::Relaxed)
    }

    /// Wait for the worker to exit. Idempotent when nothing is joinable.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn joinable(&self) -> bool {
        self.handle.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ThreadRunner {
    fn drop(&mut self) {
        self.request_stop();
        self.join();
    }
}
