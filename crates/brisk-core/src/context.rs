//! Shared execution context
//!
//! One multi-threaded tokio runtime whose workers run every session's
//! continuations. Passed explicitly to each server instead of living in a
//! process-wide global, so several servers can share one pool.

use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};

/// Worker pool driving sessions and acceptors
#[derive(Default)]
pub struct ExecutionContext {
    runtime: Mutex<Option<Runtime>>,
}

impl ExecutionContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Launch `concurrency` worker threads
    ///
    /// Returns the handle of the already running pool if one exists.
    pub fn start(&self, concurrency: usize) -> Result<Handle> {
        let mut runtime = self.runtime.lock();
        if let Some(rt) = runtime.as_ref() {
            return Ok(rt.handle().clone());
        }

        let workers = concurrency.max(1);
        let rt = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("brisk-worker")
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;

        tracing::debug!(workers, "execution context started");
        let handle = rt.handle().clone();
        *runtime = Some(rt);
        Ok(handle)
    }

    /// Handle of the running pool
    pub fn handle(&self) -> Option<Handle> {
        self.runtime.lock().as_ref().map(|rt| rt.handle().clone())
    }

    pub fn is_running(&self) -> bool {
        self.runtime.lock().is_some()
    }

    /// Cancel outstanding work and release the worker threads
    ///
    /// Does not block, so it may be called from a worker thread.
    pub fn stop(&self) {
        if let Some(rt) = self.runtime.lock().take() {
            rt.shutdown_background();
            tracing::debug!("execution context stopped");
        }
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.stop();
    }
}
