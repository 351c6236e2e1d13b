use crate::runtime::{Handle, ThreadConfig, ThreadPool};
use anyhow::Result;
use std::ops::Deref;
use tracing::{debug, error};

/// Owning scope of a scheduler and its worker threads.
///
/// Dereferences to [`Handle`], so `runtime.run(...)` works directly. Dropping
/// the runtime (or calling [`Runtime::shutdown`]) stops and joins every
/// worker, then cancels every task that did not finish yet.
#[derive(Debug)]
pub struct Runtime {
    handle: Handle,
    pool: ThreadPool,
}

impl Runtime {
    pub(crate) fn new(handle: Handle, pool: ThreadPool) -> Runtime {
        Runtime { handle, pool }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Spawns one more worker thread. Safe to call while tasks are running.
    pub fn add_thread(&self, config: ThreadConfig) -> Result<()> {
        self.pool.spawn(&self.handle, config)
    }

    pub fn num_threads(&self) -> usize {
        self.pool.len()
    }

    /// Shuts the runtime down.
    ///
    /// Workers finish the task they are running, then exit. Once every worker
    /// is joined, tasks still `Pending` or `Ready` are cancelled: each payload
    /// sees `on_cancel` exactly once. `run` returns
    /// [`SchedulerError::ShuttingDown`] from then on.
    ///
    /// [`SchedulerError::ShuttingDown`]: crate::SchedulerError::ShuttingDown
    pub fn shutdown(self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&self) {
        let shared = &self.handle.shared;
        if !shared.set_shutdown() {
            return;
        }
        debug!("runtime shutting down");

        self.pool.stop_all();
        shared.queues.wakeup.notify_all();
        if let Err(e) = self.pool.join_all() {
            error!("error during runtime shutdown: {:?}", e);
        }

        let mut cancelled = self.handle.cancel_outstanding();

        // Resolvers may hold registrations: dropping them cancels their tasks.
        self.handle.resolvers.clear();
        cancelled += self.handle.cancel_outstanding();

        debug!(cancelled, "runtime shut down");
    }
}

impl Deref for Runtime {
    type Target = Handle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}
