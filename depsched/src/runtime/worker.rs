use crate::queue::{QueueId, QueueSet};
use crate::runtime::{Handle, WaitStrategy};
use crate::utils::scope_guard::ScopeGuard;
use std::hint;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::debug;

/// A worker thread's event loop: run ready tasks from the service set, idle
/// when there are none, exit once told to stop.
#[derive(Debug)]
pub(crate) struct Worker {
    name: String,
    queues: QueueSet,
    looping: Arc<AtomicBool>,
    wait_strategy: WaitStrategy,
    cycles_before_suspend: usize,
}

impl Worker {
    pub(crate) fn new(name: String, queues: QueueSet, scheduler: &Handle) -> Self {
        Self {
            name,
            queues,
            looping: Arc::new(AtomicBool::new(true)),
            wait_strategy: scheduler.cfg.wait_strategy,
            cycles_before_suspend: scheduler.cfg.process_cycles_before_suspend,
        }
    }

    /// Flag cleared to stop the worker.
    pub(crate) fn looping(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.looping)
    }

    fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Acquire)
    }

    pub(crate) fn event_loop(&self, scheduler: &Handle) {
        let span = tracing::debug_span!("worker", name = %self.name);
        let _enter = span.enter();

        debug!(queues = ?self.queues, "worker started");
        let _exit = ScopeGuard::new(|| debug!("worker stopped"));

        // Start each worker at a different queue of its service set.
        let mut offset = fastrand::usize(..QueueId::COUNT);
        let mut idle_passes = 0;

        while self.is_looping() {
            if self.run_pass(scheduler, offset) {
                idle_passes = 0;
            } else {
                idle_passes += 1;
            }
            offset = offset.wrapping_add(1);

            if idle_passes >= self.cycles_before_suspend {
                self.idle(scheduler);
                idle_passes = 0;
            }
        }
    }

    /// Tries every queue of the service set once. Returns true if any task ran.
    fn run_pass(&self, scheduler: &Handle, offset: usize) -> bool {
        let mut found = false;

        for queue in self.queues.iter_from(offset) {
            if !self.is_looping() {
                break;
            }
            found |= scheduler.process_task(queue);
        }

        found
    }

    fn idle(&self, scheduler: &Handle) {
        match self.wait_strategy {
            WaitStrategy::Block { timeout } => {
                let queues = &scheduler.shared.queues;
                queues.wakeup.suspend(timeout, || {
                    !self.is_looping() || !queues.is_empty(self.queues)
                });
            }
            WaitStrategy::Spin { spins } => {
                for _ in 0..spins {
                    hint::spin_loop();
                }
                thread::yield_now();
            }
        }
    }
}
