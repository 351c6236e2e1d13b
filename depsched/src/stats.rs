use crate::task::TaskState;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time snapshot of the scheduler counters.
///
/// Counters are updated with relaxed atomics, so a snapshot taken while tasks
/// are in flight is not guaranteed to be internally consistent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Tasks accepted by `run`.
    pub created: u64,

    /// `Pending -> Ready` transitions, including continuations.
    pub readied: u64,

    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,

    /// Runs that ended in a continuation rather than a terminal state.
    pub continued: u64,

    /// Payload panics, each also counted as cancelled.
    pub panicked: u64,

    /// Slots currently held by a handle.
    pub live_tasks: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    created: AtomicU64,
    readied: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    continued: AtomicU64,
    panicked: AtomicU64,
}

impl Counters {
    pub(crate) fn inc_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_readied(&self) {
        self.readied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_continued(&self) {
        self.continued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_terminal(&self, state: TaskState) {
        let counter = match state {
            TaskState::Completed => &self.completed,
            TaskState::Failed => &self.failed,
            TaskState::Cancelled => &self.cancelled,
            _ => unreachable!("{} is not a terminal state", state),
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, live_tasks: usize) -> SchedulerStats {
        SchedulerStats {
            created: self.created.load(Ordering::Relaxed),
            readied: self.readied.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            continued: self.continued.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            live_tasks,
        }
    }
}
