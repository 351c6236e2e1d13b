use crate::dependency::DependencyKind;
use crate::error::SchedulerError;
use crate::queue::QueueId;
use crate::task::state::{State, TaskState};
use crate::task::{Payload, TaskHandle, TaskId};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};

/// Maximum number of dependents a single task can notify. Fan out further by
/// inserting intermediate join tasks.
pub const MAX_WAITERS: usize = 15;

/// Maximum number of dependencies a single task run can wait on. Bounded by
/// the width of the resolved mask.
pub const MAX_DEPENDENCIES: usize = u64::BITS as usize;

/// One entry of a producer's outgoing waiter list.
pub(crate) struct Waiter {
    pub(crate) consumer: TaskHandle,
    pub(crate) bit: u8,
    pub(crate) kind: DependencyKind,
}

pub(crate) type WaiterList = SmallVec<[Waiter; MAX_WAITERS]>;

/// What registering against a producer did.
pub(crate) enum Attach {
    /// Appended to the waiter list, the producer will fire it on completion.
    Queued,

    /// The producer already reached this terminal state. The caller resolves
    /// the dependency on the spot.
    AlreadyFinished(TaskState),
}

/// Fields guarded by the body lock. Never held while a payload runs: the
/// payload is moved out first.
struct Body {
    payload: Option<Box<dyn Payload>>,
    name: Cow<'static, str>,
    failure: Option<Arc<anyhow::Error>>,
}

/// The mutable part of a task slot. Slots are reused, so every field is
/// reachable through `&self` and reset on recycle.
pub(crate) struct TaskCore {
    pub(crate) state: State,
    queue: AtomicU8,

    /// Exclusive right to execute or cancel the payload. Held by the creating
    /// thread while dependencies are registered, by the worker while the
    /// payload runs, and forever once the task is terminal.
    claimed: AtomicBool,

    /// Unresolved dependencies, plus one guard unit while registration is in
    /// progress.
    remaining: AtomicU32,
    resolved: AtomicU64,

    cancelled_deps: AtomicU32,
    failed_deps: AtomicU32,
    cancel_requested: AtomicBool,

    waiters: Mutex<WaiterList>,
    body: Mutex<Body>,
}

impl TaskCore {
    pub(crate) fn new() -> Self {
        Self {
            state: State::new(),
            queue: AtomicU8::new(QueueId::Main as u8),
            claimed: AtomicBool::new(false),
            remaining: AtomicU32::new(0),
            resolved: AtomicU64::new(0),
            cancelled_deps: AtomicU32::new(0),
            failed_deps: AtomicU32::new(0),
            cancel_requested: AtomicBool::new(false),
            waiters: Mutex::new(SmallVec::new()),
            body: Mutex::new(Body {
                payload: None,
                name: Cow::Borrowed(""),
                failure: None,
            }),
        }
    }

    /// Installs a fresh payload into a just allocated slot. The calling thread
    /// owns the claim and the registration guard afterwards.
    pub(crate) fn prepare(&self, payload: Box<dyn Payload>) {
        self.queue.store(payload.queue() as u8, Ordering::Relaxed);
        {
            let mut body = self.body.lock();
            body.name = payload.debug_name();
            body.payload = Some(payload);
            body.failure = None;
        }

        self.state.store(TaskState::Created);
        self.claimed.store(true, Ordering::SeqCst);
        self.remaining.store(1, Ordering::Release);
    }

    /// Returns the slot to its pristine state. The payload, if any, is dropped
    /// outside the lock as it may own other task handles.
    pub(crate) fn reset(&self) {
        let payload = {
            let mut body = self.body.lock();
            body.name = Cow::Borrowed("");
            body.failure = None;
            body.payload.take()
        };
        let waiters = std::mem::take(&mut *self.waiters.lock());
        debug_assert!(waiters.is_empty(), "recycled a task with live waiters");

        self.state.store(TaskState::Created);
        self.claimed.store(false, Ordering::SeqCst);
        self.remaining.store(0, Ordering::Relaxed);
        self.resolved.store(0, Ordering::Relaxed);
        self.cancelled_deps.store(0, Ordering::Relaxed);
        self.failed_deps.store(0, Ordering::Relaxed);
        self.cancel_requested.store(false, Ordering::Relaxed);

        drop(payload);
        drop(waiters);
    }

    pub(crate) fn queue(&self) -> QueueId {
        QueueId::from_u8(self.queue.load(Ordering::Relaxed))
    }

    pub(crate) fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn release_claim(&self) {
        self.claimed.store(false, Ordering::SeqCst);
    }

    pub(crate) fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn cancelled_deps(&self) -> u32 {
        self.cancelled_deps.load(Ordering::Acquire)
    }

    pub(crate) fn failed_deps(&self) -> u32 {
        self.failed_deps.load(Ordering::Acquire)
    }

    pub(crate) fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }

    /// Counts one more dependency. Must happen before the dependency becomes
    /// visible to whoever fires it.
    pub(crate) fn add_pending(&self) {
        self.remaining.fetch_add(1, Ordering::AcqRel);
    }

    /// Undoes `add_pending` for a dependency that was refused before anybody
    /// could fire it.
    pub(crate) fn remove_pending(&self) {
        let prev = self.remaining.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 1, "dropped below the registration guard");
    }

    /// Drops the registration guard. Returns true if this took the counter to
    /// zero, in which case the caller owns the `Pending -> Ready` transition.
    pub(crate) fn release_guard(&self) -> bool {
        self.remaining.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Marks dependency `bit` as resolved. Returns true if this was the last
    /// outstanding one. A second resolution of the same bit is ignored.
    pub(crate) fn resolve(&self, bit: u8, cancel: bool, failed: bool) -> bool {
        let mask = 1u64 << bit;
        let prev = self.resolved.fetch_or(mask, Ordering::AcqRel);
        debug_assert_eq!(prev & mask, 0, "dependency {} resolved twice", bit);
        if prev & mask != 0 {
            return false;
        }

        // Published by the AcqRel decrement below.
        if cancel {
            self.cancelled_deps.fetch_add(1, Ordering::Relaxed);
        }
        if failed {
            self.failed_deps.fetch_add(1, Ordering::Relaxed);
        }

        let prev = self.remaining.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "remaining dependency counter underflow");
        prev == 1
    }

    /// Rearms the dependency set for another run. Only called by the thread
    /// holding the claim.
    pub(crate) fn reset_for_continuation(&self) {
        self.resolved.store(0, Ordering::Relaxed);
        self.failed_deps.store(0, Ordering::Relaxed);
        self.remaining.store(1, Ordering::Release);
    }

    /// Appends a waiter unless the task is already terminal or the list is full.
    pub(crate) fn attach(
        &self,
        producer: TaskId,
        consumer: &TaskHandle,
        bit: u8,
        kind: DependencyKind,
    ) -> Result<Attach, SchedulerError> {
        let mut waiters = self.waiters.lock();

        // Terminal states are stored under this lock, so this cannot race with
        // the drain in `finish`.
        let state = self.state.load();
        if state.is_terminal() {
            return Ok(Attach::AlreadyFinished(state));
        }

        if waiters.len() >= MAX_WAITERS {
            return Err(SchedulerError::WaiterListFull {
                producer,
                capacity: MAX_WAITERS,
            });
        }

        waiters.push(Waiter {
            consumer: consumer.clone(),
            bit,
            kind,
        });
        Ok(Attach::Queued)
    }

    /// Stores the terminal state and hands back the waiters to notify. Every
    /// waiter is returned exactly once over the lifetime of the run.
    pub(crate) fn finish(&self, state: TaskState) -> WaiterList {
        debug_assert!(state.is_terminal());

        let mut waiters = self.waiters.lock();
        self.state.store(state);
        std::mem::take(&mut *waiters)
    }

    pub(crate) fn num_waiters(&self) -> usize {
        self.waiters.lock().len()
    }

    pub(crate) fn take_payload(&self) -> Option<Box<dyn Payload>> {
        self.body.lock().payload.take()
    }

    pub(crate) fn restore_payload(&self, payload: Box<dyn Payload>) {
        let prev = self.body.lock().payload.replace(payload);
        debug_assert!(prev.is_none());
    }

    pub(crate) fn debug_name(&self) -> Cow<'static, str> {
        self.body.lock().name.clone()
    }

    pub(crate) fn set_failure(&self, err: anyhow::Error) {
        self.body.lock().failure = Some(Arc::new(err));
    }

    pub(crate) fn failure(&self) -> Option<Arc<anyhow::Error>> {
        self.body.lock().failure.clone()
    }
}

impl fmt::Debug for TaskCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCore")
            .field("state", &self.state)
            .field("queue", &self.queue())
            .field("remaining", &self.remaining())
            .field("resolved", &self.resolved.load(Ordering::Relaxed))
            .field("cancelled_deps", &self.cancelled_deps())
            .field("failed_deps", &self.failed_deps())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_guard_holds_counter_above_zero() {
        let core = TaskCore::new();
        core.prepare(Box::new(Noop::new(QueueId::Main)));

        core.add_pending();
        core.add_pending();

        assert!(!core.resolve(0, false, false));
        assert!(!core.resolve(1, false, false));
        assert_eq!(core.remaining(), 1);

        assert!(core.release_guard());
        assert_eq!(core.remaining(), 0);
    }

    #[test]
    fn test_resolve_counts_outcomes() {
        let core = TaskCore::new();
        core.prepare(Box::new(Noop::new(QueueId::Main)));

        for _ in 0..3 {
            core.add_pending();
        }
        core.resolve(0, true, false);
        core.resolve(1, false, true);
        core.resolve(2, false, false);

        assert_eq!(core.cancelled_deps(), 1);
        assert_eq!(core.failed_deps(), 1);
        assert!(core.release_guard());
    }

    #[test]
    fn test_claim_is_exclusive() {
        let core = TaskCore::new();
        core.prepare(Box::new(Noop::new(QueueId::Main)));

        assert!(!core.try_claim());
        core.release_claim();
        assert!(core.try_claim());
        assert!(!core.try_claim());
    }

    #[test]
    fn test_reset_clears_everything() {
        let core = TaskCore::new();
        core.prepare(Box::new(Noop::new(QueueId::Background)));
        core.request_cancel();
        core.set_failure(anyhow::anyhow!("boom"));

        core.reset();

        assert_eq!(core.state.load(), TaskState::Created);
        assert!(!core.cancel_requested());
        assert!(core.failure().is_none());
        assert!(core.take_payload().is_none());
        assert_eq!(core.remaining(), 0);
    }
}
