use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering, fence};
use std::time::Duration;

/// Idle-worker wakeup shared by every ready queue.
///
/// A push only takes the lock when somebody is asleep, so the hot path stays a
/// single atomic load once every worker is busy.
#[derive(Debug)]
pub(crate) struct Wakeup {
    lock: Mutex<()>,
    cond: Condvar,
    sleepers: AtomicUsize,
}

impl Wakeup {
    pub(crate) fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            cond: Condvar::new(),
            sleepers: AtomicUsize::new(0),
        }
    }

    #[cfg(test)]
    pub(crate) fn sleepers(&self) -> usize {
        self.sleepers.load(Ordering::Acquire)
    }

    /// Called after every push. Pairs with the fence in `suspend`: either the
    /// sleeper sees the pushed task, or we see the sleeper.
    pub(crate) fn notify(&self) {
        fence(Ordering::SeqCst);
        if self.sleepers.load(Ordering::SeqCst) > 0 {
            self.notify_all();
        }
    }

    /// Unconditionally wakes every sleeper. Used on stop so a worker never sits
    /// out its whole timeout before noticing it has to exit.
    pub(crate) fn notify_all(&self) {
        // Taking the lock orders us after a sleeper's re-check.
        drop(self.lock.lock());
        self.cond.notify_all();
    }

    /// Suspends the calling thread until a push, a stop or `timeout`, whichever
    /// comes first. `should_wake` is re-checked under the lock, with the
    /// caller already counted as a sleeper, so a concurrent push is never lost.
    pub(crate) fn suspend(&self, timeout: Duration, should_wake: impl Fn() -> bool) {
        let mut guard = self.lock.lock();
        self.sleepers.fetch_add(1, Ordering::SeqCst);
        fence(Ordering::SeqCst);

        if !should_wake() {
            let _ = self.cond.wait_for(&mut guard, timeout);
        }

        self.sleepers.fetch_sub(1, Ordering::SeqCst);
    }
}
