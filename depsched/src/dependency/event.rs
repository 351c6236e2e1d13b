use crate::dependency::{Dependency, Registration};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Completed,
    Failed,
    Abandoned,
}

enum EventState {
    Waiting(SmallVec<[Registration; 4]>),
    Signaled(Signal),
}

/// A one-shot external completion that tasks can depend on.
///
/// `Event` is the built-in external dependency: clone it into whatever
/// subsystem completes it, pass it (or a clone) as a dependency, then call one
/// of [`complete`], [`fail`] or [`abandon`] once. Tasks registered after the
/// event was signalled resolve immediately with the same outcome.
///
/// Dropping every clone of an unsignalled event abandons its waiters.
///
/// [`complete`]: Event::complete
/// [`fail`]: Event::fail
/// [`abandon`]: Event::abandon
#[derive(Clone)]
pub struct Event {
    state: Arc<Mutex<EventState>>,
}

impl Event {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EventState::Waiting(SmallVec::new()))),
        }
    }

    /// Signals success. Returns the number of waiting tasks that were
    /// resolved, or `None` if the event was already signalled.
    pub fn complete(&self) -> Option<usize> {
        self.signal(Signal::Completed)
    }

    /// Signals failure. Waiters still run and see one more failed dependency.
    pub fn fail(&self) -> Option<usize> {
        self.signal(Signal::Failed)
    }

    /// Signals that the event will never happen. Cancels every waiter.
    pub fn abandon(&self) -> Option<usize> {
        self.signal(Signal::Abandoned)
    }

    pub fn is_signaled(&self) -> bool {
        matches!(*self.state.lock(), EventState::Signaled(_))
    }

    pub fn num_waiters(&self) -> usize {
        match &*self.state.lock() {
            EventState::Waiting(regs) => regs.len(),
            EventState::Signaled(_) => 0,
        }
    }

    fn signal(&self, signal: Signal) -> Option<usize> {
        let regs = {
            let mut state = self.state.lock();
            match &mut *state {
                EventState::Signaled(_) => return None,
                EventState::Waiting(regs) => {
                    let regs = std::mem::take(regs);
                    *state = EventState::Signaled(signal);
                    regs
                }
            }
        };

        // Fired outside the lock: resolving may push, or recursively cancel.
        let n = regs.len();
        for reg in regs {
            dispatch(reg, signal);
        }
        Some(n)
    }

    /// Stores `reg` until the event is signalled, or fires it right away.
    pub(crate) fn attach(&self, reg: Registration) {
        let signaled = {
            let mut state = self.state.lock();
            match &mut *state {
                EventState::Waiting(regs) => {
                    regs.push(reg);
                    return;
                }
                EventState::Signaled(signal) => *signal,
            }
        };
        dispatch(reg, signaled);
    }
}

fn dispatch(reg: Registration, signal: Signal) {
    match signal {
        Signal::Completed => reg.fire(),
        Signal::Failed => reg.fail(),
        Signal::Abandoned => reg.abandon(),
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.lock() {
            EventState::Waiting(regs) => format!("Waiting({})", regs.len()),
            EventState::Signaled(signal) => format!("{:?}", signal),
        };
        f.debug_struct("Event").field("state", &state).finish()
    }
}

impl From<Event> for Dependency {
    fn from(event: Event) -> Self {
        Dependency::external(event)
    }
}

impl From<&Event> for Dependency {
    fn from(event: &Event) -> Self {
        Dependency::external(event.clone())
    }
}
