use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a task.
///
/// ```text
///  Created ──► Pending ──► Ready ──► Running ──► Completed | Failed | Cancelled
///                 ▲                     │
///                 └──── continuation ───┘
/// ```
///
/// Any non-terminal state can also move straight to `Cancelled`. Terminal
/// states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskState {
    /// Allocated, dependencies are being registered.
    Created = 0,

    /// Waiting on at least one dependency.
    Pending = 1,

    /// Sitting in its ready queue.
    Ready = 2,

    /// A thread is executing the payload.
    Running = 3,

    Completed = 4,
    Failed = 5,
    Cancelled = 6,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    fn from_u8(val: u8) -> TaskState {
        match val {
            0 => TaskState::Created,
            1 => TaskState::Pending,
            2 => TaskState::Ready,
            3 => TaskState::Running,
            4 => TaskState::Completed,
            5 => TaskState::Failed,
            6 => TaskState::Cancelled,
            _ => unreachable!("invalid task state {}", val),
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Atomic cell holding a [`TaskState`].
pub(crate) struct State(AtomicU8);

impl State {
    pub(crate) const fn new() -> Self {
        State(AtomicU8::new(TaskState::Created as u8))
    }

    pub(crate) fn load(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: TaskState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Single winner transition. Returns false if the state was not `from`.
    pub(crate) fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(), f)
    }
}
