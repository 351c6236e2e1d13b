//! Dependency descriptors and the resolution protocol.
//!
//! A task waits on up to [`MAX_DEPENDENCIES`] dependencies per run. Each one is
//! either another task or an external value understood by a
//! [`DependencyResolver`]. Whatever the kind, a dependency is resolved exactly
//! once: the resolved bit is set and the consumer's counter decremented, and
//! whoever takes that counter to zero pushes the consumer to its ready queue.
//!
//! [`MAX_DEPENDENCIES`]: crate::task::MAX_DEPENDENCIES

use crate::task::harness;
use crate::task::{TaskHandle, TaskId, TaskState};
use std::any::Any;
use std::fmt;
use tracing::{debug, warn};

mod event;
pub use event::Event;

mod resolver;
pub use resolver::DependencyResolver;
pub(crate) use resolver::ResolverRegistry;

/// An empty dependency list, for tasks that can run right away.
pub const NO_DEPS: [Dependency; 0] = [];

/// How the outcome of a producer task affects its consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    /// A `Cancelled` producer cancels the consumer.
    Strong,

    /// The consumer runs whatever the producer's outcome.
    Weak,
}

/// Something a task waits on before it becomes ready.
pub enum Dependency {
    Task {
        handle: TaskHandle,
        kind: DependencyKind,
    },
    External {
        value: Box<dyn Any + Send>,
        type_name: &'static str,
    },
}

impl Dependency {
    pub fn strong(handle: &TaskHandle) -> Self {
        Dependency::Task {
            handle: handle.clone(),
            kind: DependencyKind::Strong,
        }
    }

    pub fn weak(handle: &TaskHandle) -> Self {
        Dependency::Task {
            handle: handle.clone(),
            kind: DependencyKind::Weak,
        }
    }

    /// Wraps a value resolved by the resolver registered for `T`.
    pub fn external<T: Any + Send>(value: T) -> Self {
        Dependency::External {
            value: Box::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }
}

impl From<TaskHandle> for Dependency {
    fn from(handle: TaskHandle) -> Self {
        Dependency::Task {
            handle,
            kind: DependencyKind::Strong,
        }
    }
}

impl From<&TaskHandle> for Dependency {
    fn from(handle: &TaskHandle) -> Self {
        Dependency::strong(handle)
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Task { handle, kind } => f
                .debug_struct("Task")
                .field("id", &handle.id())
                .field("kind", kind)
                .finish(),
            Dependency::External { type_name, .. } => f
                .debug_struct("External")
                .field("type", type_name)
                .finish(),
        }
    }
}

/// How a dependency ended, as seen by its consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    Satisfied,
    Failed,
    Cancelled,
}

impl Resolution {
    pub(crate) fn from_terminal(state: TaskState) -> Resolution {
        match state {
            TaskState::Completed => Resolution::Satisfied,
            TaskState::Failed => Resolution::Failed,
            TaskState::Cancelled => Resolution::Cancelled,
            _ => unreachable!("{} is not a terminal state", state),
        }
    }
}

/// Resolves dependency `bit` of `consumer`, readying it if this was the last
/// one outstanding.
///
/// A strong dependency that ended `Cancelled` cancels the consumer right away,
/// without waiting for its other dependencies. If the consumer is claimed
/// (still registering, or registering a continuation), the owner sees the
/// cancel request when it lets go of the claim.
pub(crate) fn resolve(
    consumer: &TaskHandle,
    bit: u8,
    resolution: Resolution,
    kind: DependencyKind,
) {
    let cancel = resolution == Resolution::Cancelled && kind == DependencyKind::Strong;
    let failed = resolution == Resolution::Failed;

    let core = consumer.core();
    let last = core.resolve(bit, cancel, failed);

    if cancel {
        core.request_cancel();
        if core.try_claim() {
            debug!(task_id = %consumer.id(), "strong dependency cancelled, cancelling task");
            harness::cancel_claimed(consumer);
            return;
        }
    }

    if last {
        harness::make_ready(consumer);
    }
}

/// Single-use token handed to a [`DependencyResolver`] for one external
/// dependency of one task.
///
/// Consuming the token is the only way to resolve the dependency, so it can
/// never fire twice. A token dropped without being fired is treated as
/// abandoned and cancels the waiting task, so a task never waits on a resolver
/// that forgot about it.
#[must_use = "dropping a registration cancels the waiting task"]
pub struct Registration {
    consumer: Option<TaskHandle>,
    bit: u8,
}

impl Registration {
    pub(crate) fn new(consumer: TaskHandle, bit: u8) -> Self {
        Self {
            consumer: Some(consumer),
            bit,
        }
    }

    /// Id of the task waiting on this registration.
    pub fn task_id(&self) -> Option<TaskId> {
        self.consumer.as_ref().map(TaskHandle::id)
    }

    /// The awaited event happened.
    pub fn fire(mut self) {
        self.resolve(Resolution::Satisfied);
    }

    /// The awaited event happened, but unsuccessfully. The waiting task still
    /// runs and can inspect `RunContext::failed_dependencies`.
    pub fn fail(mut self) {
        self.resolve(Resolution::Failed);
    }

    /// The awaited event will never happen. Cancels the waiting task.
    pub fn abandon(mut self) {
        self.resolve(Resolution::Cancelled);
    }

    fn resolve(&mut self, resolution: Resolution) {
        if let Some(consumer) = self.consumer.take() {
            resolve(&consumer, self.bit, resolution, DependencyKind::Strong);
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(consumer) = &self.consumer {
            warn!(
                task_id = %consumer.id(),
                "registration dropped without firing, cancelling waiting task"
            );
            self.resolve(Resolution::Cancelled);
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("task_id", &self.task_id())
            .field("bit", &self.bit)
            .finish()
    }
}
