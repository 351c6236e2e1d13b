use crate::queue::QueueId;
use crate::shared::Shared;
use crate::task::core::TaskCore;
use crate::task::{TaskId, TaskState};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A counted reference to a task.
///
/// Holding a `TaskHandle` keeps the task's slot from being recycled, so its
/// state, failure and id stay observable after it finished. Clones are cheap:
/// one atomic increment. The slot goes back to the pool when the last handle
/// (including the ones held internally by queues and waiter lists) is dropped.
pub struct TaskHandle {
    shared: Arc<Shared>,
    id: TaskId,
}

impl TaskHandle {
    /// The caller transfers one slot reference to the new handle.
    pub(crate) fn from_raw(shared: Arc<Shared>, id: TaskId) -> Self {
        Self { shared, id }
    }

    pub(crate) fn core(&self) -> &TaskCore {
        let slot = self.shared.arena.slot(self.id.index());
        debug_assert_eq!(slot.generation(), self.id.generation());
        &slot.core
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> TaskState {
        self.core().state.load()
    }

    pub fn queue(&self) -> QueueId {
        self.core().queue()
    }

    /// Returns true once the task reached `Completed`, `Failed` or `Cancelled`.
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// The error returned by the payload, if the task `Failed`.
    pub fn failure(&self) -> Option<Arc<anyhow::Error>> {
        self.core().failure()
    }

    pub fn debug_name(&self) -> Cow<'static, str> {
        self.core().debug_name()
    }

    /// Number of dependents currently registered against this task.
    pub fn num_waiters(&self) -> usize {
        self.core().num_waiters()
    }
}

impl Clone for TaskHandle {
    fn clone(&self) -> Self {
        self.shared.arena.retain(self.id.index());
        Self {
            shared: Arc::clone(&self.shared),
            id: self.id,
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.shared.arena.release(self.id.index());
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for TaskHandle {}

impl Hash for TaskHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("name", &self.debug_name())
            .field("state", &self.state())
            .finish()
    }
}
