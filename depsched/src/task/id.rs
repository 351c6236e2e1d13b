use std::fmt;
use std::hash::{Hash, Hasher};

/// An opaque id that identifies a task slot for one lifetime of that slot.
///
/// Unlike a [`TaskHandle`], a `TaskId` does not keep the task alive: once every
/// handle is dropped the slot is recycled under a new generation and the id
/// goes stale. Use [`Handle::upgrade`] to turn it back into a handle.
///
/// # Notes
///
/// - Ids are *not* sequential. Slot indices are reused, in no particular order.
/// - Two live tasks never share an id.
///
/// [`TaskHandle`]: crate::task::TaskHandle
/// [`Handle::upgrade`]: crate::runtime::Handle::upgrade
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaskId {
    index: u32,
    generation: u32,
}

impl TaskId {
    #[inline]
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Packed form, handy as a tracing field.
    pub fn as_u64(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({}:{})", self.index, self.generation)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index, self.generation)
    }
}

impl Hash for TaskId {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.as_u64());
    }
}
