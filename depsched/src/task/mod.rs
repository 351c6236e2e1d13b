//! The task object model.
//!
//! A task is a slot in the scheduler's arena holding a [`Payload`], a fixed
//! queue affinity, an atomic lifecycle [`TaskState`], the countdown of its
//! unresolved dependencies and the bounded list of dependents to notify when
//! it finishes. Callers only ever see [`TaskHandle`]s (counted references) and
//! [`TaskId`]s (plain ids that can go stale).

pub(crate) mod core;
pub use self::core::{MAX_DEPENDENCIES, MAX_WAITERS};

pub(crate) mod harness;

mod handle;
pub use handle::TaskHandle;

mod id;
pub use id::TaskId;

mod payload;
pub(crate) use payload::Join;
pub use payload::{FnPayload, Payload, RunContext};

mod state;
pub use state::TaskState;

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(TaskHandle: Send, Sync, Clone);
    assert_impl_all!(TaskId: Send, Sync, Copy);
    assert_impl_all!(TaskState: Send, Sync, Copy);
}
