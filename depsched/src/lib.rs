//! An in-process, dependency-graph task scheduler.
//!
//! Tasks are submitted with an explicit set of prerequisites: other tasks, or
//! external completions such as an [`Event`]. Each task runs on one of a few
//! named queues ([`QueueId`]) as soon as, and only once, every prerequisite
//! resolved. Worker threads are bound to a subset of the queues, and any
//! thread can lend a hand through [`Handle::process_task`].

mod arena;

pub mod dependency;
pub use dependency::{Dependency, DependencyKind, DependencyResolver, Event, NO_DEPS, Registration};

mod error;
pub use error::SchedulerError;

pub mod queue;
pub use queue::{QueueId, QueueSet};

pub mod runtime;
pub use runtime::{Builder, Handle, Runtime, ThreadConfig, WaitStrategy};

mod shared;

mod stats;
pub use stats::SchedulerStats;

pub mod task;
pub use task::{Payload, RunContext, TaskHandle, TaskId, TaskState};

mod utils;

#[cfg(test)]
mod test_utils;
