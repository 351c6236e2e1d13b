use crate::task::TaskId;

/// A centralized error type for every scheduler operation that can be refused.
///
/// None of these are fatal to the process. A refused `run` cancels the task it
/// was building, so the payload still observes `on_cancel`.
#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    /// The producer's outgoing waiter list is at capacity. Insert an
    /// intermediate join task (see `Handle::wait_async`) to fan out further.
    #[error("Task {producer} already has {capacity} waiters, cannot register another dependent")]
    WaiterListFull { producer: TaskId, capacity: usize },

    #[error("A single task run cannot wait on more than {max} dependencies")]
    TooManyDependencies { max: usize },

    /// An external dependency value was passed but no resolver is registered
    /// for its type.
    #[error("No dependency resolver registered for type `{type_name}`")]
    NoResolver { type_name: &'static str },

    /// A resolver was handed a value of a type it does not understand.
    #[error("Resolver expected a value of type `{expected}`")]
    UnexpectedDependencyValue { expected: &'static str },

    #[error("Task {0} cannot depend on itself")]
    SelfDependency(TaskId),

    /// Every slot of the task arena is in use.
    #[error("Task arena is exhausted ({capacity} live tasks)")]
    ArenaExhausted { capacity: usize },

    /// The id refers to a slot that has since been recycled.
    #[error("Task id {0} is stale, its slot was recycled")]
    StaleTask(TaskId),

    #[error("Scheduler is shutting down, no new tasks are accepted")]
    ShuttingDown,

    /// A catch-all for resolver specific failures.
    #[error("An unexpected error occurred: {0}")]
    Other(#[from] anyhow::Error),
}

impl SchedulerError {
    /// Errors the caller can recover from by restructuring the graph or
    /// retrying later, as opposed to programming errors.
    pub fn is_capacity_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::WaiterListFull { .. }
                | SchedulerError::TooManyDependencies { .. }
                | SchedulerError::ArenaExhausted { .. }
        )
    }
}

impl PartialEq for SchedulerError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::WaiterListFull { producer: a, .. }, Self::WaiterListFull { producer: b, .. }) => {
                a == b
            }
            (Self::TooManyDependencies { .. }, Self::TooManyDependencies { .. }) => true,
            (Self::NoResolver { type_name: a }, Self::NoResolver { type_name: b }) => a == b,
            (
                Self::UnexpectedDependencyValue { expected: a },
                Self::UnexpectedDependencyValue { expected: b },
            ) => a == b,
            (Self::SelfDependency(a), Self::SelfDependency(b)) => a == b,
            (Self::ArenaExhausted { .. }, Self::ArenaExhausted { .. }) => true,
            (Self::StaleTask(a), Self::StaleTask(b)) => a == b,
            (Self::ShuttingDown, Self::ShuttingDown) => true,
            _ => false,
        }
    }
}
