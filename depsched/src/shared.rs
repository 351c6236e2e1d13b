use crate::arena::TaskArena;
use crate::error::SchedulerError;
use crate::queue::ReadyQueues;
use crate::stats::Counters;
use crate::task::{Payload, TaskHandle, TaskId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// State shared by every thread touching the scheduler. Task handles point
/// back here, so firing a dependency can reach the ready queues without going
/// through the façade.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) arena: TaskArena,
    pub(crate) queues: ReadyQueues,
    pub(crate) counters: Counters,
    shutdown: AtomicBool,
}

impl Shared {
    pub(crate) fn new(arena_capacity: usize) -> Self {
        Self {
            arena: TaskArena::new(arena_capacity),
            queues: ReadyQueues::new(),
            counters: Counters::default(),
            shutdown: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Returns true if this call initiated shutdown.
    pub(crate) fn set_shutdown(&self) -> bool {
        !self.shutdown.swap(true, Ordering::AcqRel)
    }

    /// Allocates a slot and installs `payload`. On failure the payload is
    /// handed back so the caller can still cancel it.
    pub(crate) fn allocate(
        self: &Arc<Self>,
        payload: Box<dyn Payload>,
    ) -> Result<TaskHandle, (SchedulerError, Box<dyn Payload>)> {
        let id = match self.arena.allocate() {
            Ok(id) => id,
            Err(err) => return Err((err, payload)),
        };

        self.arena.slot(id.index()).core.prepare(payload);
        self.counters.inc_created();
        Ok(TaskHandle::from_raw(Arc::clone(self), id))
    }

    pub(crate) fn upgrade(self: &Arc<Self>, id: TaskId) -> Result<TaskHandle, SchedulerError> {
        if self.arena.try_retain(id) {
            Ok(TaskHandle::from_raw(Arc::clone(self), id))
        } else {
            Err(SchedulerError::StaleTask(id))
        }
    }

    /// Handles to every task that is currently live.
    pub(crate) fn live_tasks(self: &Arc<Self>) -> Vec<TaskHandle> {
        (0..self.arena.high_water() as u32)
            .filter_map(|index| {
                let generation = self.arena.get(index)?.generation();
                self.upgrade(TaskId::new(index, generation)).ok()
            })
            .collect()
    }
}
