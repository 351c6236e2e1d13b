//! Logical queues and the per-queue ready lists.

use crate::task::TaskHandle;
use bitflags::bitflags;
use crossbeam_deque::{Injector, Steal};
use std::fmt;

mod wakeup;
pub(crate) use wakeup::Wakeup;

/// The closed set of logical queues a task can be bound to. A task's queue is
/// fixed when it is created and never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum QueueId {
    /// Work that must run on the thread driving the application loop.
    Main = 0,

    /// Work produced and consumed within a single frame.
    PerFrame = 1,

    /// Command recording and submission.
    Renderer = 2,

    /// Long running work with no frame deadline (streaming, compilation).
    Background = 3,
}

impl QueueId {
    pub const COUNT: usize = 4;

    pub const ALL: [QueueId; QueueId::COUNT] = [
        QueueId::Main,
        QueueId::PerFrame,
        QueueId::Renderer,
        QueueId::Background,
    ];

    #[inline(always)]
    pub(crate) fn as_index(self) -> usize {
        self as usize
    }

    pub(crate) fn from_u8(val: u8) -> QueueId {
        match val {
            0 => QueueId::Main,
            1 => QueueId::PerFrame,
            2 => QueueId::Renderer,
            3 => QueueId::Background,
            _ => unreachable!("invalid queue id {}", val),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            QueueId::Main => "main",
            QueueId::PerFrame => "per-frame",
            QueueId::Renderer => "renderer",
            QueueId::Background => "background",
        }
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// A set of logical queues, used as the service set of a worker thread and
    /// as the set of queues a blocked caller helps with.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueueSet: u8 {
        const MAIN = 1;
        const PER_FRAME = 1 << 1;
        const RENDERER = 1 << 2;
        const BACKGROUND = 1 << 3;
    }
}

impl QueueSet {
    /// Iterates the queues of the set, starting at `offset` and wrapping around.
    /// Workers rotate the offset so that no queue of their service set starves
    /// the others.
    pub fn iter_from(self, offset: usize) -> impl Iterator<Item = QueueId> {
        (0..QueueId::COUNT)
            .map(move |i| QueueId::ALL[(i + offset) % QueueId::COUNT])
            .filter(move |q| self.contains((*q).into()))
    }

    pub fn queues(self) -> impl Iterator<Item = QueueId> {
        self.iter_from(0)
    }
}

impl From<QueueId> for QueueSet {
    fn from(queue: QueueId) -> QueueSet {
        QueueSet::from_bits_retain(1 << queue.as_index())
    }
}

/// One unbounded multi-producer/multi-consumer ready list per logical queue.
///
/// A task is pushed here exactly once per run: by the thread whose decrement
/// took its remaining-dependency counter to zero. Ordering between unrelated
/// tasks is not guaranteed.
pub(crate) struct ReadyQueues {
    queues: [Injector<TaskHandle>; QueueId::COUNT],

    /// Parks idle workers and wakes them up on push.
    pub(crate) wakeup: Wakeup,
}

impl ReadyQueues {
    pub(crate) fn new() -> Self {
        Self {
            queues: std::array::from_fn(|_| Injector::new()),
            wakeup: Wakeup::new(),
        }
    }

    pub(crate) fn push(&self, task: TaskHandle) {
        let queue = task.queue();
        self.queues[queue.as_index()].push(task);
        self.wakeup.notify();
    }

    pub(crate) fn pop(&self, queue: QueueId) -> Option<TaskHandle> {
        let injector = &self.queues[queue.as_index()];

        loop {
            match injector.steal() {
                Steal::Success(task) => return Some(task),
                Steal::Empty => return None,
                Steal::Retry => std::hint::spin_loop(),
            }
        }
    }

    pub(crate) fn len(&self, queue: QueueId) -> usize {
        self.queues[queue.as_index()].len()
    }

    /// Returns true if no queue of `set` has a task waiting.
    pub(crate) fn is_empty(&self, set: QueueSet) -> bool {
        set.queues().all(|q| self.queues[q.as_index()].is_empty())
    }

    /// Removes every queued task. Only used during teardown, once no worker is
    /// left to pop them.
    pub(crate) fn drain(&self) -> Vec<TaskHandle> {
        QueueId::ALL
            .iter()
            .flat_map(|q| iter_drain(&self.queues[q.as_index()]))
            .collect()
    }
}

fn iter_drain(injector: &Injector<TaskHandle>) -> impl Iterator<Item = TaskHandle> + '_ {
    std::iter::from_fn(move || {
        loop {
            match injector.steal() {
                Steal::Success(task) => return Some(task),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    })
}

impl fmt::Debug for ReadyQueues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("ReadyQueues");
        for q in QueueId::ALL {
            dbg.field(q.name(), &self.len(q));
        }
        dbg.finish()
    }
}
