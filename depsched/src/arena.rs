//! Pooled storage for task slots.
//!
//! The arena is a fixed-capacity table of slots, split into chunks that are
//! only allocated the first time one of their slots is handed out. Every slot
//! carries:
//!
//! - a generation, bumped on recycle, so stale [`TaskId`]s are detected;
//! - an atomic reference count, one unit per live [`TaskHandle`];
//! - the [`TaskCore`] itself.
//!
//! Slots are never moved or freed before the arena itself, so a handle can
//! borrow its core without any lock. Recycled indices go through a lock-free
//! free list.
//!
//! [`TaskHandle`]: crate::task::TaskHandle

use crate::error::SchedulerError;
use crate::task::TaskId;
use crate::task::core::TaskCore;
use crossbeam_queue::SegQueue;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering, fence};

/// Slots per chunk.
pub(crate) const CHUNK_SIZE: usize = 256;

pub(crate) struct Slot {
    generation: AtomicU32,
    refs: AtomicUsize,
    pub(crate) core: TaskCore,
}

impl Slot {
    fn new() -> Self {
        Self {
            generation: AtomicU32::new(0),
            refs: AtomicUsize::new(0),
            core: TaskCore::new(),
        }
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }
}

pub(crate) struct TaskArena {
    chunks: Box<[OnceLock<Box<[Slot]>>]>,
    capacity: usize,

    /// Indices below this have been handed out at least once.
    high_water: AtomicUsize,
    free: SegQueue<u32>,
    live: AtomicUsize,
}

impl TaskArena {
    #[track_caller]
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "arena capacity must be greater than 0");
        assert!(
            capacity <= u32::MAX as usize,
            "arena capacity must fit in a u32 index"
        );

        let num_chunks = capacity.div_ceil(CHUNK_SIZE);
        Self {
            chunks: (0..num_chunks).map(|_| OnceLock::new()).collect(),
            capacity,
            high_water: AtomicUsize::new(0),
            free: SegQueue::new(),
            live: AtomicUsize::new(0),
        }
    }

    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn high_water(&self) -> usize {
        self.high_water.load(Ordering::Acquire)
    }

    /// Reserves a slot and returns its id with one reference held.
    pub(crate) fn allocate(&self) -> Result<TaskId, SchedulerError> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => self.bump()?,
        };

        let slot = self.init_slot(index);
        debug_assert_eq!(slot.refs.load(Ordering::Acquire), 0);
        slot.refs.store(1, Ordering::Release);
        self.live.fetch_add(1, Ordering::AcqRel);

        Ok(TaskId::new(index, slot.generation()))
    }

    fn bump(&self) -> Result<u32, SchedulerError> {
        let capacity = self.capacity;
        self.high_water
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            })
            .map(|n| n as u32)
            .map_err(|_| SchedulerError::ArenaExhausted { capacity })
    }

    fn init_slot(&self, index: u32) -> &Slot {
        let (chunk, offset) = split(index);
        &self.chunks[chunk].get_or_init(|| (0..CHUNK_SIZE).map(|_| Slot::new()).collect())[offset]
    }

    /// Returns the slot at `index` if its chunk was ever allocated.
    pub(crate) fn get(&self, index: u32) -> Option<&Slot> {
        let (chunk, offset) = split(index);
        self.chunks.get(chunk)?.get().map(|slots| &slots[offset])
    }

    /// Returns a slot that is known to be allocated: the caller holds a
    /// reference to it.
    pub(crate) fn slot(&self, index: u32) -> &Slot {
        match self.get(index) {
            Some(slot) => slot,
            None => unreachable!("task slot {} was never allocated", index),
        }
    }

    pub(crate) fn retain(&self, index: u32) {
        let prev = self.slot(index).refs.fetch_add(1, Ordering::Relaxed);
        debug_assert!(prev > 0, "retained a free slot");
    }

    /// Takes a reference to `id` if it is still live under the same generation.
    pub(crate) fn try_retain(&self, id: TaskId) -> bool {
        let Some(slot) = self.get(id.index()) else {
            return false;
        };

        let mut refs = slot.refs.load(Ordering::Relaxed);
        loop {
            if refs == 0 {
                return false;
            }
            match slot.refs.compare_exchange_weak(
                refs,
                refs + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => refs = actual,
            }
        }

        // The slot may have been recycled and reallocated in between.
        if slot.generation() != id.generation() {
            self.release(id.index());
            return false;
        }
        true
    }

    /// Drops one reference. The last one recycles the slot.
    pub(crate) fn release(&self, index: u32) {
        let slot = self.slot(index);
        if slot.refs.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        fence(Ordering::Acquire);

        slot.core.reset();
        slot.generation.fetch_add(1, Ordering::Release);
        self.live.fetch_sub(1, Ordering::AcqRel);
        self.free.push(index);
    }
}

impl std::fmt::Debug for TaskArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskArena")
            .field("capacity", &self.capacity)
            .field("high_water", &self.high_water())
            .field("live", &self.live())
            .finish()
    }
}

#[inline(always)]
fn split(index: u32) -> (usize, usize) {
    let index = index as usize;
    (index / CHUNK_SIZE, index % CHUNK_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use static_assertions::assert_impl_all;

    assert_impl_all!(TaskArena: Send, Sync);

    #[test]
    fn test_allocate_and_recycle() -> Result<()> {
        let arena = TaskArena::new(4);

        let a = arena.allocate()?;
        let b = arena.allocate()?;
        assert_ne!(a.index(), b.index());
        assert_eq!(arena.live(), 2);

        arena.release(a.index());
        assert_eq!(arena.live(), 1);

        // The recycled index comes back under a new generation.
        let c = arena.allocate()?;
        assert_eq!(c.index(), a.index());
        assert_eq!(c.generation(), a.generation() + 1);
        assert!(!arena.try_retain(a));
        assert!(arena.try_retain(c));

        Ok(())
    }

    #[test]
    fn test_exhausted() -> Result<()> {
        let arena = TaskArena::new(2);
        arena.allocate()?;
        arena.allocate()?;

        assert_eq!(
            arena.allocate().unwrap_err(),
            SchedulerError::ArenaExhausted { capacity: 2 }
        );
        Ok(())
    }

    #[test]
    fn test_chunks_are_lazy() -> Result<()> {
        let arena = TaskArena::new(CHUNK_SIZE * 4);
        assert!(arena.get(0).is_none());

        for _ in 0..=CHUNK_SIZE {
            arena.allocate()?;
        }
        assert!(arena.get(CHUNK_SIZE as u32).is_some());
        assert!(arena.get(2 * CHUNK_SIZE as u32).is_none());
        assert_eq!(arena.high_water(), CHUNK_SIZE + 1);

        Ok(())
    }

    #[test]
    fn test_retain_keeps_slot_alive() -> Result<()> {
        let arena = TaskArena::new(1);
        let id = arena.allocate()?;

        arena.retain(id.index());
        arena.release(id.index());
        assert!(arena.try_retain(id));

        arena.release(id.index());
        arena.release(id.index());
        assert_eq!(arena.live(), 0);
        assert!(!arena.try_retain(id));

        Ok(())
    }
}
