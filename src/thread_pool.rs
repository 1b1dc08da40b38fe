//! A bounded thread-slot pool: multiple sentences may be parsed
//! concurrently by distinct OS threads, each holding a slot id in
//! `[0, MAX_NUM_THREADS)`. All per-thread state (OOV vocabulary extension,
//! the per-sentence arena, merit bucket caches) hangs off the slot rather
//! than behind a separately-locked global, so acquiring a slot is the only
//! synchronization point in the system.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};

use crate::vocab::{VocabId, OOV_SENTINEL_BASE};

pub const MAX_NUM_THREADS: usize = 32;

/// Per-thread scratch state, reset between sentences by the owning
/// [`ThreadSlotGuard`].
#[derive(Debug, Default)]
pub struct ThreadLocalState {
    pub oov_ids: HashMap<String, VocabId>,
    next_oov_id: u32,
}

impl ThreadLocalState {
    pub fn reset(&mut self) {
        self.oov_ids.clear();
        self.next_oov_id = 0;
    }

    /// Assigns (or returns the already-assigned) sentinel id for an
    /// out-of-vocabulary word seen by this thread during the current
    /// sentence.
    pub fn oov_id(&mut self, surface: &str) -> VocabId {
        if let Some(&id) = self.oov_ids.get(surface) {
            return id;
        }
        let id = OOV_SENTINEL_BASE - self.next_oov_id;
        self.next_oov_id += 1;
        self.oov_ids.insert(surface.to_string(), id);
        id
    }
}

struct PoolInner {
    free: Vec<usize>,
    slots: Vec<Mutex<ThreadLocalState>>,
}

/// A bounded pool of thread slots. `acquire` blocks (via a condvar) until a
/// slot is free; the returned guard releases its slot on drop.
pub struct ThreadSlotPool {
    inner: Mutex<PoolInner>,
    available: Condvar,
}

impl ThreadSlotPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_NUM_THREADS).max(1);
        let mut slots = Vec::with_capacity(capacity);
        let mut free = Vec::with_capacity(capacity);
        for i in 0..capacity {
            slots.push(Mutex::new(ThreadLocalState::default()));
            free.push(capacity - 1 - i);
        }
        ThreadSlotPool {
            inner: Mutex::new(PoolInner { free, slots }),
            available: Condvar::new(),
        }
    }

    pub fn acquire(&self) -> ThreadSlotGuard<'_> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(slot) = inner.free.pop() {
                return ThreadSlotGuard { pool: self, slot };
            }
            inner = self.available.wait(inner).unwrap();
        }
    }

    fn release(&self, slot: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.slots[slot].lock().unwrap().reset();
        inner.free.push(slot);
        self.available.notify_one();
    }
}

pub struct ThreadSlotGuard<'a> {
    pool: &'a ThreadSlotPool,
    slot: usize,
}

impl<'a> ThreadSlotGuard<'a> {
    pub fn id(&self) -> usize {
        self.slot
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut ThreadLocalState) -> R) -> R {
        let inner = self.pool.inner.lock().unwrap();
        let mut state = inner.slots[self.slot].lock().unwrap();
        f(&mut state)
    }
}

impl<'a> Drop for ThreadSlotGuard<'a> {
    fn drop(&mut self) {
        self.pool.release(self.slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release_cycles_slots() {
        let pool = ThreadSlotPool::new(2);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_ne!(a.id(), b.id());
        drop(a);
        let c = pool.acquire();
        assert!(c.id() < 2);
    }

    #[test]
    fn oov_ids_are_stable_within_a_slot() {
        let pool = ThreadSlotPool::new(1);
        let guard = pool.acquire();
        let id1 = guard.with_state(|s| s.oov_id("zorblex"));
        let id2 = guard.with_state(|s| s.oov_id("zorblex"));
        assert_eq!(id1, id2);
    }
}
