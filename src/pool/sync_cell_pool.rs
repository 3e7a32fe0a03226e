//! A bounded free-list of idle [`SyncCell`]s. Reuse avoids an allocation on
//! every blocking send/receive/select, but a cell that timed out may still be
//! observed by a thread that never got unparked in time — so a cell is only
//! handed back out once this pool is its sole owner.

use std::sync::Arc;

use crate::spinlock::SpinLock;
use crate::sync_cell::SyncCell;

const DEFAULT_CAPACITY: usize = 256;

pub(crate) struct SyncCellPool<V> {
    capacity: usize,
    idle: SpinLock<Vec<Arc<SyncCell<V>>>>,
}

impl<V> SyncCellPool<V> {
    pub(crate) fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            idle: SpinLock::new(Vec::with_capacity(capacity.min(DEFAULT_CAPACITY))),
        }
    }

    /// Returns a ready-to-use cell: either a uniquely-owned idle one (reset in
    /// place) or a freshly allocated one.
    pub(crate) fn obtain(&self) -> Arc<SyncCell<V>> {
        let mut idle = self.idle.lock();
        while let Some(candidate) = idle.pop() {
            if Arc::strong_count(&candidate) == 1 {
                // Safety: strong count of 1 means this pool is the only
                // owner, so no other thread can be parked on it.
                unsafe { candidate.reset() };
                return candidate;
            }
            // A timed-out waiter may still hold a clone; drop this entry on
            // the floor rather than reviving a cell someone else can see.
        }
        drop(idle);
        Arc::new(SyncCell::new())
    }

    /// Returns a cell to the pool once the caller is done with it. Silently
    /// dropped instead of stored once the pool is at capacity.
    pub(crate) fn release(&self, cell: Arc<SyncCell<V>>) {
        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push(cell);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn reuses_a_uniquely_owned_cell() {
        let pool: SyncCellPool<u32> = SyncCellPool::new();
        let a = pool.obtain();
        let ptr = Arc::as_ptr(&a);
        pool.release(a);
        let b = pool.obtain();
        assert_eq!(ptr, Arc::as_ptr(&b));
    }

    #[test]
    fn skips_a_cell_another_thread_still_holds() {
        let pool: SyncCellPool<u32> = SyncCellPool::new();
        let a = pool.obtain();
        let _still_held = a.clone();
        pool.release(a);
        let b = pool.obtain();
        // `b` must be a fresh cell, not the one still referenced elsewhere.
        assert_eq!(Arc::strong_count(&_still_held), 1);
        drop(b);
    }

    #[test]
    fn timed_out_waiter_still_holding_a_clone_blocks_reuse() {
        let pool: SyncCellPool<u32> = SyncCellPool::new();
        let cell = pool.obtain();
        let clone = cell.clone();
        // Simulate a waiter that timed out but whose stack frame (and clone)
        // is still alive, e.g. a select() that is still unwinding.
        assert!(!clone.wait(Some(Instant::now() + Duration::from_millis(10))));
        pool.release(cell);
        let next = pool.obtain();
        assert_ne!(Arc::as_ptr(&next), Arc::as_ptr(&clone));
    }
}
