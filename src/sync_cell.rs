//! The two-phase semaphore at the center of every blocking path in this
//! crate: a signed counter for classic P/V wait/signal, plus a tagged state
//! machine (`Ready -> Pointer -> Done`) whose `Ready -> Pointer` transition is
//! the single atomic commit point a multi-way `select` races on.
//!
//! The blocking half is a lazily published `std::thread::Thread` handle
//! parked/unparked directly — there is no real kernel semaphore object to
//! construct, `std::thread::park` already *is* the OS-level primitive.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::thread::{self, Thread};
use std::time::Instant;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellState {
    Ready = 0,
    Pointer = 1,
    Done = 2,
}

impl CellState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => CellState::Ready,
            1 => CellState::Pointer,
            2 => CellState::Done,
            other => unreachable!("invalid SyncCell state byte {other}"),
        }
    }
}

/// `V` is whatever a particular use of the cell hands across the rendezvous:
/// the value itself for a plain blocking send/receive, or a `Selection` for a
/// multi-way `select`.
///
/// The type itself is `pub` only so it can appear in the [`crate::select`]
/// trait signatures that heterogeneous channel arms implement; every member
/// stays `pub(crate)`, so a `SyncCell` is an opaque handle outside this
/// crate.
pub struct SyncCell<V> {
    counter: AtomicI64,
    state: AtomicU8,
    slot: UnsafeCell<Option<V>>,
    parked: UnsafeCell<Option<Thread>>,
    published: AtomicBool,
}

// Safety: `slot` and `parked` are only ever touched by the side that currently
// owns the cell's state transition (see the per-method safety comments); the
// `AtomicU8` state word is what makes ownership well defined across threads.
unsafe impl<V: Send> Send for SyncCell<V> {}
unsafe impl<V: Send> Sync for SyncCell<V> {}

impl<V> SyncCell<V> {
    pub(crate) fn new() -> Self {
        Self {
            counter: AtomicI64::new(0),
            state: AtomicU8::new(CellState::Ready as u8),
            slot: UnsafeCell::new(None),
            parked: UnsafeCell::new(None),
            published: AtomicBool::new(false),
        }
    }

    /// Restores a cell drawn from a [`crate::pool::sync_cell_pool::SyncCellPool`]
    /// to its initial configuration.
    ///
    /// # Safety
    /// The caller must hold the only `Arc` to this cell (the pool's
    /// uniqueness check) — nobody else may still be parked on it.
    pub(crate) unsafe fn reset(&self) {
        self.counter.store(0, Ordering::Relaxed);
        self.state.store(CellState::Ready as u8, Ordering::Relaxed);
        unsafe {
            *self.slot.get() = None;
            *self.parked.get() = None;
        }
        self.published.store(false, Ordering::Relaxed);
    }

    pub(crate) fn state(&self) -> CellState {
        CellState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The selection commit point: `Ready -> Pointer`. Exactly one caller
    /// across every channel racing this cell observes `true`.
    pub(crate) fn try_claim(&self) -> bool {
        self.state
            .compare_exchange(
                CellState::Ready as u8,
                CellState::Pointer as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Unconditional `-> Done`. Called by whichever side just finished
    /// reading or writing the slot, so a cell returned to the pool never
    /// looks claimable again.
    pub(crate) fn finish(&self) {
        self.state.store(CellState::Done as u8, Ordering::Release);
    }

    /// # Safety
    /// Only the thread that just won `try_claim` may call this, and only
    /// once.
    pub(crate) unsafe fn put(&self, value: V) {
        unsafe {
            *self.slot.get() = Some(value);
        }
    }

    /// # Safety
    /// Only valid once the caller has observed this cell reach `Pointer` or
    /// `Done` (i.e. after `wait` returns, or after winning `try_claim`
    /// itself).
    pub(crate) unsafe fn take(&self) -> Option<V> {
        unsafe { (*self.slot.get()).take() }
    }

    /// P: decrement, blocking (optionally with a deadline) if the
    /// post-decrement count is negative. Returns `false` only on timeout; a
    /// `false` return restores the ticket it had reserved and moves the cell
    /// to `Done` so no later claimant can mistake it for still `Ready`.
    pub(crate) fn wait(&self, deadline: Option<Instant>) -> bool {
        let prev = self.counter.fetch_sub(1, Ordering::AcqRel);
        if prev > 0 {
            return true;
        }
        unsafe {
            *self.parked.get() = Some(thread::current());
        }
        self.published.store(true, Ordering::Release);
        loop {
            if self.counter.load(Ordering::Acquire) >= 0 {
                return true;
            }
            match deadline {
                None => thread::park(),
                Some(at) => {
                    let now = Instant::now();
                    if now >= at {
                        self.counter.fetch_add(1, Ordering::AcqRel);
                        self.finish();
                        return false;
                    }
                    thread::park_timeout(at - now);
                }
            }
        }
    }

    /// V: increment, waking a parked waiter if the pre-increment count was
    /// negative. Signaling a cell already past `Done` is harmless — the
    /// counter simply absorbs the extra ticket.
    pub(crate) fn signal(&self) {
        let prev = self.counter.fetch_add(1, Ordering::AcqRel);
        if prev < 0 {
            while !self.published.load(Ordering::Acquire) {
                std::hint::spin_loop();
            }
            let waiter = unsafe { (*self.parked.get()).clone() };
            if let Some(waiter) = waiter {
                waiter.unpark();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn signal_before_wait_does_not_block() {
        let cell: SyncCell<u32> = SyncCell::new();
        cell.signal();
        assert!(cell.wait(None));
    }

    #[test]
    fn wait_blocks_until_signaled() {
        let cell = Arc::new(SyncCell::<u32>::new());
        let waiter = {
            let cell = cell.clone();
            thread::spawn(move || cell.wait(None))
        };
        thread::sleep(Duration::from_millis(50));
        cell.signal();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn try_claim_is_exclusive() {
        let cell = Arc::new(SyncCell::<()>::new());
        let wins: usize = (0..16)
            .map(|_| {
                let cell = cell.clone();
                thread::spawn(move || cell.try_claim())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn timeout_returns_false_and_restores_ticket() {
        let cell: SyncCell<u32> = SyncCell::new();
        let ok = cell.wait(Some(Instant::now() + Duration::from_millis(20)));
        assert!(!ok);
        assert_eq!(cell.state(), CellState::Done);
    }

    #[test]
    fn put_and_take_round_trip() {
        let cell: SyncCell<&'static str> = SyncCell::new();
        assert!(cell.try_claim());
        unsafe { cell.put("hello") };
        assert_eq!(unsafe { cell.take() }, Some("hello"));
        assert_eq!(unsafe { cell.take() }, None);
    }
}
