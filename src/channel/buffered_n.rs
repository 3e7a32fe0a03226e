//! N-slot ring-buffered channel (spec §4.6): like [`crate::channel::buffered1`]
//! but with a multi-slot ring instead of a single cell, so up to `capacity`
//! sends can complete without a receiver ever showing up. Producer and
//! consumer each own a monotonic cursor into the ring; the `empty`/`filled`
//! gates are what make `capacity` sends-ahead-of-receives safe without either
//! cursor racing the other into an unwritten or unread slot.

use std::any::Any;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

use crate::error::{TryRecvError, TrySendError};
use crate::gate::ResourceGate;
use crate::ring::{round_up_capacity, RingBuffer};
use crate::select::{
    SelectOutcome, SelectRecvArm, SelectSendArm, Selection, TryRecvProbe, TrySendProbe,
};
use crate::sync_cell::SyncCell;

/// Ring capacities are clamped to this many slots regardless of what a
/// caller requests, matching the hard ceiling a `make(capacity)` call is
/// rounded and clamped against.
const MAX_CAPACITY: usize = 32_768;

/// A fixed-capacity, ring-buffered channel.
pub struct BufferedNChannel<T> {
    ring: RingBuffer<UnsafeCell<MaybeUninit<T>>>,
    write_cursor: CachePadded<AtomicUsize>,
    read_cursor: CachePadded<AtomicUsize>,
    empty: ResourceGate,
    filled: ResourceGate,
    closed: AtomicBool,
}

unsafe impl<T: Send> Send for BufferedNChannel<T> {}
unsafe impl<T: Send> Sync for BufferedNChannel<T> {}

impl<T: Send + 'static> BufferedNChannel<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = round_up_capacity(capacity, MAX_CAPACITY);
        Self {
            ring: RingBuffer::new(capacity),
            write_cursor: CachePadded::new(AtomicUsize::new(0)),
            read_cursor: CachePadded::new(AtomicUsize::new(0)),
            empty: ResourceGate::new(capacity as i64),
            filled: ResourceGate::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn claim_write_slot(&self) -> usize {
        self.write_cursor.fetch_add(1, Ordering::AcqRel)
    }

    fn claim_read_slot(&self) -> usize {
        self.read_cursor.fetch_add(1, Ordering::AcqRel)
    }

    /// Blocks until a slot is free, writes `value` into it, and releases it
    /// to readers. Returns `false` if the channel was (or became, while
    /// blocked) closed.
    pub fn send(&self, value: T) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        if !self.empty.acquire_blocking() {
            return false;
        }
        if self.closed.load(Ordering::Acquire) {
            self.empty
                .release(|_, _| unreachable!("a plain ticket never reaches finalize"));
            return false;
        }
        let seq = self.claim_write_slot();
        unsafe { self.ring.write(self.ring.index(seq), value) };
        self.filled
            .release(|_, _| unreachable!("a plain ticket never reaches finalize"));
        true
    }

    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TrySendError::Disconnected(value));
        }
        if !self.empty.try_acquire() {
            return Err(TrySendError::Full(value));
        }
        if self.closed.load(Ordering::Acquire) {
            self.empty
                .release(|_, _| unreachable!("a plain ticket never reaches finalize"));
            return Err(TrySendError::Disconnected(value));
        }
        let seq = self.claim_write_slot();
        unsafe { self.ring.write(self.ring.index(seq), value) };
        self.filled
            .release(|_, _| unreachable!("a plain ticket never reaches finalize"));
        Ok(())
    }

    /// Blocks until a value is ready, reads and removes it. Returns `None`
    /// once the channel is closed and the ring has been drained.
    pub fn recv(&self) -> Option<T> {
        if !self.filled.acquire_blocking() {
            return None;
        }
        let seq = self.claim_read_slot();
        let value = unsafe { self.ring.read(self.ring.index(seq)) };
        self.empty
            .release(|_, _| unreachable!("a plain ticket never reaches finalize"));
        Some(value)
    }

    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        if !self.filled.try_acquire() {
            return if self.closed.load(Ordering::Acquire) {
                Err(TryRecvError::Disconnected)
            } else {
                Err(TryRecvError::Empty)
            };
        }
        let seq = self.claim_read_slot();
        let value = unsafe { self.ring.read(self.ring.index(seq)) };
        self.empty
            .release(|_, _| unreachable!("a plain ticket never reaches finalize"));
        Ok(value)
    }

    /// Marks the channel closed and wakes every parked waiter. Idempotent.
    /// Values already in the ring stay available to `recv`/`try_recv`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.empty.close();
        self.filled.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// A snapshot of how many values are currently buffered. Racy under
    /// concurrent use, like any such count on a live queue.
    pub fn len(&self) -> usize {
        self.filled.available().max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

impl<T> Drop for BufferedNChannel<T> {
    fn drop(&mut self) {
        let read = *self.read_cursor.get_mut();
        let written = *self.write_cursor.get_mut();
        for seq in read..written {
            unsafe { self.ring.drop(self.ring.index(seq)) };
        }
    }
}

impl<T: Send + 'static> SelectRecvArm for BufferedNChannel<T> {
    fn try_recv_probe(&self) -> TryRecvProbe {
        match self.try_recv() {
            Ok(v) => TryRecvProbe::Ready(Box::new(v)),
            Err(TryRecvError::Empty) => TryRecvProbe::Empty,
            Err(TryRecvError::Disconnected) => TryRecvProbe::Closed,
        }
    }

    fn select_recv(&self, sel: &Arc<SyncCell<Selection>>, index: usize) {
        if self.filled.register(sel, index) {
            let seq = self.claim_read_slot();
            let value = unsafe { self.ring.read(self.ring.index(seq)) };
            unsafe {
                sel.put(Selection {
                    index,
                    outcome: SelectOutcome::Received(Box::new(value)),
                });
            }
            sel.finish();
            self.empty
                .release(|_, _| unreachable!("a plain ticket never reaches finalize"));
        }
    }

    fn cancel_recv(&self, _index: usize, sel: &Arc<SyncCell<Selection>>) {
        self.filled.unregister(sel);
    }
}

impl<T: Send + 'static> SelectSendArm for BufferedNChannel<T> {
    fn try_send_probe(&self, value: Box<dyn Any + Send>) -> TrySendProbe {
        if self.closed.load(Ordering::Acquire) {
            return TrySendProbe::Closed(value);
        }
        if !self.empty.try_acquire() {
            return TrySendProbe::Full(value);
        }
        if self.closed.load(Ordering::Acquire) {
            self.empty
                .release(|_, _| unreachable!("a plain ticket never reaches finalize"));
            return TrySendProbe::Closed(value);
        }
        let unboxed = *value
            .downcast::<T>()
            .unwrap_or_else(|_| unreachable!("BufferedNChannel<T> arms always carry a T"));
        let seq = self.claim_write_slot();
        unsafe { self.ring.write(self.ring.index(seq), unboxed) };
        self.filled
            .release(|_, _| unreachable!("a plain ticket never reaches finalize"));
        TrySendProbe::Sent
    }

    fn select_send(&self, sel: &Arc<SyncCell<Selection>>, index: usize, value: Box<dyn Any + Send>) {
        if self.empty.register(sel, index) {
            if self.closed.load(Ordering::Acquire) {
                unsafe {
                    sel.put(Selection {
                        index,
                        outcome: SelectOutcome::Closed,
                    });
                }
                sel.finish();
                self.empty
                    .release(|_, _| unreachable!("a plain ticket never reaches finalize"));
                return;
            }
            let unboxed = *value
                .downcast::<T>()
                .unwrap_or_else(|_| unreachable!("BufferedNChannel<T> arms always carry a T"));
            let seq = self.claim_write_slot();
            unsafe { self.ring.write(self.ring.index(seq), unboxed) };
            unsafe {
                sel.put(Selection {
                    index,
                    outcome: SelectOutcome::Sent,
                });
            }
            sel.finish();
            self.filled
                .release(|_, _| unreachable!("a plain ticket never reaches finalize"));
        }
    }

    fn cancel_send(&self, _index: usize, sel: &Arc<SyncCell<Selection>>) {
        self.empty.unregister(sel);
    }
}
