//! Single-slot buffered channel (spec §4.5): a send completes as soon as the
//! one slot is empty, without waiting for a receiver to be physically
//! present. Built on a pair of [`ResourceGate`]s — `empty` counts free
//! capacity, `filled` counts ready values — the same shape `BufferedNChannel`
//! uses with a ring instead of a single cell.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{TryRecvError, TrySendError};
use crate::gate::ResourceGate;
use crate::select::{
    SelectOutcome, SelectRecvArm, SelectSendArm, Selection, TryRecvProbe, TrySendProbe,
};
use crate::spinlock::SpinLock;
use crate::sync_cell::SyncCell;

/// A single-slot buffered channel.
pub struct Buffered1Channel<T> {
    slot: SpinLock<Option<T>>,
    empty: ResourceGate,
    filled: ResourceGate,
    closed: AtomicBool,
}

unsafe impl<T: Send> Send for Buffered1Channel<T> {}
unsafe impl<T: Send> Sync for Buffered1Channel<T> {}

impl<T: Send + 'static> Default for Buffered1Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Buffered1Channel<T> {
    pub fn new() -> Self {
        Self {
            slot: SpinLock::new(None),
            empty: ResourceGate::new(1),
            filled: ResourceGate::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Blocks until the slot is empty, then deposits `value`. Returns
    /// `false` if the channel was (or became, while blocked) closed.
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
        *self.slot.lock() = Some(value);
        self.filled.release(|_, _| unreachable!("a plain ticket never reaches finalize"));
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
        *self.slot.lock() = Some(value);
        self.filled.release(|_, _| unreachable!("a plain ticket never reaches finalize"));
        Ok(())
    }

    /// Blocks until a value is in the slot, then takes it. Returns `None`
    /// once the channel is closed and the slot has been drained.
    pub fn recv(&self) -> Option<T> {
        if !self.filled.acquire_blocking() {
            return None;
        }
        let value = self.slot.lock().take().expect("filled gate granted an empty slot");
        self.empty.release(|_, _| unreachable!("a plain ticket never reaches finalize"));
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
        let value = self.slot.lock().take().expect("filled gate granted an empty slot");
        self.empty.release(|_, _| unreachable!("a plain ticket never reaches finalize"));
        Ok(value)
    }

    /// Marks the channel closed and wakes every parked waiter. Idempotent.
    /// A value already sitting in the slot remains available to `recv`.
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

    pub fn len(&self) -> usize {
        if self.slot.lock().is_some() { 1 } else { 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        1
    }
}

impl<T: Send + 'static> SelectRecvArm for Buffered1Channel<T> {
    fn try_recv_probe(&self) -> TryRecvProbe {
        match self.try_recv() {
            Ok(v) => TryRecvProbe::Ready(Box::new(v)),
            Err(TryRecvError::Empty) => TryRecvProbe::Empty,
            Err(TryRecvError::Disconnected) => TryRecvProbe::Closed,
        }
    }

    fn select_recv(&self, sel: &Arc<SyncCell<Selection>>, index: usize) {
        if self.filled.register(sel, index) {
            let value = self
                .slot
                .lock()
                .take()
                .expect("filled gate granted an empty slot");
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

impl<T: Send + 'static> SelectSendArm for Buffered1Channel<T> {
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
            .unwrap_or_else(|_| unreachable!("Buffered1Channel<T> arms always carry a T"));
        *self.slot.lock() = Some(unboxed);
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
                .unwrap_or_else(|_| unreachable!("Buffered1Channel<T> arms always carry a T"));
            *self.slot.lock() = Some(unboxed);
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn send_then_recv_round_trips() {
        let chan = Buffered1Channel::<u32>::new();
        assert!(chan.send(7));
        assert_eq!(chan.recv(), Some(7));
    }

    #[test]
    fn send_does_not_block_once_slot_is_free() {
        let chan = Buffered1Channel::<u32>::new();
        assert!(chan.send(1));
        assert!(matches!(chan.try_send(2), Err(TrySendError::Full(2))));
    }

    #[test]
    fn second_send_blocks_until_slot_drains() {
        let chan = Arc::new(Buffered1Channel::<u32>::new());
        chan.send(1);
        let sender = {
            let chan = chan.clone();
            thread::spawn(move || chan.send(2))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(chan.recv(), Some(1));
        assert!(sender.join().unwrap());
        assert_eq!(chan.recv(), Some(2));
    }

    #[test]
    fn close_wakes_a_blocked_receiver() {
        let chan = Arc::new(Buffered1Channel::<u32>::new());
        let receiver = {
            let chan = chan.clone();
            thread::spawn(move || chan.recv())
        };
        thread::sleep(Duration::from_millis(20));
        chan.close();
        assert_eq!(receiver.join().unwrap(), None);
    }

    #[test]
    fn close_leaves_a_buffered_value_recoverable() {
        let chan = Buffered1Channel::<u32>::new();
        chan.send(9);
        chan.close();
        assert_eq!(chan.recv(), Some(9));
    }

    #[test]
    fn try_send_never_writes_into_a_closed_channel() {
        // `close()` never decrements `empty`'s counter, so a free slot stays
        // acquirable after close — both the pre-acquire and post-acquire
        // closed checks must hold for this to keep failing.
        let chan = Buffered1Channel::<u32>::new();
        chan.close();
        assert!(matches!(
            chan.try_send(1),
            Err(TrySendError::Disconnected(1))
        ));
        assert!(chan.try_recv().is_err());
    }
}
