//! Rendezvous channel (spec §4.4): a send only completes once a receiver is
//! physically handing it off to, and vice versa. There is no buffer — a
//! single lock guards both waiter queues and the closed flag, exactly the
//! shape spec §4.4 describes ("a mutex protecting both queues").

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::{TryRecvError, TrySendError};
use crate::select::{
    SelectOutcome, SelectRecvArm, SelectSendArm, Selection, TryRecvProbe, TrySendProbe,
};
use crate::spinlock::SpinLock;
use crate::sync_cell::SyncCell;

/// A parked sender: `sel` is the cell a receiver must claim to complete the
/// handoff, `index` is this arm's position in whatever `select` call parked
/// it (`0` for a plain blocking `send`), and `value` is the payload, boxed so
/// the same waiter shape serves both plain sends and `select` send arms.
struct SendWaiter {
    sel: Arc<SyncCell<Selection>>,
    index: usize,
    value: SpinLock<Option<Box<dyn Any + Send>>>,
}

struct RecvWaiter {
    sel: Arc<SyncCell<Selection>>,
    index: usize,
}

struct Inner {
    senders: VecDeque<Arc<SendWaiter>>,
    receivers: VecDeque<Arc<RecvWaiter>>,
    closed: bool,
}

/// An unbuffered, rendezvous channel.
pub struct UnbufferedChannel<T> {
    inner: SpinLock<Inner>,
    _marker: std::marker::PhantomData<T>,
}

// Safety: all access to `T` values goes through `Box<dyn Any + Send>`, moved
// across threads only while a waiter is parked under `inner`'s lock.
unsafe impl<T: Send> Send for UnbufferedChannel<T> {}
unsafe impl<T: Send> Sync for UnbufferedChannel<T> {}

impl<T: Send + 'static> Default for UnbufferedChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> UnbufferedChannel<T> {
    pub fn new() -> Self {
        Self {
            inner: SpinLock::new(Inner {
                senders: VecDeque::new(),
                receivers: VecDeque::new(),
                closed: false,
            }),
            _marker: std::marker::PhantomData,
        }
    }

    /// Blocks until a receiver is waiting (or arrives) to take `value`.
    /// Returns `false` if the channel was (or became) closed before a
    /// receiver showed up.
    pub fn send(&self, value: T) -> bool {
        let boxed: Box<dyn Any + Send> = Box::new(value);
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        while let Some(w) = inner.receivers.pop_front() {
            if !w.sel.try_claim() {
                continue;
            }
            drop(inner);
            unsafe {
                w.sel.put(Selection {
                    index: w.index,
                    outcome: SelectOutcome::Received(boxed),
                });
            }
            w.sel.finish();
            w.sel.signal();
            return true;
        }
        let sel = Arc::new(SyncCell::new());
        let waiter = Arc::new(SendWaiter {
            sel: sel.clone(),
            index: 0,
            value: SpinLock::new(Some(boxed)),
        });
        inner.senders.push_back(waiter);
        drop(inner);
        sel.wait(None);
        sel.finish();
        matches!(
            unsafe { sel.take() },
            Some(Selection {
                outcome: SelectOutcome::Sent,
                ..
            })
        )
    }

    /// Non-blocking send: succeeds only if a receiver is already parked.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(TrySendError::Disconnected(value));
        }
        while let Some(w) = inner.receivers.pop_front() {
            if !w.sel.try_claim() {
                continue;
            }
            drop(inner);
            let boxed: Box<dyn Any + Send> = Box::new(value);
            unsafe {
                w.sel.put(Selection {
                    index: w.index,
                    outcome: SelectOutcome::Received(boxed),
                });
            }
            w.sel.finish();
            w.sel.signal();
            return Ok(());
        }
        Err(TrySendError::Full(value))
    }

    /// Blocks until a sender is waiting (or arrives) to hand off a value.
    /// Returns `None` once the channel is closed and drained of senders.
    pub fn recv(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        while let Some(w) = inner.senders.pop_front() {
            if !w.sel.try_claim() {
                continue;
            }
            let value = w
                .value
                .lock()
                .take()
                .expect("sender waiter already consumed");
            drop(inner);
            unsafe {
                w.sel.put(Selection {
                    index: w.index,
                    outcome: SelectOutcome::Sent,
                });
            }
            w.sel.finish();
            w.sel.signal();
            return Some(*value.downcast::<T>().unwrap_or_else(|_| {
                unreachable!("UnbufferedChannel<T> waiters always carry a T")
            }));
        }
        if inner.closed {
            return None;
        }
        let sel = Arc::new(SyncCell::new());
        let waiter = Arc::new(RecvWaiter {
            sel: sel.clone(),
            index: 0,
        });
        inner.receivers.push_back(waiter);
        drop(inner);
        sel.wait(None);
        sel.finish();
        match unsafe { sel.take() } {
            Some(Selection {
                outcome: SelectOutcome::Received(v),
                ..
            }) => Some(*v.downcast::<T>().unwrap_or_else(|_| {
                unreachable!("UnbufferedChannel<T> waiters always carry a T")
            })),
            _ => None,
        }
    }

    /// Non-blocking receive: succeeds only if a sender is already parked.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut inner = self.inner.lock();
        while let Some(w) = inner.senders.pop_front() {
            if !w.sel.try_claim() {
                continue;
            }
            let value = w
                .value
                .lock()
                .take()
                .expect("sender waiter already consumed");
            drop(inner);
            unsafe {
                w.sel.put(Selection {
                    index: w.index,
                    outcome: SelectOutcome::Sent,
                });
            }
            w.sel.finish();
            w.sel.signal();
            return Ok(*value
                .downcast::<T>()
                .unwrap_or_else(|_| unreachable!("UnbufferedChannel<T> waiters always carry a T")));
        }
        if inner.closed {
            Err(TryRecvError::Disconnected)
        } else {
            Err(TryRecvError::Empty)
        }
    }

    /// Marks the channel closed and wakes every parked waiter. Idempotent.
    /// A parked sender wakes to a failed `send`; a parked receiver wakes to
    /// `None`/`TryRecvError::Disconnected` equivalents.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        let senders = std::mem::take(&mut inner.senders);
        let receivers = std::mem::take(&mut inner.receivers);
        drop(inner);
        for w in senders {
            if w.sel.try_claim() {
                unsafe {
                    w.sel.put(Selection {
                        index: w.index,
                        outcome: SelectOutcome::Closed,
                    });
                }
                w.sel.finish();
                w.sel.signal();
            }
        }
        for w in receivers {
            if w.sel.try_claim() {
                unsafe {
                    w.sel.put(Selection {
                        index: w.index,
                        outcome: SelectOutcome::Closed,
                    });
                }
                w.sel.finish();
                w.sel.signal();
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Always `0` — an unbuffered channel never holds a value at rest.
    pub fn len(&self) -> usize {
        0
    }

    pub fn is_empty(&self) -> bool {
        true
    }

    /// Always `0` — rendezvous channels have no storage capacity.
    pub fn capacity(&self) -> usize {
        0
    }
}

impl<T: Send + 'static> SelectRecvArm for UnbufferedChannel<T> {
    fn try_recv_probe(&self) -> TryRecvProbe {
        match self.try_recv() {
            Ok(v) => TryRecvProbe::Ready(Box::new(v)),
            Err(TryRecvError::Empty) => TryRecvProbe::Empty,
            Err(TryRecvError::Disconnected) => TryRecvProbe::Closed,
        }
    }

    fn select_recv(&self, sel: &Arc<SyncCell<Selection>>, index: usize) {
        let mut inner = self.inner.lock();
        loop {
            let Some(w) = inner.senders.pop_front() else {
                break;
            };
            if !w.sel.try_claim() {
                continue;
            }
            let value = w
                .value
                .lock()
                .take()
                .expect("sender waiter already consumed");
            drop(inner);
            unsafe {
                w.sel.put(Selection {
                    index: w.index,
                    outcome: SelectOutcome::Sent,
                });
            }
            w.sel.finish();
            // `sel` is claimed only now, so a loss here costs nothing but an
            // already-claimed sender: the value has a real receiver (this
            // thread) regardless of whether our own selection also wins.
            if sel.try_claim() {
                unsafe {
                    sel.put(Selection {
                        index,
                        outcome: SelectOutcome::Received(value),
                    });
                }
                sel.finish();
                sel.signal();
            }
            w.sel.signal();
            return;
        }
        if inner.closed {
            drop(inner);
            if sel.try_claim() {
                unsafe {
                    sel.put(Selection {
                        index,
                        outcome: SelectOutcome::Closed,
                    });
                }
                sel.finish();
                sel.signal();
            }
            return;
        }
        inner.receivers.push_back(Arc::new(RecvWaiter {
            sel: sel.clone(),
            index,
        }));
    }

    fn cancel_recv(&self, _index: usize, sel: &Arc<SyncCell<Selection>>) {
        self.inner
            .lock()
            .receivers
            .retain(|w| !Arc::ptr_eq(&w.sel, sel));
    }
}

impl<T: Send + 'static> SelectSendArm for UnbufferedChannel<T> {
    fn try_send_probe(&self, value: Box<dyn Any + Send>) -> TrySendProbe {
        let mut inner = self.inner.lock();
        if inner.closed {
            return TrySendProbe::Closed(value);
        }
        while let Some(w) = inner.receivers.pop_front() {
            if !w.sel.try_claim() {
                continue;
            }
            drop(inner);
            unsafe {
                w.sel.put(Selection {
                    index: w.index,
                    outcome: SelectOutcome::Received(value),
                });
            }
            w.sel.finish();
            w.sel.signal();
            return TrySendProbe::Sent;
        }
        TrySendProbe::Full(value)
    }

    fn select_send(&self, sel: &Arc<SyncCell<Selection>>, index: usize, value: Box<dyn Any + Send>) {
        let mut inner = self.inner.lock();
        loop {
            let Some(w) = inner.receivers.pop_front() else {
                break;
            };
            if !w.sel.try_claim() {
                continue;
            }
            drop(inner);
            unsafe {
                w.sel.put(Selection {
                    index: w.index,
                    outcome: SelectOutcome::Received(value),
                });
            }
            w.sel.finish();
            if sel.try_claim() {
                unsafe {
                    sel.put(Selection {
                        index,
                        outcome: SelectOutcome::Sent,
                    });
                }
                sel.finish();
                sel.signal();
            }
            w.sel.signal();
            return;
        }
        if inner.closed {
            drop(inner);
            if sel.try_claim() {
                unsafe {
                    sel.put(Selection {
                        index,
                        outcome: SelectOutcome::Closed,
                    });
                }
                sel.finish();
                sel.signal();
            }
            return;
        }
        inner.senders.push_back(Arc::new(SendWaiter {
            sel: sel.clone(),
            index,
            value: SpinLock::new(Some(value)),
        }));
    }

    fn cancel_send(&self, _index: usize, sel: &Arc<SyncCell<Selection>>) {
        self.inner
            .lock()
            .senders
            .retain(|w| !Arc::ptr_eq(&w.sel, sel));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn send_that_parks_before_its_receiver_arrives_reports_success() {
        let chan = Arc::new(UnbufferedChannel::<u32>::new());
        let sender = {
            let chan = chan.clone();
            thread::spawn(move || chan.send(42))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(chan.recv(), Some(42));
        assert!(sender.join().unwrap());
    }

    #[test]
    fn rendezvous_hands_off_a_value() {
        let chan = Arc::new(UnbufferedChannel::<u32>::new());
        let receiver = {
            let chan = chan.clone();
            thread::spawn(move || chan.recv())
        };
        thread::sleep(Duration::from_millis(20));
        assert!(chan.send(42));
        assert_eq!(receiver.join().unwrap(), Some(42));
    }

    #[test]
    fn try_send_fails_with_no_receiver_waiting() {
        let chan = UnbufferedChannel::<u32>::new();
        assert!(matches!(chan.try_send(1), Err(TrySendError::Full(1))));
    }

    #[test]
    fn try_recv_fails_with_no_sender_waiting() {
        let chan = UnbufferedChannel::<u32>::new();
        assert!(matches!(chan.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn close_wakes_a_blocked_receiver() {
        let chan = Arc::new(UnbufferedChannel::<u32>::new());
        let receiver = {
            let chan = chan.clone();
            thread::spawn(move || chan.recv())
        };
        thread::sleep(Duration::from_millis(20));
        chan.close();
        assert_eq!(receiver.join().unwrap(), None);
    }

    #[test]
    fn close_wakes_a_blocked_sender_with_failure() {
        let chan = Arc::new(UnbufferedChannel::<u32>::new());
        let sender = {
            let chan = chan.clone();
            thread::spawn(move || chan.send(7))
        };
        thread::sleep(Duration::from_millis(20));
        chan.close();
        assert!(!sender.join().unwrap());
    }

    #[test]
    fn send_after_close_fails_immediately() {
        let chan = UnbufferedChannel::<u32>::new();
        chan.close();
        assert!(!chan.send(1));
        assert!(matches!(chan.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[test]
    fn receivers_are_served_fifo() {
        let chan = Arc::new(UnbufferedChannel::<u32>::new());
        let order = Arc::new(SpinLock::new(Vec::new()));
        let handles: Vec<_> = (0..4)
            .map(|id| {
                let chan = chan.clone();
                let order = order.clone();
                thread::spawn(move || {
                    let v = chan.recv().unwrap();
                    order.lock().push((id, v));
                })
            })
            .collect();
        thread::sleep(Duration::from_millis(30));
        for i in 0..4u32 {
            assert!(chan.send(i));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(order.lock().len(), 4);
    }
}
