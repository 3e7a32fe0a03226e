//! A counting resource gate shared by the two buffered channels' `empty`/
//! `filled` semaphore pairs (spec §4.5/§4.6). Built on the same claim-or-park
//! protocol as [`crate::select`]'s multi-way commit so a blocking `send`/
//! `recv` and a `select` arm can wait on the exact same queue of tickets. The
//! queue itself is a [`NodeQueue`], so repeated park/wake cycles recycle a
//! small number of node allocations instead of allocating on every call.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::pool::node_pool::NodeQueue;
use crate::select::{SelectOutcome, Selection};
use crate::spinlock::SpinLock;
use crate::sync_cell::SyncCell;

/// A parked contender for one unit of the gated resource. Plain blocking
/// callers only need a wake; `select` arms need the claim-then-finalize
/// protocol so exactly one of them ever completes.
enum Ticket {
    Plain(Arc<SyncCell<Selection>>),
    Select {
        index: usize,
        cell: Arc<SyncCell<Selection>>,
    },
}

pub(crate) struct ResourceGate {
    available: AtomicI64,
    waiters: SpinLock<NodeQueue<Ticket>>,
}

impl ResourceGate {
    pub(crate) fn new(initial: i64) -> Self {
        Self {
            available: AtomicI64::new(initial),
            waiters: SpinLock::new(NodeQueue::new()),
        }
    }

    /// Non-blocking attempt to take one unit.
    pub(crate) fn try_acquire(&self) -> bool {
        self.available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                if v > 0 { Some(v - 1) } else { None }
            })
            .is_ok()
    }

    /// Blocking acquire for a plain (non-select) caller: parks a private
    /// ticket and waits on its counter directly. Returns `false` if the
    /// wake came from [`ResourceGate::close`] rather than a real release —
    /// the caller never actually got a unit.
    pub(crate) fn acquire_blocking(&self) -> bool {
        if self.try_acquire() {
            return true;
        }
        let cell = Arc::new(SyncCell::new());
        self.waiters.lock().push_back(Ticket::Plain(cell.clone()));
        cell.wait(None);
        cell.finish();
        !matches!(
            unsafe { cell.take() },
            Some(Selection {
                outcome: SelectOutcome::Closed,
                ..
            })
        )
    }

    /// Wakes every parked waiter without granting anyone a unit — used when
    /// the owning channel is closing. Plain waiters wake with `false` from
    /// `acquire_blocking`; `select` tickets wake to a `Closed` outcome, the
    /// same as a winning arm would deliver `Sent`/`Received`.
    pub(crate) fn close(&self) {
        let waiters = std::mem::replace(&mut *self.waiters.lock(), NodeQueue::new());
        for ticket in waiters.into_values() {
            match ticket {
                Ticket::Plain(cell) => {
                    if cell.try_claim() {
                        unsafe {
                            cell.put(Selection {
                                index: 0,
                                outcome: SelectOutcome::Closed,
                            });
                        }
                        cell.finish();
                    }
                    cell.signal();
                }
                Ticket::Select { index, cell } => {
                    if cell.try_claim() {
                        unsafe {
                            cell.put(Selection {
                                index,
                                outcome: SelectOutcome::Closed,
                            });
                        }
                        cell.finish();
                        cell.signal();
                    }
                }
            }
        }
    }

    /// Registers `sel` as a blocking contender for one unit under `index`.
    /// Returns `true` if the caller itself won the race on both the resource
    /// and `sel` (and must finalize `sel` inline); `false` if it either lost
    /// the race on `sel` (unit handed back, this arm is not actually ready)
    /// or parked (a future `release` will finalize it).
    pub(crate) fn register(&self, sel: &Arc<SyncCell<Selection>>, index: usize) -> bool {
        if self.try_acquire() {
            if sel.try_claim() {
                return true;
            }
            self.available.fetch_add(1, Ordering::AcqRel);
            return false;
        }
        self.waiters.lock().push_back(Ticket::Select {
            index,
            cell: sel.clone(),
        });
        false
    }

    pub(crate) fn unregister(&self, sel: &Arc<SyncCell<Selection>>) {
        self.waiters.lock().retain(|t| match t {
            Ticket::Plain(cell) => !Arc::ptr_eq(cell, sel),
            Ticket::Select { cell, .. } => !Arc::ptr_eq(cell, sel),
        });
    }

    /// Releases one unit. A parked plain waiter is simply signaled. A parked
    /// `select` ticket is handed the unit via `finalize` (which must
    /// `put`/`finish`/`signal` the cell) unless a racing arm already claimed
    /// it elsewhere, in which case the next ticket is tried — the same
    /// give-back-on-loss rule `select` itself uses.
    pub(crate) fn release(&self, finalize: impl FnOnce(usize, &Arc<SyncCell<Selection>>)) {
        loop {
            let next = self.waiters.lock().pop_front();
            match next {
                None => {
                    self.available.fetch_add(1, Ordering::AcqRel);
                    return;
                }
                Some(Ticket::Plain(cell)) => {
                    cell.signal();
                    return;
                }
                Some(Ticket::Select { index, cell }) => {
                    if cell.try_claim() {
                        finalize(index, &cell);
                        return;
                    }
                    // Lost the race on this ticket; try the next one.
                }
            }
        }
    }

    pub(crate) fn available(&self) -> i64 {
        self.available.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::SelectOutcome;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn try_acquire_respects_the_count() {
        let gate = ResourceGate::new(1);
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
    }

    #[test]
    fn release_wakes_a_blocked_acquirer() {
        let gate = std::sync::Arc::new(ResourceGate::new(0));
        let handle = {
            let gate = gate.clone();
            thread::spawn(move || gate.acquire_blocking())
        };
        thread::sleep(Duration::from_millis(30));
        gate.release(|_, _| unreachable!("a plain ticket never reaches finalize"));
        assert!(handle.join().unwrap());
    }

    #[test]
    fn close_wakes_a_blocked_acquirer_with_failure() {
        let gate = std::sync::Arc::new(ResourceGate::new(0));
        let handle = {
            let gate = gate.clone();
            thread::spawn(move || gate.acquire_blocking())
        };
        thread::sleep(Duration::from_millis(30));
        gate.close();
        assert!(!handle.join().unwrap());
    }

    #[test]
    fn close_delivers_a_closed_outcome_to_a_registered_select_ticket() {
        let gate = ResourceGate::new(0);
        let sel = Arc::new(SyncCell::new());
        assert!(!gate.register(&sel, 5));
        gate.close();
        assert!(sel.wait(None));
        let selection = unsafe { sel.take() }.unwrap();
        assert_eq!(selection.index, 5);
        assert!(matches!(selection.outcome, SelectOutcome::Closed));
    }

    #[test]
    fn release_finalizes_a_registered_select_ticket() {
        let gate = ResourceGate::new(0);
        let sel = Arc::new(SyncCell::new());
        assert!(!gate.register(&sel, 3));
        gate.release(|index, cell| {
            unsafe {
                cell.put(Selection {
                    index,
                    outcome: SelectOutcome::Sent,
                });
            }
            cell.finish();
            cell.signal();
        });
        assert!(sel.wait(None));
        let selection = unsafe { sel.take() };
        assert_eq!(selection.map(|s| s.index), Some(3));
    }
}
