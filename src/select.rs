//! The multi-way selection operator (spec §4.7): race a shared [`SyncCell`]
//! across every arm's channel, let the first successful `Ready -> Pointer`
//! claim commit the whole call, and give back any reserved resource on the
//! arms that lose.
//!
//! Heterogeneous arms (different element types, different channel kinds) are
//! erased behind `Box<dyn Any + Send>` at the boundary — the only way to let
//! one `select` call mix a `UnbufferedChannel<String>` arm and a
//! `Buffered1Channel<i32>` arm in safe Rust without a macro.

use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;
use std::thread_local;

use crate::pool::sync_cell_pool::SyncCellPool;
use crate::sync_cell::SyncCell;

/// What a winning channel deposits into the shared cell: which arm fired and
/// what happened. `pub` only so it can appear inside `Arc<SyncCell<Selection>>`
/// in the public arm traits below; its fields stay crate-private.
pub struct Selection {
    pub(crate) index: usize,
    pub(crate) outcome: SelectOutcome,
}

/// The result of whichever arm wins a [`select`] or [`try_select`] call.
pub enum SelectOutcome {
    /// A send arm's value was accepted.
    Sent,
    /// A receive arm produced a value, type-erased — downcast with
    /// [`SelectOutcome::into_received`].
    Received(Box<dyn Any + Send>),
    /// The arm's channel is closed (and, for a receive arm, drained).
    Closed,
}

impl std::fmt::Debug for SelectOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectOutcome::Sent => f.write_str("Sent"),
            SelectOutcome::Received(_) => f.write_str("Received(..)"),
            SelectOutcome::Closed => f.write_str("Closed"),
        }
    }
}

impl SelectOutcome {
    /// Downcasts a `Received` outcome back to its concrete type. Panics if
    /// called on a non-`Received` outcome or with the wrong `T` — both are
    /// caller bugs (the type is known from which arm index fired).
    pub fn into_received<T: 'static>(self) -> T {
        match self {
            SelectOutcome::Received(boxed) => *boxed
                .downcast::<T>()
                .unwrap_or_else(|_| panic!("select outcome type mismatch")),
            _ => panic!("select outcome was not Received"),
        }
    }
}

/// What a non-blocking receive probe from inside `select` found.
#[doc(hidden)]
pub enum TryRecvProbe {
    Ready(Box<dyn Any + Send>),
    Empty,
    Closed,
}

/// What a non-blocking send probe from inside `select` found. The boxed
/// value is handed back on anything short of success so the caller can keep
/// it for a later arm or drop it.
#[doc(hidden)]
pub enum TrySendProbe {
    Sent,
    Full(Box<dyn Any + Send>),
    Closed(Box<dyn Any + Send>),
}

/// Object-safe hook a channel implements to participate as a receive arm.
pub trait SelectRecvArm: Send + Sync {
    #[doc(hidden)]
    fn try_recv_probe(&self) -> TryRecvProbe;
    #[doc(hidden)]
    fn select_recv(&self, sel: &Arc<SyncCell<Selection>>, index: usize);
    #[doc(hidden)]
    fn cancel_recv(&self, index: usize, sel: &Arc<SyncCell<Selection>>);
}

/// Object-safe hook a channel implements to participate as a send arm.
pub trait SelectSendArm: Send + Sync {
    #[doc(hidden)]
    fn try_send_probe(&self, value: Box<dyn Any + Send>) -> TrySendProbe;
    #[doc(hidden)]
    fn select_send(&self, sel: &Arc<SyncCell<Selection>>, index: usize, value: Box<dyn Any + Send>);
    #[doc(hidden)]
    fn cancel_send(&self, index: usize, sel: &Arc<SyncCell<Selection>>);
}

#[doc(hidden)]
pub struct RecvArm<'a> {
    channel: &'a dyn SelectRecvArm,
}

#[doc(hidden)]
pub struct SendArm<'a> {
    channel: &'a dyn SelectSendArm,
    value: RefCell<Option<Box<dyn Any + Send>>>,
}

/// One arm of a [`select`]/[`try_select`] call.
pub enum SelectOp<'a> {
    Recv(RecvArm<'a>),
    Send(SendArm<'a>),
}

impl<'a> SelectOp<'a> {
    /// Builds a receive arm over any channel implementing [`SelectRecvArm`].
    pub fn recv<C: SelectRecvArm>(channel: &'a C) -> Self {
        SelectOp::Recv(RecvArm { channel })
    }

    /// Builds a send arm carrying `value`, over any channel implementing
    /// [`SelectSendArm`].
    pub fn send<C: SelectSendArm, T: Send + 'static>(channel: &'a C, value: T) -> Self {
        SelectOp::Send(SendArm {
            channel,
            value: RefCell::new(Some(Box::new(value))),
        })
    }
}

thread_local! {
    static SELECT_POOL: SyncCellPool<Selection> = SyncCellPool::with_capacity(64);
}

/// Non-blocking scan: tries every arm in order, committing the first one that
/// can complete without blocking. Returns `None` if every arm would block —
/// this is the "default arm" case from spec §4.7.
pub fn try_select(ops: &[SelectOp<'_>]) -> Option<(usize, SelectOutcome)> {
    for (index, op) in ops.iter().enumerate() {
        match op {
            SelectOp::Recv(arm) => match arm.channel.try_recv_probe() {
                TryRecvProbe::Ready(v) => return Some((index, SelectOutcome::Received(v))),
                TryRecvProbe::Closed => return Some((index, SelectOutcome::Closed)),
                TryRecvProbe::Empty => continue,
            },
            SelectOp::Send(arm) => {
                let value = arm
                    .value
                    .borrow_mut()
                    .take()
                    .expect("a select arm was reused after completing");
                match arm.channel.try_send_probe(value) {
                    TrySendProbe::Sent => return Some((index, SelectOutcome::Sent)),
                    TrySendProbe::Closed(_) => return Some((index, SelectOutcome::Closed)),
                    TrySendProbe::Full(v) => {
                        *arm.value.borrow_mut() = Some(v);
                        continue;
                    }
                }
            }
        }
    }
    None
}

/// Blocking multi-way select. Commits exactly one arm: the non-blocking scan
/// wins immediately if anything is ready, otherwise every arm registers a
/// shared cell and the calling thread blocks until the first channel claims
/// it, at which point every other arm's reservation is given back.
pub fn select(ops: &[SelectOp<'_>]) -> (usize, SelectOutcome) {
    if let Some(result) = try_select(ops) {
        return result;
    }

    let sel = SELECT_POOL.with(|pool| pool.obtain());
    for (index, op) in ops.iter().enumerate() {
        match op {
            SelectOp::Recv(arm) => arm.channel.select_recv(&sel, index),
            SelectOp::Send(arm) => {
                let value = arm
                    .value
                    .borrow_mut()
                    .take()
                    .expect("a select arm was reused after completing");
                arm.channel.select_send(&sel, index, value);
            }
        }
    }

    sel.wait(None);
    sel.finish();
    // Safety: `wait` only returns once the cell has been claimed and its
    // slot populated by the winning channel.
    let selection = unsafe { sel.take() }.expect("a claimed SyncCell always carries a Selection");

    for (index, op) in ops.iter().enumerate() {
        if index == selection.index {
            continue;
        }
        match op {
            SelectOp::Recv(arm) => arm.channel.cancel_recv(index, &sel),
            SelectOp::Send(arm) => arm.channel.cancel_send(index, &sel),
        }
    }

    SELECT_POOL.with(|pool| pool.release(sel));
    (selection.index, selection.outcome)
}
