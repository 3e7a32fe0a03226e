//! CSP-style typed channels with blocking selection over sends and receives.
//!
//! Three channel flavors share one synchronization core:
//!
//! ```text
//! UnbufferedChannel<T>   rendezvous, no storage
//!   sender  ─┐                          ┌─ receiver
//!            └──────── SyncCell ────────┘
//!
//! Buffered1Channel<T>    one slot
//!   send ──empty──▶ [ T ] ──filled──▶ recv
//!
//! BufferedNChannel<T>    power-of-two ring, capacity C
//!   send ──empty──▶ [ 0 | 1 | 2 | .. | C-1 ] ──filled──▶ recv
//! ```
//!
//! Every blocking wait, on every channel, ultimately parks on a
//! [`SyncCell`](sync_cell::SyncCell): a signed counter for classic P/V
//! wait/signal, plus a tiny `Ready -> Pointer -> Done` state machine whose
//! `Ready -> Pointer` transition is the one atomic commit point
//! [`select`] races across multiple channels to decide a winner. Cells are
//! drawn from a bounded [`SyncCellPool`](pool::sync_cell_pool::SyncCellPool);
//! the two buffered channels' waiter lists draw their node allocations from a
//! [`NodePool`](pool::node_pool::NodePool) the same way.
//!
//! ```
//! use chansel::{select, Buffered1Channel, SelectOp};
//!
//! let a = Buffered1Channel::<u32>::new();
//! let b = Buffered1Channel::<u32>::new();
//! a.send(1);
//!
//! let (index, outcome) = select(&[SelectOp::recv(&a), SelectOp::recv(&b)]);
//! assert_eq!(index, 0);
//! assert_eq!(outcome.into_received::<u32>(), 1);
//! ```

pub mod channel;
mod error;
mod gate;
mod pool;
mod ring;
mod select;
mod spinlock;
mod sync_cell;

pub use channel::buffered1::Buffered1Channel;
pub use channel::buffered_n::BufferedNChannel;
pub use channel::unbuffered::UnbufferedChannel;
pub use error::{TryRecvError, TrySendError};
pub use select::{select, try_select, SelectOp, SelectOutcome, SelectRecvArm, SelectSendArm};

/// Builds a synchronous rendezvous channel.
pub fn unbuffered<T: Send + 'static>() -> UnbufferedChannel<T> {
    UnbufferedChannel::new()
}

/// Builds a single-slot buffered channel.
pub fn buffered1<T: Send + 'static>() -> Buffered1Channel<T> {
    Buffered1Channel::new()
}

/// Builds a ring-buffered channel of the given capacity (rounded up to a
/// power of two, clamped to 32768).
pub fn buffered_n<T: Send + 'static>(capacity: usize) -> BufferedNChannel<T> {
    BufferedNChannel::new(capacity)
}

/// Generates `buffered_nN::<T>()` convenience constructors for common
/// power-of-two capacities, so a caller reaching for `BufferedNChannel<T>`
/// with a fixed, well-known depth doesn't have to spell out `new(64)`.
macro_rules! define_size_aliases {
    ($($n:literal),* $(,)?) => {
        paste::paste! {
            $(
                /// Builds a ring-buffered channel with capacity $n.
                pub fn [<buffered_n $n>]<T: Send + 'static>() -> BufferedNChannel<T> {
                    BufferedNChannel::new($n)
                }
            )*
        }
    };
}

define_size_aliases!(2, 4, 8, 16, 32, 64, 128, 256, 512, 1024, 2048, 4096, 8192);
