//! Return-value error kinds (spec §7): `Closed` and `WouldBlock` are ordinary
//! results a caller branches on, never `std::error::Error` exceptions.

use std::fmt;

/// Returned by a non-blocking send attempt.
#[derive(Debug)]
pub enum TrySendError<T> {
    /// The channel has no free capacity right now.
    Full(T),
    /// The channel is closed; the value was not enqueued.
    Disconnected(T),
}

impl<T> TrySendError<T> {
    /// Recovers the value that could not be sent.
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(v) => v,
            TrySendError::Disconnected(v) => v,
        }
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, TrySendError::Disconnected(_))
    }
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => write!(f, "channel full"),
            TrySendError::Disconnected(_) => write!(f, "channel closed"),
        }
    }
}

/// Returned by a non-blocking receive attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum TryRecvError {
    /// Nothing buffered right now, but the channel is still open.
    Empty,
    /// The channel is closed and fully drained.
    Disconnected,
}

impl fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryRecvError::Empty => write!(f, "channel empty"),
            TryRecvError::Disconnected => write!(f, "channel closed"),
        }
    }
}
