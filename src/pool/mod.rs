//! Free-list pools that keep the blocking paths allocation-light: a bounded
//! cache of idle [`SyncCell`](crate::sync_cell::SyncCell)s and a lock-free
//! stack of free queue nodes.

pub(crate) mod node_pool;
pub(crate) mod sync_cell_pool;
