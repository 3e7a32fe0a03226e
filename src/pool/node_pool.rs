//! A lock-free Treiber stack of free `Node<V>` boxes, and the [`NodeQueue`]
//! built on top of it: every channel's `ResourceGate` waiter list draws its
//! node allocations from here instead of allocating fresh on every park.

use std::collections::VecDeque;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

pub(crate) struct Node<V> {
    next: AtomicPtr<Node<V>>,
    pub(crate) value: Option<V>,
}

pub(crate) struct NodePool<V> {
    free: AtomicPtr<Node<V>>,
}

impl<V> NodePool<V> {
    pub(crate) const fn new() -> Self {
        Self {
            free: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Hands back a node carrying `value`, reusing a freed one if the stack
    /// is non-empty or boxing a new one otherwise.
    pub(crate) fn acquire(&self, value: V) -> Box<Node<V>> {
        loop {
            let head = self.free.load(Ordering::Acquire);
            if head.is_null() {
                return Box::new(Node {
                    next: AtomicPtr::new(ptr::null_mut()),
                    value: Some(value),
                });
            }
            // Safety: `head` came off `free`, which only ever holds pointers
            // to boxes this pool itself produced and has not yet returned to
            // the caller.
            let next = unsafe { (*head).next.load(Ordering::Relaxed) };
            if self
                .free
                .compare_exchange_weak(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // Safety: we just unlinked `head` from the stack, so we are
                // its sole owner again.
                let mut node = unsafe { Box::from_raw(head) };
                node.value = Some(value);
                return node;
            }
        }
    }

    /// Returns an emptied node to the free stack for later reuse.
    pub(crate) fn release(&self, mut node: Box<Node<V>>) {
        debug_assert!(node.value.is_none(), "node released with a value still in it");
        node.value = None;
        let raw = Box::into_raw(node);
        loop {
            let head = self.free.load(Ordering::Acquire);
            // Safety: `raw` was just produced by `Box::into_raw` above and is
            // not yet reachable from `free`, so writing its `next` is fine.
            unsafe {
                (*raw).next.store(head, Ordering::Relaxed);
            }
            if self
                .free
                .compare_exchange_weak(head, raw, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }
}

impl<V> Drop for NodePool<V> {
    fn drop(&mut self) {
        let mut cur = *self.free.get_mut();
        while !cur.is_null() {
            // Safety: draining a stack only this (uniquely borrowed) pool
            // owns; each node was boxed by `acquire`/`release` above.
            let node = unsafe { Box::from_raw(cur) };
            cur = node.next.load(Ordering::Relaxed);
        }
    }
}

unsafe impl<V: Send> Send for NodePool<V> {}
unsafe impl<V: Send> Sync for NodePool<V> {}

/// A FIFO queue whose node allocations are drawn from and returned to a
/// private `NodePool`: ordering is tracked by an ordinary `VecDeque` of
/// pointers, but each push/pop recycles a `Node<V>` box instead of calling
/// the allocator, once the pool has warmed up.
///
/// Not `Sync` on its own — callers serialize access externally (every use in
/// this crate is behind a `SpinLock`).
pub(crate) struct NodeQueue<V> {
    pool: NodePool<V>,
    order: VecDeque<Box<Node<V>>>,
}

impl<V> NodeQueue<V> {
    pub(crate) fn new() -> Self {
        Self {
            pool: NodePool::new(),
            order: VecDeque::new(),
        }
    }

    pub(crate) fn push_back(&mut self, value: V) {
        self.order.push_back(self.pool.acquire(value));
    }

    pub(crate) fn pop_front(&mut self) -> Option<V> {
        let mut node = self.order.pop_front()?;
        let value = node.value.take().expect("queued node always holds a value");
        self.pool.release(node);
        Some(value)
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&V) -> bool) {
        self.order
            .retain(|node| keep(node.value.as_ref().expect("queued node always holds a value")));
    }

    /// Consumes the queue, returning its values in order. Used by `close()`
    /// paths that need to drain every waiter at once.
    pub(crate) fn into_values(self) -> Vec<V> {
        self.order
            .into_iter()
            .map(|mut node| node.value.take().expect("queued node always holds a value"))
            .collect()
    }
}
