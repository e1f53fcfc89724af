//! Open-iterator bookkeeping
//!
//! A model that hands out lock-holding iterators acquires one lock unit per
//! iterator and records a [`Lease`] for it. The lease's first `close()`
//! calls back into its owner through a weak reference, which removes the
//! lease from the registry and releases exactly one lock unit. When the
//! model is torn down it force-closes every remaining lease instead, which
//! marks them closed without touching the lock.

use crate::lock::{ReadLocker, ReentrantReadExclusiveWriteLock, WriteLocker};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Receives the release notification of a closed lease
pub trait LeaseOwner: Send + Sync {
    fn release_lease(&self, id: u64);
}

/// One iterator's claim on its model's lock
pub struct Lease {
    id: u64,
    closed: AtomicBool,
    owner: Weak<dyn LeaseOwner>,
}

impl Lease {
    pub fn new(id: u64, owner: Weak<dyn LeaseOwner>) -> Self {
        Self {
            id,
            closed: AtomicBool::new(false),
            owner,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Release the lease. Only the first call reaches the owner.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(owner) = self.owner.upgrade() {
            owner.release_lease(self.id);
        }
    }

    /// Mark closed without notifying the owner. Returns `false` if the
    /// lease was already closed.
    pub fn force_close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Set of leases that are still open
#[derive(Debug, Default)]
pub struct IteratorRegistry {
    next_id: AtomicU64,
    open: Mutex<IndexMap<u64, Arc<Lease>>>,
}

impl IteratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, owner: Weak<dyn LeaseOwner>) -> Arc<Lease> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let lease = Arc::new(Lease::new(id, owner));
        self.open.lock().insert(id, Arc::clone(&lease));
        lease
    }

    /// Forget a lease; `true` if it was registered
    pub fn remove(&self, id: u64) -> bool {
        self.open.lock().shift_remove(&id).is_some()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.open.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.open.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.lock().is_empty()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.open.lock().keys().copied().collect()
    }

    /// Force-close and forget every open lease
    pub fn close_all(&self) -> usize {
        let leases: Vec<_> = self.open.lock().drain(..).map(|(_, lease)| lease).collect();
        leases.iter().filter(|lease| lease.force_close()).count()
    }
}

/// Whether an iterator-returning call holds the read or the write side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

/// A model's lock together with the leases that currently hold it
#[derive(Debug, Default)]
pub struct LockCoupling {
    lock: ReentrantReadExclusiveWriteLock,
    iterators: IteratorRegistry,
}

impl LockCoupling {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Lock and register a lease that keeps the lock until it is closed.
    /// If the caller fails before wrapping a cursor around the lease it
    /// must `close()` the lease itself.
    pub fn acquire(self: &Arc<Self>, mode: LockMode) -> Arc<Lease> {
        match mode {
            LockMode::Read => self.lock.lock_for_read(),
            LockMode::Write => self.lock.lock_for_write(),
        }
        let owner: Weak<dyn LeaseOwner> = Arc::downgrade(self) as Weak<dyn LeaseOwner>;
        let lease = self.iterators.open(owner);
        debug!(lease = lease.id(), ?mode, open = self.iterators.len(), "lease acquired");
        lease
    }

    /// Scoped read lock for calls that do not return an iterator
    pub fn read(&self) -> ReadLocker<'_> {
        self.lock.read()
    }

    /// Scoped write lock; writes never outlive the call
    pub fn write(&self) -> WriteLocker<'_> {
        self.lock.write()
    }

    pub fn lock(&self) -> &ReentrantReadExclusiveWriteLock {
        &self.lock
    }

    pub fn open_iterators(&self) -> usize {
        self.iterators.len()
    }

    pub fn is_open(&self, lease: &Lease) -> bool {
        self.iterators.contains(lease.id())
    }

    /// Teardown: force-close every open iterator without unlocking
    pub fn close_all(&self) {
        let closed = self.iterators.close_all();
        if closed > 0 {
            warn!(closed, "force-closed open iterators during model teardown");
        }
    }
}

impl LeaseOwner for LockCoupling {
    fn release_lease(&self, id: u64) {
        if self.iterators.remove(id) {
            self.lock.unlock();
            debug!(lease = id, open = self.iterators.len(), "lease released");
        }
    }
}
