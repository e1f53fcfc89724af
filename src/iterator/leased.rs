use super::{IteratorBackend, QueryResultIteratorBackend, ResultShape};
use crate::error::Error;
use crate::model::Lease;
use crate::rdf::{Node, Statement};
use std::sync::Arc;
use tracing::trace;

/// Couples a cursor to one unit of its model's lock.
///
/// The inner cursor is closed first and the lease released second, so the
/// engine is never touched after the lock is given back. A lease that the
/// model force-closed during teardown turns the iterator into an exhausted
/// one without unlocking anything.
///
/// Dropping the backend without `close()` drops the cursor and then
/// releases the lease, which is how an abandoned handle gives its lock back.
pub struct LeasedBackend<B> {
    inner: Option<B>,
    closed: bool,
    lease: Arc<Lease>,
}

impl<B> LeasedBackend<B> {
    pub fn new(inner: B, lease: Arc<Lease>) -> Self {
        trace!(lease = lease.id(), "iterator opened");
        Self {
            inner: Some(inner),
            closed: false,
            lease,
        }
    }

    pub fn lease(&self) -> &Arc<Lease> {
        &self.lease
    }

    fn live(&self) -> Option<&B> {
        if self.closed || self.lease.is_closed() {
            None
        } else {
            self.inner.as_ref()
        }
    }
}

impl<B> LeasedBackend<B> {
    fn shut<T>(&mut self)
    where
        B: IteratorBackend<T>,
    {
        if !self.closed {
            self.closed = true;
            if let Some(inner) = self.inner.as_mut() {
                inner.close();
            }
        }
        self.lease.close();
        trace!(lease = self.lease.id(), "iterator closed");
    }
}

impl<T: Default, B: IteratorBackend<T>> IteratorBackend<T> for LeasedBackend<B> {
    fn next(&mut self) -> bool {
        if self.lease.is_closed() {
            self.shut::<T>();
            return false;
        }
        match (self.closed, self.inner.as_mut()) {
            (false, Some(inner)) => inner.next(),
            _ => false,
        }
    }

    fn current(&self) -> T {
        self.live().map(|inner| IteratorBackend::<T>::current(inner)).unwrap_or_default()
    }

    fn close(&mut self) {
        self.shut::<T>();
    }

    fn last_error(&self) -> Option<Error> {
        self.inner.as_ref().and_then(|inner| IteratorBackend::<T>::last_error(inner))
    }
}

impl<B: QueryResultIteratorBackend> QueryResultIteratorBackend for LeasedBackend<B> {
    fn shape(&self) -> ResultShape {
        self.inner.as_ref().map_or(ResultShape::Bindings, |inner| inner.shape())
    }

    fn current_statement(&self) -> Statement {
        self.live().map(|inner| inner.current_statement()).unwrap_or_default()
    }

    fn binding_names(&self) -> Vec<String> {
        self.inner.as_ref().map(|inner| inner.binding_names()).unwrap_or_default()
    }

    fn binding(&mut self, name: &str) -> Node {
        self.clear_error();
        if self.closed || self.lease.is_closed() {
            return Node::Empty;
        }
        self.inner.as_mut().map(|inner| inner.binding(name)).unwrap_or_default()
    }

    fn binding_at(&mut self, offset: usize) -> Node {
        self.clear_error();
        if self.closed || self.lease.is_closed() {
            return Node::Empty;
        }
        self.inner.as_mut().map(|inner| inner.binding_at(offset)).unwrap_or_default()
    }

    fn bool_value(&self) -> bool {
        self.inner.as_ref().is_some_and(|inner| inner.bool_value())
    }

    fn report_error(&mut self, error: Error) {
        if let Some(inner) = self.inner.as_mut() {
            inner.report_error(error);
        }
    }

    fn clear_error(&mut self) {
        if let Some(inner) = self.inner.as_mut() {
            inner.clear_error();
        }
    }
}

impl<B> Drop for LeasedBackend<B> {
    fn drop(&mut self) {
        drop(self.inner.take());
        self.lease.close();
    }
}
