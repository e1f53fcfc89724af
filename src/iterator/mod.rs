//! Lazy, closeable, shared iterators
//!
//! Every listing or query operation of a [`Model`](crate::model::Model)
//! returns one of the handles defined here:
//!
//! - [`StatementIterator`]: statements from `list_statements` or a parser
//! - [`NodeIterator`]: nodes from `list_contexts` or a projected column
//! - [`QueryResultIterator`]: bindings, statements or a boolean from a query
//!
//! A handle wraps exactly one [`IteratorBackend`]. Cloning a handle does
//! *not* copy the stream: all clones alias the same backend and observe the
//! same position. The backend is closed when `close()` is called through any
//! alias or when the last alias is dropped.
//!
//! Traversal is pull based: `next()` advances (and may block on I/O) and
//! `current()` re-reads the element under the cursor as often as needed.
//! Errors never panic; after `next()` returns `false` check `last_error()`
//! to tell a clean end of data from a failed fetch.
//!
//! ```rust
//! use triplegate::iterator::{IteratorHandle, SimpleIteratorBackend};
//!
//! let mut it = IteratorHandle::new(SimpleIteratorBackend::new(vec![1, 2, 3]));
//! let alias = it.clone();
//! assert!(it.next());
//! assert_eq!(alias.current(), 1);
//! assert_eq!(alias.all_elements(), vec![2, 3]);
//! assert!(!it.next());
//! ```

mod adapters;
mod leased;
mod query_result;
mod simple;

pub use adapters::{
    BindingColumnBackend, BindingStatementBackend, FilterBackend, GraphStatementBackend,
    StatementNodeBackend, StatementPart,
};
pub use leased::LeasedBackend;
pub use query_result::{
    QueryResultIterator, QueryResultIteratorBackend, ResultShape, SimpleQueryResult,
    StatementQueryResultBackend,
};
pub use simple::SimpleIteratorBackend;

use crate::error::Error;
use crate::rdf::{Node, Statement};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// The minimal cursor contract implemented once per engine or source.
///
/// Invariants every implementation upholds:
/// - once `next()` returned `false` it keeps returning `false`;
/// - `current()` yields `T::default()` before the first `next()`, after
///   exhaustion and after `close()`;
/// - `close()` is idempotent and releases whatever the backend holds.
pub trait IteratorBackend<T>: Send {
    /// Advance to the next element. `false` at the end or on error.
    fn next(&mut self) -> bool;

    /// The element produced by the last successful `next()`.
    fn current(&self) -> T;

    /// Release the cursor and any lock or connection it holds.
    fn close(&mut self);

    /// Failure recorded by the last `next()`, if any.
    fn last_error(&self) -> Option<Error> {
        None
    }
}

impl<T, B: IteratorBackend<T> + ?Sized> IteratorBackend<T> for Box<B> {
    fn next(&mut self) -> bool {
        (**self).next()
    }

    fn current(&self) -> T {
        (**self).current()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn last_error(&self) -> Option<Error> {
        (**self).last_error()
    }
}

type SharedBackend<T> = Arc<Mutex<Box<dyn IteratorBackend<T>>>>;

/// Reference-counted handle around one backend.
///
/// A handle without a backend is *invalid*: it yields nothing and all
/// accessors return defaults.
pub struct IteratorHandle<T> {
    backend: Option<SharedBackend<T>>,
}

/// Statements from a listing, a graph query or a parser
pub type StatementIterator = IteratorHandle<Statement>;

/// Nodes from `list_contexts` or a projected statement/binding column
pub type NodeIterator = IteratorHandle<Node>;

impl<T: Default + 'static> IteratorHandle<T> {
    pub fn new(backend: impl IteratorBackend<T> + 'static) -> Self {
        Self::from_box(Box::new(backend))
    }

    pub fn from_box(backend: Box<dyn IteratorBackend<T>>) -> Self {
        Self {
            backend: Some(Arc::new(Mutex::new(backend))),
        }
    }

    /// Handle with no backend
    pub fn invalid() -> Self {
        Self { backend: None }
    }

    /// `true` iff a backend is attached
    pub fn is_valid(&self) -> bool {
        self.backend.is_some()
    }

    pub fn next(&mut self) -> bool {
        match &self.backend {
            Some(backend) => backend.lock().next(),
            None => false,
        }
    }

    pub fn current(&self) -> T {
        match &self.backend {
            Some(backend) => backend.lock().current(),
            None => T::default(),
        }
    }

    /// Close the shared backend for every alias
    pub fn close(&mut self) {
        if let Some(backend) = &self.backend {
            backend.lock().close();
        }
    }

    pub fn last_error(&self) -> Option<Error> {
        self.backend.as_ref().and_then(|backend| backend.lock().last_error())
    }

    /// Drain the remaining elements. The iterator is exhausted afterwards.
    pub fn all_elements(&self) -> Vec<T> {
        let mut it = self.clone();
        let mut elements = Vec::new();
        while it.next() {
            elements.push(it.current());
        }
        elements
    }

    /// Borrowing adapter for use with `for` loops and iterator combinators
    pub fn elements(&mut self) -> Elements<'_, T> {
        Elements { handle: self }
    }

    /// Number of handles sharing this backend
    pub fn alias_count(&self) -> usize {
        self.backend.as_ref().map_or(0, Arc::strong_count)
    }
}

impl<T> Clone for IteratorHandle<T> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
        }
    }
}

impl<T> Default for IteratorHandle<T> {
    fn default() -> Self {
        Self { backend: None }
    }
}

impl<T> fmt::Debug for IteratorHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IteratorHandle")
            .field("valid", &self.backend.is_some())
            .finish()
    }
}

/// A handle is itself a backend, so decorators can wrap a finished
/// iterator (in a lease, a filter) without unpacking it.
impl<T: Default + 'static> IteratorBackend<T> for IteratorHandle<T> {
    fn next(&mut self) -> bool {
        IteratorHandle::next(self)
    }

    fn current(&self) -> T {
        IteratorHandle::current(self)
    }

    fn close(&mut self) {
        IteratorHandle::close(self)
    }

    fn last_error(&self) -> Option<Error> {
        IteratorHandle::last_error(self)
    }
}

/// Standard-library view of a handle, see [`IteratorHandle::elements`]
pub struct Elements<'a, T> {
    handle: &'a mut IteratorHandle<T>,
}

impl<T: Default + 'static> Iterator for Elements<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.handle.next() {
            Some(self.handle.current())
        } else {
            None
        }
    }
}

impl StatementIterator {
    /// Drain into a vector of statements
    pub fn all_statements(&self) -> Vec<Statement> {
        self.all_elements()
    }

    pub fn iterate_subjects(&self) -> NodeIterator {
        self.project(StatementPart::Subject)
    }

    pub fn iterate_predicates(&self) -> NodeIterator {
        self.project(StatementPart::Predicate)
    }

    pub fn iterate_objects(&self) -> NodeIterator {
        self.project(StatementPart::Object)
    }

    pub fn iterate_contexts(&self) -> NodeIterator {
        self.project(StatementPart::Context)
    }

    fn project(&self, part: StatementPart) -> NodeIterator {
        if !self.is_valid() {
            return NodeIterator::invalid();
        }
        NodeIterator::new(StatementNodeBackend::new(self.clone(), part))
    }
}

impl NodeIterator {
    pub fn all_nodes(&self) -> Vec<Node> {
        self.all_elements()
    }
}
