//! triplegate
//!
//! A uniform data-access layer over RDF stores. Every store is a
//! [`Model`](model::Model); every result is a lazy, closeable, shared
//! iterator that holds a read lock on its model until it is closed.
//!
//! # Layers
//!
//! - [`iterator`]: `IteratorBackend<T>`, the shared [`IteratorHandle`](iterator::IteratorHandle)
//!   and the query-result discrimination layer (bindings, graph, boolean)
//! - [`lock`]: `ReentrantReadExclusiveWriteLock`
//! - [`model`]: the `Model` trait, the in-memory, SQLite and SPARQL
//!   backends, and the filter, read-only, multi-call protection and async
//!   decorators
//! - [`sparql`], [`serialization`], [`index`]: query, parse/serialize and
//!   full-text collaborators producing statements and bindings
//! - [`protocol`]: binary client/server transport
//! - [`backend`], [`config`]: backends by name and YAML configuration
//!
//! ## Example Usage
//!
//! ```rust
//! use triplegate::model::{MemoryModel, Model};
//! use triplegate::rdf::{Node, Statement};
//!
//! let model = MemoryModel::new();
//! let a = Node::resource("urn:a").unwrap();
//! let p = Node::resource("urn:p").unwrap();
//! model.add_statement(&Statement::new(a.clone(), p.clone(), Node::resource("urn:b").unwrap())).unwrap();
//! model.add_statement(&Statement::new(a.clone(), p.clone(), Node::resource("urn:c").unwrap())).unwrap();
//!
//! // the iterator read-locks the model until it is closed
//! let mut it = model.list_statements(&Statement::new(a, p, Node::Empty)).unwrap();
//! let mut count = 0;
//! while it.next() {
//!     count += 1;
//! }
//! assert!(it.last_error().is_none());
//! it.close();
//! assert_eq!(count, 2);
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod error;
pub mod index;
pub mod iterator;
pub mod lock;
pub mod model;
pub mod protocol;
pub mod rdf;
pub mod serialization;
pub mod sparql;

// Re-export main types for convenience
pub use backend::{Backend, BackendFeatures, BackendRegistry};
pub use config::{BackendSettings, Config};
pub use error::{Error, ErrorCache, ErrorCode, Locator, Result};
pub use iterator::{IteratorHandle, NodeIterator, QueryResultIterator, ResultShape, StatementIterator};
pub use lock::ReentrantReadExclusiveWriteLock;
pub use model::{Model, QueryLanguage};
pub use rdf::{BindingSet, Node, Statement};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(version(), "0.3.0");
    }
}
