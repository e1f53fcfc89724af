//! Models: the uniform statement/query facade over storage engines
//!
//! Engines:
//! - [`MemoryModel`]: in-process indexed quad store
//! - [`SqlModel`]: SQLite-backed store read through paged SQL cursors
//! - [`SparqlModel`]: remote SPARQL 1.1 protocol endpoint
//!
//! Decorators (each wraps an `Arc<dyn Model>`):
//! - [`FilterModel`]: pass-through base
//! - [`ReadOnlyModel`]: rejects writes
//! - [`MultiCallProtectionModel`]: serialises concurrent callers
//! - [`AsyncModel`]: moves every call onto a dedicated worker thread
//!
//! # Locking contract
//!
//! Storage models take their read lock *before* asking the engine for a
//! cursor and keep it until the returned iterator is closed or dropped.
//! Writes take the write lock for the duration of the call only. Writing
//! from a thread that still has an iterator open on the same model
//! deadlocks; drain the iterator first (`all_statements()`) when a listing
//! drives modifications.

mod async_model;
mod filter;
mod memory;
mod protection;
mod readonly;
mod registry;
mod sparql;
mod sql;

pub use async_model::{AsyncIterator, AsyncModel, AsyncNodeIterator, AsyncQueryResultIterator, AsyncStatementIterator, ResultRow};
pub use filter::FilterModel;
pub use memory::{MemoryModel, QuadStore};
pub use protection::{MultiCallProtectionModel, ProtectionMode};
pub use readonly::ReadOnlyModel;
pub use registry::{IteratorRegistry, Lease, LeaseOwner, LockCoupling, LockMode};
pub use sparql::SparqlModel;
pub use sql::{SqlConfig, SqlModel};

use crate::error::{Error, Result};
use crate::iterator::{NodeIterator, QueryResultIterator, StatementIterator};
use crate::rdf::{Node, Statement};
use std::fmt;
use std::str::FromStr;

/// Query language tag passed to [`Model::execute_query`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryLanguage {
    Sparql,
    Sql,
    /// Backend-specific language, e.g. `text` for full-text search
    User(String),
}

impl QueryLanguage {
    pub fn as_str(&self) -> &str {
        match self {
            QueryLanguage::Sparql => "SPARQL",
            QueryLanguage::Sql => "SQL",
            QueryLanguage::User(name) => name,
        }
    }
}

impl fmt::Display for QueryLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryLanguage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_argument("empty query language"));
        }
        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "sparql" => QueryLanguage::Sparql,
            "sql" => QueryLanguage::Sql,
            _ => QueryLanguage::User(trimmed.to_string()),
        })
    }
}

/// Statement storage and query facade.
///
/// Every method records its outcome in the model's last-error slot (see
/// [`Model::last_error`]) in addition to returning it.
pub trait Model: Send + Sync {
    /// Add one statement; duplicates are ignored. Invalid statements are
    /// rejected with `InvalidArgument`.
    fn add_statement(&self, statement: &Statement) -> Result<()>;

    fn add_statements(&self, statements: &[Statement]) -> Result<()> {
        for statement in statements {
            self.add_statement(statement)?;
        }
        Ok(())
    }

    /// Remove one fully specified statement. Removing a missing statement
    /// succeeds.
    fn remove_statement(&self, statement: &Statement) -> Result<()>;

    /// Remove every statement matching `partial`
    fn remove_all_statements(&self, partial: &Statement) -> Result<()>;

    /// Lazily list the statements matching `partial`. The returned iterator
    /// holds the model's read lock until it is closed or dropped.
    fn list_statements(&self, partial: &Statement) -> Result<StatementIterator>;

    fn list_statements_in_context(&self, context: &Node) -> Result<StatementIterator> {
        self.list_statements(&Statement::any().with_context(context.clone()))
    }

    /// Lazily list the distinct non-empty contexts
    fn list_contexts(&self) -> Result<NodeIterator>;

    fn execute_query(&self, query: &str, language: &QueryLanguage) -> Result<QueryResultIterator>;

    /// Exact match including the context; an empty context means the
    /// default graph.
    fn contains_statement(&self, statement: &Statement) -> Result<bool>;

    /// Whether anything matches `partial`
    fn contains_any_statement(&self, partial: &Statement) -> Result<bool> {
        let mut it = self.list_statements(partial)?;
        let found = it.next();
        let error = it.last_error();
        it.close();
        match error {
            Some(e) if !found => Err(e),
            _ => Ok(found),
        }
    }

    fn contains_context(&self, context: &Node) -> Result<bool> {
        self.contains_any_statement(&Statement::any().with_context(context.clone()))
    }

    fn remove_context(&self, context: &Node) -> Result<()> {
        if !context.is_valid() {
            return Err(Error::invalid_argument("cannot remove the default context"));
        }
        self.remove_all_statements(&Statement::any().with_context(context.clone()))
    }

    fn statement_count(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.statement_count()? == 0)
    }

    /// A blank node that is unique within this model
    fn create_blank_node(&self) -> Result<Node>;

    /// Error recorded by the most recent call, if it failed
    fn last_error(&self) -> Option<Error>;
}
