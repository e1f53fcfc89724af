//! SPARQL 1.1 support
//!
//! - [`parse_query`]/[`parse_update`]: spargebra front end
//! - [`execute`]: evaluator for the commonly used algebra subset over any
//!   [`QuadSource`]
//! - [`results`]: SPARQL 1.1 query results JSON reader and writer
//! - [`SparqlClient`]: SPARQL protocol client (blocking reqwest)
//! - [`SparqlHttpEndpoint`]: SPARQL protocol endpoint over a [`Model`](crate::model::Model)
//!
//! # Example
//!
//! ```rust
//! use triplegate::model::{MemoryModel, Model, QueryLanguage};
//! use triplegate::rdf::{Node, Statement};
//!
//! let model = MemoryModel::new();
//! model.add_statement(&Statement::new(
//!     Node::resource("http://example.org/alice").unwrap(),
//!     Node::resource("http://xmlns.com/foaf/0.1/name").unwrap(),
//!     Node::literal("Alice"),
//! )).unwrap();
//!
//! let query = r#"
//!     PREFIX foaf: <http://xmlns.com/foaf/0.1/>
//!     SELECT ?name WHERE { ?person foaf:name ?name }
//! "#;
//! let mut it = model.execute_query(query, &QueryLanguage::Sparql).unwrap();
//! assert!(it.next());
//! assert_eq!(it.binding("name"), Node::literal("Alice"));
//! ```

mod client;
mod executor;
mod http;
mod parser;
pub mod results;

pub use client::SparqlClient;
pub use executor::{execute, execute_parsed};
pub use http::SparqlHttpEndpoint;
pub use parser::{parse_query, parse_update, query_form_hint, ParsedQuery, QueryForm};

use crate::error::{Error, Locator, Result};
use crate::rdf::Statement;
use thiserror::Error;

/// Anything the evaluator can read quads from
pub trait QuadSource {
    /// Statements matching `pattern`; empty pattern nodes are wildcards and
    /// an empty context matches every graph.
    fn quads_matching(&self, pattern: &Statement) -> Result<Vec<Statement>>;
}

/// SPARQL translation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SparqlError {
    /// Query or update text does not parse
    #[error("Parse error: {0}")]
    Parse(String),

    /// Valid SPARQL outside the supported algebra subset
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Malformed results document
    #[error("Results error: {0}")]
    Results(String),
}

impl From<SparqlError> for Error {
    fn from(error: SparqlError) -> Self {
        match error {
            SparqlError::Parse(message) => Error::parser(message, Locator::default()),
            SparqlError::Unsupported(message) => Error::not_supported(message),
            SparqlError::Results(message) => Error::unknown(message),
        }
    }
}

pub type SparqlResult<T> = std::result::Result<T, SparqlError>;
