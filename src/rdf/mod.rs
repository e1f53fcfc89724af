//! RDF value types consumed by the iterator and model layers
//!
//! - [`Node`]: one RDF term, or the empty wildcard
//! - [`Statement`]: subject, predicate, object and context
//! - [`BindingSet`]: one named row of a tuple query result
//!
//! # Example
//!
//! ```rust
//! use triplegate::rdf::{Node, Statement};
//!
//! let st = Statement::new(
//!     Node::resource("http://example.org/alice").unwrap(),
//!     Node::resource("http://xmlns.com/foaf/0.1/name").unwrap(),
//!     Node::literal("Alice"),
//! );
//! assert!(st.is_valid());
//! assert_eq!(Node::from_n3(&st.object.to_n3()).unwrap(), st.object);
//! ```

mod binding_set;
mod node;
mod statement;
pub mod vocab;

pub use binding_set::BindingSet;
pub use node::{BlankNode, Literal, NamedNode, Node};
pub use statement::Statement;
