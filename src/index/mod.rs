//! Full-text indexing
//!
//! [`TextIndex`] maps the words of literal objects to their subjects.
//! [`IndexFilterModel`] keeps an index in step with a parent model and
//! answers `text` queries from it; search hits are presented as a binding
//! result with the columns `resource` and `score`.

mod model;
mod text_index;

pub use model::{IndexFilterModel, TEXT_QUERY_LANGUAGE};
pub use text_index::{tokenize, QueryHit, TextIndex};

use crate::error::Error;
use crate::iterator::{IteratorBackend, IteratorHandle, QueryResultIteratorBackend, ResultShape};
use crate::rdf::{BindingSet, Literal, Node};

const BINDING_NAMES: [&str; 2] = ["resource", "score"];

/// Presents search hits as a two-column binding result
pub struct QueryHitWrapperBackend {
    hits: IteratorHandle<QueryHit>,
    error: Option<Error>,
}

impl QueryHitWrapperBackend {
    pub fn new(hits: IteratorHandle<QueryHit>) -> Self {
        Self { hits, error: None }
    }

    fn column(&self, offset: usize) -> Node {
        let hit = self.hits.current();
        match offset {
            0 => hit.resource,
            1 => Node::Literal(Literal::from(hit.score)),
            _ => Node::Empty,
        }
    }
}

impl IteratorBackend<BindingSet> for QueryHitWrapperBackend {
    fn next(&mut self) -> bool {
        self.error = None;
        self.hits.next()
    }

    fn current(&self) -> BindingSet {
        BINDING_NAMES
            .iter()
            .enumerate()
            .map(|(offset, name)| (*name, self.column(offset)))
            .collect()
    }

    fn close(&mut self) {
        self.hits.close();
    }

    fn last_error(&self) -> Option<Error> {
        self.error.clone().or_else(|| self.hits.last_error())
    }
}

impl QueryResultIteratorBackend for QueryHitWrapperBackend {
    fn shape(&self) -> ResultShape {
        ResultShape::Bindings
    }

    fn binding_names(&self) -> Vec<String> {
        BINDING_NAMES.iter().map(|n| n.to_string()).collect()
    }

    fn binding(&mut self, name: &str) -> Node {
        self.error = None;
        match BINDING_NAMES.iter().position(|n| *n == name) {
            Some(offset) => self.column(offset),
            None => {
                self.report_error(Error::invalid_argument(format!("invalid binding name: {}", name)));
                Node::Empty
            }
        }
    }

    fn binding_at(&mut self, offset: usize) -> Node {
        self.error = None;
        self.column(offset)
    }

    fn report_error(&mut self, error: Error) {
        self.error = Some(error);
    }

    fn clear_error(&mut self) {
        self.error = None;
    }
}
