//! Decorator backends
//!
//! Each adapter owns a handle to its source and forwards to it. Advancing
//! an adapter advances the source, and closing it closes the source.

use super::{IteratorBackend, IteratorHandle, QueryResultIterator};
use crate::error::Error;
use crate::rdf::{Node, Statement};

/// Position inside a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementPart {
    Subject,
    Predicate,
    Object,
    Context,
}

impl StatementPart {
    pub fn of(self, statement: Statement) -> Node {
        match self {
            StatementPart::Subject => statement.subject,
            StatementPart::Predicate => statement.predicate,
            StatementPart::Object => statement.object,
            StatementPart::Context => statement.context,
        }
    }
}

/// Projects one position of each statement
pub struct StatementNodeBackend {
    source: IteratorHandle<Statement>,
    part: StatementPart,
}

impl StatementNodeBackend {
    pub fn new(source: IteratorHandle<Statement>, part: StatementPart) -> Self {
        Self { source, part }
    }
}

impl IteratorBackend<Node> for StatementNodeBackend {
    fn next(&mut self) -> bool {
        self.source.next()
    }

    fn current(&self) -> Node {
        self.part.of(self.source.current())
    }

    fn close(&mut self) {
        self.source.close();
    }

    fn last_error(&self) -> Option<Error> {
        self.source.last_error()
    }
}

/// Statements of a graph query result
pub struct GraphStatementBackend {
    source: QueryResultIterator,
}

impl GraphStatementBackend {
    pub fn new(source: QueryResultIterator) -> Self {
        Self { source }
    }
}

impl IteratorBackend<Statement> for GraphStatementBackend {
    fn next(&mut self) -> bool {
        self.source.next()
    }

    fn current(&self) -> Statement {
        self.source.current_statement()
    }

    fn close(&mut self) {
        self.source.close();
    }

    fn last_error(&self) -> Option<Error> {
        self.source.last_error()
    }
}

enum Column {
    Name(String),
    Offset(usize),
}

/// One column of a binding result
pub struct BindingColumnBackend {
    source: QueryResultIterator,
    column: Column,
}

impl BindingColumnBackend {
    pub fn by_name(source: QueryResultIterator, name: &str) -> Self {
        Self {
            source,
            column: Column::Name(name.to_string()),
        }
    }

    pub fn by_offset(source: QueryResultIterator, offset: usize) -> Self {
        Self {
            source,
            column: Column::Offset(offset),
        }
    }
}

impl IteratorBackend<Node> for BindingColumnBackend {
    fn next(&mut self) -> bool {
        self.source.next()
    }

    fn current(&self) -> Node {
        match &self.column {
            Column::Name(name) => self.source.binding(name),
            Column::Offset(offset) => self.source.binding_at(*offset),
        }
    }

    fn close(&mut self) {
        self.source.close();
    }

    fn last_error(&self) -> Option<Error> {
        self.source.last_error()
    }
}

/// Builds statements out of binding columns, filling unnamed positions
/// from a template
pub struct BindingStatementBackend {
    source: QueryResultIterator,
    names: [String; 4],
    template: Statement,
}

impl BindingStatementBackend {
    pub fn new(source: QueryResultIterator, names: [&str; 4], template: Statement) -> Self {
        Self {
            source,
            names: names.map(str::to_string),
            template,
        }
    }

    fn part(&self, index: usize, fallback: &Node) -> Node {
        let name = &self.names[index];
        if name.is_empty() {
            fallback.clone()
        } else {
            self.source.binding(name)
        }
    }
}

impl IteratorBackend<Statement> for BindingStatementBackend {
    fn next(&mut self) -> bool {
        self.source.next()
    }

    fn current(&self) -> Statement {
        Statement::new_quad(
            self.part(0, &self.template.subject),
            self.part(1, &self.template.predicate),
            self.part(2, &self.template.object),
            self.part(3, &self.template.context),
        )
    }

    fn close(&mut self) {
        self.source.close();
    }

    fn last_error(&self) -> Option<Error> {
        self.source.last_error()
    }
}

/// Forwards only the elements accepted by a predicate
pub struct FilterBackend<T> {
    source: IteratorHandle<T>,
    accept: Box<dyn Fn(&T) -> bool + Send>,
}

impl<T> FilterBackend<T> {
    pub fn new(source: IteratorHandle<T>, accept: impl Fn(&T) -> bool + Send + 'static) -> Self {
        Self {
            source,
            accept: Box::new(accept),
        }
    }
}

impl<T: Default + 'static> IteratorBackend<T> for FilterBackend<T> {
    fn next(&mut self) -> bool {
        while self.source.next() {
            if (self.accept)(&self.source.current()) {
                return true;
            }
        }
        false
    }

    fn current(&self) -> T {
        self.source.current()
    }

    fn close(&mut self) {
        self.source.close();
    }

    fn last_error(&self) -> Option<Error> {
        self.source.last_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::{SimpleIteratorBackend, StatementIterator};

    #[test]
    fn test_filter_skips_rejected() {
        let source = IteratorHandle::new(SimpleIteratorBackend::new(vec![1, 2, 3, 4, 5, 6]));
        let filtered = IteratorHandle::new(FilterBackend::new(source, |v| v % 3 == 0));
        assert_eq!(filtered.all_elements(), vec![3, 6]);
    }

    #[test]
    fn test_closing_adapter_closes_source() {
        let st = Statement::new(
            Node::resource("urn:a").unwrap(),
            Node::resource("urn:p").unwrap(),
            Node::literal("x"),
        );
        let source = StatementIterator::new(SimpleIteratorBackend::new(vec![st.clone(), st]));
        let mut objects = source.iterate_objects();
        assert!(objects.next());
        objects.close();
        let mut source = source;
        assert!(!source.next());
    }
}
