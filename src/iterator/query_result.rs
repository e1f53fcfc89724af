//! Query results: one cursor over three result shapes
//!
//! A result is exactly one of
//!
//! - a binding (tuple) result: rows of [`BindingSet`], addressable by
//!   variable name or column offset,
//! - a graph result: a stream of [`Statement`]s read via
//!   `current_statement()`,
//! - a boolean result: a single answer read via `bool_value()`.
//!
//! The shape is fixed when the backend is constructed.
//!
//! Boolean results are a special case of the pull protocol: `next()`
//! returns `true` exactly once whatever the answer is, then `false`.
//! "Is there a row" and "what did ASK answer" are different questions, so a
//! `while it.next()` loop runs exactly once on a boolean result.

use super::adapters::{BindingColumnBackend, BindingStatementBackend, GraphStatementBackend};
use super::{IteratorBackend, NodeIterator, StatementIterator};
use crate::error::Error;
use crate::rdf::{BindingSet, Node, Statement};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Which of the three result shapes a query produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultShape {
    Bindings,
    Graph,
    Bool,
}

impl ResultShape {
    pub fn as_u8(self) -> u8 {
        match self {
            ResultShape::Bindings => 1,
            ResultShape::Graph => 2,
            ResultShape::Bool => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(ResultShape::Bindings),
            2 => Some(ResultShape::Graph),
            3 => Some(ResultShape::Bool),
            _ => None,
        }
    }
}

/// Backend contract for query results.
///
/// Accessors for the wrong shape return empty values: `current_statement()`
/// on a binding result is an empty statement, `bool_value()` on a graph
/// result is `false`, and so on.
pub trait QueryResultIteratorBackend: IteratorBackend<BindingSet> {
    fn shape(&self) -> ResultShape;

    /// Current statement of a graph result
    fn current_statement(&self) -> Statement {
        Statement::default()
    }

    /// Binding names of a tuple result, known before the first `next()`
    fn binding_names(&self) -> Vec<String>;

    fn binding_count(&self) -> usize {
        self.binding_names().len()
    }

    /// Value of `name` in the current row. Unknown names record an
    /// `InvalidArgument` error and yield an empty node.
    fn binding(&mut self, name: &str) -> Node {
        self.clear_error();
        if self.shape() != ResultShape::Bindings {
            return Node::Empty;
        }
        if !self.binding_names().iter().any(|n| n == name) {
            self.report_error(Error::invalid_argument(format!("invalid binding name: {}", name)));
            return Node::Empty;
        }
        self.current().value(name)
    }

    /// Value at `offset` in the current row; empty when out of range.
    fn binding_at(&mut self, offset: usize) -> Node {
        self.clear_error();
        if self.shape() != ResultShape::Bindings {
            return Node::Empty;
        }
        self.current().at(offset).cloned().unwrap_or_default()
    }

    /// Answer of a boolean result
    fn bool_value(&self) -> bool {
        false
    }

    /// Record an error in the backend's last-error slot
    fn report_error(&mut self, error: Error);

    /// Empty the last-error slot. Every `next()` and binding lookup starts
    /// with a cleared slot.
    fn clear_error(&mut self);

    fn is_graph(&self) -> bool {
        self.shape() == ResultShape::Graph
    }

    fn is_binding(&self) -> bool {
        self.shape() == ResultShape::Bindings
    }

    fn is_bool(&self) -> bool {
        self.shape() == ResultShape::Bool
    }
}

impl<B: QueryResultIteratorBackend + ?Sized> QueryResultIteratorBackend for Box<B> {
    fn shape(&self) -> ResultShape {
        (**self).shape()
    }

    fn current_statement(&self) -> Statement {
        (**self).current_statement()
    }

    fn binding_names(&self) -> Vec<String> {
        (**self).binding_names()
    }

    fn binding_count(&self) -> usize {
        (**self).binding_count()
    }

    fn binding(&mut self, name: &str) -> Node {
        (**self).binding(name)
    }

    fn binding_at(&mut self, offset: usize) -> Node {
        (**self).binding_at(offset)
    }

    fn bool_value(&self) -> bool {
        (**self).bool_value()
    }

    fn report_error(&mut self, error: Error) {
        (**self).report_error(error)
    }

    fn clear_error(&mut self) {
        (**self).clear_error()
    }
}

enum Payload {
    Bindings { names: Vec<String>, rows: Vec<BindingSet> },
    Graph(Vec<Statement>),
    Bool(bool),
}

/// Fully materialised result, used by engines that evaluate eagerly
pub struct SimpleQueryResult {
    payload: Payload,
    position: usize,
    closed: bool,
    error: Option<Error>,
}

impl SimpleQueryResult {
    pub fn bindings(names: Vec<String>, rows: Vec<BindingSet>) -> Self {
        Self::with_payload(Payload::Bindings { names, rows })
    }

    pub fn graph(statements: Vec<Statement>) -> Self {
        Self::with_payload(Payload::Graph(statements))
    }

    pub fn boolean(value: bool) -> Self {
        Self::with_payload(Payload::Bool(value))
    }

    fn with_payload(payload: Payload) -> Self {
        Self {
            payload,
            position: 0,
            closed: false,
            error: None,
        }
    }

    fn len(&self) -> usize {
        match &self.payload {
            Payload::Bindings { rows, .. } => rows.len(),
            Payload::Graph(statements) => statements.len(),
            Payload::Bool(_) => 1,
        }
    }

    fn row_index(&self) -> Option<usize> {
        if self.closed || self.position == 0 || self.position > self.len() {
            None
        } else {
            Some(self.position - 1)
        }
    }
}

impl IteratorBackend<BindingSet> for SimpleQueryResult {
    fn next(&mut self) -> bool {
        self.error = None;
        if self.closed || self.position > self.len() {
            return false;
        }
        self.position += 1;
        self.position <= self.len()
    }

    fn current(&self) -> BindingSet {
        match (&self.payload, self.row_index()) {
            (Payload::Bindings { rows, .. }, Some(i)) => rows[i].clone(),
            _ => BindingSet::default(),
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn last_error(&self) -> Option<Error> {
        self.error.clone()
    }
}

impl QueryResultIteratorBackend for SimpleQueryResult {
    fn shape(&self) -> ResultShape {
        match self.payload {
            Payload::Bindings { .. } => ResultShape::Bindings,
            Payload::Graph(_) => ResultShape::Graph,
            Payload::Bool(_) => ResultShape::Bool,
        }
    }

    fn current_statement(&self) -> Statement {
        match (&self.payload, self.row_index()) {
            (Payload::Graph(statements), Some(i)) => statements[i].clone(),
            _ => Statement::default(),
        }
    }

    fn binding_names(&self) -> Vec<String> {
        match &self.payload {
            Payload::Bindings { names, .. } => names.clone(),
            _ => Vec::new(),
        }
    }

    fn bool_value(&self) -> bool {
        matches!(self.payload, Payload::Bool(true))
    }

    fn report_error(&mut self, error: Error) {
        self.error = Some(error);
    }

    fn clear_error(&mut self) {
        self.error = None;
    }
}

/// Graph result over a lazily produced statement stream
pub struct StatementQueryResultBackend {
    statements: StatementIterator,
    error: Option<Error>,
}

impl StatementQueryResultBackend {
    pub fn new(statements: StatementIterator) -> Self {
        Self {
            statements,
            error: None,
        }
    }
}

impl IteratorBackend<BindingSet> for StatementQueryResultBackend {
    fn next(&mut self) -> bool {
        self.error = None;
        self.statements.next()
    }

    fn current(&self) -> BindingSet {
        BindingSet::default()
    }

    fn close(&mut self) {
        self.statements.close();
    }

    fn last_error(&self) -> Option<Error> {
        self.error.clone().or_else(|| self.statements.last_error())
    }
}

impl QueryResultIteratorBackend for StatementQueryResultBackend {
    fn shape(&self) -> ResultShape {
        ResultShape::Graph
    }

    fn current_statement(&self) -> Statement {
        self.statements.current()
    }

    fn binding_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn report_error(&mut self, error: Error) {
        self.error = Some(error);
    }

    fn clear_error(&mut self) {
        self.error = None;
    }
}

type SharedResult = Arc<Mutex<Box<dyn QueryResultIteratorBackend>>>;

/// Shared handle around a query result backend; see the module docs of
/// [`crate::iterator`] for the aliasing rules.
#[derive(Clone, Default)]
pub struct QueryResultIterator {
    backend: Option<SharedResult>,
}

impl QueryResultIterator {
    pub fn new(backend: impl QueryResultIteratorBackend + 'static) -> Self {
        Self::from_box(Box::new(backend))
    }

    pub fn from_box(backend: Box<dyn QueryResultIteratorBackend>) -> Self {
        Self {
            backend: Some(Arc::new(Mutex::new(backend))),
        }
    }

    pub fn invalid() -> Self {
        Self { backend: None }
    }

    pub fn is_valid(&self) -> bool {
        self.backend.is_some()
    }

    fn with<R>(&self, default: R, f: impl FnOnce(&mut dyn QueryResultIteratorBackend) -> R) -> R {
        match &self.backend {
            Some(backend) => f(&mut **backend.lock()),
            None => default,
        }
    }

    pub fn next(&mut self) -> bool {
        self.with(false, |b| b.next())
    }

    /// Current row of a binding result
    pub fn current(&self) -> BindingSet {
        self.with(BindingSet::default(), |b| b.current())
    }

    pub fn current_bindings(&self) -> BindingSet {
        self.current()
    }

    pub fn current_statement(&self) -> Statement {
        self.with(Statement::default(), |b| b.current_statement())
    }

    pub fn binding(&self, name: &str) -> Node {
        self.with(Node::Empty, |b| b.binding(name))
    }

    pub fn binding_at(&self, offset: usize) -> Node {
        self.with(Node::Empty, |b| b.binding_at(offset))
    }

    pub fn binding_count(&self) -> usize {
        self.with(0, |b| b.binding_count())
    }

    pub fn binding_names(&self) -> Vec<String> {
        self.with(Vec::new(), |b| b.binding_names())
    }

    /// Shape of the result; `None` for an invalid handle
    pub fn shape(&self) -> Option<ResultShape> {
        self.with(None, |b| Some(b.shape()))
    }

    pub fn is_graph(&self) -> bool {
        self.with(false, |b| b.is_graph())
    }

    pub fn is_binding(&self) -> bool {
        self.with(false, |b| b.is_binding())
    }

    pub fn is_bool(&self) -> bool {
        self.with(false, |b| b.is_bool())
    }

    pub fn bool_value(&self) -> bool {
        self.with(false, |b| b.bool_value())
    }

    pub fn close(&mut self) {
        self.with((), |b| b.close())
    }

    pub fn last_error(&self) -> Option<Error> {
        self.with(None, |b| b.last_error())
    }

    /// Drain the remaining rows of a binding result
    pub fn all_bindings(&self) -> Vec<BindingSet> {
        let mut it = self.clone();
        let mut rows = Vec::new();
        while it.next() {
            rows.push(it.current());
        }
        rows
    }

    /// Drain the remaining statements of a graph result
    pub fn all_statements(&self) -> Vec<Statement> {
        let mut it = self.clone();
        let mut statements = Vec::new();
        while it.next() {
            statements.push(it.current_statement());
        }
        statements
    }

    /// Graph result as a statement iterator sharing this stream
    pub fn iterate_statements(&self) -> StatementIterator {
        if !self.is_valid() {
            return StatementIterator::invalid();
        }
        StatementIterator::new(GraphStatementBackend::new(self.clone()))
    }

    /// One binding column as a node iterator sharing this stream
    pub fn iterate_bindings(&self, name: &str) -> NodeIterator {
        if !self.is_valid() {
            return NodeIterator::invalid();
        }
        NodeIterator::new(BindingColumnBackend::by_name(self.clone(), name))
    }

    pub fn iterate_bindings_at(&self, offset: usize) -> NodeIterator {
        if !self.is_valid() {
            return NodeIterator::invalid();
        }
        NodeIterator::new(BindingColumnBackend::by_offset(self.clone(), offset))
    }

    /// Build statements from binding columns. An empty column name takes
    /// that position from `template` instead.
    pub fn iterate_statements_from_bindings(
        &self,
        subject: &str,
        predicate: &str,
        object: &str,
        context: &str,
        template: Statement,
    ) -> StatementIterator {
        if !self.is_valid() {
            return StatementIterator::invalid();
        }
        StatementIterator::new(BindingStatementBackend::new(
            self.clone(),
            [subject, predicate, object, context],
            template,
        ))
    }
}

impl IteratorBackend<BindingSet> for QueryResultIterator {
    fn next(&mut self) -> bool {
        QueryResultIterator::next(self)
    }

    fn current(&self) -> BindingSet {
        QueryResultIterator::current(self)
    }

    fn close(&mut self) {
        QueryResultIterator::close(self)
    }

    fn last_error(&self) -> Option<Error> {
        QueryResultIterator::last_error(self)
    }
}

/// Lets a decorator wrap a finished result in another backend
impl QueryResultIteratorBackend for QueryResultIterator {
    fn shape(&self) -> ResultShape {
        QueryResultIterator::shape(self).unwrap_or(ResultShape::Bindings)
    }

    fn current_statement(&self) -> Statement {
        QueryResultIterator::current_statement(self)
    }

    fn binding_names(&self) -> Vec<String> {
        QueryResultIterator::binding_names(self)
    }

    fn binding(&mut self, name: &str) -> Node {
        QueryResultIterator::binding(self, name)
    }

    fn binding_at(&mut self, offset: usize) -> Node {
        QueryResultIterator::binding_at(self, offset)
    }

    fn bool_value(&self) -> bool {
        QueryResultIterator::bool_value(self)
    }

    fn report_error(&mut self, error: Error) {
        self.with((), |b| b.report_error(error))
    }

    fn clear_error(&mut self) {
        self.with((), |b| b.clear_error())
    }
}

impl fmt::Debug for QueryResultIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResultIterator")
            .field("valid", &self.backend.is_some())
            .field("shape", &self.shape())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::SimpleIteratorBackend;

    fn res(iri: &str) -> Node {
        Node::resource(iri).unwrap()
    }

    fn spo_rows() -> SimpleQueryResult {
        let names = vec!["s".to_string(), "p".to_string(), "o".to_string()];
        let rows = vec![
            vec![("s", res("urn:a")), ("p", res("urn:p")), ("o", res("urn:b"))],
            vec![("s", res("urn:c")), ("p", res("urn:p")), ("o", Node::literal("d"))],
        ]
        .into_iter()
        .map(|row| row.into_iter().collect())
        .collect();
        SimpleQueryResult::bindings(names, rows)
    }

    #[test]
    fn test_binding_lookup() {
        let mut it = QueryResultIterator::new(spo_rows());
        assert!(it.is_binding());
        assert_eq!(it.binding_names(), vec!["s", "p", "o"]);
        assert!(it.next());
        assert_eq!(it.binding("s"), it.binding_at(0));
        assert_eq!(it.binding("o"), res("urn:b"));
        assert!(it.last_error().is_none());
        assert_eq!(it.binding("missing"), Node::Empty);
        assert_eq!(it.last_error().map(|e| e.code()), Some(crate::ErrorCode::InvalidArgument));
        assert_eq!(it.binding_at(7), Node::Empty);
    }

    #[test]
    fn test_lookup_error_does_not_outlive_the_row() {
        let mut it = QueryResultIterator::new(spo_rows());
        assert!(it.next());
        assert_eq!(it.binding("typo"), Node::Empty);
        assert!(it.last_error().is_some());
        assert_eq!(it.binding("s"), res("urn:a"));
        assert!(it.last_error().is_none());

        assert_eq!(it.binding("typo"), Node::Empty);
        assert!(it.next());
        assert!(it.last_error().is_none());
        assert!(!it.next());
        assert!(it.last_error().is_none());
    }

    #[test]
    fn test_boolean_next_once() {
        let mut it = QueryResultIterator::new(SimpleQueryResult::boolean(false));
        assert!(it.is_bool());
        assert!(!it.bool_value());
        assert!(it.next());
        assert!(!it.next());
        assert!(!it.next());
        assert!(!it.bool_value());
    }

    #[test]
    fn test_wrong_shape_accessors_are_empty() {
        let mut it = QueryResultIterator::new(SimpleQueryResult::graph(vec![Statement::new(
            res("urn:s"),
            res("urn:p"),
            res("urn:o"),
        )]));
        assert!(it.is_graph() && !it.is_binding() && !it.is_bool());
        assert!(it.next());
        assert!(!it.bool_value());
        assert_eq!(it.binding("s"), Node::Empty);
        assert!(it.current().is_empty());
        assert_eq!(it.current_statement().subject, res("urn:s"));
        assert!(!it.next());
        assert_eq!(it.current_statement(), Statement::default());
    }

    #[test]
    fn test_iterate_bindings_column() {
        let it = QueryResultIterator::new(spo_rows());
        let subjects = it.iterate_bindings("s").all_nodes();
        assert_eq!(subjects, vec![res("urn:a"), res("urn:c")]);
    }

    #[test]
    fn test_statements_from_bindings_use_template() {
        let it = QueryResultIterator::new(spo_rows());
        let template = Statement::any().with_context(res("urn:g"));
        let statements = it.iterate_statements_from_bindings("s", "p", "o", "", template).all_statements();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1].object, Node::literal("d"));
        assert_eq!(statements[1].context, res("urn:g"));
    }

    #[test]
    fn test_graph_from_statement_stream() {
        let source = StatementIterator::new(SimpleIteratorBackend::new(vec![Statement::new(
            res("urn:s"),
            res("urn:p"),
            res("urn:o"),
        )]));
        let result = QueryResultIterator::new(StatementQueryResultBackend::new(source));
        assert!(result.is_graph());
        assert_eq!(result.iterate_statements().all_statements().len(), 1);
    }
}
