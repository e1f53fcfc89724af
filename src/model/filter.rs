//! Pass-through decorator

use super::{Model, QueryLanguage};
use crate::error::{Error, Result};
use crate::iterator::{NodeIterator, QueryResultIterator, StatementIterator};
use crate::rdf::{Node, Statement};
use std::fmt;
use std::sync::Arc;

/// Forwards every call to its parent model unchanged.
///
/// Decorators embed a `FilterModel` and override only the calls they care
/// about, delegating the rest through [`FilterModel::parent`].
#[derive(Clone)]
pub struct FilterModel {
    parent: Arc<dyn Model>,
}

impl FilterModel {
    pub fn new(parent: Arc<dyn Model>) -> Self {
        Self { parent }
    }

    pub fn parent(&self) -> &Arc<dyn Model> {
        &self.parent
    }

    pub fn set_parent(&mut self, parent: Arc<dyn Model>) {
        self.parent = parent;
    }
}

impl fmt::Debug for FilterModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterModel").finish_non_exhaustive()
    }
}

impl Model for FilterModel {
    fn add_statement(&self, statement: &Statement) -> Result<()> {
        self.parent.add_statement(statement)
    }

    fn add_statements(&self, statements: &[Statement]) -> Result<()> {
        self.parent.add_statements(statements)
    }

    fn remove_statement(&self, statement: &Statement) -> Result<()> {
        self.parent.remove_statement(statement)
    }

    fn remove_all_statements(&self, partial: &Statement) -> Result<()> {
        self.parent.remove_all_statements(partial)
    }

    fn list_statements(&self, partial: &Statement) -> Result<StatementIterator> {
        self.parent.list_statements(partial)
    }

    fn list_statements_in_context(&self, context: &Node) -> Result<StatementIterator> {
        self.parent.list_statements_in_context(context)
    }

    fn list_contexts(&self) -> Result<NodeIterator> {
        self.parent.list_contexts()
    }

    fn execute_query(&self, query: &str, language: &QueryLanguage) -> Result<QueryResultIterator> {
        self.parent.execute_query(query, language)
    }

    fn contains_statement(&self, statement: &Statement) -> Result<bool> {
        self.parent.contains_statement(statement)
    }

    fn contains_any_statement(&self, partial: &Statement) -> Result<bool> {
        self.parent.contains_any_statement(partial)
    }

    fn contains_context(&self, context: &Node) -> Result<bool> {
        self.parent.contains_context(context)
    }

    fn remove_context(&self, context: &Node) -> Result<()> {
        self.parent.remove_context(context)
    }

    fn statement_count(&self) -> Result<usize> {
        self.parent.statement_count()
    }

    fn is_empty(&self) -> Result<bool> {
        self.parent.is_empty()
    }

    fn create_blank_node(&self) -> Result<Node> {
        self.parent.create_blank_node()
    }

    fn last_error(&self) -> Option<Error> {
        self.parent.last_error()
    }
}
