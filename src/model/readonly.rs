//! Read-only decorator

use super::{FilterModel, Model, QueryLanguage};
use crate::error::{Error, ErrorCache, Result};
use crate::iterator::{NodeIterator, QueryResultIterator, StatementIterator};
use crate::rdf::{Node, Statement};
use std::sync::Arc;
use tracing::debug;

/// Forwards reads and rejects every write with `PermissionDenied`
#[derive(Debug)]
pub struct ReadOnlyModel {
    base: FilterModel,
    errors: ErrorCache,
}

impl ReadOnlyModel {
    pub fn new(parent: Arc<dyn Model>) -> Self {
        Self {
            base: FilterModel::new(parent),
            errors: ErrorCache::new(),
        }
    }

    pub fn parent(&self) -> &Arc<dyn Model> {
        self.base.parent()
    }

    fn deny<T>(&self, operation: &str) -> Result<T> {
        debug!(operation, "write rejected by read-only model");
        self.errors
            .track(Err(Error::permission_denied(format!("{} is not allowed on a read-only model", operation))))
    }

    fn read<T>(&self, result: Result<T>) -> Result<T> {
        self.errors.track(result)
    }
}

impl Model for ReadOnlyModel {
    fn add_statement(&self, _statement: &Statement) -> Result<()> {
        self.deny("adding statements")
    }

    fn add_statements(&self, _statements: &[Statement]) -> Result<()> {
        self.deny("adding statements")
    }

    fn remove_statement(&self, _statement: &Statement) -> Result<()> {
        self.deny("removing statements")
    }

    fn remove_all_statements(&self, _partial: &Statement) -> Result<()> {
        self.deny("removing statements")
    }

    fn remove_context(&self, _context: &Node) -> Result<()> {
        self.deny("removing contexts")
    }

    fn list_statements(&self, partial: &Statement) -> Result<StatementIterator> {
        self.read(self.base.list_statements(partial))
    }

    fn list_contexts(&self) -> Result<NodeIterator> {
        self.read(self.base.list_contexts())
    }

    fn execute_query(&self, query: &str, language: &QueryLanguage) -> Result<QueryResultIterator> {
        self.read(self.base.execute_query(query, language))
    }

    fn contains_statement(&self, statement: &Statement) -> Result<bool> {
        self.read(self.base.contains_statement(statement))
    }

    fn contains_any_statement(&self, partial: &Statement) -> Result<bool> {
        self.read(self.base.contains_any_statement(partial))
    }

    fn contains_context(&self, context: &Node) -> Result<bool> {
        self.read(self.base.contains_context(context))
    }

    fn statement_count(&self) -> Result<usize> {
        self.read(self.base.statement_count())
    }

    fn is_empty(&self) -> Result<bool> {
        self.read(self.base.is_empty())
    }

    fn create_blank_node(&self) -> Result<Node> {
        self.read(self.base.create_blank_node())
    }

    fn last_error(&self) -> Option<Error> {
        self.errors.last_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryModel;
    use crate::ErrorCode;

    #[test]
    fn test_writes_are_denied() {
        let memory = Arc::new(MemoryModel::new());
        let st = Statement::new(
            Node::resource("urn:a").unwrap(),
            Node::resource("urn:p").unwrap(),
            Node::literal("x"),
        );
        memory.add_statement(&st).unwrap();
        let model = ReadOnlyModel::new(memory.clone());

        let err = model.add_statement(&st).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert_eq!(model.last_error().map(|e| e.code()), Some(ErrorCode::PermissionDenied));
        assert_eq!(
            model.remove_all_statements(&Statement::any()).unwrap_err().code(),
            ErrorCode::PermissionDenied
        );
        assert_eq!(memory.statement_count().unwrap(), 1);

        assert!(model.contains_statement(&st).unwrap());
        assert!(model.last_error().is_none());
        assert_eq!(model.list_statements(&Statement::any()).unwrap().all_statements(), vec![st]);
    }
}
