//! Model decorator that keeps a text index in step with its parent

use super::{QueryHitWrapperBackend, TextIndex};
use crate::error::{Error, ErrorCache, Result};
use crate::iterator::{NodeIterator, QueryResultIterator, StatementIterator};
use crate::model::{FilterModel, Model, QueryLanguage};
use crate::rdf::{Node, Statement};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Query language answered from the index
pub const TEXT_QUERY_LANGUAGE: &str = "text";

/// Indexes literal objects on add, unindexes them on remove, and answers
/// `QueryLanguage::User("text")` queries from the index. Everything else
/// goes to the parent model.
pub struct IndexFilterModel {
    base: FilterModel,
    index: Arc<RwLock<TextIndex>>,
    errors: ErrorCache,
}

impl IndexFilterModel {
    pub fn new(parent: Arc<dyn Model>) -> Self {
        Self::with_index(parent, Arc::new(RwLock::new(TextIndex::new())))
    }

    /// Share an index with other models
    pub fn with_index(parent: Arc<dyn Model>, index: Arc<RwLock<TextIndex>>) -> Self {
        Self {
            base: FilterModel::new(parent),
            index,
            errors: ErrorCache::new(),
        }
    }

    pub fn index(&self) -> &Arc<RwLock<TextIndex>> {
        &self.index
    }

    /// Index every literal statement the parent already holds
    pub fn rebuild(&self) -> Result<usize> {
        let statements = {
            let mut it = self.base.list_statements(&Statement::any())?;
            let statements = it.all_statements();
            let error = it.last_error();
            it.close();
            if let Some(e) = error {
                return self.errors.track(Err(e));
            }
            statements
        };
        let mut index = self.index.write();
        index.clear();
        let indexed = statements.iter().filter(|s| index.insert(s)).count();
        debug!(indexed, "text index rebuilt");
        self.errors.track(Ok(indexed))
    }

    fn do_remove(&self, statement: &Statement) -> Result<()> {
        // only unindex what was really there, tokens are counted
        if self.base.contains_statement(statement)? {
            self.base.remove_statement(statement)?;
            self.index.write().remove(statement);
        }
        Ok(())
    }

    fn do_remove_all(&self, partial: &Statement) -> Result<()> {
        // the parent does not report what it removed, so collect first
        let mut it = self.base.list_statements(partial)?;
        let matches = it.all_statements();
        it.close();
        self.base.remove_all_statements(partial)?;
        let mut index = self.index.write();
        for statement in &matches {
            index.remove(statement);
        }
        Ok(())
    }
}

impl std::fmt::Debug for IndexFilterModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexFilterModel")
            .field("tokens", &self.index.read().len())
            .finish()
    }
}

impl Model for IndexFilterModel {
    fn add_statement(&self, statement: &Statement) -> Result<()> {
        let result = self.base.add_statement(statement).map(|()| {
            self.index.write().insert(statement);
        });
        self.errors.track(result)
    }

    fn add_statements(&self, statements: &[Statement]) -> Result<()> {
        for statement in statements {
            self.add_statement(statement)?;
        }
        Ok(())
    }

    fn remove_statement(&self, statement: &Statement) -> Result<()> {
        self.errors.track(self.do_remove(statement))
    }

    fn remove_all_statements(&self, partial: &Statement) -> Result<()> {
        self.errors.track(self.do_remove_all(partial))
    }

    fn list_statements(&self, partial: &Statement) -> Result<StatementIterator> {
        self.errors.track(self.base.list_statements(partial))
    }

    fn list_contexts(&self) -> Result<NodeIterator> {
        self.errors.track(self.base.list_contexts())
    }

    fn execute_query(&self, query: &str, language: &QueryLanguage) -> Result<QueryResultIterator> {
        match language {
            QueryLanguage::User(name) if name.eq_ignore_ascii_case(TEXT_QUERY_LANGUAGE) => {
                let hits = self.index.read().search(query);
                debug!(%query, "text query");
                self.errors
                    .track(Ok(QueryResultIterator::new(QueryHitWrapperBackend::new(hits))))
            }
            _ => self.errors.track(self.base.execute_query(query, language)),
        }
    }

    fn contains_statement(&self, statement: &Statement) -> Result<bool> {
        self.errors.track(self.base.contains_statement(statement))
    }

    fn contains_any_statement(&self, partial: &Statement) -> Result<bool> {
        self.errors.track(self.base.contains_any_statement(partial))
    }

    fn statement_count(&self) -> Result<usize> {
        self.errors.track(self.base.statement_count())
    }

    fn create_blank_node(&self) -> Result<Node> {
        self.errors.track(self.base.create_blank_node())
    }

    fn last_error(&self) -> Option<Error> {
        self.errors.last_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryModel;

    fn res(iri: &str) -> Node {
        Node::resource(iri).unwrap()
    }

    #[test]
    fn test_text_query_tracks_writes() {
        let model = IndexFilterModel::new(Arc::new(MemoryModel::new()));
        let label = Statement::new(res("urn:a"), res("urn:label"), Node::literal("graph database"));
        model.add_statement(&label).unwrap();
        model
            .add_statement(&Statement::new(res("urn:b"), res("urn:label"), Node::literal("database")))
            .unwrap();

        let text = QueryLanguage::User("text".to_string());
        let hits = model.execute_query("graph", &text).unwrap().all_bindings();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].value("resource"), res("urn:a"));

        model.remove_all_statements(&Statement::new(res("urn:a"), Node::Empty, Node::Empty)).unwrap();
        assert!(model.execute_query("graph", &text).unwrap().all_bindings().is_empty());
        assert_eq!(model.execute_query("database", &text).unwrap().all_bindings().len(), 1);
    }

    #[test]
    fn test_other_languages_reach_parent() {
        let parent = Arc::new(MemoryModel::new());
        parent
            .add_statement(&Statement::new(res("urn:a"), res("urn:label"), Node::literal("existing")))
            .unwrap();
        let model = IndexFilterModel::new(parent);
        assert_eq!(model.rebuild().unwrap(), 1);
        let rows = model
            .execute_query("SELECT ?s WHERE { ?s ?p ?o }", &QueryLanguage::Sparql)
            .unwrap()
            .all_bindings();
        assert_eq!(rows.len(), 1);
        let hits = model
            .execute_query("existing", &QueryLanguage::User("TEXT".to_string()))
            .unwrap()
            .all_bindings();
        assert_eq!(hits.len(), 1);
    }
}
