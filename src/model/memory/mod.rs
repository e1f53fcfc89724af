//! In-process storage model

mod store;

pub use store::{QuadStore, Scan};

use super::registry::{LockCoupling, LockMode};
use super::{Model, QueryLanguage};
use crate::error::{Error, ErrorCache, Result};
use crate::iterator::{
    IteratorBackend, LeasedBackend, NodeIterator, QueryResultIterator, StatementIterator,
};
use crate::rdf::{BlankNode, Node, Statement};
use crate::sparql;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Model over an in-memory [`QuadStore`].
///
/// Iterators returned by this model hold its read lock until they are
/// closed or dropped, see [the module docs](crate::model).
pub struct MemoryModel {
    store: Arc<RwLock<QuadStore>>,
    coupling: Arc<LockCoupling>,
    errors: ErrorCache,
}

impl MemoryModel {
    pub fn new() -> Self {
        debug!("memory model created");
        Self {
            store: Arc::new(RwLock::new(QuadStore::new())),
            coupling: LockCoupling::new(),
            errors: ErrorCache::new(),
        }
    }

    /// Number of iterators currently holding the lock
    pub fn open_iterators(&self) -> usize {
        self.coupling.open_iterators()
    }

    /// Lock state, mostly useful for diagnostics and tests
    pub fn coupling(&self) -> &Arc<LockCoupling> {
        &self.coupling
    }

    fn do_add(&self, statement: &Statement) -> Result<()> {
        if !statement.is_valid() {
            return Err(Error::invalid_argument(format!("cannot add invalid statement {}", statement)));
        }
        let _guard = self.coupling.write();
        if self.store.write().insert(statement.clone()) {
            debug!(%statement, "statement added");
        }
        Ok(())
    }

    fn do_remove(&self, statement: &Statement) -> Result<()> {
        if !statement.is_valid() {
            return Err(Error::invalid_argument(format!("cannot remove invalid statement {}", statement)));
        }
        let _guard = self.coupling.write();
        self.store.write().remove(statement);
        Ok(())
    }

    fn do_remove_all(&self, partial: &Statement) -> Result<()> {
        if partial.is_valid() {
            return self.do_remove(partial);
        }
        if partial.is_context_only() {
            let _guard = self.coupling.write();
            let removed = self.store.write().remove_context(&partial.context);
            debug!(removed, context = %partial.context, "context removed");
            return Ok(());
        }
        // collect under the read lock first, the iterator must be gone
        // before the write lock can be taken
        let mut it = self.do_list(partial);
        let matches = it.all_statements();
        it.close();
        let _guard = self.coupling.write();
        let mut store = self.store.write();
        for statement in &matches {
            store.remove(statement);
        }
        debug!(removed = matches.len(), "statements removed");
        Ok(())
    }

    fn do_list(&self, partial: &Statement) -> StatementIterator {
        let lease = self.coupling.acquire(LockMode::Read);
        let scan = self.store.read().plan(partial);
        let cursor = StatementCursor {
            store: Arc::clone(&self.store),
            scan,
            pattern: partial.clone(),
            position: 0,
            current: None,
            done: false,
        };
        StatementIterator::new(LeasedBackend::new(cursor, lease))
    }

    fn do_query(&self, query: &str, language: &QueryLanguage) -> Result<QueryResultIterator> {
        if *language != QueryLanguage::Sparql {
            return Err(Error::not_supported(format!("unsupported query language {}", language)));
        }
        let lease = self.coupling.acquire(LockMode::Read);
        let evaluated = sparql::execute(query, &*self.store.read());
        match evaluated {
            Ok(result) => Ok(QueryResultIterator::new(LeasedBackend::new(result, lease))),
            Err(e) => {
                lease.close();
                Err(e)
            }
        }
    }
}

impl Default for MemoryModel {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryModel {
    fn drop(&mut self) {
        self.coupling.close_all();
    }
}

impl Model for MemoryModel {
    fn add_statement(&self, statement: &Statement) -> Result<()> {
        self.errors.track(self.do_add(statement))
    }

    fn remove_statement(&self, statement: &Statement) -> Result<()> {
        self.errors.track(self.do_remove(statement))
    }

    fn remove_all_statements(&self, partial: &Statement) -> Result<()> {
        self.errors.track(self.do_remove_all(partial))
    }

    fn list_statements(&self, partial: &Statement) -> Result<StatementIterator> {
        self.errors.track(Ok(self.do_list(partial)))
    }

    fn list_contexts(&self) -> Result<NodeIterator> {
        let lease = self.coupling.acquire(LockMode::Read);
        let cursor = ContextCursor {
            store: Arc::clone(&self.store),
            position: 0,
            current: Node::Empty,
            done: false,
        };
        self.errors.track(Ok(NodeIterator::new(LeasedBackend::new(cursor, lease))))
    }

    fn execute_query(&self, query: &str, language: &QueryLanguage) -> Result<QueryResultIterator> {
        self.errors.track(self.do_query(query, language))
    }

    fn contains_statement(&self, statement: &Statement) -> Result<bool> {
        if !statement.is_valid() {
            return self.errors.track(Err(Error::invalid_argument("cannot check an invalid statement")));
        }
        let _guard = self.coupling.read();
        let found = self.store.read().contains(statement);
        self.errors.track(Ok(found))
    }

    fn contains_any_statement(&self, partial: &Statement) -> Result<bool> {
        let mut it = self.do_list(partial);
        let found = it.next();
        it.close();
        self.errors.track(Ok(found))
    }

    fn statement_count(&self) -> Result<usize> {
        let _guard = self.coupling.read();
        let count = self.store.read().len();
        self.errors.track(Ok(count))
    }

    fn create_blank_node(&self) -> Result<Node> {
        let id = format!("b{}", Uuid::new_v4().simple());
        self.errors.track(Ok(Node::Blank(BlankNode::new_unchecked(id))))
    }

    fn last_error(&self) -> Option<Error> {
        self.errors.last_error()
    }
}

/// Position cursor over one scan of the store
struct StatementCursor {
    store: Arc<RwLock<QuadStore>>,
    scan: Scan,
    pattern: Statement,
    position: usize,
    current: Option<Statement>,
    done: bool,
}

impl IteratorBackend<Statement> for StatementCursor {
    fn next(&mut self) -> bool {
        if self.done {
            return false;
        }
        let store = self.store.read();
        while let Some(statement) = store.scan_get(&self.scan, self.position) {
            self.position += 1;
            if statement.matches(&self.pattern) {
                self.current = Some(statement.clone());
                return true;
            }
        }
        self.done = true;
        self.current = None;
        false
    }

    fn current(&self) -> Statement {
        self.current.clone().unwrap_or_default()
    }

    fn close(&mut self) {
        self.done = true;
        self.current = None;
    }
}

/// Cursor over the named graphs in first-use order
struct ContextCursor {
    store: Arc<RwLock<QuadStore>>,
    position: usize,
    current: Node,
    done: bool,
}

impl IteratorBackend<Node> for ContextCursor {
    fn next(&mut self) -> bool {
        if self.done {
            return false;
        }
        match self.store.read().context_at(self.position) {
            Some(context) => {
                self.current = context.clone();
                self.position += 1;
                true
            }
            None => {
                self.done = true;
                self.current = Node::Empty;
                false
            }
        }
    }

    fn current(&self) -> Node {
        self.current.clone()
    }

    fn close(&mut self) {
        self.done = true;
        self.current = Node::Empty;
    }
}

impl std::fmt::Debug for MemoryModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryModel")
            .field("statements", &self.store.read().len())
            .field("open_iterators", &self.open_iterators())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(iri: &str) -> Node {
        Node::resource(iri).unwrap()
    }

    fn populated() -> MemoryModel {
        let model = MemoryModel::new();
        model
            .add_statements(&[
                Statement::new(res("urn:a"), res("urn:p"), res("urn:b")),
                Statement::new(res("urn:a"), res("urn:p"), res("urn:c")),
                Statement::new(res("urn:x"), res("urn:q"), Node::literal("lit")).with_context(res("urn:g")),
            ])
            .unwrap();
        model
    }

    #[test]
    fn test_iterator_holds_read_lock_until_closed() {
        let model = populated();
        let mut it = model.list_statements(&Statement::any()).unwrap();
        assert_eq!(model.open_iterators(), 1);
        assert!(model.coupling().lock().is_locked());
        assert!(it.next());
        it.close();
        assert_eq!(model.open_iterators(), 0);
        assert!(!model.coupling().lock().is_locked());
    }

    #[test]
    fn test_nested_listing_on_one_thread() {
        let model = populated();
        let mut outer = model.list_statements(&Statement::any()).unwrap();
        let mut count = 0;
        while outer.next() {
            let subject = outer.current().subject;
            let inner = model
                .list_statements(&Statement::new(subject, Node::Empty, Node::Empty))
                .unwrap();
            count += inner.all_statements().len();
        }
        assert_eq!(count, 5);
        outer.close();
        assert!(!model.coupling().lock().is_locked());
    }

    #[test]
    fn test_remove_all_partial_and_context() {
        let model = populated();
        model
            .remove_all_statements(&Statement::new(res("urn:a"), Node::Empty, Node::Empty))
            .unwrap();
        assert_eq!(model.statement_count().unwrap(), 1);
        model.remove_context(&res("urn:g")).unwrap();
        assert!(model.is_empty().unwrap());
    }

    #[test]
    fn test_invalid_add_records_error() {
        let model = MemoryModel::new();
        let bad = Statement::new(Node::literal("s"), res("urn:p"), res("urn:o"));
        assert!(model.add_statement(&bad).is_err());
        assert_eq!(model.last_error().map(|e| e.code()), Some(crate::ErrorCode::InvalidArgument));
        assert!(model.statement_count().is_ok());
        assert!(model.last_error().is_none());
    }

    #[test]
    fn test_list_contexts() {
        let model = populated();
        let contexts = model.list_contexts().unwrap().all_nodes();
        assert_eq!(contexts, vec![res("urn:g")]);
        assert!(model.contains_context(&res("urn:g")).unwrap());
    }

    #[test]
    fn test_blank_nodes_are_unique() {
        let model = MemoryModel::new();
        let a = model.create_blank_node().unwrap();
        let b = model.create_blank_node().unwrap();
        assert!(a.is_blank());
        assert_ne!(a, b);
    }

    #[test]
    fn test_drop_model_with_open_iterator() {
        let model = populated();
        let mut it = model.list_statements(&Statement::any()).unwrap();
        assert!(it.next());
        drop(model);
        assert!(!it.next());
        assert_eq!(it.current(), Statement::default());
    }
}
