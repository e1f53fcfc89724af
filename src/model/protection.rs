//! Serialising decorator for models shared between threads

use super::registry::{Lease, LockCoupling, LockMode};
use super::{FilterModel, Model, QueryLanguage};
use crate::error::{Error, ErrorCache, Result};
use crate::iterator::{LeasedBackend, NodeIterator, QueryResultIterator, StatementIterator};
use crate::rdf::{Node, Statement};
use std::sync::Arc;
use tracing::trace;

/// How [`MultiCallProtectionModel`] locks its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtectionMode {
    /// Every call takes the write lock
    Exclusive,
    /// Reads share the lock per thread, writes take it exclusively
    #[default]
    ReadWrite,
}

/// Wraps a model that must not see concurrent calls.
///
/// Calls returning an iterator keep the lock until that iterator is closed
/// or dropped. In `Exclusive` mode this means a thread must close its
/// iterator before it calls the model again.
pub struct MultiCallProtectionModel {
    base: FilterModel,
    mode: ProtectionMode,
    coupling: Arc<LockCoupling>,
    errors: ErrorCache,
}

impl MultiCallProtectionModel {
    pub fn new(parent: Arc<dyn Model>, mode: ProtectionMode) -> Self {
        Self {
            base: FilterModel::new(parent),
            mode,
            coupling: LockCoupling::new(),
            errors: ErrorCache::new(),
        }
    }

    pub fn mode(&self) -> ProtectionMode {
        self.mode
    }

    pub fn parent(&self) -> &Arc<dyn Model> {
        self.base.parent()
    }

    pub fn open_iterators(&self) -> usize {
        self.coupling.open_iterators()
    }

    fn read_mode(&self) -> LockMode {
        match self.mode {
            ProtectionMode::Exclusive => LockMode::Write,
            ProtectionMode::ReadWrite => LockMode::Read,
        }
    }

    fn read<T>(&self, call: impl FnOnce(&FilterModel) -> Result<T>) -> Result<T> {
        let result = match self.mode {
            ProtectionMode::Exclusive => {
                let _guard = self.coupling.write();
                call(&self.base)
            }
            ProtectionMode::ReadWrite => {
                let _guard = self.coupling.read();
                call(&self.base)
            }
        };
        self.errors.track(result)
    }

    fn write<T>(&self, call: impl FnOnce(&FilterModel) -> Result<T>) -> Result<T> {
        let _guard = self.coupling.write();
        self.errors.track(call(&self.base))
    }

    /// Run an iterator-returning call, handing the lock over to the
    /// iterator on success
    fn leased<I>(
        &self,
        call: impl FnOnce(&FilterModel) -> Result<I>,
        wrap: impl FnOnce(I, Arc<Lease>) -> I,
    ) -> Result<I> {
        let lease = self.coupling.acquire(self.read_mode());
        match call(&self.base) {
            Ok(it) => {
                trace!(lease = lease.id(), "protected iterator opened");
                self.errors.track(Ok(wrap(it, lease)))
            }
            Err(e) => {
                lease.close();
                self.errors.track(Err(e))
            }
        }
    }
}

impl Drop for MultiCallProtectionModel {
    fn drop(&mut self) {
        self.coupling.close_all();
    }
}

impl std::fmt::Debug for MultiCallProtectionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiCallProtectionModel")
            .field("mode", &self.mode)
            .field("open_iterators", &self.open_iterators())
            .finish()
    }
}

impl Model for MultiCallProtectionModel {
    fn add_statement(&self, statement: &Statement) -> Result<()> {
        self.write(|m| m.add_statement(statement))
    }

    fn add_statements(&self, statements: &[Statement]) -> Result<()> {
        self.write(|m| m.add_statements(statements))
    }

    fn remove_statement(&self, statement: &Statement) -> Result<()> {
        self.write(|m| m.remove_statement(statement))
    }

    fn remove_all_statements(&self, partial: &Statement) -> Result<()> {
        self.write(|m| m.remove_all_statements(partial))
    }

    fn remove_context(&self, context: &Node) -> Result<()> {
        self.write(|m| m.remove_context(context))
    }

    fn list_statements(&self, partial: &Statement) -> Result<StatementIterator> {
        self.leased(
            |m| m.list_statements(partial),
            |it, lease| StatementIterator::new(LeasedBackend::new(it, lease)),
        )
    }

    fn list_contexts(&self) -> Result<NodeIterator> {
        self.leased(
            |m| m.list_contexts(),
            |it, lease| NodeIterator::new(LeasedBackend::new(it, lease)),
        )
    }

    fn execute_query(&self, query: &str, language: &QueryLanguage) -> Result<QueryResultIterator> {
        self.leased(
            |m| m.execute_query(query, language),
            |it, lease| QueryResultIterator::new(LeasedBackend::new(it, lease)),
        )
    }

    fn contains_statement(&self, statement: &Statement) -> Result<bool> {
        self.read(|m| m.contains_statement(statement))
    }

    fn contains_any_statement(&self, partial: &Statement) -> Result<bool> {
        self.read(|m| m.contains_any_statement(partial))
    }

    fn contains_context(&self, context: &Node) -> Result<bool> {
        self.read(|m| m.contains_context(context))
    }

    fn statement_count(&self) -> Result<usize> {
        self.read(|m| m.statement_count())
    }

    fn is_empty(&self) -> Result<bool> {
        self.read(|m| m.is_empty())
    }

    fn create_blank_node(&self) -> Result<Node> {
        self.write(|m| m.create_blank_node())
    }

    fn last_error(&self) -> Option<Error> {
        self.errors.last_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryModel;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn filled() -> Arc<MemoryModel> {
        let model = Arc::new(MemoryModel::new());
        for i in 0..3 {
            model
                .add_statement(&Statement::new(
                    Node::resource(&format!("urn:s{}", i)).unwrap(),
                    Node::resource("urn:p").unwrap(),
                    Node::literal("x"),
                ))
                .unwrap();
        }
        model
    }

    #[test]
    fn test_iterator_holds_protection_lock() {
        let model = Arc::new(MultiCallProtectionModel::new(filled(), ProtectionMode::ReadWrite));
        let mut it = model.list_statements(&Statement::any()).unwrap();
        assert_eq!(model.open_iterators(), 1);

        let (tx, rx) = mpsc::channel();
        let writer = {
            let model = model.clone();
            thread::spawn(move || {
                model.remove_all_statements(&Statement::any()).unwrap();
                tx.send(()).unwrap();
            })
        };
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(it.all_statements().len(), 3);
        it.close();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        writer.join().unwrap();
        assert!(model.is_empty().unwrap());
    }

    #[test]
    fn test_failed_call_releases_lock() {
        let model = MultiCallProtectionModel::new(filled(), ProtectionMode::Exclusive);
        assert!(model.execute_query("SELECT", &QueryLanguage::Sql).is_err());
        assert_eq!(model.open_iterators(), 0);
        assert!(model.last_error().is_some());
        // would block forever if the failed call kept the write lock
        assert_eq!(model.statement_count().unwrap(), 3);
        assert!(model.last_error().is_none());
    }

    #[test]
    fn test_read_write_mode_allows_nested_reads() {
        let model = MultiCallProtectionModel::new(filled(), ProtectionMode::ReadWrite);
        let mut outer = model.list_statements(&Statement::any()).unwrap();
        let mut seen = 0;
        while outer.next() {
            let subject = outer.current().subject;
            assert!(model
                .contains_any_statement(&Statement::new(subject, Node::Empty, Node::Empty))
                .unwrap());
            seen += 1;
        }
        assert_eq!(seen, 3);
    }
}
