//! Async facade over a blocking model
//!
//! Every call is sent to one dedicated worker thread that owns all
//! iterators opened through this facade. Because the iterators never leave
//! that thread, the model's thread-affine read lock stays consistent no
//! matter which tokio worker polls the futures.
//!
//! While any iterator is open the worker cannot take the write lock without
//! deadlocking itself, so writes are queued and run once the last iterator
//! is closed. Reads and iterator commands run immediately. Awaiting a write
//! while holding an open iterator on the same facade therefore waits until
//! that iterator is closed or dropped.

use super::{Model, QueryLanguage};
use crate::error::{Error, ErrorCache, Result};
use crate::iterator::{NodeIterator, QueryResultIterator, ResultShape, StatementIterator};
use crate::rdf::{BindingSet, Node, Statement};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

type Reply<T> = oneshot::Sender<Result<T>>;

/// One row of a query result as seen by the async side
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultRow {
    pub bindings: BindingSet,
    pub statement: Statement,
}

/// Reply to a query: the iterator id and everything known before the
/// first row
#[derive(Debug)]
struct QueryOpened {
    id: u64,
    shape: ResultShape,
    names: Vec<String>,
    bool_value: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WorkerStatus {
    open_iterators: usize,
    queued_writes: usize,
}

enum WriteOp {
    Add(Vec<Statement>),
    Remove(Statement),
    RemoveAll(Statement),
    RemoveContext(Node),
}

enum Command {
    Write(WriteOp, Reply<()>),
    List(Statement, Reply<u64>),
    ListContexts(Reply<u64>),
    Query(String, QueryLanguage, Reply<QueryOpened>),
    ContainsStatement(Statement, Reply<bool>),
    ContainsAny(Statement, Reply<bool>),
    ContainsContext(Node, Reply<bool>),
    StatementCount(Reply<usize>),
    IsEmpty(Reply<bool>),
    CreateBlankNode(Reply<Node>),
    NextStatement(u64, Reply<Option<Statement>>),
    NextNode(u64, Reply<Option<Node>>),
    NextRow(u64, Reply<Option<ResultRow>>),
    Close(u64),
    Status(oneshot::Sender<WorkerStatus>),
}

enum OpenIterator {
    Statements(StatementIterator),
    Nodes(NodeIterator),
    Results(QueryResultIterator),
}

impl OpenIterator {
    fn close(&mut self) {
        match self {
            OpenIterator::Statements(it) => it.close(),
            OpenIterator::Nodes(it) => it.close(),
            OpenIterator::Results(it) => it.close(),
        }
    }
}

fn finish<T>(advanced: bool, element: impl FnOnce() -> T, error: Option<Error>) -> Result<Option<T>> {
    match (advanced, error) {
        (true, _) => Ok(Some(element())),
        (false, Some(e)) => Err(e),
        (false, None) => Ok(None),
    }
}

struct Worker {
    model: Arc<dyn Model>,
    iterators: HashMap<u64, OpenIterator>,
    next_id: u64,
    deferred: VecDeque<(WriteOp, Reply<()>)>,
}

impl Worker {
    fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!("async model worker started");
        while let Some(command) = commands.blocking_recv() {
            self.handle(command);
            if self.iterators.is_empty() {
                self.flush_writes();
            }
        }
        for (_, mut it) in self.iterators.drain() {
            it.close();
        }
        self.flush_writes();
        debug!("async model worker stopped");
    }

    fn register(&mut self, it: OpenIterator) -> u64 {
        self.next_id += 1;
        self.iterators.insert(self.next_id, it);
        trace!(id = self.next_id, open = self.iterators.len(), "iterator registered");
        self.next_id
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Write(op, reply) => {
                if self.iterators.is_empty() {
                    let _ = reply.send(self.apply(op));
                } else {
                    trace!(open = self.iterators.len(), "write queued behind open iterators");
                    self.deferred.push_back((op, reply));
                }
            }
            Command::List(partial, reply) => {
                let opened = self
                    .model
                    .list_statements(&partial)
                    .map(|it| self.register(OpenIterator::Statements(it)));
                let _ = reply.send(opened);
            }
            Command::ListContexts(reply) => {
                let opened = self
                    .model
                    .list_contexts()
                    .map(|it| self.register(OpenIterator::Nodes(it)));
                let _ = reply.send(opened);
            }
            Command::Query(query, language, reply) => {
                let opened = self.model.execute_query(&query, &language).map(|it| {
                    let shape = it.shape().unwrap_or(ResultShape::Bindings);
                    let names = it.binding_names();
                    let bool_value = it.bool_value();
                    let id = self.register(OpenIterator::Results(it));
                    QueryOpened {
                        id,
                        shape,
                        names,
                        bool_value,
                    }
                });
                let _ = reply.send(opened);
            }
            Command::ContainsStatement(statement, reply) => {
                let _ = reply.send(self.model.contains_statement(&statement));
            }
            Command::ContainsAny(partial, reply) => {
                let _ = reply.send(self.model.contains_any_statement(&partial));
            }
            Command::ContainsContext(context, reply) => {
                let _ = reply.send(self.model.contains_context(&context));
            }
            Command::StatementCount(reply) => {
                let _ = reply.send(self.model.statement_count());
            }
            Command::IsEmpty(reply) => {
                let _ = reply.send(self.model.is_empty());
            }
            Command::CreateBlankNode(reply) => {
                let _ = reply.send(self.model.create_blank_node());
            }
            Command::NextStatement(id, reply) => {
                let outcome = match self.iterators.get_mut(&id) {
                    Some(OpenIterator::Statements(it)) => {
                        let advanced = it.next();
                        finish(advanced, || it.current(), it.last_error())
                    }
                    other => Err(wrong_iterator(id, other.is_some(), "statement")),
                };
                let _ = reply.send(outcome);
            }
            Command::NextNode(id, reply) => {
                let outcome = match self.iterators.get_mut(&id) {
                    Some(OpenIterator::Nodes(it)) => {
                        let advanced = it.next();
                        finish(advanced, || it.current(), it.last_error())
                    }
                    other => Err(wrong_iterator(id, other.is_some(), "node")),
                };
                let _ = reply.send(outcome);
            }
            Command::NextRow(id, reply) => {
                let outcome = match self.iterators.get_mut(&id) {
                    Some(OpenIterator::Results(it)) => {
                        let advanced = it.next();
                        let row = || ResultRow {
                            bindings: it.current_bindings(),
                            statement: it.current_statement(),
                        };
                        finish(advanced, row, it.last_error())
                    }
                    other => Err(wrong_iterator(id, other.is_some(), "query result")),
                };
                let _ = reply.send(outcome);
            }
            Command::Close(id) => {
                if let Some(mut it) = self.iterators.remove(&id) {
                    it.close();
                    trace!(id, open = self.iterators.len(), "iterator closed");
                }
            }
            Command::Status(reply) => {
                let _ = reply.send(WorkerStatus {
                    open_iterators: self.iterators.len(),
                    queued_writes: self.deferred.len(),
                });
            }
        }
    }

    fn apply(&self, op: WriteOp) -> Result<()> {
        match op {
            WriteOp::Add(statements) => self.model.add_statements(&statements),
            WriteOp::Remove(statement) => self.model.remove_statement(&statement),
            WriteOp::RemoveAll(partial) => self.model.remove_all_statements(&partial),
            WriteOp::RemoveContext(context) => self.model.remove_context(&context),
        }
    }

    fn flush_writes(&mut self) {
        if !self.deferred.is_empty() {
            debug!(count = self.deferred.len(), "running queued writes");
        }
        while let Some((op, reply)) = self.deferred.pop_front() {
            let _ = reply.send(self.apply(op));
        }
    }
}

fn wrong_iterator(id: u64, exists: bool, kind: &str) -> Error {
    if exists {
        Error::invalid_argument(format!("iterator {} is not a {} iterator", id, kind))
    } else {
        Error::invalid_argument(format!("unknown iterator {}", id))
    }
}

fn worker_gone() -> Error {
    Error::unknown("async model worker has stopped")
}

/// Async handle to a model running on its own worker thread.
///
/// Clones share the worker and the last-error slot.
#[derive(Clone)]
pub struct AsyncModel {
    commands: mpsc::UnboundedSender<Command>,
    errors: Arc<ErrorCache>,
}

impl AsyncModel {
    /// Start the worker thread for `model`
    pub fn new(model: Arc<dyn Model>) -> Result<Self> {
        let (commands, receiver) = mpsc::unbounded_channel();
        let worker = Worker {
            model,
            iterators: HashMap::new(),
            next_id: 0,
            deferred: VecDeque::new(),
        };
        thread::Builder::new()
            .name("triplegate-model".to_string())
            .spawn(move || worker.run(receiver))?;
        Ok(Self {
            commands,
            errors: Arc::new(ErrorCache::new()),
        })
    }

    async fn call<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(command(reply)).is_err() {
            return self.errors.track(Err(worker_gone()));
        }
        let result = response.await.unwrap_or_else(|_| Err(worker_gone()));
        self.errors.track(result)
    }

    async fn write(&self, op: WriteOp) -> Result<()> {
        self.call(|reply| Command::Write(op, reply)).await
    }

    pub async fn add_statement(&self, statement: &Statement) -> Result<()> {
        self.add_statements(std::slice::from_ref(statement)).await
    }

    pub async fn add_statements(&self, statements: &[Statement]) -> Result<()> {
        self.write(WriteOp::Add(statements.to_vec())).await
    }

    pub async fn remove_statement(&self, statement: &Statement) -> Result<()> {
        self.write(WriteOp::Remove(statement.clone())).await
    }

    pub async fn remove_all_statements(&self, partial: &Statement) -> Result<()> {
        self.write(WriteOp::RemoveAll(partial.clone())).await
    }

    pub async fn remove_context(&self, context: &Node) -> Result<()> {
        self.write(WriteOp::RemoveContext(context.clone())).await
    }

    pub async fn list_statements(&self, partial: &Statement) -> Result<AsyncStatementIterator> {
        let id = self.call(|reply| Command::List(partial.clone(), reply)).await?;
        Ok(AsyncIterator::new(id, self.commands.clone(), Command::NextStatement))
    }

    pub async fn list_contexts(&self) -> Result<AsyncNodeIterator> {
        let id = self.call(Command::ListContexts).await?;
        Ok(AsyncIterator::new(id, self.commands.clone(), Command::NextNode))
    }

    pub async fn execute_query(&self, query: &str, language: &QueryLanguage) -> Result<AsyncQueryResultIterator> {
        let opened = self
            .call(|reply| Command::Query(query.to_string(), language.clone(), reply))
            .await?;
        Ok(AsyncQueryResultIterator {
            rows: AsyncIterator::new(opened.id, self.commands.clone(), Command::NextRow),
            shape: opened.shape,
            names: opened.names,
            bool_value: opened.bool_value,
        })
    }

    pub async fn contains_statement(&self, statement: &Statement) -> Result<bool> {
        self.call(|reply| Command::ContainsStatement(statement.clone(), reply)).await
    }

    pub async fn contains_any_statement(&self, partial: &Statement) -> Result<bool> {
        self.call(|reply| Command::ContainsAny(partial.clone(), reply)).await
    }

    pub async fn contains_context(&self, context: &Node) -> Result<bool> {
        self.call(|reply| Command::ContainsContext(context.clone(), reply)).await
    }

    pub async fn statement_count(&self) -> Result<usize> {
        self.call(Command::StatementCount).await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        self.call(Command::IsEmpty).await
    }

    pub async fn create_blank_node(&self) -> Result<Node> {
        self.call(Command::CreateBlankNode).await
    }

    pub fn last_error(&self) -> Option<Error> {
        self.errors.last_error()
    }

    async fn status(&self) -> Result<WorkerStatus> {
        let (reply, response) = oneshot::channel();
        self.commands.send(Command::Status(reply)).map_err(|_| worker_gone())?;
        response.await.map_err(|_| worker_gone())
    }

    /// Iterators the worker currently holds open
    pub async fn open_iterators(&self) -> Result<usize> {
        Ok(self.status().await?.open_iterators)
    }

    /// Writes waiting for the open iterators to close
    pub async fn queued_writes(&self) -> Result<usize> {
        Ok(self.status().await?.queued_writes)
    }
}

impl std::fmt::Debug for AsyncModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncModel")
            .field("running", &!self.commands.is_closed())
            .finish()
    }
}

/// Iterator living on the worker thread. `next()` is a round trip;
/// `current()` reads the element cached by the last `next()`.
///
/// Dropping the handle closes the worker-side iterator.
pub struct AsyncIterator<T> {
    id: u64,
    commands: mpsc::UnboundedSender<Command>,
    fetch: fn(u64, Reply<Option<T>>) -> Command,
    current: T,
    error: Option<Error>,
    closed: bool,
}

pub type AsyncStatementIterator = AsyncIterator<Statement>;
pub type AsyncNodeIterator = AsyncIterator<Node>;

impl<T: Default> AsyncIterator<T> {
    fn new(id: u64, commands: mpsc::UnboundedSender<Command>, fetch: fn(u64, Reply<Option<T>>) -> Command) -> Self {
        Self {
            id,
            commands,
            fetch,
            current: T::default(),
            error: None,
            closed: false,
        }
    }

    /// Worker-side iterator id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn next(&mut self) -> bool {
        self.current = T::default();
        if self.closed {
            return false;
        }
        let (reply, response) = oneshot::channel();
        if self.commands.send((self.fetch)(self.id, reply)).is_err() {
            self.error = Some(worker_gone());
            self.closed = true;
            return false;
        }
        match response.await.unwrap_or_else(|_| Err(worker_gone())) {
            Ok(Some(element)) => {
                self.error = None;
                self.current = element;
                true
            }
            Ok(None) => false,
            Err(e) => {
                self.error = Some(e);
                false
            }
        }
    }

    pub fn current(&self) -> &T {
        &self.current
    }

    pub fn last_error(&self) -> Option<Error> {
        self.error.clone()
    }

    /// Drain the remaining elements
    pub async fn all_elements(&mut self) -> Vec<T>
    where
        T: Clone,
    {
        let mut elements = Vec::new();
        while self.next().await {
            elements.push(self.current.clone());
        }
        elements
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.current = T::default();
        if self.commands.send(Command::Close(self.id)).is_err() {
            warn!(id = self.id, "iterator closed after its worker stopped");
        }
    }
}

impl<T> Drop for AsyncIterator<T> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.commands.send(Command::Close(self.id));
        }
    }
}

impl<T> std::fmt::Debug for AsyncIterator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncIterator")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Query result living on the worker thread
#[derive(Debug)]
pub struct AsyncQueryResultIterator {
    rows: AsyncIterator<ResultRow>,
    shape: ResultShape,
    names: Vec<String>,
    bool_value: bool,
}

impl AsyncQueryResultIterator {
    pub fn id(&self) -> u64 {
        self.rows.id()
    }

    pub fn shape(&self) -> ResultShape {
        self.shape
    }

    pub fn is_graph(&self) -> bool {
        self.shape == ResultShape::Graph
    }

    pub fn is_binding(&self) -> bool {
        self.shape == ResultShape::Bindings
    }

    pub fn is_bool(&self) -> bool {
        self.shape == ResultShape::Bool
    }

    pub fn bool_value(&self) -> bool {
        self.bool_value
    }

    pub fn binding_names(&self) -> &[String] {
        &self.names
    }

    pub async fn next(&mut self) -> bool {
        self.rows.next().await
    }

    pub fn current_bindings(&self) -> &BindingSet {
        &self.rows.current().bindings
    }

    pub fn current_statement(&self) -> &Statement {
        &self.rows.current().statement
    }

    pub fn binding(&self, name: &str) -> Node {
        self.rows.current().bindings.value(name)
    }

    pub fn last_error(&self) -> Option<Error> {
        self.rows.last_error()
    }

    pub fn close(&mut self) {
        self.rows.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryModel;
    use std::time::Duration;

    fn st(subject: &str) -> Statement {
        Statement::new(
            Node::resource(subject).unwrap(),
            Node::resource("urn:p").unwrap(),
            Node::literal("v"),
        )
    }

    #[tokio::test]
    async fn test_reads_and_writes() {
        let model = AsyncModel::new(Arc::new(MemoryModel::new())).unwrap();
        model.add_statements(&[st("urn:a"), st("urn:b")]).await.unwrap();
        assert_eq!(model.statement_count().await.unwrap(), 2);
        let mut it = model.list_statements(&Statement::any()).await.unwrap();
        assert_eq!(it.all_elements().await.len(), 2);
        it.close();
        assert!(model.add_statement(&Statement::any()).await.is_err());
        assert!(model.last_error().is_some());
    }

    #[tokio::test]
    async fn test_writes_wait_for_open_iterators() {
        let model = AsyncModel::new(Arc::new(MemoryModel::new())).unwrap();
        model.add_statement(&st("urn:a")).await.unwrap();
        let mut it = model.list_statements(&Statement::any()).await.unwrap();
        assert!(it.next().await);

        let pending = tokio::spawn({
            let model = model.clone();
            async move { model.add_statement(&st("urn:b")).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(model.queued_writes().await.unwrap(), 1);
        assert!(!model.contains_statement(&st("urn:b")).await.unwrap());

        drop(it);
        pending.await.unwrap().unwrap();
        assert!(model.contains_statement(&st("urn:b")).await.unwrap());
        assert_eq!(model.open_iterators().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_result_shapes() {
        let model = AsyncModel::new(Arc::new(MemoryModel::new())).unwrap();
        model.add_statement(&st("urn:a")).await.unwrap();
        let mut ask = model
            .execute_query("ASK { ?s ?p ?o }", &QueryLanguage::Sparql)
            .await
            .unwrap();
        assert!(ask.is_bool());
        assert!(ask.bool_value());
        assert!(ask.next().await);
        assert!(!ask.next().await);
        ask.close();

        let mut select = model
            .execute_query("SELECT ?s WHERE { ?s ?p ?o }", &QueryLanguage::Sparql)
            .await
            .unwrap();
        assert_eq!(select.binding_names(), ["s".to_string()]);
        assert!(select.next().await);
        assert_eq!(select.binding("s"), Node::resource("urn:a").unwrap());
        assert!(!select.next().await);
        assert!(select.last_error().is_none());
    }
}
