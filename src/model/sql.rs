//! SQLite storage model
//!
//! Quads live in one table with N3-encoded text columns. Listings and user
//! SQL are read a page at a time, so an open iterator never holds the
//! connection between `next()` calls, only the model's read lock.

use super::registry::{LockCoupling, LockMode};
use super::{Model, QueryLanguage};
use crate::error::{Error, ErrorCache, Result};
use crate::iterator::{
    IteratorBackend, LeasedBackend, NodeIterator, QueryResultIterator, QueryResultIteratorBackend,
    ResultShape, StatementIterator,
};
use crate::rdf::vocab::xsd;
use crate::rdf::{BindingSet, BlankNode, Literal, Node, Statement};
use crate::serialization::{parse_str, RdfSerialization};
use crate::sparql::{self, QuadSource};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

/// Column holding the answer of an ASK-style SQL result
pub const ASK_COLUMN: &str = "__ask_retval";
/// Column holding serialized graph documents
pub const GRAPH_COLUMN: &str = "callret-0";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS quads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject TEXT NOT NULL,
    predicate TEXT NOT NULL,
    object TEXT NOT NULL,
    context TEXT NOT NULL DEFAULT '',
    UNIQUE (subject, predicate, object, context)
);
CREATE INDEX IF NOT EXISTS quads_predicate ON quads (predicate);
CREATE INDEX IF NOT EXISTS quads_object ON quads (object);
CREATE INDEX IF NOT EXISTS quads_context ON quads (context);
";

/// Connection and paging settings
#[derive(Debug, Clone, PartialEq)]
pub struct SqlConfig {
    /// Database file; `None` opens a private in-memory database
    pub path: Option<PathBuf>,
    /// Rows fetched per round trip
    pub page_size: usize,
    /// How often a busy or locked database is retried before `Timeout`
    pub busy_retries: u32,
    pub busy_retry_interval: Duration,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            path: None,
            page_size: 256,
            busy_retries: 10,
            busy_retry_interval: Duration::from_millis(50),
        }
    }
}

impl SqlConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

/// Connection shared by the model and its cursors
struct SqlCore {
    conn: Mutex<Connection>,
    config: SqlConfig,
}

impl SqlCore {
    fn open(config: SqlConfig) -> Result<Self> {
        let conn = match &config.path {
            Some(path) => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?,
            None => Connection::open_in_memory()?,
        };
        // busy waits are paced by `with_retry` alone
        conn.busy_timeout(Duration::ZERO)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    /// Run `f` on the connection, retrying while the database is busy
    fn with_retry<T>(&self, mut f: impl FnMut(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            let outcome = {
                let conn = self.conn.lock();
                f(&conn)
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if is_busy(&e) => {
                    if attempt >= self.config.busy_retries {
                        warn!(attempts = attempt + 1, "database stayed busy");
                        return Err(Error::timeout(format!("database busy: {}", e)));
                    }
                    attempt += 1;
                    trace!(attempt, "database busy, retrying");
                    std::thread::sleep(self.config.busy_retry_interval);
                }
                Err(e) => {
                    error!(error = %e, "sqlite failure");
                    return Err(e.into());
                }
            }
        }
    }

    fn select_quads(&self, pattern: &Statement, after: i64, limit: Option<usize>) -> Result<Vec<(i64, Statement)>> {
        let (conditions, mut params) = conditions(pattern);
        params.insert(0, Value::Integer(after));
        let mut sql = format!(
            "SELECT id, subject, predicate, object, context FROM quads WHERE id > ?{}",
            conditions
        );
        sql.push_str(" ORDER BY id");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        let rows = self.with_retry(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    [
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ],
                ))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;
        rows.into_iter()
            .map(|(id, [s, p, o, c])| {
                Ok((
                    id,
                    Statement::new_quad(Node::from_n3(&s)?, Node::from_n3(&p)?, Node::from_n3(&o)?, Node::from_n3(&c)?),
                ))
            })
            .collect()
    }
}

impl QuadSource for SqlCore {
    fn quads_matching(&self, pattern: &Statement) -> Result<Vec<Statement>> {
        Ok(self
            .select_quads(pattern, 0, None)?
            .into_iter()
            .map(|(_, statement)| statement)
            .collect())
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(native, _)
            if matches!(native.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

/// `AND column = ?` clauses for the bound parts of `pattern`
fn conditions(pattern: &Statement) -> (String, Vec<Value>) {
    let mut sql = String::new();
    let mut params = Vec::new();
    for (column, node) in [
        ("subject", &pattern.subject),
        ("predicate", &pattern.predicate),
        ("object", &pattern.object),
        ("context", &pattern.context),
    ] {
        if !node.is_empty() {
            sql.push_str(&format!(" AND {} = ?", column));
            params.push(Value::Text(node.to_n3()));
        }
    }
    (sql, params)
}

fn quad_params(statement: &Statement) -> [String; 4] {
    [
        statement.subject.to_n3(),
        statement.predicate.to_n3(),
        statement.object.to_n3(),
        statement.context.to_n3(),
    ]
}

/// Model over a SQLite database
pub struct SqlModel {
    core: Arc<SqlCore>,
    coupling: Arc<LockCoupling>,
    errors: ErrorCache,
}

impl SqlModel {
    pub fn open(config: SqlConfig) -> Result<Self> {
        let path = config.path.clone();
        let core = SqlCore::open(config)?;
        debug!(?path, "sql model opened");
        Ok(Self {
            core: Arc::new(core),
            coupling: LockCoupling::new(),
            errors: ErrorCache::new(),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(SqlConfig::in_memory())
    }

    pub fn config(&self) -> &SqlConfig {
        &self.core.config
    }

    pub fn open_iterators(&self) -> usize {
        self.coupling.open_iterators()
    }

    fn do_add(&self, statement: &Statement) -> Result<()> {
        if !statement.is_valid() {
            return Err(Error::invalid_argument(format!("cannot add invalid statement {}", statement)));
        }
        let params = quad_params(statement);
        let _guard = self.coupling.write();
        let inserted = self.core.with_retry(|conn| {
            conn.prepare_cached(
                "INSERT OR IGNORE INTO quads (subject, predicate, object, context) VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params_from_iter(params.iter()))
        })?;
        if inserted > 0 {
            debug!(%statement, "statement added");
        }
        Ok(())
    }

    fn do_remove(&self, statement: &Statement) -> Result<()> {
        if !statement.is_valid() {
            return Err(Error::invalid_argument(format!("cannot remove invalid statement {}", statement)));
        }
        let params = quad_params(statement);
        let _guard = self.coupling.write();
        self.core.with_retry(|conn| {
            conn.prepare_cached(
                "DELETE FROM quads WHERE subject = ?1 AND predicate = ?2 AND object = ?3 AND context = ?4",
            )?
            .execute(params_from_iter(params.iter()))
        })?;
        Ok(())
    }

    fn do_remove_all(&self, partial: &Statement) -> Result<()> {
        let (conditions, params) = conditions(partial);
        let sql = format!("DELETE FROM quads WHERE 1 = 1{}", conditions);
        let _guard = self.coupling.write();
        let removed = self
            .core
            .with_retry(|conn| conn.execute(&sql, params_from_iter(params.iter())))?;
        debug!(removed, "statements removed");
        Ok(())
    }

    fn do_list(&self, partial: &Statement) -> StatementIterator {
        let lease = self.coupling.acquire(LockMode::Read);
        let cursor = QuadCursor {
            core: Arc::clone(&self.core),
            pattern: partial.clone(),
            last_id: 0,
            page: VecDeque::new(),
            current: None,
            exhausted: false,
            error: None,
        };
        StatementIterator::new(LeasedBackend::new(cursor, lease))
    }

    fn do_query(&self, query: &str, language: &QueryLanguage) -> Result<QueryResultIterator> {
        let lease = self.coupling.acquire(LockMode::Read);
        let result = match language {
            QueryLanguage::Sparql => sparql::execute(query, &*self.core)
                .map(|result| QueryResultIterator::new(LeasedBackend::new(result, Arc::clone(&lease)))),
            QueryLanguage::Sql => SqlResultBackend::open(Arc::clone(&self.core), query)
                .map(|result| QueryResultIterator::new(LeasedBackend::new(result, Arc::clone(&lease)))),
            QueryLanguage::User(name) => Err(Error::not_supported(format!("unsupported query language {}", name))),
        };
        if result.is_err() {
            lease.close();
        }
        result
    }
}

impl Drop for SqlModel {
    fn drop(&mut self) {
        self.coupling.close_all();
    }
}

impl fmt::Debug for SqlModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlModel")
            .field("config", &self.core.config)
            .field("open_iterators", &self.open_iterators())
            .finish()
    }
}

impl Model for SqlModel {
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
            core: Arc::clone(&self.core),
            last: String::new(),
            page: VecDeque::new(),
            current: Node::Empty,
            exhausted: false,
            error: None,
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
        self.contains_any_statement(statement)
    }

    fn contains_any_statement(&self, partial: &Statement) -> Result<bool> {
        let (conditions, params) = conditions(partial);
        let sql = format!("SELECT EXISTS (SELECT 1 FROM quads WHERE 1 = 1{})", conditions);
        let _guard = self.coupling.read();
        let found = self.core.with_retry(|conn| {
            conn.query_row(&sql, params_from_iter(params.iter()), |row| row.get::<_, bool>(0))
        });
        self.errors.track(found)
    }

    fn statement_count(&self) -> Result<usize> {
        let _guard = self.coupling.read();
        let count = self
            .core
            .with_retry(|conn| conn.query_row("SELECT COUNT(*) FROM quads", [], |row| row.get::<_, i64>(0)))
            .map(|count| usize::try_from(count).unwrap_or_default());
        self.errors.track(count)
    }

    fn create_blank_node(&self) -> Result<Node> {
        let id = format!("b{}", Uuid::new_v4().simple());
        self.errors.track(Ok(Node::Blank(BlankNode::new_unchecked(id))))
    }

    fn last_error(&self) -> Option<Error> {
        self.errors.last_error()
    }
}

/// Keyset-paged statement listing
struct QuadCursor {
    core: Arc<SqlCore>,
    pattern: Statement,
    last_id: i64,
    page: VecDeque<Statement>,
    current: Option<Statement>,
    exhausted: bool,
    error: Option<Error>,
}

impl QuadCursor {
    fn fetch(&mut self) {
        let page_size = self.core.config.page_size;
        match self.core.select_quads(&self.pattern, self.last_id, Some(page_size)) {
            Ok(rows) => {
                trace!(rows = rows.len(), after = self.last_id, "page fetched");
                if rows.len() < page_size {
                    self.exhausted = true;
                }
                if let Some((id, _)) = rows.last() {
                    self.last_id = *id;
                }
                self.page.extend(rows.into_iter().map(|(_, statement)| statement));
            }
            Err(e) => {
                self.error = Some(e);
                self.exhausted = true;
            }
        }
    }
}

impl IteratorBackend<Statement> for QuadCursor {
    fn next(&mut self) -> bool {
        self.error = None;
        if self.page.is_empty() && !self.exhausted {
            self.fetch();
        }
        self.current = self.page.pop_front();
        self.current.is_some()
    }

    fn current(&self) -> Statement {
        self.current.clone().unwrap_or_default()
    }

    fn close(&mut self) {
        self.exhausted = true;
        self.page.clear();
        self.current = None;
    }

    fn last_error(&self) -> Option<Error> {
        self.error.clone()
    }
}

/// Keyset-paged distinct contexts
struct ContextCursor {
    core: Arc<SqlCore>,
    last: String,
    page: VecDeque<String>,
    current: Node,
    exhausted: bool,
    error: Option<Error>,
}

impl ContextCursor {
    fn fetch(&mut self) {
        let page_size = self.core.config.page_size;
        let last = self.last.clone();
        let fetched = self.core.with_retry(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT DISTINCT context FROM quads WHERE context > ?1 ORDER BY context LIMIT ?2",
            )?;
            let rows = stmt.query_map(rusqlite::params![last, page_size as i64], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        });
        match fetched {
            Ok(rows) => {
                if rows.len() < page_size {
                    self.exhausted = true;
                }
                if let Some(last) = rows.last() {
                    self.last = last.clone();
                }
                self.page.extend(rows);
            }
            Err(e) => {
                self.error = Some(e);
                self.exhausted = true;
            }
        }
    }
}

impl IteratorBackend<Node> for ContextCursor {
    fn next(&mut self) -> bool {
        self.error = None;
        if self.page.is_empty() && !self.exhausted {
            self.fetch();
        }
        match self.page.pop_front().map(|text| Node::from_n3(&text)) {
            Some(Ok(node)) => {
                self.current = node;
                true
            }
            Some(Err(e)) => {
                self.error = Some(e);
                self.close();
                false
            }
            None => {
                self.current = Node::Empty;
                false
            }
        }
    }

    fn current(&self) -> Node {
        self.current.clone()
    }

    fn close(&mut self) {
        self.exhausted = true;
        self.page.clear();
        self.current = Node::Empty;
    }

    fn last_error(&self) -> Option<Error> {
        self.error.clone()
    }
}

/// Decode one SQL value into a node
fn decode_value(value: &Value) -> Node {
    match value {
        Value::Null => Node::Empty,
        Value::Integer(i) => Node::Literal(Literal::from(*i)),
        Value::Real(f) => Node::Literal(Literal::from(*f)),
        Value::Text(text) => {
            let looks_like_term = text.starts_with('<') || text.starts_with('"') || text.starts_with("_:");
            match looks_like_term.then(|| Node::from_n3(text)) {
                Some(Ok(node)) => node,
                _ => Node::literal(text.as_str()),
            }
        }
        Value::Blob(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
            Node::typed_literal(hex, xsd::HEX_BINARY).unwrap_or_default()
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Integer(i) => *i != 0,
        Value::Real(f) => *f != 0.0,
        Value::Text(text) => matches!(text.trim(), "1" | "true"),
        Value::Blob(bytes) => !bytes.is_empty(),
    }
}

/// Lazily paged result of a user SQL query.
///
/// The query is wrapped as `SELECT * FROM (query) LIMIT ? OFFSET ?`, which
/// both validates it and exposes its column names before the first row.
struct SqlResultBackend {
    core: Arc<SqlCore>,
    sql: String,
    names: Vec<String>,
    shape: ResultShape,
    offset: usize,
    rows: VecDeque<Vec<Value>>,
    row: Option<Vec<Value>>,
    decoded: Vec<Option<Node>>,
    document: Option<StatementIterator>,
    statement: Option<Statement>,
    answer: bool,
    answered: bool,
    exhausted: bool,
    error: Option<Error>,
}

impl SqlResultBackend {
    fn open(core: Arc<SqlCore>, query: &str) -> Result<Self> {
        let query = query.trim().trim_end_matches(';');
        if query.is_empty() {
            return Err(Error::invalid_argument("empty SQL query"));
        }
        let sql = format!("SELECT * FROM ({}) LIMIT ?1 OFFSET ?2", query);
        let names = core.with_retry(|conn| {
            let stmt = conn.prepare_cached(&sql)?;
            let names: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
            Ok(names)
        })?;
        let shape = match names.as_slice() {
            [name] if name == ASK_COLUMN => ResultShape::Bool,
            [name] if name == GRAPH_COLUMN => ResultShape::Graph,
            _ => ResultShape::Bindings,
        };
        debug!(?shape, columns = names.len(), "sql query prepared");
        let mut backend = Self {
            core,
            sql,
            names,
            shape,
            offset: 0,
            rows: VecDeque::new(),
            row: None,
            decoded: Vec::new(),
            document: None,
            statement: None,
            answer: false,
            answered: false,
            exhausted: false,
            error: None,
        };
        if shape == ResultShape::Bool {
            backend.fetch();
            if let Some(error) = backend.error.take() {
                return Err(error);
            }
            backend.answer = backend.rows.front().and_then(|row| row.first()).is_some_and(truthy);
        }
        Ok(backend)
    }

    fn fetch(&mut self) {
        let page_size = self.core.config.page_size;
        let params = [page_size as i64, self.offset as i64];
        let sql = self.sql.clone();
        let fetched = self.core.with_retry(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let columns = stmt.column_count();
            let rows = stmt.query_map(params, |row| {
                (0..columns).map(|i| row.get::<_, Value>(i)).collect::<rusqlite::Result<Vec<_>>>()
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        });
        match fetched {
            Ok(rows) => {
                trace!(rows = rows.len(), offset = self.offset, "result page fetched");
                if rows.len() < page_size {
                    self.exhausted = true;
                }
                self.offset += rows.len();
                self.rows.extend(rows);
            }
            Err(e) => {
                self.error = Some(e);
                self.exhausted = true;
            }
        }
    }

    fn next_row(&mut self) -> Option<Vec<Value>> {
        if self.rows.is_empty() && !self.exhausted {
            self.fetch();
        }
        self.rows.pop_front()
    }

    fn next_statement(&mut self) -> bool {
        loop {
            if let Some(document) = self.document.as_mut() {
                if document.next() {
                    self.statement = Some(document.current());
                    return true;
                }
                if let Some(e) = document.last_error() {
                    self.error = Some(e);
                    self.document = None;
                    self.statement = None;
                    return false;
                }
                self.document = None;
            }
            let Some(row) = self.next_row() else {
                self.statement = None;
                return false;
            };
            let text = match row.into_iter().next() {
                Some(Value::Text(text)) => text,
                Some(Value::Blob(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                _ => continue,
            };
            match parse_str(&text, RdfSerialization::Turtle, None) {
                Ok(document) => self.document = Some(document),
                Err(e) => {
                    self.error = Some(e);
                    return false;
                }
            }
        }
    }

    fn decoded_at(&mut self, offset: usize) -> Node {
        let Some(row) = self.row.as_ref() else {
            return Node::Empty;
        };
        let Some(value) = row.get(offset) else {
            return Node::Empty;
        };
        if self.decoded.len() < row.len() {
            self.decoded.resize(row.len(), None);
        }
        self.decoded[offset].get_or_insert_with(|| decode_value(value)).clone()
    }
}

impl IteratorBackend<BindingSet> for SqlResultBackend {
    fn next(&mut self) -> bool {
        self.error = None;
        match self.shape {
            ResultShape::Bool => {
                self.rows.clear();
                self.exhausted = true;
                !std::mem::replace(&mut self.answered, true)
            }
            ResultShape::Graph => self.next_statement(),
            ResultShape::Bindings => {
                self.row = self.next_row();
                self.decoded.clear();
                self.row.is_some()
            }
        }
    }

    fn current(&self) -> BindingSet {
        match &self.row {
            Some(row) => self
                .names
                .iter()
                .zip(row)
                .map(|(name, value)| (name.as_str(), decode_value(value)))
                .collect(),
            None => BindingSet::new(),
        }
    }

    fn close(&mut self) {
        self.exhausted = true;
        self.answered = true;
        self.rows.clear();
        self.row = None;
        self.decoded.clear();
        self.statement = None;
        if let Some(mut document) = self.document.take() {
            document.close();
        }
    }

    fn last_error(&self) -> Option<Error> {
        self.error.clone()
    }
}

impl QueryResultIteratorBackend for SqlResultBackend {
    fn shape(&self) -> ResultShape {
        self.shape
    }

    fn current_statement(&self) -> Statement {
        self.statement.clone().unwrap_or_default()
    }

    fn binding_names(&self) -> Vec<String> {
        match self.shape {
            ResultShape::Bindings => self.names.clone(),
            _ => Vec::new(),
        }
    }

    fn binding(&mut self, name: &str) -> Node {
        self.error = None;
        if self.shape != ResultShape::Bindings {
            return Node::Empty;
        }
        match self.names.iter().position(|n| n == name) {
            Some(offset) => self.decoded_at(offset),
            None => {
                self.report_error(Error::invalid_argument(format!("invalid binding name: {}", name)));
                Node::Empty
            }
        }
    }

    fn binding_at(&mut self, offset: usize) -> Node {
        self.error = None;
        if self.shape != ResultShape::Bindings {
            return Node::Empty;
        }
        self.decoded_at(offset)
    }

    fn bool_value(&self) -> bool {
        self.answer
    }

    fn report_error(&mut self, error: Error) {
        self.error = Some(error);
    }

    fn clear_error(&mut self) {
        self.error = None;
    }
}
