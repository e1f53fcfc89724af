//! Blocking transport client
//!
//! [`ClientModel`] implements [`Model`] against a remote
//! [`TransportServer`](super::TransportServer). Requests are strictly
//! request/response over one connection, shared by the model and every
//! iterator it returned.

use super::command::{
    decode_next, decode_query_opened, decode_response, frame, IteratorKind, Request, Row, PROTOCOL_VERSION,
};
use super::datastream::{decode_frame, get_bool, get_node, get_u32, get_u64, DecodeResult};
use crate::error::{Error, ErrorCache, Result};
use crate::iterator::{
    IteratorBackend, IteratorHandle, NodeIterator, QueryResultIterator, QueryResultIteratorBackend, ResultShape,
    StatementIterator,
};
use crate::model::{Model, QueryLanguage};
use crate::rdf::{BindingSet, Node, Statement};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::fmt;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Connection {
    fn call<T>(&mut self, request: &Request, payload: impl FnOnce(&mut Bytes) -> DecodeResult<T>) -> Result<T> {
        trace!(%request, "sending request");
        let mut body = BytesMut::new();
        request.encode(&mut body);
        self.stream.write_all(&frame(&body)?)?;

        let mut chunk = [0u8; 4096];
        loop {
            if let Some(response) = decode_frame(&mut self.buffer)? {
                return decode_response(response, payload);
            }
            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                return Err(Error::unknown("connection closed by server"));
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}

type SharedConnection = Arc<Mutex<Connection>>;

/// Model served by a remote transport server
pub struct ClientModel {
    connection: SharedConnection,
    address: String,
    errors: ErrorCache,
}

impl ClientModel {
    /// Connect and check that the server speaks this protocol version
    pub fn connect(address: &str) -> Result<Self> {
        Self::open(TcpStream::connect(address)?, address)
    }

    /// Like [`connect`](Self::connect), with a read and write timeout on the
    /// socket. A stalled reply surfaces as `Timeout`.
    pub fn connect_timeout(address: &str, timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect(address)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        Self::open(stream, address)
    }

    fn open(stream: TcpStream, address: &str) -> Result<Self> {
        stream.set_nodelay(true)?;
        let model = Self {
            connection: Arc::new(Mutex::new(Connection {
                stream,
                buffer: BytesMut::with_capacity(4096),
            })),
            address: address.to_string(),
            errors: ErrorCache::new(),
        };
        let supported = model.call(&Request::SupportsProtocolVersion(PROTOCOL_VERSION), |buf| get_bool(buf))?;
        if !supported {
            return Err(Error::not_supported(format!(
                "server at {} does not speak protocol version {}",
                address, PROTOCOL_VERSION
            )));
        }
        debug!(address, "connected to transport server");
        Ok(model)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Feature flags of the server's backend
    pub fn supported_features(&self) -> Result<u32> {
        self.errors.track(self.call(&Request::SupportedFeatures, |buf| get_u32(buf)))
    }

    fn call<T>(&self, request: &Request, payload: impl FnOnce(&mut Bytes) -> DecodeResult<T>) -> Result<T> {
        self.connection.lock().call(request, payload)
    }

    fn done(&self, request: Request) -> Result<()> {
        self.errors.track(self.call(&request, |_| Ok(())))
    }

    fn flag(&self, request: Request) -> Result<bool> {
        self.errors.track(self.call(&request, |buf| get_bool(buf)))
    }

    fn open_iterator(&self, request: Request, kind: IteratorKind) -> Result<RemoteCursor> {
        let id = self.call(&request, |buf| get_u32(buf))?;
        Ok(RemoteCursor::new(Arc::clone(&self.connection), id, kind))
    }
}

impl fmt::Debug for ClientModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientModel").field("address", &self.address).finish()
    }
}

impl Model for ClientModel {
    fn add_statement(&self, statement: &Statement) -> Result<()> {
        if !statement.is_valid() {
            return self
                .errors
                .track(Err(Error::invalid_argument(format!("cannot add invalid statement {}", statement))));
        }
        self.done(Request::AddStatement(statement.clone()))
    }

    fn remove_statement(&self, statement: &Statement) -> Result<()> {
        self.done(Request::RemoveStatement(statement.clone()))
    }

    fn remove_all_statements(&self, partial: &Statement) -> Result<()> {
        self.done(Request::RemoveAllStatements(partial.clone()))
    }

    fn list_statements(&self, partial: &Statement) -> Result<StatementIterator> {
        let cursor = self.open_iterator(Request::ListStatements(partial.clone()), IteratorKind::Statements);
        self.errors.track(cursor.map(|c| IteratorHandle::new(RemoteBackend::statements(c))))
    }

    fn list_contexts(&self) -> Result<NodeIterator> {
        let cursor = self.open_iterator(Request::ListContexts, IteratorKind::Nodes);
        self.errors.track(cursor.map(|c| IteratorHandle::new(RemoteBackend::nodes(c))))
    }

    fn execute_query(&self, query: &str, language: &QueryLanguage) -> Result<QueryResultIterator> {
        let request = Request::Query {
            query: query.to_string(),
            language: language.to_string(),
        };
        let opened = self.call(&request, decode_query_opened).map(|(id, shape, names, bool_value)| {
            let cursor = RemoteCursor::new(Arc::clone(&self.connection), id, IteratorKind::Results(shape));
            QueryResultIterator::new(RemoteQueryResult {
                cursor,
                shape,
                names,
                bool_value,
                error: None,
            })
        });
        self.errors.track(opened)
    }

    fn contains_statement(&self, statement: &Statement) -> Result<bool> {
        self.flag(Request::ContainsStatement(statement.clone()))
    }

    fn contains_any_statement(&self, partial: &Statement) -> Result<bool> {
        self.flag(Request::ContainsAnyStatement(partial.clone()))
    }

    fn statement_count(&self) -> Result<usize> {
        let count = self.call(&Request::StatementCount, |buf| get_u64(buf));
        self.errors.track(count.map(|c| c as usize))
    }

    fn is_empty(&self) -> Result<bool> {
        self.flag(Request::IsEmpty)
    }

    fn create_blank_node(&self) -> Result<Node> {
        self.errors.track(self.call(&Request::CreateBlankNode, |buf| get_node(buf)))
    }

    fn last_error(&self) -> Option<Error> {
        self.errors.last_error()
    }
}

/// Server-side iterator addressed by id
struct RemoteCursor {
    connection: SharedConnection,
    id: u32,
    kind: IteratorKind,
    current: Option<Row>,
    error: Option<Error>,
    done: bool,
    closed: bool,
}

impl RemoteCursor {
    fn new(connection: SharedConnection, id: u32, kind: IteratorKind) -> Self {
        trace!(id, ?kind, "remote iterator opened");
        Self {
            connection,
            id,
            kind,
            current: None,
            error: None,
            done: false,
            closed: false,
        }
    }

    fn next(&mut self) -> bool {
        self.current = None;
        self.error = None;
        if self.done || self.closed {
            return false;
        }
        let kind = self.kind;
        match self
            .connection
            .lock()
            .call(&Request::IteratorNext(self.id), |buf| decode_next(buf, kind))
        {
            Ok(Some(row)) => {
                self.current = Some(row);
                true
            }
            Ok(None) => {
                self.done = true;
                false
            }
            Err(e) => {
                self.done = true;
                self.error = Some(e);
                false
            }
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.current = None;
        if let Err(e) = self.connection.lock().call(&Request::IteratorClose(self.id), |_| Ok(())) {
            debug!(id = self.id, error = %e, "closing remote iterator failed");
        }
        trace!(id = self.id, "remote iterator closed");
    }
}

impl Drop for RemoteCursor {
    fn drop(&mut self) {
        self.close();
    }
}

/// Statement or node stream over a remote cursor
struct RemoteBackend<T> {
    cursor: RemoteCursor,
    extract: fn(&Row) -> Option<T>,
}

impl RemoteBackend<Statement> {
    fn statements(cursor: RemoteCursor) -> Self {
        Self {
            cursor,
            extract: |row| match row {
                Row::Statement(st) => Some(st.clone()),
                _ => None,
            },
        }
    }
}

impl RemoteBackend<Node> {
    fn nodes(cursor: RemoteCursor) -> Self {
        Self {
            cursor,
            extract: |row| match row {
                Row::Node(node) => Some(node.clone()),
                _ => None,
            },
        }
    }
}

impl<T: Default + Send> IteratorBackend<T> for RemoteBackend<T> {
    fn next(&mut self) -> bool {
        self.cursor.next()
    }

    fn current(&self) -> T {
        self.cursor.current.as_ref().and_then(self.extract).unwrap_or_default()
    }

    fn close(&mut self) {
        self.cursor.close()
    }

    fn last_error(&self) -> Option<Error> {
        self.cursor.error.clone()
    }
}

/// Query result over a remote cursor. Shape, names and the boolean answer
/// arrive with the QUERY reply.
struct RemoteQueryResult {
    cursor: RemoteCursor,
    shape: ResultShape,
    names: Vec<String>,
    bool_value: bool,
    error: Option<Error>,
}

impl IteratorBackend<BindingSet> for RemoteQueryResult {
    fn next(&mut self) -> bool {
        self.error = None;
        self.cursor.next()
    }

    fn current(&self) -> BindingSet {
        match &self.cursor.current {
            Some(Row::Result(row)) => row.bindings.clone(),
            _ => BindingSet::default(),
        }
    }

    fn close(&mut self) {
        self.cursor.close()
    }

    fn last_error(&self) -> Option<Error> {
        self.error.clone().or_else(|| self.cursor.error.clone())
    }
}

impl QueryResultIteratorBackend for RemoteQueryResult {
    fn shape(&self) -> ResultShape {
        self.shape
    }

    fn current_statement(&self) -> Statement {
        match &self.cursor.current {
            Some(Row::Result(row)) => row.statement.clone(),
            _ => Statement::default(),
        }
    }

    fn binding_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn bool_value(&self) -> bool {
        self.bool_value
    }

    fn report_error(&mut self, error: Error) {
        self.error = Some(error);
    }

    fn clear_error(&mut self) {
        self.error = None;
        self.cursor.error = None;
    }
}
