//! Transport server
//!
//! One tokio task per connection. Each connection gets its own
//! [`AsyncModel`] over the shared model, so every iterator a client opens
//! lives on that connection's worker thread until the client closes it or
//! disconnects.

use super::command::{encode_response, frame, IteratorKind, Reply, Request, Row, DEFAULT_PORT, PROTOCOL_VERSION};
use super::datastream::{decode_frame, DecodeError};
use crate::error::{Error, Result};
use crate::model::{
    AsyncModel, AsyncNodeIterator, AsyncQueryResultIterator, AsyncStatementIterator, Model, QueryLanguage, ResultRow,
};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, trace, warn};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub address: String,
    /// Port
    pub port: u16,
    /// Maximum concurrent connections
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            max_connections: 1024,
        }
    }
}

/// Binary transport server exposing one model
pub struct TransportServer {
    config: ServerConfig,
    model: Arc<dyn Model>,
    features: u32,
}

impl TransportServer {
    pub fn new(config: ServerConfig, model: Arc<dyn Model>) -> Self {
        Self {
            config,
            model,
            features: 0,
        }
    }

    /// Feature flags reported to SUPPORTED_FEATURES
    pub fn with_features(mut self, features: u32) -> Self {
        self.features = features;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address and serve forever
    pub async fn start(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.address, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!("transport server listening on {}", listener.local_addr()?);
        let permits = Arc::new(Semaphore::new(self.config.max_connections));

        loop {
            let (socket, peer_addr) = listener.accept().await?;
            let permit = match Arc::clone(&permits).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(
                        "rejecting connection from {}: {} connections open",
                        peer_addr, self.config.max_connections
                    );
                    continue;
                }
            };
            info!("connection from {}", peer_addr);

            let model = match AsyncModel::new(Arc::clone(&self.model)) {
                Ok(model) => model,
                Err(e) => {
                    error!("cannot start model worker for {}: {}", peer_addr, e);
                    continue;
                }
            };
            let features = self.features;

            tokio::spawn(async move {
                let mut connection = Connection::new(model, features);
                if let Err(e) = connection.run(socket).await {
                    error!("error handling connection from {}: {}", peer_addr, e);
                }
                info!("connection from {} closed", peer_addr);
                drop(permit);
            });
        }
    }
}

enum OpenIterator {
    Statements(AsyncStatementIterator),
    Nodes(AsyncNodeIterator),
    Results(AsyncQueryResultIterator),
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

/// Per-connection state
struct Connection {
    model: AsyncModel,
    iterators: HashMap<u32, OpenIterator>,
    next_id: u32,
    features: u32,
}

impl Connection {
    fn new(model: AsyncModel, features: u32) -> Self {
        Self {
            model,
            iterators: HashMap::new(),
            next_id: 0,
            features,
        }
    }

    async fn run(&mut self, mut socket: TcpStream) -> Result<()> {
        let mut buffer = BytesMut::with_capacity(4096);

        loop {
            let n = socket.read_buf(&mut buffer).await?;
            if n == 0 {
                debug!("connection closed by client");
                break;
            }

            loop {
                let body = match decode_frame(&mut buffer) {
                    Ok(Some(body)) => body,
                    Ok(None) => break,
                    Err(e) => {
                        // framing is lost; report and hang up
                        error!("protocol error: {}", e);
                        self.send(&mut socket, Err(e.into())).await?;
                        self.close_all();
                        return Ok(());
                    }
                };
                let outcome = match Request::decode(body) {
                    Ok(request) => {
                        trace!(%request, "request");
                        self.handle(request).await
                    }
                    Err(DecodeError::Io(e)) => return Err(e.into()),
                    Err(e) => {
                        warn!("malformed request: {}", e);
                        Err(e.into())
                    }
                };
                self.send(&mut socket, outcome).await?;
            }
        }

        self.close_all();
        Ok(())
    }

    async fn send(&self, socket: &mut TcpStream, outcome: Result<Reply>) -> Result<()> {
        let body = encode_response(&outcome);
        socket.write_all(&frame(&body)?).await?;
        Ok(())
    }

    fn register(&mut self, it: OpenIterator) -> u32 {
        self.next_id = self.next_id.wrapping_add(1);
        self.iterators.insert(self.next_id, it);
        debug!(id = self.next_id, open = self.iterators.len(), "remote iterator opened");
        self.next_id
    }

    fn close_all(&mut self) {
        for (_, mut it) in self.iterators.drain() {
            it.close();
        }
    }

    /// A write on a connection holding open iterators would wait for those
    /// iterators forever, since this connection is the only one that can
    /// close them.
    fn check_writable(&self) -> Result<()> {
        if self.iterators.is_empty() {
            Ok(())
        } else {
            Err(Error::invalid_argument(format!(
                "close the {} open iterator(s) on this connection before writing",
                self.iterators.len()
            )))
        }
    }

    async fn handle(&mut self, request: Request) -> Result<Reply> {
        match request {
            Request::AddStatement(statement) => {
                self.check_writable()?;
                self.model.add_statement(&statement).await?;
                Ok(Reply::Done)
            }
            Request::RemoveStatement(statement) => {
                self.check_writable()?;
                self.model.remove_statement(&statement).await?;
                Ok(Reply::Done)
            }
            Request::RemoveAllStatements(partial) => {
                self.check_writable()?;
                self.model.remove_all_statements(&partial).await?;
                Ok(Reply::Done)
            }
            Request::ListStatements(partial) => {
                let it = self.model.list_statements(&partial).await?;
                Ok(Reply::IteratorOpened(self.register(OpenIterator::Statements(it))))
            }
            Request::ContainsStatement(statement) => Ok(Reply::Bool(self.model.contains_statement(&statement).await?)),
            Request::ContainsAnyStatement(partial) => {
                Ok(Reply::Bool(self.model.contains_any_statement(&partial).await?))
            }
            Request::ListContexts => {
                let it = self.model.list_contexts().await?;
                Ok(Reply::IteratorOpened(self.register(OpenIterator::Nodes(it))))
            }
            Request::StatementCount => Ok(Reply::Count(self.model.statement_count().await? as u64)),
            Request::IsEmpty => Ok(Reply::Bool(self.model.is_empty().await?)),
            Request::Query { query, language } => {
                let language: QueryLanguage = language.parse()?;
                let it = self.model.execute_query(&query, &language).await?;
                let shape = it.shape();
                let names = it.binding_names().to_vec();
                let bool_value = it.bool_value();
                let id = self.register(OpenIterator::Results(it));
                Ok(Reply::QueryOpened {
                    id,
                    shape,
                    names,
                    bool_value,
                })
            }
            Request::CreateBlankNode => Ok(Reply::Node(self.model.create_blank_node().await?)),
            Request::IteratorNext(id) => self.next(id).await,
            Request::IteratorClose(id) => {
                if let Some(mut it) = self.iterators.remove(&id) {
                    it.close();
                    debug!(id, open = self.iterators.len(), "remote iterator closed");
                }
                Ok(Reply::Done)
            }
            Request::SupportedFeatures => Ok(Reply::Features(self.features)),
            Request::SupportsProtocolVersion(version) => Ok(Reply::Bool(version == PROTOCOL_VERSION)),
        }
    }

    async fn next(&mut self, id: u32) -> Result<Reply> {
        let it = self
            .iterators
            .get_mut(&id)
            .ok_or_else(|| Error::invalid_argument(format!("unknown iterator {}", id)))?;
        let (row, kind, error) = match it {
            OpenIterator::Statements(it) => {
                let row = it.next().await.then(|| Row::Statement(it.current().clone()));
                (row, IteratorKind::Statements, it.last_error())
            }
            OpenIterator::Nodes(it) => {
                let row = it.next().await.then(|| Row::Node(it.current().clone()));
                (row, IteratorKind::Nodes, it.last_error())
            }
            OpenIterator::Results(it) => {
                let kind = IteratorKind::Results(it.shape());
                let row = it.next().await.then(|| {
                    Row::Result(ResultRow {
                        bindings: it.current_bindings().clone(),
                        statement: it.current_statement().clone(),
                    })
                });
                (row, kind, it.last_error())
            }
        };
        match (row, error) {
            (None, Some(e)) => Err(e),
            (row, _) => Ok(Reply::Next(row, kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.address, "127.0.0.1");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.max_connections, 1024);
    }

    #[test]
    fn test_server_config_from_yaml() {
        let config: ServerConfig = serde_yaml::from_str("port: 7001\n").unwrap();
        assert_eq!(config.port, 7001);
        assert_eq!(config.address, "127.0.0.1");
    }
}
