//! Binary client/server transport
//!
//! - [`datastream`]: length-prefixed native-endian encoding of nodes,
//!   statements, binding sets and error records
//! - [`command`]: command codes, requests and reply payloads
//! - [`server`]: tokio server exposing a [`Model`](crate::model::Model)
//! - [`client`]: blocking [`ClientModel`]
//!
//! Remote iterators are addressed by id. ITERATOR_NEXT answers has-next and
//! the row; ITERATOR_CLOSE is idempotent.

pub mod client;
pub mod command;
pub mod datastream;
pub mod server;

pub use client::ClientModel;
pub use command::{CommandCode, IteratorKind, Reply, Request, Row, DEFAULT_PORT, PROTOCOL_VERSION};
pub use datastream::{DecodeError, DecodeResult};
pub use server::{ServerConfig, TransportServer};
