//! Transport commands
//!
//! A request body is a `u16` command code followed by the command's
//! payload. A response body is an error record followed, when the error
//! code is zero, by the reply payload. Reply payloads carry no tag of their
//! own; the client decodes them according to the request it sent.

use super::datastream::*;
use crate::error::{Error, Result};
use crate::iterator::ResultShape;
use crate::model::ResultRow;
use crate::rdf::{Node, Statement};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Version spoken by this implementation
pub const PROTOCOL_VERSION: u32 = 1;

/// Default server port
pub const DEFAULT_PORT: u16 = 5000;

/// Numeric command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CommandCode {
    AddStatement = 0x02,
    RemoveStatement = 0x03,
    RemoveAllStatements = 0x04,
    ListStatements = 0x05,
    ContainsStatement = 0x06,
    ContainsAnyStatement = 0x07,
    ListContexts = 0x08,
    StatementCount = 0x09,
    IsEmpty = 0x0A,
    Query = 0x0B,
    CreateBlankNode = 0x0C,
    IteratorNext = 0x10,
    IteratorClose = 0x12,
    SupportedFeatures = 0x16,
    SupportsProtocolVersion = 0x17,
}

impl CommandCode {
    pub fn from_u16(code: u16) -> Option<Self> {
        use CommandCode::*;
        Some(match code {
            0x02 => AddStatement,
            0x03 => RemoveStatement,
            0x04 => RemoveAllStatements,
            0x05 => ListStatements,
            0x06 => ContainsStatement,
            0x07 => ContainsAnyStatement,
            0x08 => ListContexts,
            0x09 => StatementCount,
            0x0A => IsEmpty,
            0x0B => Query,
            0x0C => CreateBlankNode,
            0x10 => IteratorNext,
            0x12 => IteratorClose,
            0x16 => SupportedFeatures,
            0x17 => SupportsProtocolVersion,
            _ => return None,
        })
    }
}

/// A decoded client request
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    AddStatement(Statement),
    RemoveStatement(Statement),
    RemoveAllStatements(Statement),
    ListStatements(Statement),
    ContainsStatement(Statement),
    ContainsAnyStatement(Statement),
    ListContexts,
    StatementCount,
    IsEmpty,
    Query { query: String, language: String },
    CreateBlankNode,
    IteratorNext(u32),
    IteratorClose(u32),
    SupportedFeatures,
    SupportsProtocolVersion(u32),
}

impl Request {
    pub fn code(&self) -> CommandCode {
        match self {
            Request::AddStatement(_) => CommandCode::AddStatement,
            Request::RemoveStatement(_) => CommandCode::RemoveStatement,
            Request::RemoveAllStatements(_) => CommandCode::RemoveAllStatements,
            Request::ListStatements(_) => CommandCode::ListStatements,
            Request::ContainsStatement(_) => CommandCode::ContainsStatement,
            Request::ContainsAnyStatement(_) => CommandCode::ContainsAnyStatement,
            Request::ListContexts => CommandCode::ListContexts,
            Request::StatementCount => CommandCode::StatementCount,
            Request::IsEmpty => CommandCode::IsEmpty,
            Request::Query { .. } => CommandCode::Query,
            Request::CreateBlankNode => CommandCode::CreateBlankNode,
            Request::IteratorNext(_) => CommandCode::IteratorNext,
            Request::IteratorClose(_) => CommandCode::IteratorClose,
            Request::SupportedFeatures => CommandCode::SupportedFeatures,
            Request::SupportsProtocolVersion(_) => CommandCode::SupportsProtocolVersion,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16_ne(self.code() as u16);
        match self {
            Request::AddStatement(st)
            | Request::RemoveStatement(st)
            | Request::RemoveAllStatements(st)
            | Request::ListStatements(st)
            | Request::ContainsStatement(st)
            | Request::ContainsAnyStatement(st) => put_statement(buf, st),
            Request::Query { query, language } => {
                put_string(buf, query);
                put_string(buf, language);
            }
            Request::IteratorNext(id) | Request::IteratorClose(id) => buf.put_u32_ne(*id),
            Request::SupportsProtocolVersion(version) => buf.put_u32_ne(*version),
            Request::ListContexts
            | Request::StatementCount
            | Request::IsEmpty
            | Request::CreateBlankNode
            | Request::SupportedFeatures => {}
        }
    }

    pub fn decode(mut body: Bytes) -> DecodeResult<Self> {
        let raw = get_u16(&mut body)?;
        let code = CommandCode::from_u16(raw)
            .ok_or_else(|| DecodeError::Protocol(format!("unknown command 0x{:02x}", raw)))?;
        let buf = &mut body;
        Ok(match code {
            CommandCode::AddStatement => Request::AddStatement(get_statement(buf)?),
            CommandCode::RemoveStatement => Request::RemoveStatement(get_statement(buf)?),
            CommandCode::RemoveAllStatements => Request::RemoveAllStatements(get_statement(buf)?),
            CommandCode::ListStatements => Request::ListStatements(get_statement(buf)?),
            CommandCode::ContainsStatement => Request::ContainsStatement(get_statement(buf)?),
            CommandCode::ContainsAnyStatement => Request::ContainsAnyStatement(get_statement(buf)?),
            CommandCode::ListContexts => Request::ListContexts,
            CommandCode::StatementCount => Request::StatementCount,
            CommandCode::IsEmpty => Request::IsEmpty,
            CommandCode::Query => Request::Query {
                query: get_string(buf)?,
                language: get_string(buf)?,
            },
            CommandCode::CreateBlankNode => Request::CreateBlankNode,
            CommandCode::IteratorNext => Request::IteratorNext(get_u32(buf)?),
            CommandCode::IteratorClose => Request::IteratorClose(get_u32(buf)?),
            CommandCode::SupportedFeatures => Request::SupportedFeatures,
            CommandCode::SupportsProtocolVersion => Request::SupportsProtocolVersion(get_u32(buf)?),
        })
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:02x})", self.code(), self.code() as u16)
    }
}

/// What an open server-side iterator yields, which decides the row layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorKind {
    Statements,
    Nodes,
    Results(ResultShape),
}

/// One element sent in an ITERATOR_NEXT reply
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Statement(Statement),
    Node(Node),
    Result(ResultRow),
}

impl Row {
    fn encode(&self, buf: &mut BytesMut, kind: IteratorKind) {
        match (self, kind) {
            (Row::Statement(st), _) => put_statement(buf, st),
            (Row::Node(node), _) => put_node(buf, node),
            (Row::Result(row), IteratorKind::Results(ResultShape::Graph)) => put_statement(buf, &row.statement),
            (Row::Result(row), IteratorKind::Results(ResultShape::Bindings)) => put_binding_set(buf, &row.bindings),
            (Row::Result(_), _) => {}
        }
    }

    pub fn decode(buf: &mut Bytes, kind: IteratorKind) -> DecodeResult<Self> {
        Ok(match kind {
            IteratorKind::Statements => Row::Statement(get_statement(buf)?),
            IteratorKind::Nodes => Row::Node(get_node(buf)?),
            IteratorKind::Results(ResultShape::Graph) => Row::Result(ResultRow {
                statement: get_statement(buf)?,
                ..ResultRow::default()
            }),
            IteratorKind::Results(ResultShape::Bindings) => Row::Result(ResultRow {
                bindings: get_binding_set(buf)?,
                ..ResultRow::default()
            }),
            IteratorKind::Results(ResultShape::Bool) => Row::Result(ResultRow::default()),
        })
    }
}

/// Successful reply payloads
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Done,
    Bool(bool),
    Count(u64),
    Node(Node),
    IteratorOpened(u32),
    QueryOpened {
        id: u32,
        shape: ResultShape,
        names: Vec<String>,
        bool_value: bool,
    },
    Next(Option<Row>, IteratorKind),
    Features(u32),
}

impl Reply {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            Reply::Done => {}
            Reply::Bool(value) => put_bool(buf, *value),
            Reply::Count(count) => buf.put_u64_ne(*count),
            Reply::Node(node) => put_node(buf, node),
            Reply::IteratorOpened(id) => buf.put_u32_ne(*id),
            Reply::QueryOpened {
                id,
                shape,
                names,
                bool_value,
            } => {
                buf.put_u32_ne(*id);
                buf.put_u8(shape.as_u8());
                put_strings(buf, names);
                put_bool(buf, *bool_value);
            }
            Reply::Next(row, kind) => {
                put_bool(buf, row.is_some());
                if let Some(row) = row {
                    row.encode(buf, *kind);
                }
            }
            Reply::Features(flags) => buf.put_u32_ne(*flags),
        }
    }
}

/// Response body for `result`: the error record, then the payload on success
pub fn encode_response(result: &Result<Reply>) -> BytesMut {
    let mut buf = BytesMut::with_capacity(64);
    match result {
        Ok(reply) => {
            put_error(&mut buf, None);
            reply.encode(&mut buf);
        }
        Err(e) => put_error(&mut buf, Some(e)),
    }
    buf
}

/// Split a response body into the remote error or the payload decoded by
/// `payload`
pub fn decode_response<T>(mut body: Bytes, payload: impl FnOnce(&mut Bytes) -> DecodeResult<T>) -> Result<T> {
    if let Some(error) = get_error(&mut body)? {
        return Err(error);
    }
    Ok(payload(&mut body)?)
}

/// Payload of a QUERY reply
pub fn decode_query_opened(buf: &mut Bytes) -> DecodeResult<(u32, ResultShape, Vec<String>, bool)> {
    let id = get_u32(buf)?;
    let raw = get_u8(buf)?;
    let shape = ResultShape::from_u8(raw)
        .ok_or_else(|| DecodeError::InvalidEncoding(format!("unknown result shape {}", raw)))?;
    let names = get_strings(buf)?;
    let bool_value = get_bool(buf)?;
    Ok((id, shape, names, bool_value))
}

/// Payload of an ITERATOR_NEXT reply
pub fn decode_next(buf: &mut Bytes, kind: IteratorKind) -> DecodeResult<Option<Row>> {
    if get_bool(buf)? {
        Ok(Some(Row::decode(buf, kind)?))
    } else {
        Ok(None)
    }
}

/// Wrap an encoded request or response into a frame
pub fn frame(body: &[u8]) -> Result<BytesMut> {
    let mut out = BytesMut::with_capacity(body.len() + 4);
    encode_frame(body, &mut out).map_err(Error::from)?;
    Ok(out)
}
