//! Binary encoding of the transport's primitive values
//!
//! Integers are native-endian; client and server are expected to run on
//! the same architecture. Strings are a `u32` byte length followed by UTF-8.
//!
//! Frame layout:
//!
//! ```text
//! +-------------+------------------+
//! | len: u32 NE | body: len bytes  |
//! +-------------+------------------+
//! ```

use crate::error::{Error, Locator};
use crate::rdf::{BindingSet, Literal, NamedNode, Node, Statement};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use thiserror::Error;

/// Largest accepted frame body
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const NODE_EMPTY: u8 = 0;
const NODE_RESOURCE: u8 = 1;
const NODE_LITERAL: u8 = 2;
const NODE_BLANK: u8 = 3;

/// Transport codec errors
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The buffer ended inside a value
    #[error("Incomplete data")]
    Incomplete,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Io(e) => Error::from(e),
            other => Error::unknown(format!("transport: {}", other)),
        }
    }
}

/// Append one length-prefixed frame
pub fn encode_frame(body: &[u8], out: &mut BytesMut) -> DecodeResult<()> {
    if body.len() > MAX_FRAME_LEN {
        return Err(DecodeError::Protocol(format!("frame of {} bytes is too large", body.len())));
    }
    out.reserve(4 + body.len());
    out.put_u32_ne(body.len() as u32);
    out.put_slice(body);
    Ok(())
}

/// Split one complete frame body off the front of `buf`. `Ok(None)` means
/// more bytes are needed.
pub fn decode_frame(buf: &mut BytesMut) -> DecodeResult<Option<Bytes>> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let mut header = [0u8; 4];
    header.copy_from_slice(&buf[..4]);
    let len = u32::from_ne_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(DecodeError::Protocol(format!("frame of {} bytes is too large", len)));
    }
    if buf.len() < 4 + len {
        return Ok(None);
    }
    buf.advance(4);
    Ok(Some(buf.split_to(len).freeze()))
}

pub fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

pub fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u32_ne(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

pub fn put_strings(buf: &mut BytesMut, values: &[String]) {
    buf.put_u32_ne(values.len() as u32);
    for value in values {
        put_string(buf, value);
    }
}

pub fn put_node(buf: &mut BytesMut, node: &Node) {
    match node {
        Node::Empty => buf.put_u8(NODE_EMPTY),
        Node::Resource(n) => {
            buf.put_u8(NODE_RESOURCE);
            put_string(buf, n.as_str());
        }
        Node::Literal(l) => {
            buf.put_u8(NODE_LITERAL);
            put_bool(buf, l.is_plain());
            if l.is_plain() {
                put_string(buf, l.value());
                put_string(buf, l.language().unwrap_or_default());
            } else {
                put_string(buf, l.datatype());
                put_string(buf, l.value());
            }
        }
        Node::Blank(b) => {
            buf.put_u8(NODE_BLANK);
            put_string(buf, b.as_str());
        }
    }
}

pub fn put_statement(buf: &mut BytesMut, statement: &Statement) {
    put_node(buf, &statement.subject);
    put_node(buf, &statement.predicate);
    put_node(buf, &statement.object);
    put_node(buf, &statement.context);
}

pub fn put_binding_set(buf: &mut BytesMut, bindings: &BindingSet) {
    buf.put_u32_ne(bindings.len() as u32);
    for (name, node) in bindings.iter() {
        put_string(buf, name);
        put_node(buf, node);
    }
}

/// Error record; `None` is written as code 0 with an empty message
pub fn put_error(buf: &mut BytesMut, error: Option<&Error>) {
    let Some(error) = error else {
        put_bool(buf, false);
        buf.put_i32_ne(0);
        put_string(buf, "");
        return;
    };
    let locator = error.locator();
    put_bool(buf, locator.is_some());
    buf.put_i32_ne(error.raw_code());
    put_string(buf, error.message());
    if let Some(locator) = locator {
        buf.put_i32_ne(locator.line);
        buf.put_i32_ne(locator.column);
        buf.put_i32_ne(locator.byte);
        put_string(buf, &locator.file_name);
    }
}

fn need(buf: &mut impl Buf, len: usize) -> DecodeResult<()> {
    if buf.remaining() < len {
        Err(DecodeError::Incomplete)
    } else {
        Ok(())
    }
}

pub fn get_u8(buf: &mut impl Buf) -> DecodeResult<u8> {
    need(buf, 1)?;
    Ok(buf.get_u8())
}

pub fn get_bool(buf: &mut impl Buf) -> DecodeResult<bool> {
    match get_u8(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(DecodeError::InvalidEncoding(format!("bad boolean byte {}", other))),
    }
}

pub fn get_u16(buf: &mut impl Buf) -> DecodeResult<u16> {
    need(buf, 2)?;
    Ok(buf.get_u16_ne())
}

pub fn get_u32(buf: &mut impl Buf) -> DecodeResult<u32> {
    need(buf, 4)?;
    Ok(buf.get_u32_ne())
}

pub fn get_i32(buf: &mut impl Buf) -> DecodeResult<i32> {
    need(buf, 4)?;
    Ok(buf.get_i32_ne())
}

pub fn get_u64(buf: &mut impl Buf) -> DecodeResult<u64> {
    need(buf, 8)?;
    Ok(buf.get_u64_ne())
}

pub fn get_string(buf: &mut impl Buf) -> DecodeResult<String> {
    let len = get_u32(buf)? as usize;
    need(buf, len)?;
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|e| DecodeError::InvalidEncoding(e.to_string()))
}

pub fn get_strings(buf: &mut impl Buf) -> DecodeResult<Vec<String>> {
    let count = get_u32(buf)? as usize;
    // every string carries at least its length prefix
    need(buf, count.saturating_mul(4))?;
    (0..count).map(|_| get_string(buf)).collect()
}

fn invalid(err: Error) -> DecodeError {
    DecodeError::InvalidEncoding(err.to_string())
}

pub fn get_node(buf: &mut impl Buf) -> DecodeResult<Node> {
    match get_u8(buf)? {
        NODE_EMPTY => Ok(Node::Empty),
        NODE_RESOURCE => Node::resource(&get_string(buf)?).map_err(invalid),
        NODE_LITERAL => {
            if get_bool(buf)? {
                let value = get_string(buf)?;
                let language = get_string(buf)?;
                if language.is_empty() {
                    Ok(Node::literal(value))
                } else {
                    Node::language_literal(value, &language).map_err(invalid)
                }
            } else {
                let datatype = NamedNode::new(&get_string(buf)?).map_err(invalid)?;
                let value = get_string(buf)?;
                Ok(Node::Literal(Literal::new_typed_literal(value, datatype)))
            }
        }
        NODE_BLANK => Node::blank(&get_string(buf)?).map_err(invalid),
        other => Err(DecodeError::InvalidEncoding(format!("unknown node tag {}", other))),
    }
}

pub fn get_statement(buf: &mut impl Buf) -> DecodeResult<Statement> {
    Ok(Statement::new_quad(get_node(buf)?, get_node(buf)?, get_node(buf)?, get_node(buf)?))
}

pub fn get_binding_set(buf: &mut impl Buf) -> DecodeResult<BindingSet> {
    let count = get_u32(buf)? as usize;
    let mut bindings = BindingSet::new();
    for _ in 0..count {
        let name = get_string(buf)?;
        bindings.insert(name, get_node(buf)?);
    }
    Ok(bindings)
}

pub fn get_error(buf: &mut impl Buf) -> DecodeResult<Option<Error>> {
    let is_parser = get_bool(buf)?;
    let code = get_i32(buf)?;
    let message = get_string(buf)?;
    let locator = if is_parser {
        Some(Locator {
            line: get_i32(buf)?,
            column: get_i32(buf)?,
            byte: get_i32(buf)?,
            file_name: get_string(buf)?,
        })
    } else {
        None
    };
    if code == 0 && locator.is_none() {
        return Ok(None);
    }
    Ok(Some(Error::from_parts(code, message, locator)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    #[test]
    fn test_frame_waits_for_full_body() {
        let mut out = BytesMut::new();
        encode_frame(b"hello", &mut out).unwrap();
        let mut partial = BytesMut::from(&out[..6]);
        assert!(decode_frame(&mut partial).unwrap().is_none());
        let mut full = out.clone();
        assert_eq!(decode_frame(&mut full).unwrap().unwrap().as_ref(), b"hello");
        assert!(full.is_empty());
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32_ne(u32::MAX);
        assert!(matches!(decode_frame(&mut buf), Err(DecodeError::Protocol(_))));
    }

    #[test]
    fn test_node_tags() {
        let mut buf = BytesMut::new();
        put_node(&mut buf, &Node::language_literal("chat", "fr").unwrap());
        assert_eq!(buf[0], NODE_LITERAL);
        assert_eq!(buf[1], 1);
        let mut bytes = buf.freeze();
        assert_eq!(get_node(&mut bytes).unwrap(), Node::language_literal("chat", "fr").unwrap());
        assert!(!bytes.has_remaining());
    }

    #[test]
    fn test_parser_error_keeps_locator() {
        let mut buf = BytesMut::new();
        let mut locator = Locator::new(3, 7);
        locator.file_name = "data.ttl".to_string();
        put_error(&mut buf, Some(&Error::parser("bad token", locator.clone())));
        put_error(&mut buf, None);
        let mut bytes = buf.freeze();
        let error = get_error(&mut bytes).unwrap().unwrap();
        assert_eq!(error.code(), ErrorCode::ParsingFailed);
        assert_eq!(error.locator(), Some(&locator));
        assert!(get_error(&mut bytes).unwrap().is_none());
    }

    #[test]
    fn test_truncated_input() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "truncated");
        let mut bytes = buf.freeze().slice(..6);
        assert!(matches!(get_string(&mut bytes), Err(DecodeError::Incomplete)));
        let mut bad = Bytes::from_static(&[9]);
        assert!(matches!(get_node(&mut bad), Err(DecodeError::InvalidEncoding(_))));
    }
}
