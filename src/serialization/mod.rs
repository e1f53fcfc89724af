//! RDF serialization formats
//!
//! Supports:
//! - N-Quads (.nq)
//! - N-Triples (.nt)
//! - Turtle (.ttl)
//!
//! Parsing is lazy: [`parse_reader`] returns a [`StatementIterator`] that
//! pulls one parser step from the stream per refill, so a large document or
//! a live HTTP response body is never held in memory at once.

mod parser;
mod serializer;

pub use parser::{parse_reader, parse_str};
pub use serializer::{serialize, serialize_to_string};

use crate::error::{Error, Result};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RdfSerialization {
    NQuads,
    NTriples,
    Turtle,
}

impl RdfSerialization {
    pub fn media_type(self) -> &'static str {
        match self {
            RdfSerialization::NQuads => "application/n-quads",
            RdfSerialization::NTriples => "application/n-triples",
            RdfSerialization::Turtle => "text/turtle",
        }
    }

    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type {
            "application/n-quads" | "text/x-nquads" => Some(RdfSerialization::NQuads),
            "application/n-triples" | "text/plain" => Some(RdfSerialization::NTriples),
            "text/turtle" | "application/x-turtle" => Some(RdfSerialization::Turtle),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            RdfSerialization::NQuads => "nq",
            RdfSerialization::NTriples => "nt",
            RdfSerialization::Turtle => "ttl",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "nq" => Some(RdfSerialization::NQuads),
            "nt" => Some(RdfSerialization::NTriples),
            "ttl" => Some(RdfSerialization::Turtle),
            _ => None,
        }
    }

    /// Whether the format can carry a context per statement
    pub fn supports_contexts(self) -> bool {
        self == RdfSerialization::NQuads
    }
}

impl fmt::Display for RdfSerialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RdfSerialization::NQuads => "nquads",
            RdfSerialization::NTriples => "ntriples",
            RdfSerialization::Turtle => "turtle",
        };
        f.write_str(name)
    }
}

impl FromStr for RdfSerialization {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nquads" | "nq" | "n-quads" => Ok(RdfSerialization::NQuads),
            "ntriples" | "nt" | "n-triples" => Ok(RdfSerialization::NTriples),
            "turtle" | "ttl" => Ok(RdfSerialization::Turtle),
            other => Err(Error::invalid_argument(format!("unknown serialization {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_lookup() {
        assert_eq!("TTL".parse::<RdfSerialization>().unwrap(), RdfSerialization::Turtle);
        assert!("rdfxml".parse::<RdfSerialization>().is_err());
        assert_eq!(
            RdfSerialization::from_path(Path::new("dump.NQ")),
            Some(RdfSerialization::NQuads)
        );
        assert_eq!(
            RdfSerialization::from_media_type(RdfSerialization::NTriples.media_type()),
            Some(RdfSerialization::NTriples)
        );
    }
}
