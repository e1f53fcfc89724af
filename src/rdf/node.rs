//! RDF terms
//!
//! Thin wrappers around the oxrdf primitives plus the [`Node`] sum type used
//! by statements, binding sets and every iterator payload.

use super::vocab::{rdf, xsd};
use crate::error::{Error, Locator, Result};
use oxrdf::{BlankNode as OxBlankNode, Literal as OxLiteral, NamedNode as OxNamedNode};
use std::fmt;

/// Named node (IRI)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedNode(OxNamedNode);

impl NamedNode {
    /// Create a new named node from an IRI string
    pub fn new(iri: &str) -> Result<Self> {
        OxNamedNode::new(iri)
            .map(Self)
            .map_err(|e| Error::invalid_argument(format!("invalid IRI <{}>: {}", iri, e)))
    }

    /// Wrap an IRI that a parser has already validated
    pub fn new_unchecked(iri: impl Into<String>) -> Self {
        Self(OxNamedNode::new_unchecked(iri))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn inner(&self) -> &OxNamedNode {
        &self.0
    }
}

impl fmt::Display for NamedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.as_str())
    }
}

impl From<OxNamedNode> for NamedNode {
    fn from(node: OxNamedNode) -> Self {
        Self(node)
    }
}

impl From<NamedNode> for OxNamedNode {
    fn from(node: NamedNode) -> Self {
        node.0
    }
}

/// Blank node (anonymous node)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlankNode(OxBlankNode);

impl BlankNode {
    /// Blank node with the given local identifier
    pub fn new(id: &str) -> Result<Self> {
        OxBlankNode::new(id)
            .map(Self)
            .map_err(|e| Error::invalid_argument(format!("invalid blank node id '{}': {}", id, e)))
    }

    /// Blank node with a fresh random identifier
    pub fn random() -> Self {
        Self(OxBlankNode::default())
    }

    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(OxBlankNode::new_unchecked(id))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn inner(&self) -> &OxBlankNode {
        &self.0
    }
}

impl fmt::Display for BlankNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_:{}", self.as_str())
    }
}

impl From<OxBlankNode> for BlankNode {
    fn from(node: OxBlankNode) -> Self {
        Self(node)
    }
}

/// RDF literal value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal(OxLiteral);

impl Literal {
    /// Create a simple literal (plain string)
    pub fn new_simple_literal(value: impl Into<String>) -> Self {
        Self(OxLiteral::new_simple_literal(value))
    }

    /// Create a literal with language tag
    pub fn new_language_tagged_literal(value: impl Into<String>, language: impl Into<String>) -> Result<Self> {
        OxLiteral::new_language_tagged_literal(value, language)
            .map(Self)
            .map_err(|e| Error::invalid_argument(format!("invalid language tag: {}", e)))
    }

    pub fn new_language_tagged_literal_unchecked(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self(OxLiteral::new_language_tagged_literal_unchecked(value, language))
    }

    /// Create a typed literal
    pub fn new_typed_literal(value: impl Into<String>, datatype: NamedNode) -> Self {
        Self(OxLiteral::new_typed_literal(value, datatype.0))
    }

    /// Get the lexical value
    pub fn value(&self) -> &str {
        self.0.value()
    }

    /// Get the language tag if present
    pub fn language(&self) -> Option<&str> {
        self.0.language()
    }

    /// Datatype IRI; `rdf:langString` for language-tagged literals
    pub fn datatype(&self) -> &str {
        self.0.datatype().as_str()
    }

    /// Plain literals are simple strings and language-tagged strings
    pub fn is_plain(&self) -> bool {
        let datatype = self.datatype();
        datatype == xsd::STRING || datatype == rdf::LANG_STRING
    }

    pub fn as_i64(&self) -> Option<i64> {
        if xsd::INTEGER_TYPES.contains(&self.datatype()) {
            self.value().trim().parse().ok()
        } else {
            None
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.datatype() {
            xsd::DOUBLE | xsd::FLOAT | xsd::DECIMAL => self.value().trim().parse().ok(),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        if self.datatype() != xsd::BOOLEAN {
            return None;
        }
        match self.value().trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }

    pub fn inner(&self) -> &OxLiteral {
        &self.0
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", escape(self.value()))?;
        if let Some(lang) = self.language() {
            write!(f, "@{}", lang)
        } else if self.datatype() == xsd::STRING {
            Ok(())
        } else {
            write!(f, "^^<{}>", self.datatype())
        }
    }
}

impl From<OxLiteral> for Literal {
    fn from(lit: OxLiteral) -> Self {
        Self(lit)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self(OxLiteral::from(value))
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Self(OxLiteral::from(value))
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Self(OxLiteral::from(value))
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Self(OxLiteral::from(value))
    }
}

/// One RDF term, or `Empty` which acts as a wildcard in patterns
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Node {
    #[default]
    Empty,
    Resource(NamedNode),
    Blank(BlankNode),
    Literal(Literal),
}

impl Node {
    pub fn resource(iri: &str) -> Result<Self> {
        NamedNode::new(iri).map(Node::Resource)
    }

    pub fn blank(id: &str) -> Result<Self> {
        BlankNode::new(id).map(Node::Blank)
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Node::Literal(Literal::new_simple_literal(value))
    }

    pub fn language_literal(value: impl Into<String>, language: impl Into<String>) -> Result<Self> {
        Literal::new_language_tagged_literal(value, language).map(Node::Literal)
    }

    pub fn typed_literal(value: impl Into<String>, datatype: &str) -> Result<Self> {
        let datatype = NamedNode::new(datatype)?;
        Ok(Node::Literal(Literal::new_typed_literal(value, datatype)))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }

    pub fn is_valid(&self) -> bool {
        !self.is_empty()
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, Node::Resource(_))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Node::Blank(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Node::Literal(_))
    }

    pub fn uri(&self) -> Option<&str> {
        match self {
            Node::Resource(n) => Some(n.as_str()),
            _ => None,
        }
    }

    pub fn identifier(&self) -> Option<&str> {
        match self {
            Node::Blank(b) => Some(b.as_str()),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Node::Literal(l) => Some(l),
            _ => None,
        }
    }

    /// `pattern` matches this node when it is empty or equal to it.
    pub fn matches(&self, pattern: &Node) -> bool {
        pattern.is_empty() || pattern == self
    }

    /// N-Triples term syntax; the empty node renders as an empty string.
    pub fn to_n3(&self) -> String {
        self.to_string()
    }

    /// Parse N-Triples term syntax: `<iri>`, `_:id`, `"lex"`, `"lex"@lang`,
    /// `"lex"^^<datatype>`. An empty (or blank) string yields `Node::Empty`.
    pub fn from_n3(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Node::Empty);
        }
        if let Some(rest) = text.strip_prefix('<') {
            let iri = rest
                .strip_suffix('>')
                .ok_or_else(|| n3_error("unterminated IRI", text))?;
            return Node::resource(iri);
        }
        if let Some(id) = text.strip_prefix("_:") {
            return Node::blank(id);
        }
        if text.starts_with('"') {
            let (value, rest) = unescape_quoted(text)?;
            if rest.is_empty() {
                return Ok(Node::literal(value));
            }
            if let Some(lang) = rest.strip_prefix('@') {
                return Node::language_literal(value, lang);
            }
            if let Some(datatype) = rest.strip_prefix("^^<").and_then(|r| r.strip_suffix('>')) {
                return Node::typed_literal(value, datatype);
            }
            return Err(n3_error("unexpected literal suffix", text));
        }
        Err(n3_error("not an N-Triples term", text))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Empty => Ok(()),
            Node::Resource(n) => n.fmt(f),
            Node::Blank(b) => b.fmt(f),
            Node::Literal(l) => l.fmt(f),
        }
    }
}

impl From<NamedNode> for Node {
    fn from(node: NamedNode) -> Self {
        Node::Resource(node)
    }
}

impl From<BlankNode> for Node {
    fn from(node: BlankNode) -> Self {
        Node::Blank(node)
    }
}

impl From<Literal> for Node {
    fn from(lit: Literal) -> Self {
        Node::Literal(lit)
    }
}

fn n3_error(what: &str, text: &str) -> Error {
    Error::parser(format!("{}: {}", what, text), Locator::default())
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// Split `"..."rest` into the unescaped string and `rest`.
fn unescape_quoted(text: &str) -> Result<(String, &str)> {
    let mut value = String::new();
    let mut chars = text.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((value, &text[i + 1..])),
            '\\' => {
                let (_, esc) = chars.next().ok_or_else(|| n3_error("dangling escape", text))?;
                match esc {
                    'n' => value.push('\n'),
                    'r' => value.push('\r'),
                    't' => value.push('\t'),
                    'b' => value.push('\u{8}'),
                    'f' => value.push('\u{c}'),
                    '"' | '\\' | '\'' => value.push(esc),
                    'u' | 'U' => {
                        let len = if esc == 'u' { 4 } else { 8 };
                        let hex: String = chars.by_ref().take(len).map(|(_, h)| h).collect();
                        let decoded = u32::from_str_radix(&hex, 16)
                            .ok()
                            .filter(|_| hex.len() == len)
                            .and_then(char::from_u32)
                            .ok_or_else(|| n3_error("invalid unicode escape", text))?;
                        value.push(decoded);
                    }
                    _ => return Err(n3_error("unknown escape", text)),
                }
            }
            c => value.push(c),
        }
    }
    Err(n3_error("unterminated literal", text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_node() {
        let node = Node::resource("http://example.org/alice").unwrap();
        assert!(node.is_resource());
        assert_eq!(node.uri(), Some("http://example.org/alice"));
        assert_eq!(node.to_n3(), "<http://example.org/alice>");
        assert!(Node::resource("not an iri").is_err());
    }

    #[test]
    fn test_literal_forms() {
        assert_eq!(Node::literal("hello").to_n3(), "\"hello\"");
        let tagged = Node::language_literal("bonjour", "fr").unwrap();
        assert_eq!(tagged.to_n3(), "\"bonjour\"@fr");
        let typed = Node::typed_literal("42", xsd::INTEGER).unwrap();
        assert_eq!(typed.to_n3(), format!("\"42\"^^<{}>", xsd::INTEGER));
        assert_eq!(typed.as_literal().and_then(Literal::as_i64), Some(42));
    }

    #[test]
    fn test_n3_round_trip_with_escapes() {
        let original = Node::literal("say \"hi\"\nthen\tleave \\");
        let parsed = Node::from_n3(&original.to_n3()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_from_n3_terms() {
        assert_eq!(Node::from_n3("").unwrap(), Node::Empty);
        assert_eq!(Node::from_n3("_:b0").unwrap(), Node::blank("b0").unwrap());
        assert_eq!(
            Node::from_n3("\"1.5\"^^<http://www.w3.org/2001/XMLSchema#double>").unwrap(),
            Node::Literal(Literal::from(1.5))
        );
        assert_eq!(Node::from_n3("\"caf\\u00E9\"").unwrap(), Node::literal("café"));
        assert!(Node::from_n3("\"open").is_err());
        assert!(Node::from_n3("plain words").is_err());
    }

    #[test]
    fn test_matches_wildcard() {
        let a = Node::resource("urn:a").unwrap();
        assert!(a.matches(&Node::Empty));
        assert!(a.matches(&a.clone()));
        assert!(!a.matches(&Node::resource("urn:b").unwrap()));
    }

    #[test]
    fn test_literal_decoding() {
        assert_eq!(Literal::from(true).as_bool(), Some(true));
        assert_eq!(Literal::from(7i64).as_f64(), Some(7.0));
        assert_eq!(Literal::new_simple_literal("7").as_i64(), None);
        assert!(Literal::new_simple_literal("x").is_plain());
        assert!(!Literal::from(3i64).is_plain());
    }
}
