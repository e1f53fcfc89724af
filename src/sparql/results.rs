//! SPARQL 1.1 query results JSON format
//!
//! <https://www.w3.org/TR/sparql11-results-json/>

use super::{SparqlError, SparqlResult};
use crate::iterator::{QueryResultIterator, ResultShape, SimpleQueryResult};
use crate::rdf::{BindingSet, Node};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;

/// Media type of the JSON results format
pub const JSON_MEDIA_TYPE: &str = "application/sparql-results+json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    head: Head,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    results: Option<Results>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    boolean: Option<bool>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Head {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    vars: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Results {
    bindings: Vec<HashMap<String, JsonTerm>>,
}

/// One bound value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonTerm {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    #[serde(rename = "xml:lang", default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

impl JsonTerm {
    pub fn from_node(node: &Node) -> Option<Self> {
        let term = match node {
            Node::Empty => return None,
            Node::Resource(n) => Self::plain("uri", n.as_str()),
            Node::Blank(b) => Self::plain("bnode", b.as_str()),
            Node::Literal(l) => {
                let mut term = Self::plain("literal", l.value());
                if let Some(lang) = l.language() {
                    term.lang = Some(lang.to_string());
                } else if !l.is_plain() {
                    term.datatype = Some(l.datatype().to_string());
                }
                term
            }
        };
        Some(term)
    }

    fn plain(kind: &str, value: &str) -> Self {
        Self {
            kind: kind.to_string(),
            value: value.to_string(),
            lang: None,
            datatype: None,
        }
    }

    pub fn to_node(&self) -> SparqlResult<Node> {
        let node = match self.kind.as_str() {
            "uri" => Node::resource(&self.value),
            "bnode" => Node::blank(&self.value),
            // "typed-literal" is the pre-recommendation spelling some
            // endpoints still emit
            "literal" | "typed-literal" => match (&self.lang, &self.datatype) {
                (Some(lang), _) => Node::language_literal(self.value.clone(), lang.clone()),
                (None, Some(datatype)) => Node::typed_literal(self.value.clone(), datatype),
                (None, None) => Ok(Node::literal(self.value.clone())),
            },
            other => return Err(SparqlError::Results(format!("unknown term type {}", other))),
        };
        node.map_err(|e| SparqlError::Results(e.message().to_string()))
    }
}

/// Read a results document into a materialised binding or boolean result
pub fn parse_json(reader: impl Read) -> SparqlResult<SimpleQueryResult> {
    let document: Document =
        serde_json::from_reader(reader).map_err(|e| SparqlError::Results(e.to_string()))?;
    if let Some(answer) = document.boolean {
        return Ok(SimpleQueryResult::boolean(answer));
    }
    let names = document.head.vars;
    let mut rows = Vec::new();
    for solution in document.results.unwrap_or_default().bindings {
        let mut row = BindingSet::new();
        for name in &names {
            let node = match solution.get(name) {
                Some(term) => term.to_node()?,
                None => Node::Empty,
            };
            row.insert(name.clone(), node);
        }
        rows.push(row);
    }
    Ok(SimpleQueryResult::bindings(names, rows))
}

/// Drain a binding or boolean result into a JSON results document
pub fn write_json(result: &mut QueryResultIterator) -> SparqlResult<String> {
    let document = match result.shape() {
        Some(ResultShape::Bool) => Document {
            boolean: Some(result.bool_value()),
            ..Document::default()
        },
        Some(ResultShape::Bindings) => {
            let vars = result.binding_names();
            let mut bindings = Vec::new();
            while result.next() {
                let row = result.current();
                let solution = row
                    .iter()
                    .filter_map(|(name, node)| JsonTerm::from_node(node).map(|t| (name.to_string(), t)))
                    .collect();
                bindings.push(solution);
            }
            Document {
                head: Head { vars },
                results: Some(Results { bindings }),
                boolean: None,
            }
        }
        _ => return Err(SparqlError::Results("graph results have no JSON form".to_string())),
    };
    serde_json::to_string(&document).map_err(|e| SparqlError::Results(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bindings() {
        let text = r#"{
            "head": { "vars": ["s", "o"] },
            "results": { "bindings": [
                { "s": { "type": "uri", "value": "http://example.org/a" },
                  "o": { "type": "literal", "value": "chat", "xml:lang": "fr" } },
                { "s": { "type": "bnode", "value": "b0" } }
            ] }
        }"#;
        let mut it = QueryResultIterator::new(parse_json(text.as_bytes()).unwrap());
        assert_eq!(it.binding_names(), vec!["s", "o"]);
        assert!(it.next());
        assert_eq!(it.binding("o"), Node::language_literal("chat", "fr").unwrap());
        assert!(it.next());
        assert!(it.binding("s").is_blank());
        assert_eq!(it.binding("o"), Node::Empty);
        assert!(!it.next());
    }

    #[test]
    fn test_read_boolean() {
        let mut it = QueryResultIterator::new(parse_json(r#"{"head":{},"boolean":true}"#.as_bytes()).unwrap());
        assert!(it.is_bool());
        assert!(it.bool_value());
        assert!(it.next());
    }

    #[test]
    fn test_write_then_read() {
        let typed = Node::typed_literal("42", crate::rdf::vocab::xsd::INTEGER).unwrap();
        let rows = vec![[("x", typed.clone())].into_iter().collect()];
        let mut it = QueryResultIterator::new(SimpleQueryResult::bindings(vec!["x".to_string()], rows));
        let text = write_json(&mut it).unwrap();
        assert!(text.contains("\"datatype\""));
        let mut back = QueryResultIterator::new(parse_json(text.as_bytes()).unwrap());
        assert!(back.next());
        assert_eq!(back.binding("x"), typed);
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(parse_json("{".as_bytes()), Err(SparqlError::Results(_))));
    }
}
