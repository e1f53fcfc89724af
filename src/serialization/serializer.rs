//! Streaming serialization through the rio formatters

use super::RdfSerialization;
use crate::error::{Error, Result};
use crate::iterator::{SimpleIteratorBackend, StatementIterator};
use crate::rdf::vocab::xsd;
use crate::rdf::{Node, Statement};
use rio_api::formatter::{QuadsFormatter, TriplesFormatter};
use rio_api::model::{
    BlankNode as RioBlankNode, GraphName, Literal as RioLiteral, NamedNode as RioNamedNode, Quad, Subject,
    Term, Triple,
};
use rio_turtle::{NQuadsFormatter, NTriplesFormatter, TurtleFormatter};
use std::io::Write;
use tracing::debug;

/// Write every remaining statement of `statements` to `writer`, returning
/// how many were written. Triple formats drop the context.
pub fn serialize<W: Write>(statements: &mut StatementIterator, writer: W, format: RdfSerialization) -> Result<usize> {
    let mut count = 0;
    match format {
        RdfSerialization::NTriples => {
            let mut formatter = NTriplesFormatter::new(writer);
            while statements.next() {
                let statement = statements.current();
                formatter.format(&triple(&statement)?)?;
                count += 1;
            }
            formatter.finish()?;
        }
        RdfSerialization::Turtle => {
            let mut formatter = TurtleFormatter::new(writer);
            while statements.next() {
                let statement = statements.current();
                formatter.format(&triple(&statement)?)?;
                count += 1;
            }
            formatter.finish()?;
        }
        RdfSerialization::NQuads => {
            let mut formatter = NQuadsFormatter::new(writer);
            while statements.next() {
                let statement = statements.current();
                let t = triple(&statement)?;
                let graph_name = match &statement.context {
                    Node::Resource(n) => Some(GraphName::NamedNode(RioNamedNode { iri: n.as_str() })),
                    Node::Blank(b) => Some(GraphName::BlankNode(RioBlankNode { id: b.as_str() })),
                    _ => None,
                };
                formatter.format(&Quad {
                    subject: t.subject,
                    predicate: t.predicate,
                    object: t.object,
                    graph_name,
                })?;
                count += 1;
            }
            formatter.finish()?;
        }
    }
    if let Some(error) = statements.last_error() {
        return Err(error);
    }
    debug!(count, %format, "statements serialized");
    Ok(count)
}

/// Serialize a statement slice into a string
pub fn serialize_to_string(statements: &[Statement], format: RdfSerialization) -> Result<String> {
    let mut it = StatementIterator::new(SimpleIteratorBackend::new(statements.to_vec()));
    let mut out = Vec::new();
    serialize(&mut it, &mut out, format)?;
    String::from_utf8(out).map_err(|e| Error::unknown(e.to_string()))
}

fn triple(statement: &Statement) -> Result<Triple<'_>> {
    let subject = match &statement.subject {
        Node::Resource(n) => Subject::NamedNode(RioNamedNode { iri: n.as_str() }),
        Node::Blank(b) => Subject::BlankNode(RioBlankNode { id: b.as_str() }),
        _ => return Err(invalid(statement)),
    };
    let predicate = match &statement.predicate {
        Node::Resource(n) => RioNamedNode { iri: n.as_str() },
        _ => return Err(invalid(statement)),
    };
    let object = match &statement.object {
        Node::Resource(n) => Term::NamedNode(RioNamedNode { iri: n.as_str() }),
        Node::Blank(b) => Term::BlankNode(RioBlankNode { id: b.as_str() }),
        Node::Literal(l) => Term::Literal(match l.language() {
            Some(language) => RioLiteral::LanguageTaggedString {
                value: l.value(),
                language,
            },
            None if l.datatype() == xsd::STRING => RioLiteral::Simple { value: l.value() },
            None => RioLiteral::Typed {
                value: l.value(),
                datatype: RioNamedNode { iri: l.datatype() },
            },
        }),
        Node::Empty => return Err(invalid(statement)),
    };
    Ok(Triple {
        subject,
        predicate,
        object,
    })
}

fn invalid(statement: &Statement) -> Error {
    Error::invalid_argument(format!("cannot serialize incomplete statement {}", statement))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::parse_str;

    fn sample() -> Vec<Statement> {
        let a = Node::resource("http://example.org/a").unwrap();
        let p = Node::resource("http://example.org/p").unwrap();
        vec![
            Statement::new(a.clone(), p.clone(), Node::literal("plain \"quoted\"")),
            Statement::new(a.clone(), p.clone(), Node::from(crate::rdf::Literal::from(7i64)))
                .with_context(Node::resource("http://example.org/g").unwrap()),
            Statement::new(Node::blank("x").unwrap(), p, a),
        ]
    }

    #[test]
    fn test_nquads_keeps_contexts() {
        let text = serialize_to_string(&sample(), RdfSerialization::NQuads).unwrap();
        let back = parse_str(&text, RdfSerialization::NQuads, None).unwrap().all_statements();
        assert_eq!(back.len(), 3);
        assert_eq!(back[0], sample()[0]);
        assert_eq!(back[1], sample()[1]);
    }

    #[test]
    fn test_triples_drop_contexts() {
        let text = serialize_to_string(&sample(), RdfSerialization::NTriples).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(!text.contains("http://example.org/g"));
        let turtle = serialize_to_string(&sample(), RdfSerialization::Turtle).unwrap();
        let back = parse_str(&turtle, RdfSerialization::Turtle, None).unwrap().all_statements();
        assert_eq!(back.len(), 3);
    }

    #[test]
    fn test_incomplete_statement_is_rejected() {
        let pattern = Statement::any();
        let err = serialize_to_string(&[pattern], RdfSerialization::NTriples).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::InvalidArgument);
    }
}
