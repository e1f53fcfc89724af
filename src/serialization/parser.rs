//! Lazy statement parsing on top of the rio parsers

use super::RdfSerialization;
use crate::error::{Error, Locator, Result};
use crate::iterator::{IteratorBackend, StatementIterator};
use crate::rdf::{BlankNode, Literal, NamedNode, Node, Statement};
use oxiri::Iri;
use rio_api::model::{GraphName, Literal as RioLiteral, Quad, Subject, Term, Triple};
use rio_api::parser::{ParseError, QuadsParser, TriplesParser};
use rio_turtle::{NQuadsParser, NTriplesParser, TurtleError, TurtleParser};
use std::collections::VecDeque;
use std::io::{BufReader, Cursor, Read};
use tracing::{trace, warn};

type Reader = BufReader<Box<dyn Read + Send>>;

/// Parse `reader` lazily. `base_uri` resolves relative IRIs in Turtle and
/// is ignored by the line-based formats.
pub fn parse_reader<R: Read + Send + 'static>(
    reader: R,
    format: RdfSerialization,
    base_uri: Option<&str>,
) -> Result<StatementIterator> {
    let reader: Reader = BufReader::new(Box::new(reader));
    let parser: Box<dyn StepParser> = match format {
        RdfSerialization::NTriples => Box::new(Triples(NTriplesParser::new(reader))),
        RdfSerialization::NQuads => Box::new(Quads(NQuadsParser::new(reader))),
        RdfSerialization::Turtle => {
            let base = base_uri
                .map(|iri| Iri::parse(iri.to_string()))
                .transpose()
                .map_err(|e| Error::invalid_argument(format!("invalid base IRI: {}", e)))?;
            Box::new(Triples(TurtleParser::new(reader, base)))
        }
    };
    trace!(%format, "parser opened");
    Ok(StatementIterator::new(ParserBackend {
        parser: Some(parser),
        buffer: VecDeque::new(),
        current: None,
        error: None,
    }))
}

/// Parse an in-memory document
pub fn parse_str(text: &str, format: RdfSerialization, base_uri: Option<&str>) -> Result<StatementIterator> {
    parse_reader(Cursor::new(text.as_bytes().to_vec()), format, base_uri)
}

impl From<TurtleError> for Error {
    fn from(err: TurtleError) -> Self {
        let locator = err
            .textual_position()
            .map(|position| {
                Locator::new(
                    i32::try_from(position.line_number() + 1).unwrap_or(i32::MAX),
                    i32::try_from(position.byte_number() + 1).unwrap_or(i32::MAX),
                )
            })
            .unwrap_or_default();
        Error::parser(err.to_string(), locator)
    }
}

/// One parser step at a time, appending what it produced
trait StepParser: Send {
    fn step(&mut self, out: &mut VecDeque<Statement>) -> Result<()>;
    fn at_end(&self) -> bool;
}

struct Triples<P>(P);

impl<P> StepParser for Triples<P>
where
    P: TriplesParser + Send,
    Error: From<P::Error>,
{
    fn step(&mut self, out: &mut VecDeque<Statement>) -> Result<()> {
        self.0.parse_step(&mut |t: Triple<'_>| -> Result<()> {
            out.push_back(Statement::new(subject(t.subject)?, named(t.predicate.iri), term(t.object)?));
            Ok(())
        })
    }

    fn at_end(&self) -> bool {
        self.0.is_end()
    }
}

struct Quads<P>(P);

impl<P> StepParser for Quads<P>
where
    P: QuadsParser + Send,
    Error: From<P::Error>,
{
    fn step(&mut self, out: &mut VecDeque<Statement>) -> Result<()> {
        self.0.parse_step(&mut |q: Quad<'_>| -> Result<()> {
            let context = match q.graph_name {
                Some(GraphName::NamedNode(n)) => named(n.iri),
                Some(GraphName::BlankNode(b)) => Node::Blank(BlankNode::new_unchecked(b.id)),
                None => Node::Empty,
            };
            out.push_back(Statement::new_quad(
                subject(q.subject)?,
                named(q.predicate.iri),
                term(q.object)?,
                context,
            ));
            Ok(())
        })
    }

    fn at_end(&self) -> bool {
        self.0.is_end()
    }
}

fn named(iri: &str) -> Node {
    Node::Resource(NamedNode::new_unchecked(iri))
}

fn subject(subject: Subject<'_>) -> Result<Node> {
    match subject {
        Subject::NamedNode(n) => Ok(named(n.iri)),
        Subject::BlankNode(b) => Ok(Node::Blank(BlankNode::new_unchecked(b.id))),
        #[allow(unreachable_patterns)]
        _ => Err(Error::not_supported("quoted triples are not supported")),
    }
}

fn term(term: Term<'_>) -> Result<Node> {
    match term {
        Term::NamedNode(n) => Ok(named(n.iri)),
        Term::BlankNode(b) => Ok(Node::Blank(BlankNode::new_unchecked(b.id))),
        Term::Literal(RioLiteral::Simple { value }) => Ok(Node::literal(value)),
        Term::Literal(RioLiteral::LanguageTaggedString { value, language }) => Ok(Node::Literal(
            Literal::new_language_tagged_literal_unchecked(value, language),
        )),
        Term::Literal(RioLiteral::Typed { value, datatype }) => Ok(Node::Literal(Literal::new_typed_literal(
            value,
            NamedNode::new_unchecked(datatype.iri),
        ))),
        #[allow(unreachable_patterns)]
        _ => Err(Error::not_supported("quoted triples are not supported")),
    }
}

/// Statement stream over a document. A failed step records the error and
/// ends the stream after the statements parsed before it.
struct ParserBackend {
    parser: Option<Box<dyn StepParser>>,
    buffer: VecDeque<Statement>,
    current: Option<Statement>,
    error: Option<Error>,
}

impl IteratorBackend<Statement> for ParserBackend {
    fn next(&mut self) -> bool {
        self.error = None;
        loop {
            if let Some(statement) = self.buffer.pop_front() {
                self.current = Some(statement);
                return true;
            }
            let Some(parser) = self.parser.as_mut() else {
                self.current = None;
                return false;
            };
            if parser.at_end() {
                self.parser = None;
                continue;
            }
            if let Err(e) = parser.step(&mut self.buffer) {
                warn!(error = %e, "parsing stopped");
                self.error = Some(e);
                self.parser = None;
            }
        }
    }

    fn current(&self) -> Statement {
        self.current.clone().unwrap_or_default()
    }

    fn close(&mut self) {
        self.parser = None;
        self.buffer.clear();
        self.current = None;
    }

    fn last_error(&self) -> Option<Error> {
        self.error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    #[test]
    fn test_parse_nquads() {
        let text = "<urn:a> <urn:p> \"x\"@en <urn:g> .\n_:b1 <urn:p> \"1\"^^<http://www.w3.org/2001/XMLSchema#integer> .\n";
        let statements = parse_str(text, RdfSerialization::NQuads, None).unwrap().all_statements();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].context, Node::resource("urn:g").unwrap());
        assert_eq!(statements[0].object, Node::language_literal("x", "en").unwrap());
        assert!(statements[1].subject.is_blank());
        assert_eq!(statements[1].object.as_literal().and_then(|l| l.as_i64()), Some(1));
    }

    #[test]
    fn test_parse_turtle_with_base() {
        let text = "@prefix ex: <http://example.org/> .\nex:a ex:p <rel> , \"two\" .";
        let statements = parse_str(text, RdfSerialization::Turtle, Some("http://base.org/doc"))
            .unwrap()
            .all_statements();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].object, Node::resource("http://base.org/rel").unwrap());
    }

    #[test]
    fn test_parse_error_has_locator() {
        let text = "<urn:a> <urn:p> <urn:b> .\n<urn:a> <urn:p> .\n";
        let mut it = parse_str(text, RdfSerialization::NTriples, None).unwrap();
        assert!(it.next());
        assert!(!it.next());
        let error = it.last_error().unwrap();
        assert_eq!(error.code(), ErrorCode::ParsingFailed);
        assert!(error.locator().is_some_and(|l| l.line > 0));
    }

    #[test]
    fn test_invalid_base_iri() {
        assert!(parse_str("", RdfSerialization::Turtle, Some("not an iri")).is_err());
    }
}
