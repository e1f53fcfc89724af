//! SPARQL parser using spargebra library

use super::{SparqlError, SparqlResult};
use crate::iterator::ResultShape;
use spargebra::{Query, Update};

/// Query verb, which fixes the shape of the result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryForm {
    Select,
    Construct,
    Ask,
    Describe,
}

impl QueryForm {
    pub fn shape(self) -> ResultShape {
        match self {
            QueryForm::Select => ResultShape::Bindings,
            QueryForm::Ask => ResultShape::Bool,
            QueryForm::Construct | QueryForm::Describe => ResultShape::Graph,
        }
    }
}

/// Parsed SPARQL query
#[derive(Debug)]
pub struct ParsedQuery {
    pub query: Query,
    pub form: QueryForm,
}

/// Parse a SPARQL query string
pub fn parse_query(text: &str) -> SparqlResult<ParsedQuery> {
    let query = Query::parse(text, None).map_err(|e| SparqlError::Parse(e.to_string()))?;
    let form = match &query {
        Query::Select { .. } => QueryForm::Select,
        Query::Construct { .. } => QueryForm::Construct,
        Query::Ask { .. } => QueryForm::Ask,
        Query::Describe { .. } => QueryForm::Describe,
    };
    Ok(ParsedQuery { query, form })
}

/// Parse a SPARQL UPDATE string
pub fn parse_update(text: &str) -> SparqlResult<Update> {
    Update::parse(text, None).map_err(|e| SparqlError::Parse(e.to_string()))
}

/// Guess the verb of a query without parsing it, for endpoints that accept
/// syntax beyond SPARQL 1.1. Prologue lines and comments are skipped.
pub fn query_form_hint(text: &str) -> Option<QueryForm> {
    let mut rest = text;
    loop {
        rest = rest.trim_start();
        if rest.starts_with('#') {
            rest = rest.split_once('\n').map_or("", |(_, tail)| tail);
            continue;
        }
        let word: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();
        match word.as_str() {
            "SELECT" => return Some(QueryForm::Select),
            "CONSTRUCT" => return Some(QueryForm::Construct),
            "ASK" => return Some(QueryForm::Ask),
            "DESCRIBE" => return Some(QueryForm::Describe),
            "PREFIX" | "BASE" => {
                // skip to the end of the IRI that closes the declaration
                let end = rest.find('>')?;
                rest = &rest[end + 1..];
            }
            _ => return None,
        }
    }
}
