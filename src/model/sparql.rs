//! Remote SPARQL endpoint model
//!
//! Every model operation is translated into a SPARQL query or update and
//! sent over HTTP. Only the iterator lifetime is coupled to the local lock;
//! the endpoint decides its own isolation.

use super::registry::{LockCoupling, LockMode};
use super::{Model, QueryLanguage};
use crate::error::{Error, ErrorCache, Result};
use crate::iterator::{LeasedBackend, NodeIterator, QueryResultIterator, StatementIterator};
use crate::rdf::{Node, Statement};
use crate::sparql::SparqlClient;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Model backed by a SPARQL 1.1 protocol endpoint
pub struct SparqlModel {
    client: SparqlClient,
    coupling: Arc<LockCoupling>,
    errors: ErrorCache,
}

impl SparqlModel {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self::with_client(SparqlClient::new(endpoint)?))
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self::with_client(SparqlClient::with_timeout(endpoint, Some(timeout))?))
    }

    pub fn with_client(client: SparqlClient) -> Self {
        debug!(endpoint = client.endpoint(), "sparql model created");
        Self {
            client,
            coupling: LockCoupling::new(),
            errors: ErrorCache::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.client.endpoint()
    }

    pub fn open_iterators(&self) -> usize {
        self.coupling.open_iterators()
    }

    fn query(&self, query: &str) -> Result<QueryResultIterator> {
        let lease = self.coupling.acquire(LockMode::Read);
        match self.client.query(query) {
            Ok(result) => Ok(QueryResultIterator::new(LeasedBackend::new(result, lease))),
            Err(e) => {
                lease.close();
                Err(e)
            }
        }
    }

    fn ask(&self, query: &str) -> Result<bool> {
        let mut result = self.query(query)?;
        let answer = result.bool_value();
        let error = result.last_error();
        result.close();
        match error {
            Some(e) => Err(e),
            None => Ok(answer),
        }
    }

    fn do_list(&self, partial: &Statement) -> Result<StatementIterator> {
        let query = format!("SELECT * WHERE {{ {} }}", where_clause(partial));
        let result = self.query(&query)?;
        Ok(result.iterate_statements_from_bindings(
            column(&partial.subject, "s"),
            column(&partial.predicate, "p"),
            column(&partial.object, "o"),
            column(&partial.context, "g"),
            partial.clone(),
        ))
    }

    fn do_remove_all(&self, partial: &Statement) -> Result<()> {
        if partial.is_valid() {
            return self.client.update(&data_update("DELETE", std::slice::from_ref(partial)));
        }
        let mut it = self.do_list(partial)?;
        let matches = it.all_statements();
        let error = it.last_error();
        it.close();
        if let Some(e) = error {
            return Err(e);
        }
        if matches.is_empty() {
            return Ok(());
        }
        debug!(count = matches.len(), "removing listed statements");
        self.client.update(&data_update("DELETE", &matches))
    }
}

impl Drop for SparqlModel {
    fn drop(&mut self) {
        self.coupling.close_all();
    }
}

impl fmt::Debug for SparqlModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparqlModel").field("endpoint", &self.endpoint()).finish()
    }
}

fn column<'a>(node: &Node, name: &'a str) -> &'a str {
    if node.is_empty() {
        name
    } else {
        ""
    }
}

fn term(node: &Node, variable: &str) -> String {
    if node.is_empty() {
        format!("?{}", variable)
    } else {
        node.to_n3()
    }
}

/// Graph pattern for `partial`. A wildcard context matches the default
/// graph and every named graph.
fn where_clause(partial: &Statement) -> String {
    let triple = format!(
        "{} {} {} .",
        term(&partial.subject, "s"),
        term(&partial.predicate, "p"),
        term(&partial.object, "o")
    );
    if partial.context.is_empty() {
        format!("{{ {} }} UNION {{ GRAPH ?g {{ {} }} }}", triple, triple)
    } else {
        format!("GRAPH {} {{ {} }}", partial.context.to_n3(), triple)
    }
}

/// Strict pattern for one complete statement: an empty context is the
/// default graph only
fn exact_clause(statement: &Statement) -> String {
    let triple = format!(
        "{} {} {} .",
        statement.subject.to_n3(),
        statement.predicate.to_n3(),
        statement.object.to_n3()
    );
    if statement.context.is_empty() {
        triple
    } else {
        format!("GRAPH {} {{ {} }}", statement.context.to_n3(), triple)
    }
}

fn data_update(verb: &str, statements: &[Statement]) -> String {
    let body: Vec<String> = statements.iter().map(exact_clause).collect();
    format!("{} DATA {{ {} }}", verb, body.join(" "))
}

impl Model for SparqlModel {
    fn add_statement(&self, statement: &Statement) -> Result<()> {
        if !statement.is_valid() {
            return self
                .errors
                .track(Err(Error::invalid_argument(format!("cannot add invalid statement {}", statement))));
        }
        self.errors
            .track(self.client.update(&data_update("INSERT", std::slice::from_ref(statement))))
    }

    fn add_statements(&self, statements: &[Statement]) -> Result<()> {
        if let Some(invalid) = statements.iter().find(|s| !s.is_valid()) {
            return self
                .errors
                .track(Err(Error::invalid_argument(format!("cannot add invalid statement {}", invalid))));
        }
        if statements.is_empty() {
            return self.errors.track(Ok(()));
        }
        self.errors.track(self.client.update(&data_update("INSERT", statements)))
    }

    fn remove_statement(&self, statement: &Statement) -> Result<()> {
        if !statement.is_valid() {
            return self
                .errors
                .track(Err(Error::invalid_argument(format!("cannot remove invalid statement {}", statement))));
        }
        self.errors
            .track(self.client.update(&data_update("DELETE", std::slice::from_ref(statement))))
    }

    fn remove_all_statements(&self, partial: &Statement) -> Result<()> {
        self.errors.track(self.do_remove_all(partial))
    }

    fn list_statements(&self, partial: &Statement) -> Result<StatementIterator> {
        self.errors.track(self.do_list(partial))
    }

    fn list_contexts(&self) -> Result<NodeIterator> {
        let result = self.query("SELECT DISTINCT ?g WHERE { GRAPH ?g { ?s ?p ?o } }");
        self.errors.track(result.map(|r| r.iterate_bindings("g")))
    }

    fn execute_query(&self, query: &str, language: &QueryLanguage) -> Result<QueryResultIterator> {
        if *language != QueryLanguage::Sparql {
            return self.errors.track(Err(Error::invalid_argument(format!(
                "a SPARQL endpoint cannot run {} queries",
                language
            ))));
        }
        self.errors.track(self.query(query))
    }

    fn contains_statement(&self, statement: &Statement) -> Result<bool> {
        if !statement.is_valid() {
            return self.errors.track(Err(Error::invalid_argument("cannot check an invalid statement")));
        }
        self.errors
            .track(self.ask(&format!("ASK {{ {} }}", exact_clause(statement))))
    }

    fn contains_any_statement(&self, partial: &Statement) -> Result<bool> {
        self.errors
            .track(self.ask(&format!("ASK {{ {} }}", where_clause(partial))))
    }

    fn statement_count(&self) -> Result<usize> {
        self.errors
            .track(Err(Error::not_supported("a SPARQL endpoint does not report its size")))
    }

    fn is_empty(&self) -> Result<bool> {
        let any = self.contains_any_statement(&Statement::any())?;
        Ok(!any)
    }

    fn create_blank_node(&self) -> Result<Node> {
        self.errors
            .track(Err(Error::not_supported("a SPARQL endpoint cannot mint blank nodes")))
    }

    fn last_error(&self) -> Option<Error> {
        self.errors.last_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;

    fn res(iri: &str) -> Node {
        Node::resource(iri).unwrap()
    }

    #[test]
    fn test_where_clause_forms() {
        let partial = Statement::new(res("urn:a"), Node::Empty, Node::Empty);
        assert_eq!(
            where_clause(&partial),
            "{ <urn:a> ?p ?o . } UNION { GRAPH ?g { <urn:a> ?p ?o . } }"
        );
        let in_graph = Statement::any().with_context(res("urn:g"));
        assert_eq!(where_clause(&in_graph), "GRAPH <urn:g> { ?s ?p ?o . }");
        assert_eq!(column(&partial.subject, "s"), "");
        assert_eq!(column(&partial.object, "o"), "o");
    }

    #[test]
    fn test_data_update() {
        let st = Statement::new(res("urn:a"), res("urn:p"), Node::literal("x"));
        let update = data_update("INSERT", &[st.clone(), st.with_context(res("urn:g"))]);
        assert_eq!(
            update,
            "INSERT DATA { <urn:a> <urn:p> \"x\" . GRAPH <urn:g> { <urn:a> <urn:p> \"x\" . } }"
        );
    }

    #[test]
    fn test_local_rejections() {
        let model = SparqlModel::new("http://127.0.0.1:9/sparql").unwrap();
        assert_eq!(model.statement_count().unwrap_err().code(), ErrorCode::NotSupported);
        assert_eq!(model.create_blank_node().unwrap_err().code(), ErrorCode::NotSupported);
        let err = model.execute_query("SELECT 1", &QueryLanguage::Sql).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert_eq!(model.last_error().map(|e| e.code()), Some(ErrorCode::InvalidArgument));
        let err = model.add_statement(&Statement::any()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert_eq!(model.open_iterators(), 0);
    }
}
