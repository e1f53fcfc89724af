//! SPARQL protocol endpoint over any model

use super::parser::parse_update;
use super::results::{write_json, JSON_MEDIA_TYPE};
use crate::error::{Error, ErrorCode, Result};
use crate::model::{Model, QueryLanguage};
use crate::rdf::{Node, Statement};
use crate::serialization::{serialize, RdfSerialization};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use spargebra::term::GraphName;
use spargebra::GraphUpdateOperation;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct QueryParams {
    query: Option<String>,
}

/// Serves `GET /sparql?query=` and `POST /sparql` with a
/// `application/sparql-query` or `application/sparql-update` body.
///
/// Each request runs on the blocking pool so an iterator is created,
/// drained and closed on one thread.
#[derive(Clone)]
pub struct SparqlHttpEndpoint {
    model: Arc<dyn Model>,
}

impl SparqlHttpEndpoint {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/sparql", get(get_handler).post(post_handler))
            .with_state(self.model.clone())
    }

    /// Serve on an already bound listener until the task is dropped
    pub async fn serve(&self, listener: tokio::net::TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("SPARQL endpoint listening on http://{}/sparql", addr);
        }
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    pub async fn start(&self, address: &str, port: u16) -> Result<()> {
        let listener = tokio::net::TcpListener::bind((address, port)).await?;
        self.serve(listener).await
    }
}

async fn get_handler(State(model): State<Arc<dyn Model>>, Query(params): Query<QueryParams>) -> Response {
    match params.query {
        Some(query) => run_query(model, query).await,
        None => (StatusCode::BAD_REQUEST, "missing query parameter").into_response(),
    }
}

async fn post_handler(State(model): State<Arc<dyn Model>>, headers: HeaderMap, body: String) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if content_type.starts_with("application/sparql-update") {
        let outcome = tokio::task::spawn_blocking(move || apply_update(model.as_ref(), &body)).await;
        return match outcome {
            Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
            Ok(Err(e)) => error_response(&e),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        };
    }
    if content_type.starts_with("application/sparql-query") {
        return run_query(model, body).await;
    }
    (StatusCode::UNSUPPORTED_MEDIA_TYPE, "expected a SPARQL query or update body").into_response()
}

async fn run_query(model: Arc<dyn Model>, query: String) -> Response {
    debug!(%query, "endpoint query");
    let outcome = tokio::task::spawn_blocking(move || -> Result<(String, String)> {
        let mut result = model.execute_query(&query, &QueryLanguage::Sparql)?;
        let rendered = if result.is_graph() {
            let mut statements = result.iterate_statements();
            let mut out = Vec::new();
            serialize(&mut statements, &mut out, RdfSerialization::NTriples)?;
            statements.close();
            let text = String::from_utf8(out).map_err(|e| Error::unknown(e.to_string()))?;
            (RdfSerialization::NTriples.media_type().to_string(), text)
        } else {
            (JSON_MEDIA_TYPE.to_string(), write_json(&mut result)?)
        };
        result.close();
        Ok(rendered)
    })
    .await;
    match outcome {
        Ok(Ok((media_type, body))) => ([(header::CONTENT_TYPE, media_type)], body).into_response(),
        Ok(Err(e)) => error_response(&e),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Apply `INSERT DATA` / `DELETE DATA` operations in order
fn apply_update(model: &dyn Model, text: &str) -> Result<()> {
    let update = parse_update(text)?;
    for operation in &update.operations {
        match operation {
            GraphUpdateOperation::InsertData { data } => {
                for quad in data {
                    let statement = Statement::new_quad(
                        Node::from_n3(&quad.subject.to_string())?,
                        Node::from_n3(&quad.predicate.to_string())?,
                        Node::from_n3(&quad.object.to_string())?,
                        graph_node(&quad.graph_name)?,
                    );
                    model.add_statement(&statement)?;
                }
            }
            GraphUpdateOperation::DeleteData { data } => {
                for quad in data {
                    let statement = Statement::new_quad(
                        Node::from_n3(&quad.subject.to_string())?,
                        Node::from_n3(&quad.predicate.to_string())?,
                        Node::from_n3(&quad.object.to_string())?,
                        graph_node(&quad.graph_name)?,
                    );
                    model.remove_statement(&statement)?;
                }
            }
            _ => return Err(Error::not_supported("only INSERT DATA and DELETE DATA updates are supported")),
        }
    }
    Ok(())
}

fn graph_node(name: &GraphName) -> Result<Node> {
    match name {
        GraphName::NamedNode(n) => Node::resource(n.as_str()),
        GraphName::DefaultGraph => Ok(Node::Empty),
    }
}

fn error_response(error: &Error) -> Response {
    let status = match error.code() {
        ErrorCode::InvalidArgument | ErrorCode::ParsingFailed => StatusCode::BAD_REQUEST,
        ErrorCode::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorCode::NotSupported => StatusCode::NOT_IMPLEMENTED,
        ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemoryModel;

    #[test]
    fn test_apply_update() {
        let model = MemoryModel::new();
        apply_update(
            &model,
            "INSERT DATA { <urn:a> <urn:p> \"x\"@en . GRAPH <urn:g> { <urn:a> <urn:p> <urn:b> } }",
        )
        .unwrap();
        assert_eq!(model.statement_count().unwrap(), 2);
        assert!(model.contains_context(&Node::resource("urn:g").unwrap()).unwrap());
        apply_update(&model, "DELETE DATA { <urn:a> <urn:p> \"x\"@en }").unwrap();
        assert_eq!(model.statement_count().unwrap(), 1);
    }

    #[test]
    fn test_unsupported_update() {
        let model = MemoryModel::new();
        let err = apply_update(&model, "CLEAR ALL").unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotSupported);
    }
}
