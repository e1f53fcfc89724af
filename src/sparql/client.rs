//! SPARQL 1.1 protocol client

use super::parser::{parse_query, query_form_hint, QueryForm};
use super::results::{parse_json, JSON_MEDIA_TYPE};
use crate::error::{Error, ErrorCode, Locator, Result};
use crate::iterator::{QueryResultIterator, StatementQueryResultBackend};
use crate::serialization::{parse_reader, RdfSerialization};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, error};

const GRAPH_ACCEPT: &str = "application/n-triples, text/turtle;q=0.9, application/n-quads;q=0.8";

/// Blocking client for one query/update endpoint.
///
/// Graph responses are parsed while the caller iterates, straight from the
/// open response body.
#[derive(Debug, Clone)]
pub struct SparqlClient {
    http: Client,
    endpoint: String,
    credentials: Option<(String, Option<String>)>,
}

impl SparqlClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_timeout(endpoint, None)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            endpoint: endpoint.into(),
            credentials: None,
        })
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: Option<String>) -> Self {
        self.credentials = Some((user.into(), password));
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, content_type: &str, body: &str) -> RequestBuilder {
        let request = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, content_type)
            .body(body.to_string());
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, password.as_deref()),
            None => request,
        }
    }

    /// Run a query. The verb picks the `Accept` header; queries spargebra
    /// cannot parse are sent anyway when their verb is recognisable.
    pub fn query(&self, query: &str) -> Result<QueryResultIterator> {
        let form = match parse_query(query) {
            Ok(parsed) => parsed.form,
            Err(e) => query_form_hint(query).ok_or(e)?,
        };
        let accept = match form {
            QueryForm::Select | QueryForm::Ask => JSON_MEDIA_TYPE,
            QueryForm::Construct | QueryForm::Describe => GRAPH_ACCEPT,
        };
        debug!(endpoint = %self.endpoint, ?form, "sending query");
        let response = self
            .request("application/sparql-query", query)
            .header(ACCEPT, accept)
            .send()?;
        let response = check_status(response)?;
        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
            .unwrap_or_default();

        if let Some(format) = RdfSerialization::from_media_type(&media_type) {
            let statements = parse_reader(response, format, Some(&self.endpoint))?;
            return Ok(QueryResultIterator::new(StatementQueryResultBackend::new(statements)));
        }
        if media_type.is_empty() || media_type.ends_with("json") {
            return Ok(QueryResultIterator::new(parse_json(response)?));
        }
        Err(Error::not_supported(format!("unsupported result media type {}", media_type)))
    }

    /// Run a SPARQL Update request
    pub fn update(&self, update: &str) -> Result<()> {
        debug!(endpoint = %self.endpoint, "sending update");
        let response = self.request("application/sparql-update", update).send()?;
        check_status(response)?;
        Ok(())
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let message = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body.trim())
    };
    error!(%status, "endpoint rejected request");
    Err(match status {
        StatusCode::BAD_REQUEST => Error::parser(message, Locator::default()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::permission_denied(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Error::timeout(message),
        _ => Error::engine(ErrorCode::Unknown.as_i32() + i32::from(status.as_u16()), message),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unparseable_query_is_rejected_locally() {
        let client = SparqlClient::new("http://127.0.0.1:9/sparql").unwrap();
        let err = client.query("FROB ?x").unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::ParsingFailed);
    }

    #[test]
    fn test_unreachable_endpoint_reports_error() {
        let client = SparqlClient::with_timeout("http://127.0.0.1:9/sparql", Some(Duration::from_millis(500))).unwrap();
        assert!(client.query("ASK { ?s ?p ?o }").is_err());
    }
}
