//! Error types for the Content Delivery API client.

use std::fmt;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::ExecuteQueryOptions;

/// GraphQL error location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlErrorLocation {
    /// Line number in the query (1-based).
    pub line: u32,
    /// Column number in the query (1-based).
    pub column: u32,
}

/// GraphQL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphqlPathSegment {
    /// Field name.
    Key(String),
    /// Array index.
    Index(i64),
}

/// GraphQL error (per GraphQL spec).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    /// Human-readable error message.
    pub message: String,
    /// Location(s) within the query.
    #[serde(default)]
    pub locations: Vec<GraphqlErrorLocation>,
    /// Path within the response where the error occurred.
    #[serde(default)]
    pub path: Vec<GraphqlPathSegment>,
    /// Extensions metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

/// A response body as the client saw it: parsed JSON when the server
/// declared a JSON content type, opaque text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Parsed JSON body.
    Json(serde_json::Value),
    /// Raw text body.
    Text(String),
}

impl ResponseBody {
    /// Returns the top-level `errors` value, if the body is a JSON object
    /// carrying one.
    #[must_use]
    pub fn graphql_errors(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => value.get("errors"),
            Self::Text(_) => None,
        }
    }

    fn serialize(&self) -> String {
        match self {
            Self::Json(value) => value.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

/// Error raised for non-success HTTP responses and GraphQL-level errors.
///
/// Carries enough context (status, headers, body, the serialized query and
/// the options used) to let a caller log or re-triage without re-deriving
/// state.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status code.
    pub status: StatusCode,
    /// HTTP status text.
    pub status_text: String,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body, parsed as far as the content type allowed.
    pub body: ResponseBody,
    /// The serialized query that was sent.
    pub query: String,
    /// The options the request was issued with.
    pub options: ExecuteQueryOptions,
}

impl ApiError {
    /// The GraphQL errors carried by the response body, if any parse as
    /// such.
    #[must_use]
    pub fn graphql_errors(&self) -> Vec<GraphqlError> {
        self.body
            .graphql_errors()
            .and_then(|errors| serde_json::from_value(errors.clone()).ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self.body.serialize();
        if self.status.is_success() {
            write!(f, "Request failed: {body}")
        } else {
            write!(
                f,
                "Request failed with status {} ({}): {body}",
                self.status.as_u16(),
                self.status_text
            )
        }
    }
}

impl std::error::Error for ApiError {}

/// Transport-level failure reported by a [`Transport`](crate::Transport)
/// implementation.
#[derive(Debug, Clone, Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    /// Error message.
    pub message: String,
    /// Whether the failure was a timeout.
    pub is_timeout: bool,
    /// Whether the failure was a connection failure.
    pub is_connect: bool,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            message: err.to_string(),
            is_timeout: err.is_timeout(),
            is_connect: err.is_connect(),
        }
    }
}

/// Error type for Content Delivery API client operations.
#[derive(Debug, Error)]
pub enum CdaClientError {
    /// The query was empty or failed to parse.
    #[error("query is not valid: {reason}")]
    InvalidQuery {
        /// Details.
        reason: String,
    },

    /// No transport was provided and the default one could not be built.
    #[error("no transport available: provide one via `with_transport`")]
    NoTransport,

    /// An option could not be turned into a valid request header.
    #[error("invalid options: {message}")]
    InvalidOptions {
        /// Details.
        message: String,
    },

    /// More than one selection in the query has an oversized `first:`
    /// argument.
    #[error("cannot paginate multiple oversized selections in a single query")]
    MultiplePaginationTargets,

    /// A `first`/`skip` variable resolved to a non-numeric value.
    #[error("expected variable ${name} to be a number")]
    VariableTypeMismatch {
        /// The variable name.
        name: String,
    },

    /// Non-success HTTP response or GraphQL-level errors.
    #[error(transparent)]
    Api(Box<ApiError>),

    /// Transport-level error, propagated unmodified.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<ApiError> for CdaClientError {
    fn from(err: ApiError) -> Self {
        Self::Api(Box::new(err))
    }
}
