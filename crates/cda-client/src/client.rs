//! Query execution and rate-limit retry orchestration.

use std::sync::Arc;
use std::time::Duration;

use graphql_parser::query::{Document, parse_query};
use reqwest::Method;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ApiError, CdaClientError, ResponseBody};
use crate::headers::build_request_headers;
use crate::transport::{Transport, TransportRequest, TransportResponse, default_transport};

/// The Content Delivery API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://graphql.datocms.com/";

/// Default per-request result limit enforced by the server.
pub const DEFAULT_PAGINATION_CEILING: u32 = 100;

const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Content Link embedding mode, sent as the `X-Visual-Editing` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentLinkMode {
    /// Vercel v1 stega encoding.
    VercelV1,
}

impl ContentLinkMode {
    /// The wire value of the mode.
    #[must_use]
    pub const fn as_header_value(self) -> &'static str {
        match self {
            Self::VercelV1 => "vercel-v1",
        }
    }
}

/// A query given either as text or as an already-parsed document.
#[derive(Debug, Clone)]
pub enum QueryInput {
    /// Raw GraphQL text.
    Text(String),
    /// Parsed GraphQL document.
    Document(Document<'static, String>),
}

impl QueryInput {
    /// Serialize to query text. Empty text is rejected.
    pub fn into_text(self) -> Result<String, CdaClientError> {
        match self {
            Self::Text(text) => {
                if text.trim().is_empty() {
                    return Err(CdaClientError::InvalidQuery {
                        reason: "query is empty".to_string(),
                    });
                }
                Ok(text)
            }
            Self::Document(document) => Ok(document.to_string()),
        }
    }

    /// Parse to a document if still textual. Empty or unparseable text is
    /// rejected.
    pub fn into_document(self) -> Result<Document<'static, String>, CdaClientError> {
        match self {
            Self::Text(text) => {
                if text.trim().is_empty() {
                    return Err(CdaClientError::InvalidQuery {
                        reason: "query is empty".to_string(),
                    });
                }
                parse_query::<String>(&text)
                    .map(Document::into_static)
                    .map_err(|err| CdaClientError::InvalidQuery {
                        reason: err.to_string(),
                    })
            }
            Self::Document(document) => Ok(document),
        }
    }
}

impl From<&str> for QueryInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for QueryInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Document<'static, String>> for QueryInput {
    fn from(document: Document<'static, String>) -> Self {
        Self::Document(document)
    }
}

/// Options for executing a query against the Content Delivery API.
#[derive(Debug, Clone)]
pub struct ExecuteQueryOptions {
    /// API token for the project.
    pub token: String,
    /// Variables to send with the query.
    pub variables: Option<Map<String, Value>>,
    /// Return draft versions of records instead of published ones.
    pub include_drafts: bool,
    /// Filter out invalid records.
    pub exclude_invalid: bool,
    /// Environment to query (defaults to the primary environment).
    pub environment: Option<String>,
    /// Receive the cache tags associated with the query.
    pub return_cache_tags: bool,
    /// Embed metadata that enable Content Link.
    pub content_link: Option<ContentLinkMode>,
    /// Base URL of the project, used by Content Link.
    pub base_editing_url: Option<String>,
    /// Endpoint override, mainly for tests.
    pub endpoint: Option<String>,
    /// Transport to use instead of the default reqwest-backed one.
    pub transport: Option<Arc<dyn Transport>>,
    /// Automatically retry on 429 responses (defaults to true).
    pub auto_retry: bool,
    /// Cap on rate-limit retries. `None` retries until the server stops
    /// answering 429.
    pub max_retries: Option<u32>,
    /// Per-request result limit the server enforces on `first:` arguments.
    pub pagination_ceiling: u32,
}

impl ExecuteQueryOptions {
    /// Create options with the given API token and defaults everywhere else.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            variables: None,
            include_drafts: false,
            exclude_invalid: false,
            environment: None,
            return_cache_tags: false,
            content_link: None,
            base_editing_url: None,
            endpoint: None,
            transport: None,
            auto_retry: true,
            max_retries: None,
            pagination_ceiling: DEFAULT_PAGINATION_CEILING,
        }
    }

    /// Set the query variables.
    #[must_use]
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Return draft versions of records.
    #[must_use]
    pub const fn with_include_drafts(mut self, include_drafts: bool) -> Self {
        self.include_drafts = include_drafts;
        self
    }

    /// Filter out invalid records.
    #[must_use]
    pub const fn with_exclude_invalid(mut self, exclude_invalid: bool) -> Self {
        self.exclude_invalid = exclude_invalid;
        self
    }

    /// Query a non-primary environment.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Receive the cache tags associated with the query.
    #[must_use]
    pub const fn with_return_cache_tags(mut self, return_cache_tags: bool) -> Self {
        self.return_cache_tags = return_cache_tags;
        self
    }

    /// Embed Content Link metadata.
    #[must_use]
    pub const fn with_content_link(mut self, mode: ContentLinkMode) -> Self {
        self.content_link = Some(mode);
        self
    }

    /// Set the base editing URL used by Content Link.
    #[must_use]
    pub fn with_base_editing_url(mut self, url: impl Into<String>) -> Self {
        self.base_editing_url = Some(url.into());
        self
    }

    /// Override the endpoint (for testing).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Use a custom transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Enable or disable automatic retry on 429 responses.
    #[must_use]
    pub const fn with_auto_retry(mut self, auto_retry: bool) -> Self {
        self.auto_retry = auto_retry;
        self
    }

    /// Cap the number of rate-limit retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Override the server's per-request result limit.
    #[must_use]
    pub const fn with_pagination_ceiling(mut self, ceiling: u32) -> Self {
        self.pagination_ceiling = ceiling;
        self
    }
}

/// Execute a GraphQL query, returning both the query result and the raw
/// transport response.
///
/// Responses with status 429 are retried after waiting the number of seconds
/// announced by the `X-RateLimit-Reset` header (or `retry_count` seconds when
/// the header is absent), unless `auto_retry` is disabled or `max_retries` is
/// exhausted. Every other non-success response, text body, or body carrying a
/// GraphQL `errors` array surfaces as [`CdaClientError::Api`].
pub async fn raw_execute_query(
    query: impl Into<QueryInput>,
    options: &ExecuteQueryOptions,
) -> Result<(Value, TransportResponse), CdaClientError> {
    let serialized = query.into().into_text()?;

    let transport = options
        .transport
        .clone()
        .or_else(default_transport)
        .ok_or(CdaClientError::NoTransport)?;

    let headers = build_request_headers(options)?;
    let endpoint = options.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT);

    let mut body_map = Map::new();
    body_map.insert("query".to_string(), Value::String(serialized.clone()));
    if let Some(variables) = &options.variables {
        body_map.insert("variables".to_string(), Value::Object(variables.clone()));
    }
    let body = Value::Object(body_map).to_string();

    let mut retry_count: u32 = 0;
    loop {
        let request = TransportRequest {
            method: Method::POST,
            headers: headers.clone(),
            body: body.clone(),
        };

        debug!(endpoint, "issuing GraphQL request");
        let response = transport.send(endpoint, request).await?;

        let parsed = if response.is_json() {
            match serde_json::from_slice::<Value>(&response.body) {
                Ok(value) => ResponseBody::Json(value),
                Err(_) => ResponseBody::Text(response.body_text().into_owned()),
            }
        } else {
            ResponseBody::Text(response.body_text().into_owned())
        };

        if response.status == StatusCode::TOO_MANY_REQUESTS
            && options.auto_retry
            && options.max_retries.is_none_or(|cap| retry_count < cap)
        {
            retry_count += 1;
            let wait_secs = response
                .header(RATE_LIMIT_RESET_HEADER)
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(u64::from(retry_count));
            debug!(wait_secs, retry_count, "rate limited, retrying after wait");
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
            continue;
        }

        let has_graphql_errors = parsed.graphql_errors().is_some();
        if !response.is_success() || matches!(parsed, ResponseBody::Text(_)) || has_graphql_errors
        {
            return Err(ApiError {
                status: response.status,
                status_text: response.status_text.clone(),
                headers: response.headers.clone(),
                body: parsed,
                query: serialized,
                options: options.clone(),
            }
            .into());
        }

        let data = match parsed {
            ResponseBody::Json(Value::Object(mut object)) => {
                object.remove("data").unwrap_or(Value::Null)
            }
            _ => Value::Null,
        };

        return Ok((data, response));
    }
}

/// Execute a GraphQL query, returning only the query result.
pub async fn execute_query(
    query: impl Into<QueryInput>,
    options: &ExecuteQueryOptions,
) -> Result<Value, CdaClientError> {
    let (data, _response) = raw_execute_query(query, options).await?;
    Ok(data)
}
