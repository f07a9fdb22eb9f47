//! Pluggable HTTP transport boundary.
//!
//! The orchestrator never talks to the network directly: it hands a
//! [`TransportRequest`] to a [`Transport`] and interprets the returned
//! [`TransportResponse`]. This is the sole substitution point for tests.

use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};

use crate::error::TransportError;

/// Request handed to a transport: method, headers and serialized body.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: Method,
    /// Request headers.
    pub headers: HeaderMap,
    /// Serialized JSON body.
    pub body: String,
}

/// Response returned by a transport.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// HTTP status text.
    pub status_text: String,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw response body.
    pub body: Bytes,
}

impl TransportResponse {
    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Look up a header value as a string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Returns `true` if the response declares a JSON content type.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.header("content-type")
            .is_some_and(|value| value.contains("application/json"))
    }

    /// The body as (lossy) text.
    #[must_use]
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// A fetch-like function: URL plus request in, response out.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Issue a single HTTP request.
    fn send(
        &self,
        url: &str,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>>;
}

/// Default transport backed by [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with a fresh reqwest client.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }

    /// Wrap an existing reqwest client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        url: &str,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        let client = self.client.clone();
        let url = url.to_string();
        async move {
            let response = client
                .request(request.method, &url)
                .headers(request.headers)
                .body(request.body)
                .send()
                .await?;

            let status = response.status();
            let status_text = status.canonical_reason().unwrap_or_default().to_string();
            let headers = response.headers().clone();
            let body = response.bytes().await?;

            Ok(TransportResponse {
                status,
                status_text,
                headers,
                body,
            })
        }
        .boxed()
    }
}

static DEFAULT_TRANSPORT: OnceLock<Option<Arc<ReqwestTransport>>> = OnceLock::new();

/// The ambient transport used when the caller does not provide one.
pub(crate) fn default_transport() -> Option<Arc<dyn Transport>> {
    DEFAULT_TRANSPORT
        .get_or_init(|| ReqwestTransport::new().ok().map(Arc::new))
        .clone()
        .map(|transport| transport as Arc<dyn Transport>)
}
