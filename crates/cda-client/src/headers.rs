//! Request header construction from caller options.

use reqwest::header::{ACCEPT, CONTENT_TYPE, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

use crate::client::ExecuteQueryOptions;
use crate::error::CdaClientError;

const X_INCLUDE_DRAFTS: HeaderName = HeaderName::from_static("x-include-drafts");
const X_EXCLUDE_INVALID: HeaderName = HeaderName::from_static("x-exclude-invalid");
const X_ENVIRONMENT: HeaderName = HeaderName::from_static("x-environment");
const X_CACHE_TAGS: HeaderName = HeaderName::from_static("x-cache-tags");
const X_VISUAL_EDITING: HeaderName = HeaderName::from_static("x-visual-editing");
const X_BASE_EDITING_URL: HeaderName = HeaderName::from_static("x-base-editing-url");

/// Build the request headers for a Content Delivery API query.
pub fn build_request_headers(
    options: &ExecuteQueryOptions,
) -> Result<HeaderMap, CdaClientError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        AUTHORIZATION,
        header_value(&format!("Bearer {}", options.token), "token")?,
    );

    if options.include_drafts {
        headers.insert(X_INCLUDE_DRAFTS, HeaderValue::from_static("true"));
    }

    if options.exclude_invalid {
        headers.insert(X_EXCLUDE_INVALID, HeaderValue::from_static("true"));
    }

    if let Some(environment) = &options.environment {
        headers.insert(X_ENVIRONMENT, header_value(environment, "environment")?);
    }

    if options.return_cache_tags {
        headers.insert(X_CACHE_TAGS, HeaderValue::from_static("true"));
    }

    if let Some(content_link) = options.content_link {
        headers.insert(
            X_VISUAL_EDITING,
            HeaderValue::from_static(content_link.as_header_value()),
        );
    }

    if let Some(base_editing_url) = &options.base_editing_url {
        headers.insert(
            X_BASE_EDITING_URL,
            header_value(base_editing_url, "base editing URL")?,
        );
    }

    Ok(headers)
}

fn header_value(value: &str, what: &str) -> Result<HeaderValue, CdaClientError> {
    HeaderValue::from_str(value).map_err(|_| CdaClientError::InvalidOptions {
        message: format!("{what} is not a valid header value"),
    })
}
