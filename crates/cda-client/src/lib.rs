//! Client helper for the DatoCMS Content Delivery API.
//!
//! This crate provides:
//! - Query execution against the Content Delivery API with a typed error
//!   taxonomy.
//! - Transparent retry on rate-limit (429) responses, honoring the
//!   `X-RateLimit-Reset` hint.
//! - Automatic pagination for queries whose `first:` argument exceeds the
//!   per-request result limit: the query is rewritten into bounded chunks,
//!   executed once, and the partial results are merged back together.
//! - A pluggable transport boundary for testing.
//!
//! Only a single selection per query may carry an oversized `first:`
//! argument; multiple oversized selections are a hard error.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::doc_markdown)]

mod client;
mod error;
mod headers;
mod merge;
mod pagination;
mod transport;

pub use client::{
    ContentLinkMode, DEFAULT_ENDPOINT, DEFAULT_PAGINATION_CEILING, ExecuteQueryOptions,
    QueryInput, execute_query, raw_execute_query,
};
pub use error::{
    ApiError, CdaClientError, GraphqlError, GraphqlErrorLocation, GraphqlPathSegment,
    ResponseBody, TransportError,
};
pub use headers::build_request_headers;
pub use merge::merge_split_results;
pub use pagination::{
    execute_query_with_auto_pagination, raw_execute_query_with_auto_pagination,
    split_oversized_selections,
};
pub use transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};
