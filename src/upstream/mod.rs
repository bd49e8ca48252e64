//! Upstream — outbound request orchestration against the JSON HTTP API.
//!
//! This module handles:
//! - Sliding-window rate limiting with burst spacing
//! - Retry with exponential backoff and per-attempt timeouts
//! - Cursor-based pagination aggregation
//! - Structured, kind-tagged upstream errors
//!
//! Tool handlers call [`PaginationAggregator::fetch`] (or the
//! [`RetryingRequester`] directly); neither ever sees cursors or retry state.

pub mod errors;
pub mod pagination;
pub mod rate_limiter;
pub mod requester;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use errors::{ErrorKind, UpstreamError};
pub use pagination::PaginationAggregator;
pub use rate_limiter::{RateLimitSnapshot, RateLimiter};
pub use requester::{HttpTransport, ReqwestTransport, RetryingRequester, TransportError};
pub use types::{AggregatedResult, HttpMethod, PageCursor, RawResponse, RequestAttempt};
