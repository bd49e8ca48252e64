//! Cursor-following aggregation of paginated list responses.
//!
//! Given a `{data: [...], paging: {next}}` response, follows `paging.next`
//! strictly in order, appending each page's `data` to one result that has the
//! same shape as a single page. Callers never see the cursors.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::errors::UpstreamError;
use super::requester::RetryingRequester;
use super::types::{AggregatedResult, HttpMethod, PageCursor};
use crate::config::PaginationConfig;

/// Drains cursor chains through a [`RetryingRequester`].
pub struct PaginationAggregator {
    requester: Arc<RetryingRequester>,
    enabled: bool,
    max_pages: usize,
}

impl PaginationAggregator {
    pub fn new(requester: Arc<RetryingRequester>, config: &PaginationConfig) -> Self {
        Self {
            requester,
            enabled: config.enabled,
            max_pages: config.max_pages.max(1),
        }
    }

    pub fn requester(&self) -> &Arc<RetryingRequester> {
        &self.requester
    }

    /// Issue a request and, when `paginate` is set and pagination is enabled,
    /// drain every following page into the response.
    pub async fn fetch(
        &self,
        endpoint: &str,
        params: &Map<String, Value>,
        method: HttpMethod,
        paginate: bool,
    ) -> Result<Value, UpstreamError> {
        let first = self.requester.execute(endpoint, params, method).await?;
        if paginate && self.enabled {
            self.drain(first).await
        } else {
            Ok(first)
        }
    }

    /// Follow the cursor chain of `initial`.
    ///
    /// Responses that are not list-shaped, or carry no cursor, come back
    /// unchanged.
    pub async fn drain(&self, initial: Value) -> Result<Value, UpstreamError> {
        let is_list = initial.get("data").is_some_and(Value::is_array);
        if !is_list || PageCursor::from_response(&initial).is_none() {
            return Ok(initial);
        }
        Ok(self.aggregate(initial).await?.into_response())
    }

    /// Accumulate all pages reachable from `initial`.
    ///
    /// Stops when no cursor remains, when a page's `data` is not an array
    /// (treated as end of listing), or when `max_pages` pages (the initial one
    /// included) have been consumed. Hitting the ceiling returns the partial
    /// result with `truncated` set.
    pub async fn aggregate(&self, initial: Value) -> Result<AggregatedResult, UpstreamError> {
        let mut result = AggregatedResult {
            records: initial
                .get("data")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            pages: 1,
            truncated: false,
            paging: initial.get("paging").cloned().map(without_next),
        };
        let mut cursor = PageCursor::from_response(&initial);

        while let Some(next) = cursor.take() {
            if result.pages >= self.max_pages {
                tracing::warn!(
                    pages = result.pages,
                    records = result.records.len(),
                    max_pages = self.max_pages,
                    "pagination ceiling reached, returning partial result"
                );
                result.truncated = true;
                break;
            }

            let page = self
                .requester
                .execute(&next.next_url, &Map::new(), HttpMethod::Get)
                .await?;

            let Some(data) = page.get("data").and_then(Value::as_array) else {
                tracing::debug!(
                    pages = result.pages,
                    "page without a data array, treating as end of listing"
                );
                break;
            };

            result.pages += 1;
            result.records.extend(data.iter().cloned());
            cursor = PageCursor::from_response(&page);
        }

        tracing::info!(
            pages = result.pages,
            records = result.records.len(),
            truncated = result.truncated,
            "pagination complete"
        );
        Ok(result)
    }
}

fn without_next(mut paging: Value) -> Value {
    if let Some(obj) = paging.as_object_mut() {
        obj.remove("next");
    }
    paging
}

// ─── Tests ───────────────────────────────────────────────────────────────────
