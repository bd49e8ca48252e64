//! Retrying requester for the upstream HTTP API.
//!
//! Each call is admitted by the [`RateLimiter`], sent through an
//! [`HttpTransport`] under a per-attempt timeout, and classified as success,
//! retryable, or terminal. Retryable failures are retried in an explicit loop
//! with exponential backoff; the attempt budget is `max_retries + 1`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use reqwest::Url;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::time::Instant;

use super::errors::UpstreamError;
use super::rate_limiter::RateLimiter;
use super::types::{HttpMethod, RawResponse, RequestAttempt, UpstreamErrorBody};
use crate::config::{RetryConfig, UpstreamConfig};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout for the reqwest transport.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ─── Transport ───────────────────────────────────────────────────────────────

/// Failure below the HTTP status layer.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("{0}")]
    Network(String),
}

/// Sends one attempt and returns the raw status and body.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, attempt: &RequestAttempt) -> Result<RawResponse, TransportError>;
}

/// Production transport backed by `reqwest`.
pub struct ReqwestTransport {
    http: HttpClient,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, UpstreamError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| UpstreamError::Configuration {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, attempt: &RequestAttempt) -> Result<RawResponse, TransportError> {
        let builder = match attempt.method {
            HttpMethod::Get => self.http.get(&attempt.url),
            HttpMethod::Delete => self.http.delete(&attempt.url),
            HttpMethod::Post => {
                let builder = self.http.post(&attempt.url);
                match &attempt.body {
                    Some(body) => builder.json(body),
                    None => builder,
                }
            }
        };

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok(RawResponse { status, body })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(e.to_string())
    }
}

// ─── RetryingRequester ───────────────────────────────────────────────────────

/// Issues rate-limited, retried calls against one upstream.
pub struct RetryingRequester {
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<RateLimiter>,
    upstream: UpstreamConfig,
    retry: RetryConfig,
}

impl RetryingRequester {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        limiter: Arc<RateLimiter>,
        upstream: UpstreamConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            transport,
            limiter,
            upstream,
            retry,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Execute one logical request, retrying transient failures.
    ///
    /// `endpoint` is either a path relative to the configured API root
    /// (`act_123/campaigns`) or an absolute URL, which is used verbatim
    /// (pagination cursors already embed auth and query state).
    pub async fn execute(
        &self,
        endpoint: &str,
        params: &Map<String, Value>,
        method: HttpMethod,
    ) -> Result<Value, UpstreamError> {
        let mut attempt = self.build_attempt(endpoint, params, method)?;
        let deadline = self.retry.operation_deadline().map(|d| Instant::now() + d);
        let per_attempt = self.retry.timeout();

        loop {
            attempt.attempt += 1;
            let n = attempt.attempt;

            let timeout = match deadline {
                Some(at) => {
                    let remaining = at.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(self.deadline_exceeded(&attempt, n - 1));
                    }
                    // The limiter wait counts against the operation deadline.
                    if tokio::time::timeout(remaining, self.limiter.admit())
                        .await
                        .is_err()
                    {
                        return Err(self.deadline_exceeded(&attempt, n - 1));
                    }
                    per_attempt.min(at.saturating_duration_since(Instant::now()))
                }
                None => {
                    self.limiter.admit().await;
                    per_attempt
                }
            };

            tracing::debug!(
                endpoint = %attempt.endpoint,
                method = %attempt.method,
                attempt = n,
                "sending upstream request"
            );

            let err = match tokio::time::timeout(timeout, self.transport.send(&attempt)).await {
                Ok(Ok(response)) => match classify(&attempt.endpoint, response) {
                    Ok(value) => return Ok(value),
                    Err(e) => e,
                },
                Ok(Err(TransportError::Timeout)) | Err(_) => UpstreamError::Timeout {
                    endpoint: attempt.endpoint.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                    attempts: n,
                },
                Ok(Err(TransportError::Network(reason))) => UpstreamError::Network {
                    endpoint: attempt.endpoint.clone(),
                    reason,
                },
            }
            .with_attempts(n);

            if !err.is_retryable() {
                tracing::error!(
                    endpoint = %attempt.endpoint,
                    attempt = n,
                    error = %err,
                    "upstream request failed (not retryable)"
                );
                return Err(err);
            }

            if n > self.retry.max_retries {
                tracing::error!(
                    endpoint = %attempt.endpoint,
                    attempts = n,
                    error = %err,
                    "upstream request failed, retries exhausted"
                );
                return Err(err);
            }

            let delay = self.retry.backoff(n - 1);
            if let Some(at) = deadline {
                if Instant::now() + delay >= at {
                    tracing::warn!(
                        endpoint = %attempt.endpoint,
                        attempts = n,
                        "operation deadline leaves no room for another attempt"
                    );
                    return Err(err);
                }
            }

            tracing::warn!(
                endpoint = %attempt.endpoint,
                attempt = n,
                max_retries = self.retry.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying upstream request"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn deadline_exceeded(&self, attempt: &RequestAttempt, attempts: u32) -> UpstreamError {
        UpstreamError::Timeout {
            endpoint: attempt.endpoint.clone(),
            timeout_ms: self
                .retry
                .operation_deadline()
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
            attempts,
        }
    }

    /// Resolve the URL and body for a call.
    fn build_attempt(
        &self,
        endpoint: &str,
        params: &Map<String, Value>,
        method: HttpMethod,
    ) -> Result<RequestAttempt, UpstreamError> {
        let absolute = endpoint.starts_with("http://") || endpoint.starts_with("https://");

        let raw_url = if absolute {
            endpoint.to_string()
        } else {
            format!(
                "{}/{}/{}",
                self.upstream.base_url.trim_end_matches('/'),
                self.upstream.api_version.trim_matches('/'),
                endpoint.trim_start_matches('/')
            )
        };

        let mut url = Url::parse(&raw_url).map_err(|e| UpstreamError::Configuration {
            reason: format!("invalid upstream URL for '{}': {e}", strip_query(endpoint)),
        })?;

        let mut pairs: Vec<(String, String)> = Vec::new();
        if !absolute {
            let token = self
                .upstream
                .access_token
                .as_deref()
                .filter(|t| !t.is_empty())
                .ok_or_else(|| UpstreamError::Configuration {
                    reason: "upstream access token is not configured".into(),
                })?;
            pairs.push(("access_token".into(), token.to_string()));
        }
        if method.uses_query() {
            pairs.extend(
                params
                    .iter()
                    .filter_map(|(k, v)| param_to_string(v).map(|v| (k.clone(), v))),
            );
        }
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }

        let body = if method.uses_query() {
            None
        } else {
            Some(Value::Object(params.clone()))
        };

        Ok(RequestAttempt {
            endpoint: strip_query(endpoint).to_string(),
            url: url.to_string(),
            method,
            body,
            attempt: 0,
        })
    }
}

/// Classify a raw response into a JSON payload or a tagged failure.
fn classify(endpoint: &str, response: RawResponse) -> Result<Value, UpstreamError> {
    if response.is_success() {
        return serde_json::from_str(&response.body).map_err(|e| {
            UpstreamError::MalformedResponse {
                endpoint: endpoint.to_string(),
                reason: format!("response body is not JSON: {e}"),
            }
        });
    }

    let body = UpstreamErrorBody::parse(&response.body);
    let message = body.message_or_unknown();

    if response.is_retryable() {
        Err(UpstreamError::Transient {
            endpoint: endpoint.to_string(),
            status: response.status,
            code: body.code,
            error_type: body.error_type,
            message,
            attempts: 1,
        })
    } else {
        Err(UpstreamError::Terminal {
            endpoint: endpoint.to_string(),
            status: response.status,
            code: body.code,
            error_type: body.error_type,
            message,
        })
    }
}

/// Graph-style parameter encoding: scalars as text, structures as JSON.
fn param_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Endpoint text safe to log and report (no query string, hence no token).
fn strip_query(endpoint: &str) -> &str {
    endpoint.split('?').next().unwrap_or(endpoint)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
