//! Upstream error types.
//!
//! Every failure carries a structured [`ErrorKind`] tag attached where the
//! failure is observed. Callers branch on the tag, never on message text.

use serde::Serialize;
use thiserror::Error;

/// Coarse classification of an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Required credential or setting is missing. Never retried.
    Configuration,
    /// 5xx / 429 / 408 from upstream. Retried with backoff.
    Transient,
    /// Other 4xx, malformed payloads, network failures. Surfaced immediately.
    Terminal,
    /// Local per-attempt deadline expired. Retried like a transient failure.
    Timeout,
}

/// Errors produced by the outbound request orchestration layer.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// A required credential or setting is missing.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// Upstream answered with a retryable status.
    #[error("upstream {status} on {endpoint} after {attempts} attempt(s): {message}")]
    Transient {
        endpoint: String,
        status: u16,
        code: Option<i64>,
        error_type: Option<String>,
        message: String,
        attempts: u32,
    },

    /// Upstream answered with a non-retryable status.
    #[error("upstream {status} on {endpoint}: {message}")]
    Terminal {
        endpoint: String,
        status: u16,
        code: Option<i64>,
        error_type: Option<String>,
        message: String,
    },

    /// The local per-attempt (or per-operation) deadline expired.
    #[error("request to {endpoint} timed out after {timeout_ms}ms ({attempts} attempt(s))")]
    Timeout {
        endpoint: String,
        timeout_ms: u64,
        attempts: u32,
    },

    /// Connection could not be established (DNS, refused, TLS).
    #[error("network failure reaching {endpoint}: {reason}")]
    Network { endpoint: String, reason: String },

    /// A success response whose body is not the JSON we expect.
    #[error("malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },
}

impl UpstreamError {
    /// The structured classification of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            UpstreamError::Configuration { .. } => ErrorKind::Configuration,
            UpstreamError::Transient { .. } => ErrorKind::Transient,
            UpstreamError::Timeout { .. } => ErrorKind::Timeout,
            UpstreamError::Terminal { .. }
            | UpstreamError::Network { .. }
            | UpstreamError::MalformedResponse { .. } => ErrorKind::Terminal,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::Timeout)
    }

    /// The endpoint that failed, if the failure is tied to one.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            UpstreamError::Configuration { .. } => None,
            UpstreamError::Transient { endpoint, .. }
            | UpstreamError::Terminal { endpoint, .. }
            | UpstreamError::Timeout { endpoint, .. }
            | UpstreamError::Network { endpoint, .. }
            | UpstreamError::MalformedResponse { endpoint, .. } => Some(endpoint),
        }
    }

    /// Stamp the number of attempts made onto a retryable failure.
    pub(crate) fn with_attempts(mut self, n: u32) -> Self {
        match &mut self {
            UpstreamError::Transient { attempts, .. } | UpstreamError::Timeout { attempts, .. } => {
                *attempts = n;
            }
            _ => {}
        }
        self
    }

    /// Render the failure as a JSON object suitable for an error tool result.
    pub fn detail(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("kind".into(), serde_json::json!(self.kind()));
        obj.insert("message".into(), self.to_string().into());

        if let Some(endpoint) = self.endpoint() {
            obj.insert("endpoint".into(), endpoint.into());
        }

        match self {
            UpstreamError::Transient {
                status,
                code,
                error_type,
                message,
                attempts,
                ..
            } => {
                obj.insert("status".into(), (*status).into());
                obj.insert("code".into(), serde_json::json!(code));
                obj.insert("type".into(), serde_json::json!(error_type));
                obj.insert("message".into(), message.clone().into());
                obj.insert("attempts".into(), (*attempts).into());
            }
            UpstreamError::Terminal {
                status,
                code,
                error_type,
                message,
                ..
            } => {
                obj.insert("status".into(), (*status).into());
                obj.insert("code".into(), serde_json::json!(code));
                obj.insert("type".into(), serde_json::json!(error_type));
                obj.insert("message".into(), message.clone().into());
            }
            UpstreamError::Timeout { attempts, .. } => {
                obj.insert("attempts".into(), (*attempts).into());
            }
            _ => {}
        }

        serde_json::Value::Object(obj)
    }
}
