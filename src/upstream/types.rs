//! Shared types for the upstream request layer.

use serde::Deserialize;

// ─── Requests ────────────────────────────────────────────────────────────────

/// HTTP method of an outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether parameters travel on the query string rather than in a body.
    pub fn uses_query(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Delete)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single outbound call, owned by the requester for the lifetime of one
/// logical request (all of its attempts).
#[derive(Debug, Clone)]
pub struct RequestAttempt {
    /// Endpoint as given by the caller (relative path or absolute URL).
    pub endpoint: String,
    /// Fully resolved URL, including query-string parameters for GET/DELETE.
    pub url: String,
    pub method: HttpMethod,
    /// JSON body for POST requests.
    pub body: Option<serde_json::Value>,
    /// Attempts made so far (0 before the first send).
    pub attempt: u32,
}

/// Status + body of an upstream answer, before classification.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 5xx, 429 (upstream rate limiting) and 408 (upstream request timeout).
    pub fn is_retryable(&self) -> bool {
        self.status >= 500 || self.status == 429 || self.status == 408
    }
}

// ─── Upstream error payload ──────────────────────────────────────────────────

/// `{ "error": { "message", "code", "type" } }` as returned by the upstream.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamErrorEnvelope {
    pub error: UpstreamErrorBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
}

impl UpstreamErrorBody {
    /// Parse an error body, falling back to "unknown error" when the body is
    /// not the expected JSON shape.
    pub fn parse(body: &str) -> Self {
        match serde_json::from_str::<UpstreamErrorEnvelope>(body) {
            Ok(env) => env.error,
            Err(_) => UpstreamErrorBody {
                message: Some("unknown error".to_string()),
                code: None,
                error_type: None,
            },
        }
    }

    pub fn message_or_unknown(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

// ─── Pagination ──────────────────────────────────────────────────────────────

/// Opaque continuation token plus the URL it was embedded in.
///
/// The cursor is never interpreted; only the URL is followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub next_url: String,
    pub token: Option<String>,
}

impl PageCursor {
    /// Extract the `paging.next` cursor from a list response, if any.
    pub fn from_response(response: &serde_json::Value) -> Option<Self> {
        let paging = response.get("paging")?;
        let next_url = paging.get("next")?.as_str()?.to_string();
        if next_url.is_empty() {
            return None;
        }
        let token = paging
            .get("cursors")
            .and_then(|c| c.get("after"))
            .and_then(|a| a.as_str())
            .map(str::to_string);
        Some(Self { next_url, token })
    }
}

/// All records of a paginated listing, concatenated in page order.
#[derive(Debug, Clone, Default)]
pub struct AggregatedResult {
    pub records: Vec<serde_json::Value>,
    /// Pages consumed, the initial response included.
    pub pages: usize,
    /// The page ceiling was hit while a cursor was still pending.
    pub truncated: bool,
    /// Paging metadata of the initial response, with `next` removed.
    pub paging: Option<serde_json::Value>,
}

impl AggregatedResult {
    /// Render in the same shape as a single-page response.
    ///
    /// A truncated listing carries `paging.truncated: true`, so callers can
    /// tell it apart from a complete one.
    pub fn into_response(self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        out.insert("data".into(), serde_json::Value::Array(self.records));

        let paging = match (self.paging, self.truncated) {
            (Some(serde_json::Value::Object(mut obj)), true) => {
                obj.insert("truncated".into(), serde_json::Value::Bool(true));
                Some(serde_json::Value::Object(obj))
            }
            (_, true) => Some(serde_json::json!({"truncated": true})),
            (paging, false) => paging,
        };
        if let Some(paging) = paging {
            out.insert("paging".into(), paging);
        }
        serde_json::Value::Object(out)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
