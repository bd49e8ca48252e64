//! Shared helpers for the HTTP-level tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt as _;

use graph_relay::config::AppConfig;
use graph_relay::upstream::{HttpTransport, RawResponse, RequestAttempt, TransportError};

/// Upstream stand-in answering from a queue, then with `fallback`.
pub struct QueueTransport {
    queue: Mutex<VecDeque<RawResponse>>,
    fallback: RawResponse,
    urls: Mutex<Vec<String>>,
}

impl QueueTransport {
    pub fn new(responses: Vec<RawResponse>, fallback: RawResponse) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(responses.into()),
            fallback,
            urls: Mutex::new(Vec::new()),
        })
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for QueueTransport {
    async fn send(&self, attempt: &RequestAttempt) -> Result<RawResponse, TransportError> {
        self.urls.lock().unwrap().push(attempt.url.clone());
        let next = self.queue.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

pub fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.upstream.base_url = "https://graph.example.com".into();
    config.upstream.access_token = Some("test-token".into());
    config
}

pub fn app(transport: Arc<QueueTransport>) -> Router {
    graph_relay::mcp_server::build_router(graph_relay::build_app_state(&config(), transport))
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Send `req` and return status plus JSON body (`Value::Null` when empty).
pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

/// Text of the first content block of a tool result response.
pub fn tool_text(resp: &Value) -> &str {
    resp["result"]["content"][0]["text"].as_str().unwrap()
}
