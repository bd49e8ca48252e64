//! HTTP surface — SSE session streams, session message POSTs, direct calls.

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Context as _;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::router::MessageRouter;
use super::sessions::{SessionEvent, SessionRegistry};
use super::types::JsonRpcResponse;
use crate::config::ServerConfig;

/// Shared state behind every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<MessageRouter>,
    pub sessions: SessionRegistry,
    pub server: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(router: Arc<MessageRouter>, server: ServerConfig) -> Self {
        let sessions = SessionRegistry::new(server.keepalive(), server.channel_capacity);
        Self {
            router,
            sessions,
            server: Arc::new(server),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

impl SessionQuery {
    fn parsed(&self) -> Option<Uuid> {
        self.session_id
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }
}

/// Build the axum router for the configured paths.
pub fn build_router(state: AppState) -> Router {
    let server = state.server.clone();
    Router::new()
        .route(&server.sse_path, get(sse_handler))
        .route(
            &server.message_path,
            post(message_handler).delete(close_handler),
        )
        .route(&server.mcp_path, post(direct_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until ctrl-c.
pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "MCP HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("MCP HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// ─── Handlers ────────────────────────────────────────────────────────────────

async fn sse_handler(
    State(st): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let handle = st.sessions.open();
    let endpoint = format!("{}?sessionId={}", st.server.message_path, handle.id());

    let announce = stream::once(async move {
        Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint))
    });
    let events = stream::unfold(handle, |mut handle| async move {
        let event = match handle.recv().await? {
            SessionEvent::Message(payload) => Event::default().event("message").data(payload),
            SessionEvent::KeepAlive => Event::default().comment("ping"),
        };
        Some((Ok::<_, Infallible>(event), handle))
    });

    Sse::new(announce.chain(events))
}

async fn message_handler(
    State(st): State<AppState>,
    Query(query): Query<SessionQuery>,
    body: String,
) -> Response {
    let session = query.parsed().and_then(|id| st.sessions.lookup(&id));
    if session.is_none() && query.session_id.is_some() {
        tracing::debug!(
            session = query.session_id.as_deref().unwrap_or_default(),
            "unknown session, answering directly"
        );
    }
    reply(st.router.handle_raw(&body, session.as_deref()).await)
}

async fn direct_handler(State(st): State<AppState>, body: String) -> Response {
    reply(st.router.handle_raw(&body, None).await)
}

async fn close_handler(State(st): State<AppState>, Query(query): Query<SessionQuery>) -> Response {
    let Some(id) = query.parsed() else {
        return (StatusCode::BAD_REQUEST, "missing or invalid sessionId").into_response();
    };
    if st.sessions.close(&id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (StatusCode::NOT_FOUND, "unknown sessionId").into_response()
    }
}

async fn health_handler(State(st): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "sessions": st.sessions.len(),
    }))
}

fn reply(response: Option<JsonRpcResponse>) -> Response {
    match response {
        Some(resp) => (StatusCode::OK, Json(resp)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
