//! graph-relay — an MCP server that forwards tool calls to a JSON HTTP API.
//!
//! Outbound calls go through one [`upstream::RateLimiter`] shared by every
//! caller, a retrying requester, and a cursor-following paginator. Inbound,
//! clients open SSE sessions or call directly; the router dispatches
//! `tools/call` into the [`tools`] catalog.

pub mod config;
pub mod logging;
pub mod mcp_server;
pub mod tools;
pub mod upstream;

use std::sync::Arc;

use anyhow::Context as _;

use config::AppConfig;
use mcp_server::{AppState, MessageRouter, ServerInfo};
use upstream::{HttpTransport, PaginationAggregator, RateLimiter, ReqwestTransport, RetryingRequester};

/// Wire the full stack over `transport`.
pub fn build_app_state(config: &AppConfig, transport: Arc<dyn HttpTransport>) -> AppState {
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    let requester = Arc::new(RetryingRequester::new(
        transport,
        limiter,
        config.upstream.clone(),
        config.retry.clone(),
    ));
    let aggregator = Arc::new(PaginationAggregator::new(requester, &config.pagination));
    let catalog = Arc::new(tools::graph_catalog(aggregator));

    let router = Arc::new(MessageRouter::new(
        catalog,
        ServerInfo {
            name: config.server.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    ));
    AppState::new(router, config.server.clone())
}

/// Serve until shutdown. Expects tracing to be initialised already.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;

    if config.upstream.access_token.is_none() {
        tracing::warn!("no upstream access token configured; tool calls will fail");
    }

    let transport = Arc::new(ReqwestTransport::new().context("building HTTP client")?);
    let state = build_app_state(&config, transport);

    tracing::info!(
        upstream = %config.upstream.base_url,
        api_version = %config.upstream.api_version,
        quota = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window_secs,
        max_retries = config.retry.max_retries,
        "relay configured"
    );

    mcp_server::serve(&config.server.bind, state).await
}
