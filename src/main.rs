use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

use graph_relay::config::AppConfig;

#[derive(Debug, Parser)]
#[command(
    name = "graph-relay",
    version,
    about = "Rate-limited, paginating MCP bridge to a JSON HTTP API"
)]
struct Args {
    /// YAML config file. Defaults apply when omitted.
    #[arg(long, short, env = "GRAPH_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding `server.bind`.
    #[arg(long, env = "GRAPH_RELAY_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref()).context("loading config")?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let log_file = graph_relay::logging::init_tracing(&config.logging)?;
    let log_target = log_file
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<stderr>".to_string());

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.server.bind,
        log_file = %log_target,
        pid = std::process::id(),
        "=== graph-relay starting ==="
    );

    graph_relay::run(config).await
}
