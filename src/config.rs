//! Service configuration loading and validation.
//!
//! Reads a YAML file and resolves environment variables. Every field has a
//! default, so an absent file (or an empty one) yields a runnable config
//! apart from the upstream access token.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Inbound HTTP surface.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Name reported in `initialize`.
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default = "default_sse_path")]
    pub sse_path: String,
    #[serde(default = "default_message_path")]
    pub message_path: String,
    /// Session-less JSON-RPC endpoint.
    #[serde(default = "default_mcp_path")]
    pub mcp_path: String,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    /// Buffered frames per session before writers wait.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl ServerConfig {
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            name: default_server_name(),
            sse_path: default_sse_path(),
            message_path: default_message_path(),
            mcp_path: default_mcp_path(),
            keepalive_secs: default_keepalive_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Upstream API location and credential.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Supplied, never obtained. Absence is reported per call.
    #[serde(default)]
    pub access_token: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_version: default_api_version(),
            access_token: None,
        }
    }
}

/// Quota of `max_requests` per rolling `window_secs`, plus burst spacing.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_min_spacing_ms")]
    pub min_spacing_ms: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            min_spacing_ms: default_min_spacing_ms(),
        }
    }
}

/// Retry and timeout policy for a single logical request.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff before retry `n` (0-indexed) is `2^n * base_delay_ms`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Per-attempt deadline.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Deadline spanning every attempt and backoff of one logical call.
    /// Unset means attempts are bounded only by `max_retries`.
    #[serde(default)]
    pub operation_deadline_secs: Option<u64>,
}

impl RetryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn operation_deadline(&self) -> Option<Duration> {
        self.operation_deadline_secs.map(Duration::from_secs)
    }

    /// Delay before the retry following 0-indexed `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay() * 2u32.saturating_pow(attempt)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            timeout_secs: default_timeout_secs(),
            operation_deadline_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_pages: default_max_pages(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
    /// Write to this file (rotated on startup) instead of stderr.
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
            file: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_server_name() -> String {
    "graph-relay".to_string()
}
fn default_sse_path() -> String {
    "/sse".to_string()
}
fn default_message_path() -> String {
    "/messages".to_string()
}
fn default_mcp_path() -> String {
    "/mcp".to_string()
}
fn default_keepalive_secs() -> u64 {
    30
}
fn default_channel_capacity() -> usize {
    64
}
fn default_base_url() -> String {
    "https://graph.facebook.com".to_string()
}
fn default_api_version() -> String {
    "v22.0".to_string()
}
fn default_max_requests() -> usize {
    200
}
fn default_window_secs() -> u64 {
    3600
}
fn default_min_spacing_ms() -> u64 {
    5
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_pages() -> usize {
    1000
}
fn default_true() -> bool {
    true
}
fn default_log_filter() -> String {
    "graph_relay=info,warn".to_string()
}

// ─── Loading ─────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load from `path`, or defaults when no path is given.
    ///
    /// Performs environment-variable interpolation on the raw file contents
    /// (`${VAR_NAME}` or `${VAR_NAME:-default}`) before parsing.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                Self::from_yaml(&raw)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document after env-var interpolation.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(raw);
        if interpolated.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut config: AppConfig =
            serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
                reason: e.to_string(),
            })?;

        // An interpolated-but-unset token comes through as "".
        if config
            .upstream
            .access_token
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            config.upstream.access_token = None;
        }
        Ok(config)
    }

    /// Reject settings that would make the limiter or paginator degenerate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::Invalid {
                reason: "rate_limit.max_requests must be at least 1".into(),
            });
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::Invalid {
                reason: "rate_limit.window_secs must be at least 1".into(),
            });
        }
        if self.pagination.max_pages == 0 {
            return Err(ConfigError::Invalid {
                reason: "pagination.max_pages must be at least 1".into(),
            });
        }
        if self.retry.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                reason: "retry.timeout_secs must be at least 1".into(),
            });
        }
        if self.server.keepalive_secs == 0 {
            return Err(ConfigError::Invalid {
                reason: "server.keepalive_secs must be at least 1".into(),
            });
        }
        if self.server.channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                reason: "server.channel_capacity must be at least 1".into(),
            });
        }
        Ok(())
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Substitute `${NAME}` and `${NAME:-fallback}` references. An unterminated
/// `${` is kept as written.
fn interpolate_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let body = &rest[open + 2..];
        let Some(close) = body.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        out.push_str(&lookup_var(&body[..close]));
        rest = &body[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Value of `NAME`, or of `NAME:-fallback`. Unset with no fallback is empty.
fn lookup_var(expr: &str) -> String {
    let (name, fallback) = match expr.split_once(":-") {
        Some((name, fallback)) => (name, Some(fallback)),
        None => (expr, None),
    };
    match (std::env::var(name), fallback) {
        (Ok(value), _) => value,
        (Err(_), Some(fallback)) => expand_home(fallback),
        (Err(_), None) => String::new(),
    }
}

/// Expand a bare `~` or a leading `~/` to the home directory. `~user` forms
/// are left alone.
pub(crate) fn expand_home(path: &str) -> String {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return path.to_string(),
    };
    match dirs::home_dir() {
        Some(home) => format!("{}{rest}", home.display()),
        None => path.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
