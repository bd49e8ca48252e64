//! Sliding-window rate limiter for outbound upstream calls.
//!
//! Tracks the timestamps of admitted requests over a trailing window and
//! delays callers until issuing one more request stays within quota. A
//! minimum spacing between consecutive requests is enforced regardless of
//! quota headroom (burst protection).
//!
//! Admission and recording happen under one async mutex, so the
//! check-then-append sequence is atomic across concurrent callers. Callers
//! that arrive while another is waiting queue behind it; that serialization
//! is what throttles aggregate throughput.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Utilisation (as a fraction of quota) above which a warning is logged.
const WARN_UTILISATION: f64 = 0.9;

// ─── RateWindow ──────────────────────────────────────────────────────────────

/// Chronologically ordered timestamps of admitted requests.
#[derive(Debug, Default)]
struct RateWindow {
    timestamps: VecDeque<Instant>,
    last_request: Option<Instant>,
    /// Set while utilisation sits above the warning threshold.
    warned: bool,
}

impl RateWindow {
    /// Drop every timestamp at least `window` old.
    fn purge(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Delay required before one more request may be issued at `now`.
    ///
    /// Assumes `purge` has just run.
    fn required_delay(&self, now: Instant, cfg: &RateLimitConfig) -> Duration {
        let window = cfg.window();
        let spacing = cfg.min_spacing();

        if self.timestamps.len() >= cfg.max_requests {
            let Some(&oldest) = self.timestamps.front() else {
                return spacing;
            };
            return (oldest + window).saturating_duration_since(now).max(spacing);
        }

        match self.last_request {
            Some(last) => spacing.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    fn record(&mut self, now: Instant) {
        self.timestamps.push_back(now);
        self.last_request = Some(now);
    }
}

// ─── RateLimiter ─────────────────────────────────────────────────────────────

/// Point-in-time view of limiter utilisation.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitSnapshot {
    pub used: usize,
    pub quota: usize,
    pub window_secs: u64,
    pub utilisation: f64,
}

/// Quota + spacing limiter shared by every call against one upstream.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    window: Mutex<RateWindow>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            window: Mutex::new(RateWindow::default()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Wait until a request may be issued, then record it.
    ///
    /// Never fails. Returns the total time spent waiting.
    pub async fn admit(&self) -> Duration {
        let mut window = self.window.lock().await;
        let mut waited = Duration::ZERO;

        loop {
            let now = Instant::now();
            window.purge(now, self.config.window());
            let delay = window.required_delay(now, &self.config);
            if delay.is_zero() {
                break;
            }
            tracing::debug!(
                delay_ms = delay.as_millis() as u64,
                used = window.timestamps.len(),
                quota = self.config.max_requests,
                "rate limiter delaying request"
            );
            tokio::time::sleep(delay).await;
            waited += delay;
        }

        window.record(Instant::now());
        self.observe_utilisation(&mut window);
        waited
    }

    /// The delay `admit` would currently impose, without recording anything.
    pub async fn required_delay(&self) -> Duration {
        let mut window = self.window.lock().await;
        let now = Instant::now();
        window.purge(now, self.config.window());
        window.required_delay(now, &self.config)
    }

    /// Current utilisation of the trailing window.
    pub async fn snapshot(&self) -> RateLimitSnapshot {
        let mut window = self.window.lock().await;
        window.purge(Instant::now(), self.config.window());
        let used = window.timestamps.len();
        RateLimitSnapshot {
            used,
            quota: self.config.max_requests,
            window_secs: self.config.window_secs,
            utilisation: utilisation(used, self.config.max_requests),
        }
    }

    fn observe_utilisation(&self, window: &mut RateWindow) {
        let used = window.timestamps.len();
        let ratio = utilisation(used, self.config.max_requests);

        if ratio >= WARN_UTILISATION {
            if !window.warned {
                tracing::warn!(
                    used,
                    quota = self.config.max_requests,
                    window_secs = self.config.window_secs,
                    "upstream rate limit above 90% utilisation"
                );
                window.warned = true;
            }
        } else {
            window.warned = false;
        }
    }
}

fn utilisation(used: usize, quota: usize) -> f64 {
    if quota == 0 {
        return 1.0;
    }
    used as f64 / quota as f64
}

// ─── Tests ───────────────────────────────────────────────────────────────────
