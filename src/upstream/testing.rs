//! Scripted upstream transport for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::requester::{HttpTransport, TransportError};
use super::types::{RawResponse, RequestAttempt};

/// One scripted reaction to a send.
#[derive(Debug, Clone)]
pub enum Script {
    Respond(RawResponse),
    /// Never answers within any reasonable timeout.
    Hang,
    Fail(TransportError),
}

impl Script {
    pub fn ok(body: serde_json::Value) -> Self {
        Script::Respond(RawResponse::new(200, body.to_string()))
    }

    pub fn status(status: u16, body: &str) -> Self {
        Script::Respond(RawResponse::new(status, body))
    }
}

/// Plays back scripts in order, then the repeating script (if any).
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    repeat: Option<Script>,
    calls: Mutex<Vec<(Instant, RequestAttempt)>>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            repeat: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn repeating(script: Script) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            repeat: Some(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, a)| a.url.clone())
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, attempt: &RequestAttempt) -> Result<RawResponse, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), attempt.clone()));

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.repeat.clone())
            .unwrap_or_else(|| Script::status(500, r#"{"error":{"message":"script exhausted"}}"#));

        match script {
            Script::Respond(response) => Ok(response),
            Script::Fail(e) => Err(e),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(TransportError::Timeout)
            }
        }
    }
}
