//! Session registry — long-lived output channels, one per streaming client.
//!
//! Each session owns a bounded channel and a keep-alive task. The task is
//! scoped to the session's cancellation token, so closing a session (or a
//! failed write) always stops its timer and removes the entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::errors::SessionError;

pub type SessionId = Uuid;

const MIN_KEEPALIVE: Duration = Duration::from_millis(1);

/// One frame delivered to a session's stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A serialized JSON-RPC response.
    Message(String),
    KeepAlive,
}

/// Liveness of a session. There is no way back to `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Open,
            1 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// Write side of a session. Shared with in-flight routes via `Arc`; the
/// registry is the only owner of the table entry.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    sender: mpsc::Sender<SessionEvent>,
    state: AtomicU8,
    cancel: CancellationToken,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Write a serialized message to the stream without waiting.
    ///
    /// A client that has stopped draining its stream is treated like one that
    /// has gone away: a full channel fails the write. A failed write starts
    /// teardown, and the keep-alive task observes the cancellation and
    /// removes the entry.
    pub fn send(&self, payload: String) -> Result<(), SessionError> {
        if !self.is_open() {
            return Err(self.closed_error());
        }
        match self.sender.try_send(SessionEvent::Message(payload)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(session = %self.id, "session stream backlogged, closing");
                self.begin_close();
                Err(self.closed_error())
            }
            Err(TrySendError::Closed(_)) => {
                tracing::info!(session = %self.id, "session stream gone, closing");
                self.begin_close();
                Err(self.closed_error())
            }
        }
    }

    fn begin_close(&self) {
        let _ = self.state.compare_exchange(
            SessionState::Open as u8,
            SessionState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.cancel.cancel();
    }

    fn mark_closed(&self) {
        self.state
            .store(SessionState::Closed as u8, Ordering::Release);
        self.cancel.cancel();
    }

    fn closed_error(&self) -> SessionError {
        SessionError::Closed {
            id: self.id.to_string(),
        }
    }
}

// ─── SessionHandle ───────────────────────────────────────────────────────────

/// Read side of a session, held by the streaming connection.
///
/// Dropping the handle (client disconnect) closes the session.
pub struct SessionHandle {
    id: SessionId,
    events: mpsc::Receiver<SessionEvent>,
    cancel: CancellationToken,
    registry: SessionRegistry,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Next event, or `None` once the session is closed.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        tokio::select! {
            biased;
            event = self.events.recv() => event,
            _ = self.cancel.cancelled() => None,
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.registry.close(&self.id);
    }
}

// ─── SessionRegistry ─────────────────────────────────────────────────────────

struct RegistryInner {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    keepalive: Duration,
    capacity: usize,
}

impl RegistryInner {
    fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if let Some(session) = &removed {
            session.mark_closed();
        }
        removed
    }
}

/// Concurrent table of open sessions. Cheap to clone.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    /// A zero `keepalive` is raised to one millisecond; the timer needs a
    /// non-zero period.
    pub fn new(keepalive: Duration, capacity: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: RwLock::new(HashMap::new()),
                keepalive: keepalive.max(MIN_KEEPALIVE),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Allocate a session, register it, and start its keep-alive.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(&self) -> SessionHandle {
        let (sender, events) = mpsc::channel(self.inner.capacity);
        let cancel = CancellationToken::new();
        let session = Arc::new(Session {
            id: Uuid::new_v4(),
            sender,
            state: AtomicU8::new(SessionState::Open as u8),
            cancel: cancel.clone(),
        });
        let id = session.id;

        self.inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, session.clone());

        tokio::spawn(keepalive_loop(
            self.inner.clone(),
            session,
            self.inner.keepalive,
        ));
        tracing::info!(session = %id, "session opened");

        SessionHandle {
            id,
            events,
            cancel,
            registry: self.clone(),
        }
    }

    /// The session for `id`, if it exists and is still open.
    pub fn lookup(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .filter(|s| s.is_open())
            .cloned()
    }

    /// Remove the session and stop its keep-alive. Returns `false` if no such
    /// session was registered.
    pub fn close(&self, id: &SessionId) -> bool {
        let closed = self.inner.remove(id).is_some();
        if closed {
            tracing::info!(session = %id, "session closed");
        }
        closed
    }

    pub fn len(&self) -> usize {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn keepalive_loop(inner: Arc<RegistryInner>, session: Arc<Session>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = session.cancel.cancelled() => break,
            _ = ticker.tick() => match session.sender.try_send(SessionEvent::KeepAlive) {
                Ok(()) => {}
                // Backlogged client; the next tick tries again.
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(session = %session.id, "keep-alive skipped, channel full");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::info!(session = %session.id, "keep-alive write failed, closing");
                    break;
                }
            },
        }
    }
    if inner.remove(&session.id).is_some() {
        tracing::debug!(session = %session.id, "session removed by keep-alive task");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
