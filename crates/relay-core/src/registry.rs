//! SessionRegistry: the relay's in-memory table of live sessions.
//!
//! The registry answers "which sessions exist right now, and in what state?"
//! It is the only state shared between sessions.  Forwarding never goes
//! through it: each session owns its sockets directly, and the registry only
//! holds a small [`SessionInfo`] record per session for diagnostics and for
//! draining on shutdown.
//!
//! # Registration lifecycle
//!
//! ```text
//! register(peer)          ──►  entry inserted, state CONNECTING
//! SessionRegistration::advance(ACTIVE / CLOSING)
//!                         ──►  entry state updated
//! SessionRegistration::advance(CLOSED)
//!                         ──►  entry removed
//! drop(SessionRegistration) before CLOSED
//!                         ──►  entry removed, warning logged
//! ```
//!
//! The caller advances to `Closed` only after it has dropped both sockets, so
//! an entry is visible for as long as either socket may still be open.
//!
//! # Locking
//!
//! One `RwLock` guards the map.  It is held only for the duration of a single
//! insert, update, remove or copy; never across an `.await`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::session::{InvalidTransition, SessionId, SessionState};

/// Registry record for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub id: SessionId,
    /// Remote address of the client socket.
    pub peer_addr: SocketAddr,
    pub state: SessionState,
    /// When the client was accepted.
    pub created_at: Instant,
}

impl SessionInfo {
    /// Time elapsed since the client was accepted.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Concurrent table of live sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionInfo>>,
    /// Live-session count, published on every insert and remove.
    live: watch::Sender<usize>,
    /// Total sessions ever registered.
    accepted_total: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (live, _) = watch::channel(0);
        Self {
            sessions: RwLock::new(HashMap::new()),
            live,
            accepted_total: AtomicU64::new(0),
        }
    }

    /// Inserts a new session in state `Connecting` and returns the handle
    /// that owns its entry.
    ///
    /// The identifier is assigned here, at acceptance time.
    pub fn register(self: &Arc<Self>, peer_addr: SocketAddr) -> SessionRegistration {
        let id = SessionId::new();
        let info = SessionInfo {
            id,
            peer_addr,
            state: SessionState::Connecting,
            created_at: Instant::now(),
        };

        {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            sessions.insert(id, info);
            self.live.send_replace(sessions.len());
        }
        self.accepted_total.fetch_add(1, Ordering::Relaxed);
        debug!(session_id = %id, peer = %peer_addr, "session registered");

        SessionRegistration {
            id,
            state: SessionState::Connecting,
            registry: Arc::clone(self),
        }
    }

    /// Returns a copy of one session's record.
    pub fn get(&self, id: SessionId) -> Option<SessionInfo> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of sessions ever registered, including closed ones.
    pub fn accepted_total(&self) -> u64 {
        self.accepted_total.load(Ordering::Relaxed)
    }

    /// Copies every record, oldest first.
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let mut all: Vec<SessionInfo> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by_key(|info| info.created_at);
        all
    }

    /// Sessions accepted more than `older_than` ago, oldest first.
    pub fn stale(&self, older_than: Duration) -> Vec<SessionInfo> {
        self.snapshot()
            .into_iter()
            .filter(|info| info.age() > older_than)
            .collect()
    }

    /// Watches the live-session count.
    pub fn subscribe_live_count(&self) -> watch::Receiver<usize> {
        self.live.subscribe()
    }

    /// Resolves once no session is registered.
    ///
    /// Resolves immediately if the registry is already empty.
    pub async fn wait_until_empty(&self) {
        let mut live = self.live.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = live.wait_for(|count| *count == 0).await;
    }

    fn set_state(&self, id: SessionId, state: SessionState) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(info) = sessions.get_mut(&id) {
            info.state = state;
        }
    }

    fn remove(&self, id: SessionId) -> Option<SessionInfo> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let removed = sessions.remove(&id);
        if removed.is_some() {
            self.live.send_replace(sessions.len());
        }
        removed
    }
}

/// Owning handle for one registry entry.
///
/// Held by the session for its whole life.  State changes go through
/// [`advance`](Self::advance), which validates them against the state machine
/// before publishing them to the registry.
pub struct SessionRegistration {
    id: SessionId,
    state: SessionState,
    registry: Arc<SessionRegistry>,
}

impl SessionRegistration {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Moves the session to `next` and publishes it.
    ///
    /// Reaching `Closed` removes the entry.  Reaching it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] and leaves the state unchanged if the
    /// move is not allowed.
    pub fn advance(&mut self, next: SessionState) -> Result<SessionState, InvalidTransition> {
        let next = self.state.transition(next)?;
        if next == self.state {
            return Ok(next);
        }
        self.state = next;

        if next.is_terminal() {
            self.registry.remove(self.id);
            debug!(session_id = %self.id, "session deregistered");
        } else {
            self.registry.set_state(self.id, next);
            debug!(session_id = %self.id, state = %next, "session state changed");
        }
        Ok(next)
    }
}

impl Drop for SessionRegistration {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            warn!(
                session_id = %self.id,
                state = %self.state,
                "session handle dropped before reaching CLOSED"
            );
            self.registry.remove(self.id);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
