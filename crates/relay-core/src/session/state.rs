//! The session lifecycle state machine.
//!
//! Every relay session moves through exactly four states:
//!
//! ```text
//! Connecting ──► Active ──► Closing ──► Closed
//!      │                       ▲
//!      └───────────────────────┘
//! ```
//!
//! - `Connecting`: the client socket is open and the upstream connect attempt
//!   is in flight.
//! - `Active`: both sockets are open and messages are forwarded.
//! - `Closing`: one side closed or failed; the other side is being torn down.
//! - `Closed`: terminal.  Re-entering `Closed` is accepted as a no-op so that
//!   teardown paths can converge without coordinating.
//!
//! Any other move is rejected with [`InvalidTransition`].  The state machine
//! is pure: it performs no I/O and owns no sockets.

use std::fmt;

use thiserror::Error;

/// Lifecycle state of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Client accepted; upstream connect in flight.
    Connecting,
    /// Both sockets open; forwarding in both directions.
    Active,
    /// Teardown in progress.
    Closing,
    /// Both sockets closed.  Terminal.
    Closed,
}

/// A rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid session transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

impl SessionState {
    /// Returns `true` when moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Active)
                | (Connecting, Closing)
                | (Active, Closing)
                | (Closing, Closed)
                | (Closed, Closed)
        )
    }

    /// Validates a move to `next` and returns the new state.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when the move is not part of the state
    /// machine, e.g. `Active -> Connecting` or `Closed -> Active`.
    pub fn transition(self, next: SessionState) -> Result<SessionState, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Messages may only be forwarded in this state.
    pub fn is_forwarding(self) -> bool {
        self == SessionState::Active
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }

    /// Upper-case name used in logs and diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Connecting => "CONNECTING",
            SessionState::Active => "ACTIVE",
            SessionState::Closing => "CLOSING",
            SessionState::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
