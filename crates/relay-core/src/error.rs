//! Classified session failures.
//!
//! These are the per-session error kinds.  Configuration errors are fatal at
//! startup and live with the configuration types in the `realtime-relay`
//! crate; everything here is local to one session and never affects another.
//!
//! Socket-library errors are reduced to their message text at the boundary so
//! this crate stays independent of any particular WebSocket implementation.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Which way a message was travelling when something went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client -> upstream
    ClientToUpstream,
    /// Upstream -> client
    UpstreamToClient,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::ClientToUpstream => "client->upstream",
            Direction::UpstreamToClient => "upstream->client",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The socket operation that failed during forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Read,
    Write,
}

impl fmt::Display for IoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IoOp::Read => "read",
            IoOp::Write => "write",
        })
    }
}

/// Why an upstream connect attempt failed.
///
/// A failed attempt is terminal for its session; nothing here is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamConnectError {
    /// DNS, TCP or TLS failure before the WebSocket handshake completed.
    #[error("upstream unreachable: {0}")]
    Network(String),

    /// The attempt did not complete within the configured window.
    #[error("upstream connect timed out after {0:?}")]
    Timeout(Duration),

    /// The upstream answered the upgrade with 401 or 403.
    #[error("upstream rejected credentials (HTTP {status})")]
    AuthRejected { status: u16 },

    /// The upstream spoke something other than the expected WebSocket
    /// handshake (unexpected HTTP status, bad upgrade response, bad URL).
    #[error("upstream protocol mismatch: {0}")]
    ProtocolMismatch(String),
}

impl UpstreamConnectError {
    /// `true` when the upstream was reached but refused the session.
    ///
    /// Clients use the distinction to decide whether retrying can help.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            UpstreamConnectError::AuthRejected { .. } | UpstreamConnectError::ProtocolMismatch(_)
        )
    }
}

/// Why a session ended abnormally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    UpstreamConnect(#[from] UpstreamConnectError),

    /// A read or write failed mid-session.  Realtime payloads are not
    /// replayable, so the session is torn down rather than retried.
    #[error("{op} failed while forwarding {direction}: {detail}")]
    Forwarding {
        direction: Direction,
        op: IoOp,
        detail: String,
    },

    /// A single message exceeded the configured payload limit.
    #[error("{direction} message of {len} bytes exceeds limit of {limit} bytes")]
    OversizedMessage {
        direction: Direction,
        len: usize,
        limit: usize,
    },

    /// The client sent more messages than can be buffered while the upstream
    /// connection is still being established.
    #[error("more than {capacity} messages queued before upstream was ready")]
    ConnectQueueOverflow { capacity: usize },
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_and_protocol_failures_are_rejections() {
        assert!(UpstreamConnectError::AuthRejected { status: 401 }.is_rejection());
        assert!(UpstreamConnectError::ProtocolMismatch("200 OK".into()).is_rejection());
    }

    #[test]
    fn test_network_and_timeout_failures_are_not_rejections() {
        assert!(!UpstreamConnectError::Network("refused".into()).is_rejection());
        assert!(!UpstreamConnectError::Timeout(Duration::from_secs(10)).is_rejection());
    }

    #[test]
    fn test_forwarding_error_message_names_direction_and_op() {
        let err = SessionError::Forwarding {
            direction: Direction::UpstreamToClient,
            op: IoOp::Write,
            detail: "broken pipe".into(),
        };
        assert_eq!(
            err.to_string(),
            "write failed while forwarding upstream->client: broken pipe"
        );
    }

    #[test]
    fn test_connect_error_converts_into_session_error() {
        let err: SessionError = UpstreamConnectError::AuthRejected { status: 403 }.into();
        assert!(matches!(
            err,
            SessionError::UpstreamConnect(UpstreamConnectError::AuthRejected { status: 403 })
        ));
    }
}
