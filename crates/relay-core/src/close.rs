//! Close-code classification.
//!
//! When the relay closes a socket it tells the peer *why* with a WebSocket
//! close code and a short reason.  Clients rely on the code to pick a retry
//! strategy, so every session outcome maps to exactly one entry below:
//!
//! | Reason                 | Code | Text                           |
//! |------------------------|------|--------------------------------|
//! | `Normal`               | 1000 | `normal closure`               |
//! | `GoingAway`            | 1001 | `relay shutting down`          |
//! | `ConnectQueueOverflow` | 1008 | `connect queue overflow`       |
//! | `MessageTooBig`        | 1009 | `message too big`              |
//! | `ForwardingError`      | 1011 | `internal forwarding error`    |
//! | `UpstreamUnavailable`  | 1013 | `upstream unavailable`         |
//! | `UpstreamRejected`     | 4001 | `upstream rejected connection` |
//!
//! 4001 sits in the private-use range (4000-4999) because RFC 6455 reserves
//! nothing for "the server behind me refused you".

use crate::error::SessionError;

/// Why the relay is closing a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// The peer closed cleanly; this side follows.
    Normal,
    /// The relay process is stopping.
    GoingAway,
    /// Too many messages arrived before the upstream was ready.
    ConnectQueueOverflow,
    /// A message exceeded the payload limit.
    MessageTooBig,
    /// A read or write failed mid-session.
    ForwardingError,
    /// The upstream could not be reached in time.
    UpstreamUnavailable,
    /// The upstream was reached but refused the connection.
    UpstreamRejected,
}

impl CloseReason {
    /// The RFC 6455 close code sent on the wire.
    pub fn code(self) -> u16 {
        match self {
            CloseReason::Normal => 1000,
            CloseReason::GoingAway => 1001,
            CloseReason::ConnectQueueOverflow => 1008,
            CloseReason::MessageTooBig => 1009,
            CloseReason::ForwardingError => 1011,
            CloseReason::UpstreamUnavailable => 1013,
            CloseReason::UpstreamRejected => 4001,
        }
    }

    /// Human-readable reason sent alongside the code.  Always shorter than
    /// the 123-byte limit of a close frame.
    pub fn reason(self) -> &'static str {
        match self {
            CloseReason::Normal => "normal closure",
            CloseReason::GoingAway => "relay shutting down",
            CloseReason::ConnectQueueOverflow => "connect queue overflow",
            CloseReason::MessageTooBig => "message too big",
            CloseReason::ForwardingError => "internal forwarding error",
            CloseReason::UpstreamUnavailable => "upstream unavailable",
            CloseReason::UpstreamRejected => "upstream rejected connection",
        }
    }

    /// Reverse lookup, used by clients and tests that only see the code.
    pub fn from_code(code: u16) -> Option<Self> {
        [
            CloseReason::Normal,
            CloseReason::GoingAway,
            CloseReason::ConnectQueueOverflow,
            CloseReason::MessageTooBig,
            CloseReason::ForwardingError,
            CloseReason::UpstreamUnavailable,
            CloseReason::UpstreamRejected,
        ]
        .into_iter()
        .find(|reason| reason.code() == code)
    }
}

impl From<&SessionError> for CloseReason {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::UpstreamConnect(e) if e.is_rejection() => CloseReason::UpstreamRejected,
            SessionError::UpstreamConnect(_) => CloseReason::UpstreamUnavailable,
            SessionError::Forwarding { .. } => CloseReason::ForwardingError,
            SessionError::OversizedMessage { .. } => CloseReason::MessageTooBig,
            SessionError::ConnectQueueOverflow { .. } => CloseReason::ConnectQueueOverflow,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use super::*;
    use crate::error::{Direction, IoOp, UpstreamConnectError};

    const ALL: [CloseReason; 7] = [
        CloseReason::Normal,
        CloseReason::GoingAway,
        CloseReason::ConnectQueueOverflow,
        CloseReason::MessageTooBig,
        CloseReason::ForwardingError,
        CloseReason::UpstreamUnavailable,
        CloseReason::UpstreamRejected,
    ];

    #[test]
    fn test_codes_are_distinct() {
        let codes: HashSet<u16> = ALL.iter().map(|r| r.code()).collect();
        assert_eq!(codes.len(), ALL.len());
    }

    #[test]
    fn test_reasons_fit_in_a_close_frame() {
        for reason in ALL {
            assert!(reason.reason().len() <= 123, "{reason:?}");
        }
    }

    #[test]
    fn test_from_code_inverts_code() {
        for reason in ALL {
            assert_eq!(CloseReason::from_code(reason.code()), Some(reason));
        }
        assert_eq!(CloseReason::from_code(1006), None);
    }

    #[test]
    fn test_unreachable_upstream_maps_to_1013() {
        let err = SessionError::from(UpstreamConnectError::Timeout(Duration::from_secs(1)));
        assert_eq!(CloseReason::from(&err).code(), 1013);
    }

    #[test]
    fn test_rejecting_upstream_maps_to_4001() {
        let err = SessionError::from(UpstreamConnectError::AuthRejected { status: 401 });
        assert_eq!(CloseReason::from(&err), CloseReason::UpstreamRejected);
    }

    #[test]
    fn test_forwarding_and_oversize_map_to_distinct_codes() {
        let forwarding = SessionError::Forwarding {
            direction: Direction::ClientToUpstream,
            op: IoOp::Read,
            detail: "reset".into(),
        };
        let oversized = SessionError::OversizedMessage {
            direction: Direction::ClientToUpstream,
            len: 2048,
            limit: 1024,
        };
        assert_eq!(CloseReason::from(&forwarding).code(), 1011);
        assert_eq!(CloseReason::from(&oversized).code(), 1009);
    }

    #[test]
    fn test_queue_overflow_maps_to_policy_violation() {
        let err = SessionError::ConnectQueueOverflow { capacity: 64 };
        assert_eq!(CloseReason::from(&err).code(), 1008);
    }
}
