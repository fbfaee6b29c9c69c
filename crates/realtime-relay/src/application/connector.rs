//! The upstream connection seam.
//!
//! A session asks an [`UpstreamConnector`] for its paired upstream socket
//! exactly once.  The production implementation
//! ([`WsUpstreamConnector`](crate::infrastructure::upstream::WsUpstreamConnector))
//! dials the realtime API over `ws://` or `wss://`; tests plug in in-memory
//! sockets or mocks.
//!
//! The trait is generic over the byte stream under the WebSocket so the
//! session logic is identical for TCP, TLS and in-memory transports.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;

use relay_core::{SessionId, UpstreamConnectError};

/// Opens the upstream half of a session.
#[cfg_attr(test, mockall::automock(type Stream = tokio::io::DuplexStream;))]
#[async_trait]
pub trait UpstreamConnector: Send + Sync + 'static {
    /// Transport under the upstream WebSocket.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Opens one upstream WebSocket for `session_id`.
    ///
    /// Implementations attach the upstream credential themselves; it never
    /// passes through the session.  They must not retry: a failure is
    /// terminal for the session.  The caller bounds the attempt with its own
    /// timeout and may drop the future at any point to abandon it.
    async fn connect(
        &self,
        session_id: SessionId,
    ) -> Result<WebSocketStream<Self::Stream>, UpstreamConnectError>;
}
