//! WsUpstreamConnector: dials the realtime API for one session.
//!
//! Every session gets its own upstream WebSocket.  The request carries:
//!
//! - `Authorization: Bearer <key>`: the credential, marked sensitive so the
//!   `http` crate keeps it out of `Debug` output.  It is never placed in the
//!   URL and never sent back to the client.
//! - `OpenAI-Beta: realtime=v1` unless disabled in configuration.
//!
//! Failures are classified into [`UpstreamConnectError`] so the session can
//! tell the client whether the upstream was unreachable (1013) or refused the
//! connection (4001).  Nothing is retried here.

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use relay_core::{SessionId, UpstreamConnectError};

use crate::application::UpstreamConnector;
use crate::domain::{ConfigError, RelayLimits, UpstreamConfig};

const OPENAI_BETA: HeaderName = HeaderName::from_static("openai-beta");

/// Frames up to this multiple of the relay limit are read in full and then
/// rejected with 1009; larger ones fail in the transport.
const TRANSPORT_CEILING_FACTOR: usize = 2;
const MIN_TRANSPORT_CEILING: usize = 64 * 1024;

/// Transport settings shared by the client listener and the upstream dialer.
///
/// tungstenite's own ceiling sits above `max_message_size` so an oversized
/// message reaches the forwarder, which closes with a proper 1009 instead of
/// a transport error.
pub fn transport_config(max_message_size: usize) -> WebSocketConfig {
    let ceiling = max_message_size
        .saturating_mul(TRANSPORT_CEILING_FACTOR)
        .max(MIN_TRANSPORT_CEILING);
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(ceiling);
    config.max_frame_size = Some(ceiling);
    config
}

/// Production [`UpstreamConnector`] over TCP or TLS.
pub struct WsUpstreamConnector {
    url: String,
    authorization: HeaderValue,
    beta: Option<HeaderValue>,
    max_message_size: usize,
}

impl WsUpstreamConnector {
    /// Prepares the headers once; every session reuses them.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingCredential`] for a blank key and
    /// [`ConfigError::InvalidHeader`] for a key or beta value that cannot be
    /// sent as an HTTP header.
    pub fn new(upstream: &UpstreamConfig, limits: &RelayLimits) -> Result<Self, ConfigError> {
        if upstream.credential.is_blank() {
            return Err(ConfigError::MissingCredential);
        }

        let mut authorization =
            HeaderValue::from_str(&format!("Bearer {}", upstream.credential.expose().trim()))
                .map_err(|_| ConfigError::InvalidHeader {
                    name: "Authorization",
                })?;
        authorization.set_sensitive(true);

        let beta = upstream
            .beta_header
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|_| ConfigError::InvalidHeader {
                name: "OpenAI-Beta",
            })?;

        Ok(Self {
            url: upstream.url.trim().to_string(),
            authorization,
            beta,
            max_message_size: limits.max_message_size,
        })
    }

    /// Builds the upgrade request for one attempt.
    ///
    /// # Errors
    ///
    /// [`UpstreamConnectError::ProtocolMismatch`] when the URL cannot be
    /// turned into a WebSocket request.
    pub fn request(&self) -> Result<Request, UpstreamConnectError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| UpstreamConnectError::ProtocolMismatch(e.to_string()))?;

        let headers = request.headers_mut();
        headers.insert(AUTHORIZATION, self.authorization.clone());
        if let Some(beta) = &self.beta {
            headers.insert(OPENAI_BETA, beta.clone());
        }
        Ok(request)
    }
}

#[async_trait]
impl UpstreamConnector for WsUpstreamConnector {
    type Stream = MaybeTlsStream<TcpStream>;

    async fn connect(
        &self,
        session_id: SessionId,
    ) -> Result<WebSocketStream<Self::Stream>, UpstreamConnectError> {
        let request = self.request()?;
        let config = transport_config(self.max_message_size);

        let (stream, response) = connect_async_with_config(request, Some(config), false)
            .await
            .map_err(classify_connect_error)?;

        debug!(
            session_id = %session_id,
            status = %response.status(),
            "upstream handshake complete"
        );
        Ok(stream)
    }
}

/// Maps a handshake failure onto the three failure classes.
pub fn classify_connect_error(err: WsError) -> UpstreamConnectError {
    match err {
        WsError::Http(response) => {
            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                UpstreamConnectError::AuthRejected {
                    status: status.as_u16(),
                }
            } else {
                UpstreamConnectError::ProtocolMismatch(format!(
                    "upstream answered the upgrade with HTTP {status}"
                ))
            }
        }
        WsError::Io(e) => UpstreamConnectError::Network(e.to_string()),
        WsError::Tls(e) => UpstreamConnectError::Network(e.to_string()),
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            UpstreamConnectError::Network("connection closed during handshake".to_string())
        }
        other => UpstreamConnectError::ProtocolMismatch(other.to_string()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
