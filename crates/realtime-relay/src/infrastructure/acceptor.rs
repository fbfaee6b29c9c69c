//! ConnectionAcceptor: listener, accept loop and per-session tasks.
//!
//! This module is responsible for:
//!
//! 1. Refusing to build a [`Relay`] from a config without an upstream
//!    credential, before any socket exists.
//! 2. Binding the TCP listener on the configured address.
//! 3. Upgrading each connection to a WebSocket on the configured path, within
//!    the handshake timeout.  Other paths get HTTP 404.
//! 4. Registering the session and running its [`RelaySession`] in a dedicated
//!    Tokio task.
//! 5. Stopping: no more accepts, every session closed with 1001, and a
//!    bounded wait for the registry to drain.
//!
//! # Scalability
//!
//! The accept loop never awaits a session.  It spawns one task per
//! connection and goes straight back to `accept()`, so a slow handshake or a
//! slow upstream never delays other clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, info_span, warn, Instrument};

use relay_core::{CloseReason, SessionRegistry};

use crate::application::{shutdown_signalled, RelaySession, UpstreamConnector};
use crate::domain::{ConfigError, RelayConfig};
use crate::infrastructure::diagnostics::run_reporter;
use crate::infrastructure::upstream::{transport_config, WsUpstreamConnector};

/// Pause after a failed `accept()` (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

// ── Relay ─────────────────────────────────────────────────────────────────────

/// A configured relay, ready to [`start`](Relay::start).
///
/// Owns its registry; there is no process-global state, so several relays
/// can run side by side (as the integration tests do).
pub struct Relay<C = WsUpstreamConnector> {
    config: Arc<RelayConfig>,
    connector: Arc<C>,
    registry: Arc<SessionRegistry>,
}

impl Relay<WsUpstreamConnector> {
    /// Builds a relay that dials the configured upstream.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`]; most importantly
    /// [`ConfigError::MissingCredential`].
    pub fn from_config(config: RelayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let connector = WsUpstreamConnector::new(&config.upstream, &config.limits)?;
        Self::new(config, connector)
    }
}

impl<C: UpstreamConnector> Relay<C> {
    /// Builds a relay around any connector.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found by [`RelayConfig::validate`].
    pub fn new(config: RelayConfig, connector: C) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            connector: Arc::new(connector),
            registry: Arc::new(SessionRegistry::new()),
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Binds the listener and starts accepting in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound (port in use, no
    /// permission).
    pub async fn start(&self) -> anyhow::Result<RelayHandle> {
        let listener = TcpListener::bind(self.config.listen_addr)
            .await
            .with_context(|| {
                format!(
                    "failed to bind WebSocket listener on {}",
                    self.config.listen_addr
                )
            })?;
        let local_addr = listener
            .local_addr()
            .context("failed to read bound listener address")?;

        info!(
            addr = %local_addr,
            path = %self.config.path,
            upstream = %self.config.upstream.url,
            "realtime relay listening"
        );

        let (stop_tx, stop_rx) = watch::channel(false);

        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.config),
            Arc::clone(&self.connector),
            Arc::clone(&self.registry),
            stop_rx.clone(),
        ));

        let diagnostics_task = self.config.diagnostics.interval.map(|every| {
            tokio::spawn(run_reporter(
                Arc::clone(&self.registry),
                every,
                self.config.diagnostics.stale_after,
                stop_rx,
            ))
        });

        Ok(RelayHandle {
            local_addr,
            stop_tx,
            accept_task,
            diagnostics_task,
            registry: Arc::clone(&self.registry),
        })
    }
}

// ── RelayHandle ───────────────────────────────────────────────────────────────

/// A running relay.
///
/// Dropping the handle without calling [`stop`](Self::stop) also stops the
/// relay, but without waiting for sessions to drain.
pub struct RelayHandle {
    local_addr: SocketAddr,
    stop_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    diagnostics_task: Option<JoinHandle<()>>,
    registry: Arc<SessionRegistry>,
}

impl RelayHandle {
    /// The bound address; useful when the configured port was 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Stops accepting, closes every session with 1001 and waits up to
    /// `grace` for them to finish.
    ///
    /// Returns how many sessions were still registered when `grace` ran out
    /// (0 on a clean drain).
    pub async fn stop(self, grace: Duration) -> usize {
        info!(live = self.registry.len(), "stopping relay");
        self.stop_tx.send_replace(true);

        if let Err(e) = self.accept_task.await {
            error!("accept loop ended abnormally: {e}");
        }
        if let Some(task) = self.diagnostics_task {
            let _ = task.await;
        }

        match timeout(grace, self.registry.wait_until_empty()).await {
            Ok(()) => {
                info!("all sessions closed");
                0
            }
            Err(_) => {
                let remaining = self.registry.len();
                warn!(remaining, ?grace, "sessions still open after grace period");
                remaining
            }
        }
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn accept_loop<C: UpstreamConnector>(
    listener: TcpListener,
    config: Arc<RelayConfig>,
    connector: Arc<C>,
    registry: Arc<SessionRegistry>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "tcp connection accepted");
                    tokio::spawn(handle_connection(
                        stream,
                        peer,
                        Arc::clone(&config),
                        Arc::clone(&connector),
                        Arc::clone(&registry),
                        stop.clone(),
                    ));
                }
                Err(e) => {
                    // Transient (e.g. too many open files); keep serving.
                    error!("accept error: {e}");
                    sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            _ = shutdown_signalled(&mut stop) => {
                info!("stop requested; accept loop exiting");
                break;
            }
        }
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Upgrades one TCP connection and runs its session to completion.
async fn handle_connection<C: UpstreamConnector>(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<RelayConfig>,
    connector: Arc<C>,
    registry: Arc<SessionRegistry>,
    stop: watch::Receiver<bool>,
) {
    let limits = &config.limits;
    let handshake = accept_hdr_async_with_config(
        stream,
        path_check(config.path.clone(), peer),
        Some(transport_config(limits.max_message_size)),
    );

    let client = match timeout(limits.handshake_timeout, handshake).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            debug!(%peer, "websocket handshake failed: {e}");
            return;
        }
        Err(_) => {
            debug!(%peer, timeout = ?limits.handshake_timeout, "websocket handshake timed out");
            return;
        }
    };

    let registration = registry.register(peer);
    let id = registration.id();
    let span = info_span!("session", session_id = %id, %peer);

    async move {
        info!("client accepted");
        let session = RelaySession::new(registration, client, connector, limits.clone(), stop);
        match session.run().await {
            Ok(end) => info!(?end, "session closed"),
            Err(e) => warn!(
                close_code = CloseReason::from(&e).code(),
                "session closed with error: {e}"
            ),
        }
    }
    .instrument(span)
    .await;
}

/// Handshake callback that accepts only `expected` as the request path.
fn path_check(
    expected: String,
    peer: SocketAddr,
) -> impl FnOnce(&Request, Response) -> Result<Response, ErrorResponse> {
    move |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() == expected {
            return Ok(response);
        }
        debug!(%peer, path = %req.uri().path(), "upgrade on unknown path refused");
        let mut refused = ErrorResponse::new(Some("Not Found".to_string()));
        *refused.status_mut() = StatusCode::NOT_FOUND;
        Err(refused)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
