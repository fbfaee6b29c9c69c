//! RelaySession: one client socket, one upstream socket, one lifecycle.
//!
//! A session is driven by a single task that walks the state machine from
//! `relay-core`:
//!
//! ```text
//! CONNECTING ──upstream ready──► ACTIVE ──either side ends──► CLOSING ──► CLOSED
//!     │                                                          ▲
//!     └──── connect failure / client left / shutdown ────────────┘
//! ```
//!
//! - **CONNECTING**: the single upstream attempt runs while client messages
//!   are read into a bounded queue.  Whichever finishes first wins; if the
//!   client leaves, the attempt is dropped.
//! - **ACTIVE**: two [`MessageForwarder`] pumps run concurrently in one
//!   `select!`; the client-to-upstream pump drains the queue before live
//!   reads.  The first pump to finish cancels the other.
//! - **CLOSING**: every socket that is still open receives a close frame with
//!   the code for the outcome, bounded by `close_timeout`.  Queued messages
//!   are discarded.
//! - **CLOSED**: both sockets are dropped, then the registry entry goes.
//!
//! Teardown is signalled through return values and a shutdown `watch`
//! channel; there are no callbacks.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{stream, Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use relay_core::{
    CloseReason, Direction, SessionError, SessionId, SessionRegistration, SessionState,
    UpstreamConnectError,
};

use crate::application::connector::UpstreamConnector;
use crate::application::forwarder::{Inbound, MessageForwarder};
use crate::domain::RelayLimits;

/// How a session ended when nothing went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed during ACTIVE.
    ClientClosed,
    /// The upstream closed during ACTIVE.
    UpstreamClosed,
    /// The client went away before the upstream was ready.
    ClientLeftWhileConnecting,
    /// The relay was stopped.
    Shutdown,
}

/// A single relayed session.
pub struct RelaySession<S, C> {
    registration: SessionRegistration,
    client: WebSocketStream<S>,
    connector: Arc<C>,
    limits: RelayLimits,
    shutdown: watch::Receiver<bool>,
}

impl<S, C> RelaySession<S, C>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    C: UpstreamConnector,
{
    /// Wraps an accepted client socket.
    ///
    /// `registration` must still be in CONNECTING.  Setting `shutdown` to
    /// `true` (or dropping its sender) closes the session with 1001.
    pub fn new(
        registration: SessionRegistration,
        client: WebSocketStream<S>,
        connector: Arc<C>,
        limits: RelayLimits,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registration,
            client,
            connector,
            limits,
            shutdown,
        }
    }

    pub fn id(&self) -> SessionId {
        self.registration.id()
    }

    /// Runs the session to CLOSED.
    ///
    /// On return both sockets are dropped and the session is no longer in
    /// the registry.
    ///
    /// # Errors
    ///
    /// Returns the [`SessionError`] that ended the session.  The client has
    /// already been sent the matching close code; the error is handed back
    /// only so the caller can log it.
    pub async fn run(self) -> Result<SessionEnd, SessionError> {
        let RelaySession {
            mut registration,
            client,
            connector,
            limits,
            mut shutdown,
        } = self;

        let inbound = MessageForwarder::new(Direction::ClientToUpstream, limits.max_message_size);
        let outbound = MessageForwarder::new(Direction::UpstreamToClient, limits.max_message_size);
        let (mut client_tx, mut client_rx) = client.split();

        // ── CONNECTING ──────────────────────────────────────────────────────

        let window = connect_window(
            registration.id(),
            connector.as_ref(),
            &inbound,
            &mut client_rx,
            &limits,
            &mut shutdown,
        )
        .await;

        let (upstream, queued) = match window {
            ConnectWindow::Ready(upstream, queued) => (upstream, queued),
            ConnectWindow::ClientLeft => {
                debug!("client left before the upstream was ready");
                enter(&mut registration, SessionState::Closing);
                close_socket(&mut client_tx, &mut client_rx, None, limits.close_timeout).await;
                drop((client_tx, client_rx));
                enter(&mut registration, SessionState::Closed);
                return Ok(SessionEnd::ClientLeftWhileConnecting);
            }
            ConnectWindow::Shutdown => {
                enter(&mut registration, SessionState::Closing);
                close_socket(
                    &mut client_tx,
                    &mut client_rx,
                    Some(CloseReason::GoingAway),
                    limits.close_timeout,
                )
                .await;
                drop((client_tx, client_rx));
                enter(&mut registration, SessionState::Closed);
                return Ok(SessionEnd::Shutdown);
            }
            ConnectWindow::Failed(err) => {
                enter(&mut registration, SessionState::Closing);
                close_socket(
                    &mut client_tx,
                    &mut client_rx,
                    Some(CloseReason::from(&err)),
                    limits.close_timeout,
                )
                .await;
                drop((client_tx, client_rx));
                enter(&mut registration, SessionState::Closed);
                return Err(err);
            }
        };

        // ── ACTIVE ──────────────────────────────────────────────────────────

        enter(&mut registration, SessionState::Active);
        info!(queued = queued.len(), "upstream connected, forwarding");
        let (mut upstream_tx, mut upstream_rx) = upstream.split();

        let outcome = {
            // Queued messages drain ahead of live reads, inside the select.
            let mut client_in = queued_then_live(queued, &mut client_rx);
            tokio::select! {
                pumped = inbound.pump(&mut client_in, &mut upstream_tx) => match pumped {
                    Ok(end) => {
                        debug!(forwarded = end.forwarded, "client closed");
                        Active::ClientClosed
                    }
                    Err(err) => Active::Failed(err),
                },
                pumped = outbound.pump(&mut upstream_rx, &mut client_tx) => match pumped {
                    Ok(end) => {
                        debug!(forwarded = end.forwarded, "upstream closed");
                        Active::UpstreamClosed
                    }
                    Err(err) => Active::Failed(err),
                },
                _ = shutdown_signalled(&mut shutdown) => Active::Shutdown,
            }
        };

        // ── CLOSING ─────────────────────────────────────────────────────────

        enter(&mut registration, SessionState::Closing);
        let (client_reason, upstream_reason, result) = match outcome {
            Active::ClientClosed => (None, Some(CloseReason::Normal), Ok(SessionEnd::ClientClosed)),
            Active::UpstreamClosed => (
                Some(CloseReason::Normal),
                None,
                Ok(SessionEnd::UpstreamClosed),
            ),
            Active::Shutdown => (
                Some(CloseReason::GoingAway),
                Some(CloseReason::GoingAway),
                Ok(SessionEnd::Shutdown),
            ),
            Active::Failed(err) => (
                Some(CloseReason::from(&err)),
                Some(CloseReason::Normal),
                Err(err),
            ),
        };

        tokio::join!(
            close_socket(&mut client_tx, &mut client_rx, client_reason, limits.close_timeout),
            close_socket(
                &mut upstream_tx,
                &mut upstream_rx,
                upstream_reason,
                limits.close_timeout
            ),
        );
        drop((client_tx, client_rx, upstream_tx, upstream_rx));

        // ── CLOSED ──────────────────────────────────────────────────────────

        enter(&mut registration, SessionState::Closed);
        result
    }
}

/// Resolves once the relay asks sessions to stop.
///
/// A dropped sender counts as a stop request.
pub async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

// ── Internals ─────────────────────────────────────────────────────────────────

enum ConnectWindow<U> {
    Ready(WebSocketStream<U>, VecDeque<Message>),
    ClientLeft,
    Shutdown,
    Failed(SessionError),
}

enum Active {
    ClientClosed,
    UpstreamClosed,
    Shutdown,
    Failed(SessionError),
}

/// Runs the one upstream attempt while queueing client messages.
async fn connect_window<C, R>(
    id: SessionId,
    connector: &C,
    inbound: &MessageForwarder,
    client_rx: &mut R,
    limits: &RelayLimits,
    shutdown: &mut watch::Receiver<bool>,
) -> ConnectWindow<C::Stream>
where
    C: UpstreamConnector,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut queued = VecDeque::new();
    let attempt = timeout(limits.connect_timeout, connector.connect(id));
    tokio::pin!(attempt);

    loop {
        tokio::select! {
            result = &mut attempt => {
                return match result {
                    Ok(Ok(upstream)) => ConnectWindow::Ready(upstream, queued),
                    Ok(Err(err)) => ConnectWindow::Failed(err.into()),
                    Err(_elapsed) => ConnectWindow::Failed(
                        UpstreamConnectError::Timeout(limits.connect_timeout).into(),
                    ),
                };
            }
            next = client_rx.next() => match inbound.classify(next) {
                Ok(Inbound::Data(msg)) => {
                    if queued.len() >= limits.connect_queue_capacity {
                        return ConnectWindow::Failed(SessionError::ConnectQueueOverflow {
                            capacity: limits.connect_queue_capacity,
                        });
                    }
                    queued.push_back(msg);
                }
                Ok(Inbound::Control) => {}
                Ok(Inbound::Closed(_)) => return ConnectWindow::ClientLeft,
                // Nothing has been forwarded yet, so a broken client socket is
                // just a client that left.
                Err(SessionError::Forwarding { detail, .. }) => {
                    debug!("client socket failed while connecting: {detail}");
                    return ConnectWindow::ClientLeft;
                }
                Err(err) => return ConnectWindow::Failed(err),
            },
            _ = shutdown_signalled(shutdown) => return ConnectWindow::Shutdown,
        }
    }
}

/// Yields the connect-window queue in arrival order, then live client reads.
fn queued_then_live<'a, R>(
    queued: VecDeque<Message>,
    client_rx: &'a mut R,
) -> impl Stream<Item = Result<Message, WsError>> + Unpin + 'a
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    stream::iter(queued.into_iter().map(Ok)).chain(client_rx)
}

/// Closes one socket within `within`.
///
/// With `Some(reason)` the relay starts the closing handshake and waits for
/// the peer's answer, discarding anything that arrives first.  With `None`
/// the peer already started it and the relay only completes it.
async fn close_socket<W, R>(
    writer: &mut W,
    reader: &mut R,
    reason: Option<CloseReason>,
    within: Duration,
) where
    W: Sink<Message, Error = WsError> + Unpin,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let handshake = async {
        match reason {
            Some(reason) => {
                if let Err(err) = writer.send(Message::Close(Some(close_frame(reason)))).await {
                    debug!(code = reason.code(), "close frame not delivered: {err}");
                    return;
                }
                while let Some(Ok(msg)) = reader.next().await {
                    if msg.is_close() {
                        break;
                    }
                }
            }
            None => {
                let _ = writer.close().await;
            }
        }
    };

    if timeout(within, handshake).await.is_err() {
        debug!(?within, "peer did not finish the closing handshake");
    }
}

fn close_frame(reason: CloseReason) -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::from(reason.code()),
        reason: reason.reason().into(),
    }
}

fn enter(registration: &mut SessionRegistration, next: SessionState) {
    if let Err(err) = registration.advance(next) {
        warn!("{err}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::io::DuplexStream;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;
    use tokio_tungstenite::tungstenite::protocol::Role;

    use relay_core::SessionRegistry;

    use super::*;
    use crate::application::connector::MockUpstreamConnector;

    type Ws = WebSocketStream<DuplexStream>;

    const WAIT: Duration = Duration::from_secs(5);

    /// Returns `(server_role, client_role)` ends of one in-memory socket.
    async fn ws_pair() -> (Ws, Ws) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(b, Role::Client, None).await;
        (server, client)
    }

    fn limits() -> RelayLimits {
        RelayLimits {
            connect_timeout: Duration::from_secs(2),
            close_timeout: Duration::from_millis(500),
            ..RelayLimits::default()
        }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    struct Harness {
        registry: Arc<SessionRegistry>,
        /// Test-side end of the client socket.
        client: Ws,
        stop: watch::Sender<bool>,
        task: JoinHandle<Result<SessionEnd, SessionError>>,
    }

    async fn start<C: UpstreamConnector>(connector: C, limits: RelayLimits) -> Harness {
        let registry = Arc::new(SessionRegistry::new());
        let (relay_side, client) = ws_pair().await;
        let (stop, stop_rx) = watch::channel(false);
        let session = RelaySession::new(
            registry.register(peer()),
            relay_side,
            Arc::new(connector),
            limits,
            stop_rx,
        );
        let task = tokio::spawn(session.run());
        Harness {
            registry,
            client,
            stop,
            task,
        }
    }

    /// A mock that hands out the relay's end of an upstream socket and keeps
    /// the test's end.
    async fn connected_mock() -> (MockUpstreamConnector, Ws) {
        let (fake_upstream, relay_upstream) = ws_pair().await;
        let mut mock = MockUpstreamConnector::new();
        mock.expect_connect()
            .times(1)
            .return_once(move |_| Ok(relay_upstream));
        (mock, fake_upstream)
    }

    async fn next_close_code(ws: &mut Ws) -> u16 {
        let read = async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(Some(frame)))) => return u16::from(frame.code),
                    Some(Ok(_)) => continue,
                    other => panic!("expected a close frame, got {other:?}"),
                }
            }
        };
        timeout(WAIT, read).await.expect("close frame in time")
    }

    async fn next_text(ws: &mut Ws) -> String {
        match timeout(WAIT, ws.next()).await.expect("message in time") {
            Some(Ok(Message::Text(text))) => text,
            other => panic!("expected text, got {other:?}"),
        }
    }

    async fn wait_for_state(registry: &SessionRegistry, state: SessionState) {
        let reached = async {
            while registry.snapshot().first().map(|s| s.state) != Some(state) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        timeout(WAIT, reached).await.expect("session reaches state in time");
    }

    async fn finish(task: JoinHandle<Result<SessionEnd, SessionError>>) -> Result<SessionEnd, SessionError> {
        timeout(WAIT, task)
            .await
            .expect("session ends in time")
            .expect("session task does not panic")
    }

    /// Never connects; records when the attempt is dropped.
    struct PendingConnector {
        abandoned: Arc<AtomicBool>,
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl UpstreamConnector for PendingConnector {
        type Stream = DuplexStream;

        async fn connect(&self, _session_id: SessionId) -> Result<Ws, UpstreamConnectError> {
            let _guard = SetOnDrop(Arc::clone(&self.abandoned));
            std::future::pending().await
        }
    }

    /// Connects only after the test opens the gate.
    struct GatedConnector {
        gate: Mutex<Option<oneshot::Receiver<()>>>,
        upstream: Mutex<Option<Ws>>,
    }

    #[async_trait]
    impl UpstreamConnector for GatedConnector {
        type Stream = DuplexStream;

        async fn connect(&self, _session_id: SessionId) -> Result<Ws, UpstreamConnectError> {
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.upstream
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| UpstreamConnectError::Network("already used".into()))
        }
    }

    #[tokio::test]
    async fn test_forwards_both_directions_in_order() {
        // Arrange
        let (mock, mut upstream) = connected_mock().await;
        let mut h = start(mock, limits()).await;

        // Act: client → upstream
        h.client.send(Message::Text(r#"{"type":"ping"}"#.into())).await.unwrap();
        h.client
            .send(Message::Text(r#"{"type":"audio","seq":1}"#.into()))
            .await
            .unwrap();

        // Assert
        assert_eq!(next_text(&mut upstream).await, r#"{"type":"ping"}"#);
        assert_eq!(next_text(&mut upstream).await, r#"{"type":"audio","seq":1}"#);

        // Act: upstream → client
        upstream.send(Message::Text(r#"{"type":"pong"}"#.into())).await.unwrap();
        upstream
            .send(Message::Text(r#"{"type":"audio_ack","seq":1}"#.into()))
            .await
            .unwrap();

        // Assert
        assert_eq!(next_text(&mut h.client).await, r#"{"type":"pong"}"#);
        assert_eq!(next_text(&mut h.client).await, r#"{"type":"audio_ack","seq":1}"#);
        assert_eq!(h.registry.len(), 1);
    }

    #[tokio::test]
    async fn test_binary_payload_is_byte_identical() {
        let (mock, mut upstream) = connected_mock().await;
        let mut h = start(mock, limits()).await;
        let payload: Vec<u8> = (0..=255).collect();

        h.client.send(Message::Binary(payload.clone())).await.unwrap();

        match timeout(WAIT, upstream.next()).await.unwrap() {
            Some(Ok(Message::Binary(got))) => assert_eq!(got, payload),
            other => panic!("expected binary, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_client_close_closes_upstream_with_normal_closure() {
        // Arrange
        let (mock, mut upstream) = connected_mock().await;
        let mut h = start(mock, limits()).await;
        h.client.send(Message::Text("hello".into())).await.unwrap();
        assert_eq!(next_text(&mut upstream).await, "hello");

        // Act
        h.client.close(None).await.unwrap();

        // Assert
        assert_eq!(next_close_code(&mut upstream).await, 1000);
        assert_eq!(finish(h.task).await, Ok(SessionEnd::ClientClosed));
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_close_closes_client_with_normal_closure() {
        // Arrange
        let (mock, mut upstream) = connected_mock().await;
        let mut h = start(mock, limits()).await;

        // Act
        upstream.close(None).await.unwrap();

        // Assert
        assert_eq!(next_close_code(&mut h.client).await, 1000);
        assert_eq!(finish(h.task).await, Ok(SessionEnd::UpstreamClosed));
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_closes_client_with_1013() {
        // Arrange
        let mut mock = MockUpstreamConnector::new();
        mock.expect_connect()
            .times(1)
            .returning(|_| Err(UpstreamConnectError::Network("connection refused".into())));

        // Act
        let mut h = start(mock, limits()).await;

        // Assert
        assert_eq!(next_close_code(&mut h.client).await, 1013);
        assert!(matches!(
            finish(h.task).await,
            Err(SessionError::UpstreamConnect(UpstreamConnectError::Network(_)))
        ));
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_upstream_closes_client_with_4001() {
        let mut mock = MockUpstreamConnector::new();
        mock.expect_connect()
            .times(1)
            .returning(|_| Err(UpstreamConnectError::AuthRejected { status: 401 }));

        let mut h = start(mock, limits()).await;

        assert_eq!(next_close_code(&mut h.client).await, 4001);
        assert!(finish(h.task).await.is_err());
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_connect_timeout_is_a_connect_failure() {
        // Arrange: an attempt that never finishes, a short window.
        let abandoned = Arc::new(AtomicBool::new(false));
        let connector = PendingConnector {
            abandoned: Arc::clone(&abandoned),
        };
        let limits = RelayLimits {
            connect_timeout: Duration::from_millis(50),
            ..limits()
        };

        // Act
        let mut h = start(connector, limits).await;

        // Assert
        assert_eq!(next_close_code(&mut h.client).await, 1013);
        assert_eq!(
            finish(h.task).await,
            Err(SessionError::UpstreamConnect(UpstreamConnectError::Timeout(
                Duration::from_millis(50)
            )))
        );
        assert!(abandoned.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_client_leaving_while_connecting_abandons_attempt() {
        // Arrange
        let abandoned = Arc::new(AtomicBool::new(false));
        let connector = PendingConnector {
            abandoned: Arc::clone(&abandoned),
        };
        let mut h = start(connector, limits()).await;
        let id = h.registry.snapshot()[0].id;
        assert_eq!(h.registry.get(id).unwrap().state, SessionState::Connecting);

        // Act
        h.client.close(None).await.unwrap();

        // Assert
        assert_eq!(finish(h.task).await, Ok(SessionEnd::ClientLeftWhileConnecting));
        assert!(abandoned.load(Ordering::SeqCst));
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_messages_sent_while_connecting_are_flushed_in_order() {
        // Arrange
        let (fake_upstream, relay_upstream) = ws_pair().await;
        let mut upstream = fake_upstream;
        let (open, gate) = oneshot::channel();
        let connector = GatedConnector {
            gate: Mutex::new(Some(gate)),
            upstream: Mutex::new(Some(relay_upstream)),
        };
        let mut h = start(connector, limits()).await;

        // Act
        for i in 0..3 {
            h.client.send(Message::Text(format!("early-{i}"))).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        open.send(()).unwrap();
        h.client.send(Message::Text("live".into())).await.unwrap();

        // Assert
        for i in 0..3 {
            assert_eq!(next_text(&mut upstream).await, format!("early-{i}"));
        }
        assert_eq!(next_text(&mut upstream).await, "live");
    }

    #[tokio::test]
    async fn test_connect_queue_overflow_closes_with_1008() {
        // Arrange: the gate is never opened.
        let (_fake_upstream, relay_upstream) = ws_pair().await;
        let (_open, gate) = oneshot::channel::<()>();
        let connector = GatedConnector {
            gate: Mutex::new(Some(gate)),
            upstream: Mutex::new(Some(relay_upstream)),
        };
        let limits = RelayLimits {
            connect_queue_capacity: 2,
            ..limits()
        };
        let mut h = start(connector, limits).await;

        // Act
        for i in 0..3 {
            h.client.send(Message::Text(format!("m{i}"))).await.unwrap();
        }

        // Assert
        assert_eq!(next_close_code(&mut h.client).await, 1008);
        assert_eq!(
            finish(h.task).await,
            Err(SessionError::ConnectQueueOverflow { capacity: 2 })
        );
    }

    #[tokio::test]
    async fn test_oversized_message_closes_with_1009() {
        // Arrange
        let (mock, mut upstream) = connected_mock().await;
        let limits = RelayLimits {
            max_message_size: 8,
            ..limits()
        };
        let mut h = start(mock, limits).await;
        wait_for_state(&h.registry, SessionState::Active).await;

        // Act
        h.client.send(Message::Text("123456789".into())).await.unwrap();

        // Assert
        assert_eq!(next_close_code(&mut h.client).await, 1009);
        assert_eq!(next_close_code(&mut upstream).await, 1000);
        assert!(matches!(
            finish(h.task).await,
            Err(SessionError::OversizedMessage { len: 9, limit: 8, .. })
        ));
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_message_while_connecting_closes_with_1009() {
        // Arrange: the upstream never becomes ready.
        let abandoned = Arc::new(AtomicBool::new(false));
        let connector = PendingConnector {
            abandoned: Arc::clone(&abandoned),
        };
        let limits = RelayLimits {
            max_message_size: 8,
            ..limits()
        };
        let mut h = start(connector, limits).await;

        // Act
        h.client.send(Message::Text("123456789".into())).await.unwrap();

        // Assert
        assert_eq!(next_close_code(&mut h.client).await, 1009);
        assert!(matches!(
            finish(h.task).await,
            Err(SessionError::OversizedMessage { len: 9, limit: 8, .. })
        ));
        assert!(abandoned.load(Ordering::SeqCst));
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_flush_to_stalled_upstream() {
        // Arrange: an upstream that never reads, and more queued data than
        // its socket buffer holds.
        let (_stalled_upstream, relay_upstream) = ws_pair().await;
        let (open, gate) = oneshot::channel();
        let connector = GatedConnector {
            gate: Mutex::new(Some(gate)),
            upstream: Mutex::new(Some(relay_upstream)),
        };
        let mut h = start(connector, limits()).await;
        for _ in 0..4 {
            h.client.send(Message::Binary(vec![0u8; 60 * 1024])).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        open.send(()).unwrap();
        wait_for_state(&h.registry, SessionState::Active).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Act
        h.stop.send_replace(true);

        // Assert
        assert_eq!(next_close_code(&mut h.client).await, 1001);
        assert_eq!(finish(h.task).await, Ok(SessionEnd::Shutdown));
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_closes_both_sockets_with_1001() {
        // Arrange
        let (mock, mut upstream) = connected_mock().await;
        let mut h = start(mock, limits()).await;
        h.client.send(Message::Text("warm-up".into())).await.unwrap();
        assert_eq!(next_text(&mut upstream).await, "warm-up");

        // Act
        h.stop.send_replace(true);

        // Assert
        assert_eq!(next_close_code(&mut h.client).await, 1001);
        assert_eq!(next_close_code(&mut upstream).await, 1001);
        assert_eq!(finish(h.task).await, Ok(SessionEnd::Shutdown));
        assert!(h.registry.is_empty());
    }

    #[test]
    fn test_close_frame_carries_code_and_reason() {
        let frame = close_frame(CloseReason::UpstreamRejected);
        assert_eq!(u16::from(frame.code), 4001);
        assert_eq!(frame.reason, "upstream rejected connection");
    }
}
