//! MessageForwarder: one direction of a session's message pump.
//!
//! A session runs two forwarders at once, one per direction:
//!
//! ```text
//! client socket ──read──► [ClientToUpstream] ──write──► upstream socket
//! client socket ◄──write── [UpstreamToClient] ◄──read── upstream socket
//! ```
//!
//! Each forwarder reads one message, writes it, and only then reads the next,
//! so arrival order is preserved within its direction and a slow destination
//! suspends the reader (backpressure) instead of growing a buffer.
//!
//! Payloads are opaque.  Text and binary messages are forwarded as the exact
//! `Message` value that was read; nothing is parsed or re-encoded.  The only
//! inspection is the payload length, checked against the configured limit.
//!
//! Ping and pong frames are per-hop: tungstenite answers pings on each socket
//! by itself, so they are not forwarded across.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::error::CapacityError;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use relay_core::{Direction, IoOp, SessionError};

/// Classified result of one read.
#[derive(Debug)]
pub enum Inbound {
    /// A text or binary message to forward.
    Data(Message),
    /// Ping, pong or raw frame; handled by the transport.
    Control,
    /// The peer ended the stream, with its close frame if it sent one.
    Closed(Option<CloseFrame<'static>>),
}

/// How a pump ended without error.
#[derive(Debug)]
pub struct PumpEnd {
    /// Close frame the source peer sent, if any.
    pub close_frame: Option<CloseFrame<'static>>,
    /// Messages forwarded by this pump.
    pub forwarded: u64,
}

/// Forwards messages in one direction with a payload cap.
#[derive(Debug, Clone, Copy)]
pub struct MessageForwarder {
    direction: Direction,
    max_message_size: usize,
}

impl MessageForwarder {
    pub fn new(direction: Direction, max_message_size: usize) -> Self {
        Self {
            direction,
            max_message_size,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Classifies the result of `reader.next()`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::OversizedMessage`] for a payload above the limit.
    /// - [`SessionError::Forwarding`] with [`IoOp::Read`] for any other read
    ///   failure, including a peer that vanished without a close frame.
    pub fn classify(
        &self,
        next: Option<Result<Message, WsError>>,
    ) -> Result<Inbound, SessionError> {
        match next {
            None => Ok(Inbound::Closed(None)),
            Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => {
                self.check_size(msg.len())?;
                Ok(Inbound::Data(msg))
            }
            Some(Ok(Message::Close(frame))) => Ok(Inbound::Closed(frame)),
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                Ok(Inbound::Control)
            }
            // Reading after the closing handshake completed.
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                Ok(Inbound::Closed(None))
            }
            Some(Err(WsError::Capacity(CapacityError::MessageTooLong { size, .. }))) => {
                Err(SessionError::OversizedMessage {
                    direction: self.direction,
                    len: size,
                    limit: self.max_message_size,
                })
            }
            Some(Err(err)) => Err(self.failure(IoOp::Read, &err)),
        }
    }

    /// Writes one message and flushes it.
    ///
    /// Suspends until the transport has accepted the bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Forwarding`] with [`IoOp::Write`].  The
    /// message is not retried.
    pub async fn send<W>(&self, writer: &mut W, msg: Message) -> Result<(), SessionError>
    where
        W: Sink<Message, Error = WsError> + Unpin,
    {
        writer
            .send(msg)
            .await
            .map_err(|err| self.failure(IoOp::Write, &err))
    }

    /// Forwards messages from `reader` to `writer` until the reader closes.
    ///
    /// Borrows both halves so the caller keeps ownership for the closing
    /// handshake.  Dropping the returned future stops forwarding at the next
    /// suspension point.
    ///
    /// # Errors
    ///
    /// Any read, write or size failure ends the pump with the classified
    /// [`SessionError`].
    pub async fn pump<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<PumpEnd, SessionError>
    where
        R: Stream<Item = Result<Message, WsError>> + Unpin,
        W: Sink<Message, Error = WsError> + Unpin,
    {
        let mut forwarded = 0u64;
        loop {
            match self.classify(reader.next().await)? {
                Inbound::Data(msg) => {
                    self.send(writer, msg).await?;
                    forwarded += 1;
                }
                Inbound::Control => {}
                Inbound::Closed(close_frame) => {
                    return Ok(PumpEnd {
                        close_frame,
                        forwarded,
                    })
                }
            }
        }
    }

    fn check_size(&self, len: usize) -> Result<(), SessionError> {
        if len > self.max_message_size {
            return Err(SessionError::OversizedMessage {
                direction: self.direction,
                len,
                limit: self.max_message_size,
            });
        }
        Ok(())
    }

    fn failure(&self, op: IoOp, err: &WsError) -> SessionError {
        SessionError::Forwarding {
            direction: self.direction,
            op,
            detail: err.to_string(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
