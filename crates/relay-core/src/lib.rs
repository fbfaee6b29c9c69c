//! # relay-core
//!
//! Socket-free building blocks of the realtime relay: who a session is, what
//! state it is in, where it is registered, and how it ends.
//!
//! The relay bridges browser WebSocket clients to an upstream realtime API.
//! Each accepted client becomes a *session* that owns exactly one client
//! socket and, once connected, exactly one upstream socket.  This crate holds
//! everything about sessions that can be expressed without touching a socket:
//!
//! - **`session`** – [`SessionId`] and the [`SessionState`] machine
//!   (`CONNECTING → ACTIVE → CLOSING → CLOSED`).
//! - **`registry`** – [`SessionRegistry`], the concurrent table of live
//!   sessions used for diagnostics and shutdown draining.
//! - **`error`** – classified per-session failures ([`SessionError`],
//!   [`UpstreamConnectError`]).
//! - **`close`** – [`CloseReason`], mapping each outcome to the WebSocket close
//!   code the client observes.
//!
//! The I/O side (listener, upstream connector, forwarder) lives in the
//! `realtime-relay` crate.

pub mod close;
pub mod error;
pub mod registry;
pub mod session;

pub use close::CloseReason;
pub use error::{Direction, IoOp, SessionError, UpstreamConnectError};
pub use registry::{SessionInfo, SessionRegistration, SessionRegistry};
pub use session::{InvalidTransition, SessionId, SessionState};
