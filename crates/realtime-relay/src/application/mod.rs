//! Application layer: the per-session relay logic.
//!
//! Everything here is generic over the byte streams under the two
//! WebSockets, so the same code runs over TCP, TLS and in-memory duplex
//! pipes.  Binding sockets and dialling the real upstream belong to
//! [`crate::infrastructure`].

pub mod connector;
pub mod forwarder;
pub mod session;

pub use connector::UpstreamConnector;
pub use forwarder::{Inbound, MessageForwarder, PumpEnd};
pub use session::{shutdown_signalled, RelaySession, SessionEnd};
