//! realtime-relay library crate.
//!
//! A WebSocket relay that pairs every browser client with its own upstream
//! realtime API connection.  The upstream credential is attached by the relay
//! and never reaches the client.
//!
//! # Architecture
//!
//! ```text
//! Browser (opaque text/binary frames over WebSocket)
//!         ↕
//! [realtime-relay]
//!   ├── domain/           RelayConfig and its validation
//!   ├── application/      RelaySession, MessageForwarder, UpstreamConnector seam
//!   └── infrastructure/
//!         ├── acceptor/    Listener, accept loop, Relay / RelayHandle
//!         ├── upstream/    WsUpstreamConnector (tokio-tungstenite + rustls)
//!         ├── diagnostics/ Periodic live-session report
//!         └── config_file/ Optional TOML configuration
//!         ↕
//! Upstream realtime API (Authorization: Bearer <key>)
//! ```
//!
//! Session identity, the state machine, the registry and close-code
//! classification live in the `relay-core` crate.
//!
//! # Layer rules
//!
//! - `domain` has no I/O, no async and no environment reads.
//! - `application` is generic over the byte stream under each WebSocket and
//!   never binds or dials anything itself.
//! - `infrastructure` owns every real socket.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: per-session relay logic.
pub mod application;

/// Infrastructure layer: listener, upstream dialer, config file, diagnostics.
pub mod infrastructure;

pub use infrastructure::{Relay, RelayHandle};
