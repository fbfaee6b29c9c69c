//! Infrastructure layer for realtime-relay.
//!
//! Everything that touches a real socket or the file system:
//!
//! - Binding the client-facing listener and running the accept loop
//! - Performing the WebSocket upgrade handshake with each client
//! - Dialling the upstream realtime API with the credential attached
//! - Reading the optional TOML configuration file
//! - Logging periodic session diagnostics
//!
//! Session behaviour itself lives in [`crate::application`].

pub mod acceptor;
pub mod config_file;
pub mod diagnostics;
pub mod upstream;

pub use acceptor::{Relay, RelayHandle};
pub use config_file::{ConfigFileError, RelayFile};
pub use upstream::WsUpstreamConnector;
