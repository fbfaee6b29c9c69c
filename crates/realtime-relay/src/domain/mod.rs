//! Domain layer for realtime-relay.
//!
//! Pure configuration types with no I/O, no async and no environment reads.
//! Session identity and lifecycle types live in `relay-core`; this layer adds
//! what is specific to running the relay process.

pub mod config;

pub use config::{
    ConfigError, DiagnosticsConfig, RelayConfig, RelayLimits, UpstreamConfig, UpstreamCredential,
    DEFAULT_PORT, DEFAULT_UPSTREAM_URL,
};
