//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! It is a plain struct: no global state, no environment reads.  `main.rs`
//! fills it from CLI flags, environment variables and an optional TOML file;
//! tests build it directly.
//!
//! [`RelayConfig::validate`] is the startup gate.  A relay is never
//! constructed from a config that fails it, so a missing upstream credential
//! stops the process before any socket is bound.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Default listening port for client WebSocket upgrades.
pub const DEFAULT_PORT: u16 = 8081;

/// Default upstream realtime endpoint.
pub const DEFAULT_UPSTREAM_URL: &str =
    "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview-2024-10-01";

/// Default value of the `OpenAI-Beta` header sent upstream.
pub const DEFAULT_BETA_HEADER: &str = "realtime=v1";

/// Default per-message payload cap (8 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Errors that make a configuration unusable.  All of them are fatal at
/// startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The upstream API key is absent or blank.
    #[error("upstream API key is missing; set OPENAI_API_KEY")]
    MissingCredential,

    #[error("upstream URL must start with ws:// or wss://, got '{0}'")]
    InvalidUpstreamUrl(String),

    #[error("listen path must start with '/', got '{0}'")]
    InvalidPath(String),

    #[error("{name} must be greater than zero")]
    InvalidLimit { name: &'static str },

    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    #[error("upstream header value for {name} must be visible ASCII")]
    InvalidHeader { name: &'static str },
}

/// The secret used to authenticate to the upstream.
///
/// Its `Debug` output is redacted so the key cannot leak through a logged
/// config.  The raw value is only read when building the upstream request.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UpstreamCredential(String);

impl UpstreamCredential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for the upstream `Authorization` header only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for UpstreamCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_blank() {
            f.write_str("UpstreamCredential(<empty>)")
        } else {
            f.write_str("UpstreamCredential(<redacted>)")
        }
    }
}

/// Where and how to reach the upstream realtime API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// `ws://` or `wss://` endpoint.  Must not carry the credential.
    pub url: String,
    pub credential: UpstreamCredential,
    /// Value of the `OpenAI-Beta` header; `None` omits the header.
    pub beta_header: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_UPSTREAM_URL.to_string(),
            credential: UpstreamCredential::default(),
            beta_header: Some(DEFAULT_BETA_HEADER.to_string()),
        }
    }
}

/// Per-session resource bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayLimits {
    /// Largest text or binary payload forwarded in either direction.
    pub max_message_size: usize,
    /// Client messages buffered while the upstream is still connecting.
    pub connect_queue_capacity: usize,
    /// Upper bound on one upstream connect attempt.
    pub connect_timeout: Duration,
    /// Upper bound on the client's upgrade handshake.
    pub handshake_timeout: Duration,
    /// How long to wait for a peer to finish the closing handshake.
    pub close_timeout: Duration,
}

impl Default for RelayLimits {
    /// | Field                  | Default |
    /// |------------------------|---------|
    /// | max_message_size       | 8 MiB   |
    /// | connect_queue_capacity | 64      |
    /// | connect_timeout        | 10 s    |
    /// | handshake_timeout      | 10 s    |
    /// | close_timeout          | 2 s     |
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            connect_queue_capacity: 64,
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(2),
        }
    }
}

/// Periodic live-session reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    /// Report period; `None` disables the reporter.
    pub interval: Option<Duration>,
    /// Sessions older than this are reported as stale.
    pub stale_after: Duration,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            interval: Some(Duration::from_secs(60)),
            stale_after: Duration::from_secs(60 * 60),
        }
    }
}

/// All runtime configuration for the relay.
///
/// Build it once at startup, validate it, then hand it to
/// [`Relay::new`](crate::infrastructure::Relay::new), which shares it across
/// session tasks behind an `Arc`.
///
/// # Example
///
/// ```rust
/// use realtime_relay::domain::{RelayConfig, UpstreamCredential};
///
/// let mut cfg = RelayConfig::default();
/// assert_eq!(cfg.listen_addr.port(), 8081);
/// assert!(cfg.validate().is_err(), "no credential yet");
///
/// cfg.upstream.credential = UpstreamCredential::new("sk-test");
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address the client-facing listener binds to.
    pub listen_addr: SocketAddr,
    /// Only upgrades on this path are accepted.
    pub path: String,
    pub upstream: UpstreamConfig,
    pub limits: RelayLimits,
    pub diagnostics: DiagnosticsConfig,
}

impl Default for RelayConfig {
    /// Local-development defaults.  The credential is empty, so the default
    /// config does not validate until one is supplied.
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            path: "/".to_string(),
            upstream: UpstreamConfig::default(),
            limits: RelayLimits::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Checks every startup invariant.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.  The credential is checked
    /// first: without it nothing else matters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.credential.is_blank() {
            return Err(ConfigError::MissingCredential);
        }

        let url = self.upstream.url.trim();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::InvalidUpstreamUrl(self.upstream.url.clone()));
        }

        if !self.path.starts_with('/') {
            return Err(ConfigError::InvalidPath(self.path.clone()));
        }

        if let Some(beta) = &self.upstream.beta_header {
            if beta.is_empty() || !beta.bytes().all(|b| (0x20..0x7f).contains(&b)) {
                return Err(ConfigError::InvalidHeader {
                    name: "OpenAI-Beta",
                });
            }
        }

        let limits = &self.limits;
        let checks: [(&'static str, bool); 6] = [
            ("max_message_size", limits.max_message_size > 0),
            ("connect_queue_capacity", limits.connect_queue_capacity > 0),
            ("connect_timeout", !limits.connect_timeout.is_zero()),
            ("handshake_timeout", !limits.handshake_timeout.is_zero()),
            ("close_timeout", !limits.close_timeout.is_zero()),
            (
                "diagnostics_interval",
                self.diagnostics.interval.map_or(true, |every| !every.is_zero()),
            ),
        ];
        if let Some((name, _)) = checks.iter().find(|(_, ok)| !ok) {
            return Err(ConfigError::InvalidLimit { name: *name });
        }

        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
