//! Optional TOML configuration file.
//!
//! Every key is optional; whatever is present overrides the built-in default
//! and is in turn overridden by environment variables and CLI flags.
//!
//! ```toml
//! [listen]
//! bind = "127.0.0.1"
//! port = 8081
//! path = "/realtime"
//!
//! [upstream]
//! url = "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview-2024-10-01"
//! beta_header = "realtime=v1"   # or send_beta_header = false
//!
//! [limits]
//! max_message_bytes = 8388608
//! connect_queue = 64
//! connect_timeout_secs = 10
//! handshake_timeout_secs = 10
//! close_timeout_ms = 2000
//!
//! [diagnostics]
//! interval_secs = 60             # 0 disables the reporter
//! stale_after_secs = 3600
//! ```
//!
//! The upstream API key has no key here.  Unknown keys are rejected, so a
//! misplaced `api_key` fails loudly instead of being ignored.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::RelayConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Schema ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RelayFile {
    pub listen: ListenSection,
    pub upstream: UpstreamSection,
    pub limits: LimitsSection,
    pub diagnostics: DiagnosticsSection,
}

#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ListenSection {
    pub bind: Option<IpAddr>,
    pub port: Option<u16>,
    pub path: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamSection {
    pub url: Option<String>,
    pub beta_header: Option<String>,
    /// `false` drops the `OpenAI-Beta` header entirely.
    pub send_beta_header: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsSection {
    pub max_message_bytes: Option<usize>,
    pub connect_queue: Option<usize>,
    pub connect_timeout_secs: Option<u64>,
    pub handshake_timeout_secs: Option<u64>,
    pub close_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DiagnosticsSection {
    pub interval_secs: Option<u64>,
    pub stale_after_secs: Option<u64>,
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl RelayFile {
    /// # Errors
    ///
    /// Returns [`ConfigFileError::Parse`] for malformed TOML or unknown keys.
    pub fn parse(text: &str) -> Result<Self, ConfigFileError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the file at `path`.
    ///
    /// The path was named explicitly, so a missing file is an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::Io`] if the file cannot be read and
    /// [`ConfigFileError::Parse`] if its content is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Overlays every value present in the file onto `config`.
    pub fn apply(&self, config: &mut RelayConfig) {
        let listen = &self.listen;
        if let Some(ip) = listen.bind {
            config.listen_addr = SocketAddr::new(ip, config.listen_addr.port());
        }
        if let Some(port) = listen.port {
            config.listen_addr.set_port(port);
        }
        if let Some(path) = &listen.path {
            config.path = path.clone();
        }

        let upstream = &self.upstream;
        if let Some(url) = &upstream.url {
            config.upstream.url = url.clone();
        }
        if let Some(beta) = &upstream.beta_header {
            config.upstream.beta_header = Some(beta.clone());
        }
        if upstream.send_beta_header == Some(false) {
            config.upstream.beta_header = None;
        }

        let limits = &self.limits;
        if let Some(bytes) = limits.max_message_bytes {
            config.limits.max_message_size = bytes;
        }
        if let Some(n) = limits.connect_queue {
            config.limits.connect_queue_capacity = n;
        }
        if let Some(secs) = limits.connect_timeout_secs {
            config.limits.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = limits.handshake_timeout_secs {
            config.limits.handshake_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = limits.close_timeout_ms {
            config.limits.close_timeout = Duration::from_millis(ms);
        }

        let diagnostics = &self.diagnostics;
        match diagnostics.interval_secs {
            Some(0) => config.diagnostics.interval = None,
            Some(secs) => config.diagnostics.interval = Some(Duration::from_secs(secs)),
            None => {}
        }
        if let Some(secs) = diagnostics.stale_after_secs {
            config.diagnostics.stale_after = Duration::from_secs(secs);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
