//! Realtime relay: entry point.
//!
//! Accepts WebSocket connections from browsers and gives each one its own
//! upstream connection to the realtime API, forwarding frames both ways.
//! The API key is added by the relay and never reaches the browser.
//!
//! # Usage
//!
//! ```text
//! realtime-relay [OPTIONS]
//!
//! Options:
//!   --port <PORT>                   Listening port [default: 8081]
//!   --bind <IP>                     Listening IP [default: 0.0.0.0]
//!   --path <PATH>                   Accepted upgrade path [default: /]
//!   --upstream-url <URL>            Upstream realtime endpoint
//!   --api-key <KEY>                 Upstream API key (required)
//!   --max-message-bytes <BYTES>     Per-message payload cap [default: 8 MiB]
//!   --connect-queue <N>             Messages buffered while connecting [default: 64]
//!   --connect-timeout-secs <SECS>   Upstream connect window [default: 10]
//!   --shutdown-grace-secs <SECS>    Drain time on Ctrl+C [default: 10]
//!   --config <FILE>                 Optional TOML config file
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence, then environment variables, then the config
//! file, then the built-in defaults.
//!
//! | Variable                     | Flag                     |
//! |------------------------------|--------------------------|
//! | `PORT`                       | `--port`                 |
//! | `RELAY_BIND`                 | `--bind`                 |
//! | `RELAY_PATH`                 | `--path`                 |
//! | `RELAY_UPSTREAM_URL`         | `--upstream-url`         |
//! | `OPENAI_API_KEY`             | `--api-key`              |
//! | `RELAY_MAX_MESSAGE_BYTES`    | `--max-message-bytes`    |
//! | `RELAY_CONNECT_QUEUE`        | `--connect-queue`        |
//! | `RELAY_CONNECT_TIMEOUT_SECS` | `--connect-timeout-secs` |
//! | `RELAY_SHUTDOWN_GRACE_SECS`  | `--shutdown-grace-secs`  |
//! | `RELAY_CONFIG`               | `--config`               |
//!
//! Without an API key the process prints a configuration error and exits
//! non-zero before binding any socket.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use realtime_relay::domain::{ConfigError, RelayConfig, UpstreamCredential};
use realtime_relay::infrastructure::RelayFile;
use realtime_relay::Relay;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket relay for the realtime API.
///
/// Every value is optional here so that a config file can supply it; the
/// built-in defaults are applied in [`Cli::into_relay_config`].
#[derive(Debug, Default, Parser)]
#[command(
    name = "realtime-relay",
    about = "Relays browser WebSocket sessions to the realtime API without exposing the API key",
    version
)]
struct Cli {
    /// TCP port for client WebSocket upgrades [default: 8081].
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// IP address to bind the listener to [default: 0.0.0.0].
    ///
    /// Use `127.0.0.1` to accept only local connections.
    #[arg(long, env = "RELAY_BIND")]
    bind: Option<String>,

    /// Only upgrades on this path are accepted [default: /].
    #[arg(long, env = "RELAY_PATH")]
    path: Option<String>,

    /// Upstream realtime endpoint (ws:// or wss://).
    #[arg(long, env = "RELAY_UPSTREAM_URL")]
    upstream_url: Option<String>,

    /// Upstream API key, sent as `Authorization: Bearer <key>`.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Largest text or binary message forwarded, in bytes.
    #[arg(long, env = "RELAY_MAX_MESSAGE_BYTES")]
    max_message_bytes: Option<usize>,

    /// Client messages buffered while the upstream is connecting.
    #[arg(long, env = "RELAY_CONNECT_QUEUE")]
    connect_queue: Option<usize>,

    /// Upper bound on one upstream connect attempt, in seconds.
    #[arg(long, env = "RELAY_CONNECT_TIMEOUT_SECS")]
    connect_timeout_secs: Option<u64>,

    /// How long Ctrl+C waits for sessions to close, in seconds.
    #[arg(long, default_value_t = 10, env = "RELAY_SHUTDOWN_GRACE_SECS")]
    shutdown_grace_secs: u64,

    /// Optional TOML config file.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Resolves defaults, the config file and flags into a validated
    /// [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, if
    /// `--bind` is not an IP address, or if the result fails
    /// [`RelayConfig::validate`] (most commonly: no API key).
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let mut config = RelayConfig::default();

        if let Some(path) = &self.config {
            RelayFile::load(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?
                .apply(&mut config);
        }

        if let Some(bind) = &self.bind {
            let ip: IpAddr = bind
                .parse()
                .map_err(|_| ConfigError::InvalidAddress(bind.clone()))?;
            config.listen_addr = SocketAddr::new(ip, config.listen_addr.port());
        }
        if let Some(port) = self.port {
            config.listen_addr.set_port(port);
        }
        if let Some(path) = self.path {
            config.path = path;
        }
        if let Some(url) = self.upstream_url {
            config.upstream.url = url;
        }
        if let Some(key) = self.api_key {
            config.upstream.credential = UpstreamCredential::new(key);
        }
        if let Some(bytes) = self.max_message_bytes {
            config.limits.max_message_size = bytes;
        }
        if let Some(n) = self.connect_queue {
            config.limits.connect_queue_capacity = n;
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.limits.connect_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. `tracing_subscriber` is initialised; `RUST_LOG` controls the level.
/// 2. CLI arguments, environment and config file resolve into a
///    [`RelayConfig`].  A missing API key ends the process here.
/// 3. The rustls crypto provider is installed for `wss://` upstreams.
/// 4. The relay binds its listener and serves until Ctrl+C.
/// 5. On Ctrl+C every session is closed with 1001 and given
///    `--shutdown-grace-secs` to finish.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let grace = Duration::from_secs(cli.shutdown_grace_secs);

    let config = match cli.into_relay_config() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e:#}");
            return Err(e);
        }
    };

    // A provider may already be installed; either way one is available.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let relay = Relay::from_config(config).context("invalid relay configuration")?;
    let handle = relay.start().await?;

    info!(addr = %handle.local_addr(), "realtime relay started; press Ctrl+C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for Ctrl+C signal: {e}");
    } else {
        info!("received Ctrl+C, shutting down");
    }

    let remaining = handle.stop(grace).await;
    if remaining > 0 {
        warn!(remaining, "exiting with sessions still open");
    }
    info!("realtime relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
