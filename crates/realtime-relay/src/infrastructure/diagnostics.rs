//! Periodic live-session report.
//!
//! Reads the registry only through its enumeration API; it never touches a
//! socket or a session's state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use relay_core::{SessionInfo, SessionRegistry};

use crate::application::shutdown_signalled;

/// One report's worth of numbers.
#[derive(Debug, Clone)]
pub struct DiagnosticsReport {
    pub live: usize,
    pub accepted_total: u64,
    /// Sessions older than the stale threshold, oldest first.
    pub stale: Vec<SessionInfo>,
}

/// Builds and logs one report.
pub fn report_once(registry: &SessionRegistry, stale_after: Duration) -> DiagnosticsReport {
    let report = DiagnosticsReport {
        live: registry.len(),
        accepted_total: registry.accepted_total(),
        stale: registry.stale(stale_after),
    };

    info!(
        live = report.live,
        accepted_total = report.accepted_total,
        "relay sessions"
    );
    for session in &report.stale {
        warn!(
            session_id = %session.id,
            peer = %session.peer_addr,
            state = %session.state,
            age_secs = session.age().as_secs(),
            "stale session"
        );
    }
    report
}

/// Logs a report every `every` until shutdown.
pub async fn run_reporter(
    registry: Arc<SessionRegistry>,
    every: Duration,
    stale_after: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                report_once(&registry, stale_after);
            }
            _ = shutdown_signalled(&mut shutdown) => break,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
