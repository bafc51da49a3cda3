//! Background retirement of idle or dead sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::registry::SessionRegistry;
use super::session::Session;

/// Start the periodic reaper loop.
///
/// Each tick snapshots the registry, checks every session under its own
/// lock, then closes and removes the expired ones after the scan.
/// `close()` can block on process termination and must never run under the
/// registry lock.
pub fn start_reaper(
    registry: Arc<SessionRegistry>,
    idle_ttl: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            reap_once(&registry, idle_ttl).await;
        }
    })
}

/// One reaper pass. Exposed separately so tests can drive ticks directly.
pub async fn reap_once(registry: &SessionRegistry, idle_ttl: Duration) {
    let mut expired: Vec<Arc<Session>> = Vec::new();
    for session in registry.snapshot().await {
        if session.is_expired(idle_ttl).await {
            expired.push(session);
        }
    }

    for session in expired {
        tracing::debug!("reaping expired session {}", session.id());
        session.close().await;
        registry.remove(session.id()).await;
    }
}
