//! Periodic cleanup of shared gateway state.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::gateway::Gateway;

/// Sweep idle rate-limit keys and expired cache entries every `interval`
/// until shutdown.
pub fn spawn_sweeper(
    gateway: Arc<Gateway>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let (keys, entries) = gateway.sweep().await;
                    tracing::debug!(
                        rate_limit_keys = keys,
                        cache_entries = entries,
                        tracked = gateway.limiter().tracked_keys(),
                        "Maintenance sweep complete"
                    );
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Maintenance task stopping");
                    break;
                }
            }
        }
    })
}
