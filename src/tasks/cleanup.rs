//! TTL Cleanup Task
//!
//! Background task that periodically sweeps expired entries from every cache.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::Caches;

/// Spawns a task that calls [`Caches::cleanup_expired`] every `interval`.
///
/// The task runs until aborted through the returned handle, which the server
/// does on shutdown. Lookups already purge expired entries lazily; the sweep
/// reclaims entries nobody asks for again.
pub fn spawn_cleanup_task(caches: Caches, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {:.1} seconds",
            interval.as_secs_f64()
        );

        loop {
            tokio::time::sleep(interval).await;

            let report = caches.cleanup_expired().await;
            if report.total() > 0 {
                info!(
                    meta = report.meta,
                    deck = report.deck,
                    persistent = report.persistent,
                    "TTL cleanup: removed {} expired entries",
                    report.total()
                );
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}
