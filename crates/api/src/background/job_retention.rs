//! Periodic cleanup of old terminal job records.
//!
//! The status store is in memory, so without this every finished job would
//! be kept for the life of the process.

use std::time::Duration;

use atelier_broker::JobBroker;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// How often the cleanup job runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600); // 1 hour

/// Run the job retention loop until `cancel` is triggered.
///
/// Removes SUCCESS and FAILURE records completed more than
/// `retention_hours` ago. Non-terminal records are never touched.
pub async fn run(broker: JobBroker, retention_hours: i64, cancel: CancellationToken) {
    let Some(window) = chrono::Duration::try_hours(retention_hours) else {
        tracing::error!(retention_hours, "Job retention disabled: window out of range");
        return;
    };

    tracing::info!(
        retention_hours,
        interval_secs = CLEANUP_INTERVAL.as_secs(),
        "Job retention task started"
    );

    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention task stopping");
                break;
            }
            _ = interval.tick() => {
                let Some(cutoff) = Utc::now().checked_sub_signed(window) else {
                    tracing::debug!(retention_hours, "Job retention: cutoff out of range");
                    continue;
                };
                let purged = broker.purge_terminal_before(cutoff).await;
                if purged > 0 {
                    tracing::info!(purged, "Job retention: purged finished jobs");
                } else {
                    tracing::debug!("Job retention: nothing to purge");
                }
            }
        }
    }
}
