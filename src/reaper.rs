use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

/// Background task that promotes Paid bookings to Completed once their
/// checkout has passed.
pub async fn run_sweeper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock before unix epoch")
            .as_millis() as i64;
        let finished = engine.collect_finished_stays(now);
        for (booking_id, _room_id) in finished {
            match engine.complete_booking(booking_id).await {
                Ok(()) => {
                    metrics::counter!(crate::observability::STAYS_COMPLETED_TOTAL).increment(1);
                    info!("completed finished stay {booking_id}");
                }
                Err(e) => {
                    // A racing cancel/complete may have won — that's fine
                    tracing::debug!("sweeper skip {booking_id}: {e}");
                }
            }
        }
    }
}

/// Background task that compacts the WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => tracing::warn!("WAL compaction failed: {e}"),
        }
    }
}
