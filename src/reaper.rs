use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

/// Background task that expires lapsed reservation holds. Lazy checks already
/// ignore them; this frees their claims for good.
pub async fn run_sweeper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;
        let swept = engine.sweep_lapsed_holds(engine.now_ms()).await;
        if swept > 0 {
            info!(swept, "expired lapsed holds");
        }
    }
}

/// Background task that rewrites the journal once enough appends pile up
/// since the last rewrite.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.journal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_journal().await {
            Ok(()) => {
                metrics::counter!(crate::observability::JOURNAL_COMPACTIONS_TOTAL).increment(1);
                info!(appends, "compacted journal");
            }
            Err(e) => tracing::warn!(error = %e, "journal compaction failed"),
        }
    }
}
