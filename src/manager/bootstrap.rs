//! Bootstrap initializer: bring every persisted active bot up once at
//! process start, tolerating partial failure.

use std::sync::Arc;
use tokio::time::{sleep, timeout};

use crate::core::config;
use crate::manager::registry::BotRegistry;
use crate::storage::db::BotRecordStore;

/// Outcome of one bootstrap run. Not persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Fetch all active records and start them sequentially.
///
/// Starts are strictly ordered (store order) with an enforced delay
/// between consecutive attempts: the Bot API rejects near-simultaneous
/// session starts for many bots from one process, so serializing here is
/// a correctness requirement, not an optimization. A store failure or
/// timeout degrades to a zero-bot start — the process must stay up to
/// accept registrations via the event handler either way.
pub async fn initialize_bots(registry: &Arc<BotRegistry>, store: &Arc<dyn BotRecordStore>) -> StartupReport {
    log::info!("🔄 Initializing dynamic bots from the record store...");

    let records = match timeout(config::manager::store_query_timeout(), store.fetch_active()).await {
        Ok(Ok(records)) => records,
        Ok(Err(e)) => {
            log::error!("❌ Could not load bot records [{}]: {} — continuing with zero bots", e.kind(), e);
            return StartupReport::default();
        }
        Err(_) => {
            log::error!(
                "❌ Bot record query timed out after {}s — continuing with zero bots",
                config::manager::STORE_QUERY_TIMEOUT_SECS
            );
            return StartupReport::default();
        }
    };

    if records.is_empty() {
        log::info!("📊 No active bot records found");
        return StartupReport::default();
    }

    log::info!("📊 Found {} active bot record(s)", records.len());

    let mut report = StartupReport {
        attempted: records.len(),
        ..StartupReport::default()
    };

    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            sleep(config::manager::inter_start_delay()).await;
        }

        // Individual failures are already logged (with category) by the
        // registry; the batch always runs to completion.
        match registry.start(record).await {
            Ok(_) => report.succeeded += 1,
            Err(_) => report.failed += 1,
        }
    }

    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!(
        "✅ Bootstrap complete: {} attempted, {} started, {} failed",
        report.attempted,
        report.succeeded,
        report.failed
    );
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    report
}
