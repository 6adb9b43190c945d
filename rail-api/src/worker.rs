use std::sync::Arc;

use chrono::Utc;
use rail_booking::ReclamationSweep;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::metrics::Metrics;

/// Runs the reclamation sweep on a fixed interval for the life of the process.
pub async fn start_reclamation_worker(sweep: Arc<ReclamationSweep>, metrics: Arc<Metrics>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = every.as_secs(), "Reclamation worker started");

    loop {
        ticker.tick().await;

        let report = sweep.run(Utc::now()).await;
        metrics.record_sweep(&report);

        if report.is_empty() {
            debug!("Reclamation sweep found nothing to do");
            continue;
        }

        info!(
            expired = report.expired_count,
            cancelled_transactions = report.cancelled_transaction_count,
            skipped = report.skipped_count,
            errors = report.errors.len(),
            "Reclamation sweep finished"
        );
        for failure in &report.errors {
            warn!(ticket_id = ?failure.ticket_id, error = %failure.error, "Hold left for the next sweep");
        }
    }
}
