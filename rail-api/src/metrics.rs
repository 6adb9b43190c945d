use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use rail_booking::SweepReport;

pub struct Metrics {
    registry: Registry,
    pub tickets_booked: IntCounter,
    pub booking_conflicts: IntCounter,
    pub payments_completed: IntCounter,
    pub tickets_expired: IntCounter,
    pub transactions_cancelled: IntCounter,
    pub sweep_errors: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("rail".to_string()), None)?;

        Ok(Self {
            tickets_booked: counter(&registry, "tickets_booked_total", "Seats held as pending tickets")?,
            booking_conflicts: counter(
                &registry,
                "booking_conflicts_total",
                "Bookings refused because the seat or compartment was taken",
            )?,
            payments_completed: counter(&registry, "payments_completed_total", "Payments validated and confirmed")?,
            tickets_expired: counter(&registry, "tickets_expired_total", "Unpaid holds expired by the sweep")?,
            transactions_cancelled: counter(
                &registry,
                "sweep_transactions_cancelled_total",
                "Open payment transactions cancelled by the sweep",
            )?,
            sweep_errors: counter(&registry, "sweep_errors_total", "Tickets the sweep failed to expire")?,
            registry,
        })
    }

    pub fn record_sweep(&self, report: &SweepReport) {
        self.tickets_expired.inc_by(report.expired_count as u64);
        self.transactions_cancelled
            .inc_by(report.cancelled_transaction_count as u64);
        self.sweep_errors.inc_by(report.errors.len() as u64);
    }

    /// Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_prefixed_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.tickets_booked.inc();
        metrics.record_sweep(&SweepReport {
            expired_count: 3,
            cancelled_transaction_count: 2,
            skipped_count: 0,
            errors: vec![],
        });

        let text = metrics.render();
        assert!(text.contains("rail_tickets_booked_total 1"));
        assert!(text.contains("rail_tickets_expired_total 3"));
        assert!(text.contains("rail_sweep_transactions_cancelled_total 2"));
    }
}
