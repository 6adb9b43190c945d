use chrono::{DateTime, Utc};
use rail_core::repository::ExpiryOutcome;
use rail_core::BookingStore;
use rail_shared::{SeatAvailabilityEvent, SeatChange};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::booking::publish_seat_change;

#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    /// `None` when the listing itself failed.
    pub ticket_id: Option<Uuid>,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub expired_count: usize,
    pub cancelled_transaction_count: usize,
    /// Tickets that were paid or cancelled between listing and expiry.
    pub skipped_count: usize,
    pub errors: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired_count == 0 && self.skipped_count == 0 && self.errors.is_empty()
    }
}

/// Expires unpaid holds past their deadline and gives their seats back.
pub struct ReclamationSweep {
    store: Arc<dyn BookingStore>,
    batch_size: i64,
    events: Option<broadcast::Sender<SeatAvailabilityEvent>>,
}

impl ReclamationSweep {
    pub fn new(store: Arc<dyn BookingStore>, batch_size: i64) -> Self {
        Self {
            store,
            batch_size,
            events: None,
        }
    }

    pub fn with_events(mut self, sender: broadcast::Sender<SeatAvailabilityEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// One pass. Each ticket is expired in its own unit; a failure is
    /// recorded and the pass moves on.
    pub async fn run(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let candidates = match self.store.list_expired_pending(now, self.batch_size).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "Could not list expired holds");
                report.errors.push(SweepFailure {
                    ticket_id: None,
                    error: e.to_string(),
                });
                return report;
            }
        };

        debug!(count = candidates.len(), "Expired holds found");

        for candidate in candidates {
            match self.store.expire_ticket(candidate.id, now).await {
                Ok(ExpiryOutcome::Expired {
                    ticket,
                    cancelled_transactions,
                }) => {
                    info!(
                        ticket_number = %ticket.ticket_number,
                        seat = %ticket.seat_number,
                        cancelled_transactions,
                        "Hold expired, seat released"
                    );
                    report.expired_count += 1;
                    report.cancelled_transaction_count += cancelled_transactions;
                    publish_seat_change(self.events.as_ref(), &ticket, SeatChange::Expired, now);
                }
                Ok(ExpiryOutcome::Skipped) => {
                    report.skipped_count += 1;
                }
                Err(e) => {
                    error!(ticket_id = %candidate.id, error = %e, "Failed to expire hold");
                    report.errors.push(SweepFailure {
                        ticket_id: Some(candidate.id),
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }
}
