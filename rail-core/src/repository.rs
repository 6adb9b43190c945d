use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rail_catalog::Route;
use uuid::Uuid;

use crate::payment::{GatewaySession, PaymentLog, PaymentTransaction, TransactionStatus};
use crate::schedule::{CompartmentInstance, LedgerSnapshot, Seat, TrainSchedule};
use crate::ticket::{NewTicket, Ticket, TicketStatus};
use crate::BookingResult;

/// Read access to the reference data a booking is validated against.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn get_schedule(&self, id: Uuid) -> BookingResult<Option<TrainSchedule>>;

    async fn get_route(&self, id: Uuid) -> BookingResult<Option<Route>>;

    /// The train's instance of a compartment type, if the train carries one.
    async fn find_compartment(
        &self,
        train_id: Uuid,
        compartment_type_id: Uuid,
    ) -> BookingResult<Option<CompartmentInstance>>;
}

#[derive(Debug, Clone)]
pub enum ExpiryOutcome {
    Expired {
        ticket: Ticket,
        cancelled_transactions: usize,
    },
    /// The ticket left `pending/pending` (paid, cancelled or already expired)
    /// before the sweep reached it.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct CancellationReceipt {
    pub ticket: Ticket,
    pub cancelled_transactions: usize,
}

/// Ticket, seat and ledger writes. Every method is a single atomic unit.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Claim the seat, reserve ledger capacity and write a `pending/pending`
    /// ticket. Fails `SeatAlreadyBooked` or `CapacityExceeded` without writing.
    async fn create_pending_ticket(&self, new_ticket: NewTicket) -> BookingResult<Ticket>;

    async fn get_ticket(&self, id: Uuid) -> BookingResult<Option<Ticket>>;

    /// Cancel an active ticket, closing its open transactions and releasing
    /// the seat and ledger capacity.
    async fn cancel_ticket(&self, id: Uuid, now: DateTime<Utc>, reason: &str) -> BookingResult<CancellationReceipt>;

    /// Oldest first, at most `limit`.
    async fn list_expired_pending(&self, now: DateTime<Utc>, limit: i64) -> BookingResult<Vec<Ticket>>;

    /// Expire one held ticket if it is still unpaid and past its deadline.
    async fn expire_ticket(&self, id: Uuid, now: DateTime<Utc>) -> BookingResult<ExpiryOutcome>;

    async fn ledger_snapshot(
        &self,
        schedule_id: Uuid,
        compartment_instance_id: Uuid,
    ) -> BookingResult<Option<LedgerSnapshot>>;

    async fn get_seat(&self, compartment_instance_id: Uuid, seat_number: &str) -> BookingResult<Option<Seat>>;
}

/// Gateway-confirmed facts carried into the settlement write.
#[derive(Debug, Clone)]
pub struct PaymentCompletion {
    pub transaction_id: Uuid,
    pub validation_id: String,
    pub bank_transaction_id: Option<String>,
    pub card_type: Option<String>,
    pub details: serde_json::Value,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    Completed(Ticket),
    AlreadyCompleted,
    /// The ticket moved first (typically expired by the sweep).
    TicketNotPending(TicketStatus),
    TransactionClosed(TransactionStatus),
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create_transaction(&self, transaction: &PaymentTransaction, log: PaymentLog) -> BookingResult<()>;

    async fn get_transaction(&self, id: Uuid) -> BookingResult<Option<PaymentTransaction>>;

    async fn record_session(&self, id: Uuid, session: &GatewaySession, log: PaymentLog) -> BookingResult<()>;

    /// Conditional move out of an open state. Returns `false` when the
    /// transaction was no longer in a state that allows the move.
    async fn transition_transaction(
        &self,
        id: Uuid,
        to: TransactionStatus,
        reason: Option<&str>,
        log: PaymentLog,
        now: DateTime<Utc>,
    ) -> BookingResult<bool>;

    /// Confirm the ticket and complete the transaction in one unit, each
    /// guarded by its current state.
    async fn complete_payment(&self, completion: PaymentCompletion) -> BookingResult<CompletionOutcome>;

    async fn transactions_for_ticket(&self, ticket_id: Uuid) -> BookingResult<Vec<PaymentTransaction>>;

    async fn logs_for_transaction(&self, transaction_id: Uuid) -> BookingResult<Vec<PaymentLog>>;
}

/// Everything the booking services need from storage.
pub trait BookingStore: CatalogRepository + TicketRepository + PaymentRepository {}

impl<T> BookingStore for T where T: CatalogRepository + TicketRepository + PaymentRepository {}
