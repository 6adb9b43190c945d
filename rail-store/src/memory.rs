//! In-process store with the same guarded-update semantics as the Postgres
//! repositories. Each operation runs under one lock and checks every
//! precondition before it writes, so a failed call leaves no trace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rail_catalog::{LedgerEntry, Route, SeatLedger};
use rail_core::payment::{GatewaySession, PaymentAction, PaymentLog, PaymentTransaction, TransactionStatus};
use rail_core::repository::{
    CancellationReceipt, CatalogRepository, CompletionOutcome, ExpiryOutcome, PaymentCompletion, PaymentRepository,
    TicketRepository,
};
use rail_core::schedule::{CompartmentInstance, LedgerSnapshot, Seat, TrainSchedule};
use rail_core::ticket::{generate_ticket_number, NewTicket, Ticket, TicketPaymentStatus, TicketStatus, TICKET_NUMBER_ATTEMPTS};
use rail_core::{BookingError, BookingResult};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::ticket_repo::EXPIRY_REASON;

#[derive(Default)]
struct State {
    schedules: HashMap<Uuid, TrainSchedule>,
    routes: HashMap<Uuid, Route>,
    compartments: HashMap<(Uuid, Uuid), CompartmentInstance>,
    ledger: SeatLedger,
    seats: HashMap<(Uuid, String), Seat>,
    tickets: HashMap<Uuid, Ticket>,
    ticket_numbers: HashSet<String>,
    transactions: HashMap<Uuid, PaymentTransaction>,
    logs: Vec<PaymentLog>,
}

impl State {
    fn seat_is_held(&self, seat_id: Uuid, journey_date: Option<chrono::NaiveDate>) -> bool {
        self.tickets.values().any(|t| {
            t.seat_id == seat_id && t.status.holds_seat() && journey_date.map_or(true, |d| t.journey_date == d)
        })
    }

    fn ledger_entry(&self, schedule_id: Uuid, compartment_id: Uuid) -> Option<LedgerEntry> {
        self.ledger.get(schedule_id, compartment_id).copied()
    }

    /// Fail before any write when releasing would underflow.
    fn check_releasable(&self, ticket: &Ticket) -> BookingResult<()> {
        match self.ledger_entry(ticket.schedule_id, ticket.compartment_instance_id) {
            Some(entry) if entry.booked_seats > 0 => Ok(()),
            _ => Err(BookingError::LedgerUnderflow {
                schedule_id: ticket.schedule_id,
                compartment_id: ticket.compartment_instance_id,
            }),
        }
    }

    fn release_hold(&mut self, ticket: &Ticket) -> BookingResult<()> {
        self.ledger
            .release(ticket.schedule_id, ticket.compartment_instance_id)?;

        let still_held = self.seat_is_held(ticket.seat_id, None);
        if let Some(seat) = self
            .seats
            .get_mut(&(ticket.compartment_instance_id, ticket.seat_number.clone()))
        {
            seat.is_available = !still_held;
        }
        Ok(())
    }

    fn cancel_open_transactions(
        &mut self,
        ticket_id: Uuid,
        action: PaymentAction,
        reason: &str,
        now: DateTime<Utc>,
    ) -> usize {
        let mut cancelled = Vec::new();
        for txn in self.transactions.values_mut() {
            if txn.ticket_id == ticket_id && txn.status.is_open() {
                txn.status = TransactionStatus::Cancelled;
                txn.failure_reason = Some(reason.to_string());
                txn.updated_at = now;
                txn.completed_at = Some(now);
                cancelled.push(txn.id);
            }
        }
        for id in &cancelled {
            self.logs.push(PaymentLog::new(
                *id,
                action,
                TransactionStatus::Cancelled,
                json!({ "reason": reason, "ticket_id": ticket_id }),
                now,
            ));
        }
        cancelled.len()
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_route(&self, route: Route) {
        self.state.lock().await.routes.insert(route.id, route);
    }

    pub async fn add_schedule(&self, schedule: TrainSchedule) {
        self.state.lock().await.schedules.insert(schedule.id, schedule);
    }

    pub async fn add_compartment(&self, compartment: CompartmentInstance) {
        self.state
            .lock()
            .await
            .compartments
            .insert((compartment.train_id, compartment.compartment_type_id), compartment);
    }

    /// Overwrite a ledger row, e.g. to simulate drift.
    pub async fn set_ledger(&self, schedule_id: Uuid, compartment_instance_id: Uuid, entry: LedgerEntry) {
        self.state.lock().await.ledger.set(schedule_id, compartment_instance_id, entry);
    }
}

#[async_trait]
impl CatalogRepository for InMemoryStore {
    async fn get_schedule(&self, id: Uuid) -> BookingResult<Option<TrainSchedule>> {
        Ok(self.state.lock().await.schedules.get(&id).cloned())
    }

    async fn get_route(&self, id: Uuid) -> BookingResult<Option<Route>> {
        Ok(self.state.lock().await.routes.get(&id).cloned())
    }

    async fn find_compartment(
        &self,
        train_id: Uuid,
        compartment_type_id: Uuid,
    ) -> BookingResult<Option<CompartmentInstance>> {
        Ok(self
            .state
            .lock()
            .await
            .compartments
            .get(&(train_id, compartment_type_id))
            .cloned())
    }
}

#[async_trait]
impl TicketRepository for InMemoryStore {
    async fn create_pending_ticket(&self, new_ticket: NewTicket) -> BookingResult<Ticket> {
        let mut state = self.state.lock().await;

        let seat_key = (new_ticket.compartment_instance_id, new_ticket.seat_number.clone());
        let existing_seat = state.seats.get(&seat_key).map(|s| s.id);

        if let Some(seat_id) = existing_seat {
            if state.seat_is_held(seat_id, Some(new_ticket.journey_date)) {
                return Err(BookingError::SeatAlreadyBooked {
                    seat_number: new_ticket.seat_number,
                });
            }
        }

        let ledger = state
            .ledger_entry(new_ticket.schedule_id, new_ticket.compartment_instance_id)
            .unwrap_or_else(|| LedgerEntry::seeded(new_ticket.total_seats));
        if ledger.remaining() <= 0 {
            return Err(BookingError::CapacityExceeded {
                booked: ledger.booked_seats,
                total: ledger.total_seats,
            });
        }

        let mut ticket_number = None;
        for _ in 0..TICKET_NUMBER_ATTEMPTS {
            let candidate =
                generate_ticket_number(&new_ticket.train_code, new_ticket.journey_date, &new_ticket.seat_number);
            if !state.ticket_numbers.contains(&candidate) {
                ticket_number = Some(candidate);
                break;
            }
        }
        let ticket_number = ticket_number.ok_or_else(|| {
            BookingError::Storage(format!("no unused ticket number after {} attempts", TICKET_NUMBER_ATTEMPTS))
        })?;

        // All checks passed; write.
        state
            .ledger
            .reserve(new_ticket.schedule_id, new_ticket.compartment_instance_id, new_ticket.total_seats)?;

        let seat_id = existing_seat.unwrap_or_else(Uuid::new_v4);
        let seat = state.seats.entry(seat_key).or_insert_with(|| Seat {
            id: seat_id,
            compartment_instance_id: new_ticket.compartment_instance_id,
            seat_number: new_ticket.seat_number.clone(),
            is_available: true,
        });
        seat.is_available = false;

        let ticket = new_ticket.into_ticket(Uuid::new_v4(), ticket_number, seat_id);
        state.ticket_numbers.insert(ticket.ticket_number.clone());
        state.tickets.insert(ticket.id, ticket.clone());

        Ok(ticket)
    }

    async fn get_ticket(&self, id: Uuid) -> BookingResult<Option<Ticket>> {
        Ok(self.state.lock().await.tickets.get(&id).cloned())
    }

    async fn cancel_ticket(&self, id: Uuid, now: DateTime<Utc>, reason: &str) -> BookingResult<CancellationReceipt> {
        let mut state = self.state.lock().await;

        let ticket = state
            .tickets
            .get(&id)
            .cloned()
            .ok_or_else(|| BookingError::not_found("ticket", id))?;
        if !ticket.status.holds_seat() {
            return Err(BookingError::InvalidState(format!("ticket is already {}", ticket.status)));
        }
        state.check_releasable(&ticket)?;

        let mut ticket = ticket;
        ticket.status = TicketStatus::Cancelled;
        ticket.payment_status = ticket.payment_status.on_cancellation();
        ticket.cancelled_at = Some(now);
        ticket.updated_at = now;
        state.tickets.insert(id, ticket.clone());

        let cancelled_transactions = state.cancel_open_transactions(id, PaymentAction::TicketCancelled, reason, now);
        state.release_hold(&ticket)?;

        Ok(CancellationReceipt {
            ticket,
            cancelled_transactions,
        })
    }

    async fn list_expired_pending(&self, now: DateTime<Utc>, limit: i64) -> BookingResult<Vec<Ticket>> {
        let state = self.state.lock().await;
        let mut expired: Vec<Ticket> = state
            .tickets
            .values()
            .filter(|t| t.awaiting_payment() && t.hold_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|t| t.expires_at);
        expired.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(expired)
    }

    async fn expire_ticket(&self, id: Uuid, now: DateTime<Utc>) -> BookingResult<ExpiryOutcome> {
        let mut state = self.state.lock().await;

        let Some(ticket) = state.tickets.get(&id).cloned() else {
            return Ok(ExpiryOutcome::Skipped);
        };
        if !ticket.awaiting_payment() || !ticket.hold_expired(now) {
            return Ok(ExpiryOutcome::Skipped);
        }
        state.check_releasable(&ticket)?;

        let mut ticket = ticket;
        ticket.status = TicketStatus::Expired;
        ticket.payment_status = TicketPaymentStatus::Expired;
        ticket.updated_at = now;
        state.tickets.insert(id, ticket.clone());

        let cancelled_transactions = state.cancel_open_transactions(id, PaymentAction::Expired, EXPIRY_REASON, now);
        state.release_hold(&ticket)?;

        Ok(ExpiryOutcome::Expired {
            ticket,
            cancelled_transactions,
        })
    }

    async fn ledger_snapshot(
        &self,
        schedule_id: Uuid,
        compartment_instance_id: Uuid,
    ) -> BookingResult<Option<LedgerSnapshot>> {
        let state = self.state.lock().await;
        Ok(state
            .ledger_entry(schedule_id, compartment_instance_id)
            .map(|entry| LedgerSnapshot {
                schedule_id,
                compartment_instance_id,
                booked_seats: entry.booked_seats,
                total_seats: entry.total_seats,
            }))
    }

    async fn get_seat(&self, compartment_instance_id: Uuid, seat_number: &str) -> BookingResult<Option<Seat>> {
        let state = self.state.lock().await;
        Ok(state
            .seats
            .get(&(compartment_instance_id, seat_number.to_string()))
            .cloned())
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn create_transaction(&self, transaction: &PaymentTransaction, log: PaymentLog) -> BookingResult<()> {
        let mut state = self.state.lock().await;
        if !state.tickets.contains_key(&transaction.ticket_id) {
            return Err(BookingError::not_found("ticket", transaction.ticket_id));
        }
        if state
            .transactions
            .values()
            .any(|t| t.ticket_id == transaction.ticket_id && t.status.is_open())
        {
            return Err(BookingError::InvalidState(format!(
                "ticket {} already has an open payment attempt",
                transaction.ticket_id
            )));
        }
        state.transactions.insert(transaction.id, transaction.clone());
        state.logs.push(log);
        Ok(())
    }

    async fn get_transaction(&self, id: Uuid) -> BookingResult<Option<PaymentTransaction>> {
        Ok(self.state.lock().await.transactions.get(&id).cloned())
    }

    async fn record_session(&self, id: Uuid, session: &GatewaySession, log: PaymentLog) -> BookingResult<()> {
        let mut state = self.state.lock().await;
        let txn = state
            .transactions
            .get_mut(&id)
            .filter(|t| t.status.is_open())
            .ok_or_else(|| BookingError::InvalidState(format!("transaction {} is no longer open", id)))?;
        txn.session_key = Some(session.session_key.clone());
        txn.gateway_url = Some(session.gateway_url.clone());
        txn.updated_at = log.created_at;
        state.logs.push(log);
        Ok(())
    }

    async fn transition_transaction(
        &self,
        id: Uuid,
        to: TransactionStatus,
        reason: Option<&str>,
        log: PaymentLog,
        now: DateTime<Utc>,
    ) -> BookingResult<bool> {
        let mut state = self.state.lock().await;
        let Some(txn) = state.transactions.get_mut(&id) else {
            return Ok(false);
        };
        if !txn.status.can_transition_to(to) {
            return Ok(false);
        }
        txn.status = to;
        if let Some(reason) = reason {
            txn.failure_reason = Some(reason.to_string());
        }
        txn.updated_at = now;
        if !to.is_open() {
            txn.completed_at = Some(now);
        }
        state.logs.push(log);
        Ok(true)
    }

    async fn complete_payment(&self, completion: PaymentCompletion) -> BookingResult<CompletionOutcome> {
        let mut state = self.state.lock().await;

        let txn = state
            .transactions
            .get(&completion.transaction_id)
            .cloned()
            .ok_or_else(|| BookingError::not_found("transaction", completion.transaction_id))?;
        if txn.status == TransactionStatus::Completed {
            return Ok(CompletionOutcome::AlreadyCompleted);
        }
        if !txn.status.is_open() {
            return Ok(CompletionOutcome::TransactionClosed(txn.status));
        }

        let ticket = state
            .tickets
            .get_mut(&txn.ticket_id)
            .ok_or_else(|| BookingError::not_found("ticket", txn.ticket_id))?;
        if !ticket.awaiting_payment() {
            return Ok(CompletionOutcome::TicketNotPending(ticket.status));
        }
        ticket.status = TicketStatus::Confirmed;
        ticket.payment_status = TicketPaymentStatus::Paid;
        ticket.confirmed_at = Some(completion.now);
        ticket.updated_at = completion.now;
        let ticket = ticket.clone();

        if let Some(txn) = state.transactions.get_mut(&completion.transaction_id) {
            txn.status = TransactionStatus::Completed;
            txn.validation_id = Some(completion.validation_id.clone());
            txn.bank_transaction_id = completion.bank_transaction_id.clone();
            txn.card_type = completion.card_type.clone();
            txn.updated_at = completion.now;
            txn.completed_at = Some(completion.now);
        }
        state.logs.push(PaymentLog::new(
            completion.transaction_id,
            PaymentAction::Completed,
            TransactionStatus::Completed,
            completion.details,
            completion.now,
        ));

        Ok(CompletionOutcome::Completed(ticket))
    }

    async fn transactions_for_ticket(&self, ticket_id: Uuid) -> BookingResult<Vec<PaymentTransaction>> {
        let state = self.state.lock().await;
        let mut txns: Vec<PaymentTransaction> = state
            .transactions
            .values()
            .filter(|t| t.ticket_id == ticket_id)
            .cloned()
            .collect();
        txns.sort_by_key(|t| t.created_at);
        Ok(txns)
    }

    async fn logs_for_transaction(&self, transaction_id: Uuid) -> BookingResult<Vec<PaymentLog>> {
        let state = self.state.lock().await;
        Ok(state
            .logs
            .iter()
            .filter(|l| l.transaction_id == transaction_id)
            .cloned()
            .collect())
    }
}
