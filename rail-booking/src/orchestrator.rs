use chrono::{DateTime, Utc};
use rail_core::payment::{
    GatewaySession, PaymentAction, PaymentGateway, PaymentLog, PaymentTransaction, SessionRequest, TransactionStatus,
    ValidatedPayment, ValidationStatus,
};
use rail_core::repository::{CompletionOutcome, PaymentCompletion};
use rail_core::ticket::{Ticket, TicketPaymentStatus, TicketStatus};
use rail_core::{BookingError, BookingResult, BookingStore, Principal};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Where the gateway sends the customer (and its IPN) after checkout.
#[derive(Debug, Clone)]
pub struct CallbackUrls {
    pub success: String,
    pub fail: String,
    pub cancel: String,
    pub ipn: String,
}

impl CallbackUrls {
    pub fn under(public_url: &str) -> Self {
        let base = public_url.trim_end_matches('/');
        Self {
            success: format!("{}/v1/payments/callback/success", base),
            fail: format!("{}/v1/payments/callback/fail", base),
            cancel: format!("{}/v1/payments/callback/cancel", base),
            ipn: format!("{}/v1/payments/ipn", base),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentSession {
    pub transaction_id: Uuid,
    pub ticket_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub gateway_url: String,
}

#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    Completed(Ticket),
    /// The transaction was settled by an earlier callback.
    AlreadyProcessed,
    /// The gateway has not settled yet; a later callback or IPN will.
    AwaitingGateway,
}

pub struct PaymentOrchestrator {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    callbacks: CallbackUrls,
}

impl PaymentOrchestrator {
    pub fn new(store: Arc<dyn BookingStore>, gateway: Arc<dyn PaymentGateway>, callbacks: CallbackUrls) -> Self {
        Self {
            store,
            gateway,
            callbacks,
        }
    }

    /// Open a transaction for a held ticket and ask the gateway for a checkout session.
    /// A ticket carries at most one open attempt; a retry is accepted only once
    /// the previous attempt has failed or been cancelled.
    pub async fn initiate_payment(
        &self,
        principal: &Principal,
        ticket_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<PaymentSession> {
        let ticket = self
            .store
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| BookingError::not_found("ticket", ticket_id))?;

        if ticket.user_id != principal.user_id {
            return Err(BookingError::Unauthorized(format!(
                "{} does not own ticket {}",
                principal.user_id, ticket.ticket_number
            )));
        }
        if ticket.payment_status != TicketPaymentStatus::Pending || ticket.status != TicketStatus::Pending {
            return Err(BookingError::InvalidState(format!(
                "ticket is {} with payment {}",
                ticket.status, ticket.payment_status
            )));
        }
        if ticket.hold_expired(now) {
            return Err(BookingError::InvalidState("payment window has closed".to_string()));
        }

        let transaction =
            PaymentTransaction::initiated(ticket.id, &principal.user_id, ticket.fare_minor, &ticket.currency, now);
        let log = PaymentLog::new(
            transaction.id,
            PaymentAction::Initiated,
            TransactionStatus::Initiated,
            json!({ "ticket_id": ticket.id, "amount_minor": ticket.fare_minor, "currency": ticket.currency }),
            now,
        );
        self.store.create_transaction(&transaction, log).await?;

        let request = SessionRequest {
            transaction_id: transaction.id,
            amount_minor: ticket.fare_minor,
            currency: ticket.currency.clone(),
            customer_name: ticket.passenger.name.expose().clone(),
            customer_id: ticket.user_id.clone(),
            product_name: format!("Ticket {}", ticket.ticket_number),
            success_url: self.callbacks.success.clone(),
            fail_url: self.callbacks.fail.clone(),
            cancel_url: self.callbacks.cancel.clone(),
            ipn_url: self.callbacks.ipn.clone(),
        };

        let session: GatewaySession = match self.gateway.create_session(&request).await {
            Ok(session) => session,
            Err(e) => {
                let reason = e.to_string();
                warn!(transaction_id = %transaction.id, error = %reason, "Gateway refused payment session");
                let log = PaymentLog::new(
                    transaction.id,
                    PaymentAction::GatewayRejected,
                    TransactionStatus::Failed,
                    json!({ "reason": reason }),
                    now,
                );
                self.store
                    .transition_transaction(transaction.id, TransactionStatus::Failed, Some(&reason), log, now)
                    .await?;
                return Err(e.into());
            }
        };

        let log = PaymentLog::new(
            transaction.id,
            PaymentAction::SessionCreated,
            TransactionStatus::Initiated,
            json!({ "session_key": session.session_key }),
            now,
        );
        self.store.record_session(transaction.id, &session, log).await?;

        info!(
            transaction_id = %transaction.id,
            ticket_number = %ticket.ticket_number,
            "Payment session created"
        );

        Ok(PaymentSession {
            transaction_id: transaction.id,
            ticket_id: ticket.id,
            amount_minor: ticket.fare_minor,
            currency: ticket.currency,
            gateway_url: session.gateway_url,
        })
    }

    /// Success redirect. The callback is only a hint: the gateway is asked
    /// directly before anything is confirmed.
    pub async fn handle_success(
        &self,
        transaction_id: Uuid,
        validation_id: &str,
        now: DateTime<Utc>,
    ) -> BookingResult<PaymentOutcome> {
        let transaction = self
            .store
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| BookingError::not_found("transaction", transaction_id))?;

        if transaction.status == TransactionStatus::Completed {
            info!(transaction_id = %transaction_id, "Duplicate success callback ignored");
            return Ok(PaymentOutcome::AlreadyProcessed);
        }

        let validated = self.gateway.validate(validation_id).await?;
        self.settle(transaction, validated, now).await
    }

    /// Server-to-server notification carrying only a validation id.
    pub async fn handle_ipn(&self, validation_id: &str, now: DateTime<Utc>) -> BookingResult<PaymentOutcome> {
        let validated = self.gateway.validate(validation_id).await?;

        let transaction_id = validated.transaction_id.ok_or_else(|| {
            BookingError::ValidationFailed(format!("validation {} names no transaction", validation_id))
        })?;
        let transaction = self
            .store
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| BookingError::not_found("transaction", transaction_id))?;

        if transaction.status == TransactionStatus::Completed {
            return Ok(PaymentOutcome::AlreadyProcessed);
        }

        self.settle(transaction, validated, now).await
    }

    async fn settle(
        &self,
        transaction: PaymentTransaction,
        validated: ValidatedPayment,
        now: DateTime<Utc>,
    ) -> BookingResult<PaymentOutcome> {
        check_validation(&transaction, &validated)?;

        if validated.status == ValidationStatus::Pending {
            let log = PaymentLog::new(
                transaction.id,
                PaymentAction::Pending,
                TransactionStatus::Pending,
                json!({ "validation_id": validated.validation_id }),
                now,
            );
            self.store
                .transition_transaction(transaction.id, TransactionStatus::Pending, None, log, now)
                .await?;
            return Ok(PaymentOutcome::AwaitingGateway);
        }

        let completion = PaymentCompletion {
            transaction_id: transaction.id,
            validation_id: validated.validation_id.clone(),
            bank_transaction_id: validated.bank_transaction_id.clone(),
            card_type: validated.card_type.clone(),
            details: json!({
                "validation_id": validated.validation_id,
                "bank_transaction_id": validated.bank_transaction_id,
                "card_type": validated.card_type,
                "card_brand": validated.card_brand,
            }),
            now,
        };

        match self.store.complete_payment(completion).await? {
            CompletionOutcome::Completed(ticket) => Ok(PaymentOutcome::Completed(ticket)),
            CompletionOutcome::AlreadyCompleted => Ok(PaymentOutcome::AlreadyProcessed),
            CompletionOutcome::TicketNotPending(status) => {
                // Money was taken for a hold that is gone; needs a refund by hand.
                warn!(
                    transaction_id = %transaction.id,
                    ticket_id = %transaction.ticket_id,
                    ticket_status = %status,
                    "Validated payment for a ticket that is no longer pending"
                );
                Err(BookingError::InvalidState(format!("ticket is {}", status)))
            }
            CompletionOutcome::TransactionClosed(status) => {
                Err(BookingError::InvalidState(format!("transaction is {}", status)))
            }
        }
    }

    /// Fail redirect. Returns whether the transaction moved.
    pub async fn handle_failure(
        &self,
        transaction_id: Uuid,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> BookingResult<bool> {
        self.close(transaction_id, TransactionStatus::Failed, PaymentAction::Failed, reason, now)
            .await
    }

    /// Cancel redirect. Returns whether the transaction moved.
    pub async fn handle_cancel(
        &self,
        transaction_id: Uuid,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> BookingResult<bool> {
        self.close(transaction_id, TransactionStatus::Cancelled, PaymentAction::Cancelled, reason, now)
            .await
    }

    async fn close(
        &self,
        transaction_id: Uuid,
        to: TransactionStatus,
        action: PaymentAction,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> BookingResult<bool> {
        if self.store.get_transaction(transaction_id).await?.is_none() {
            return Err(BookingError::not_found("transaction", transaction_id));
        }

        let log = PaymentLog::new(transaction_id, action, to, json!({ "reason": reason }), now);
        let moved = self
            .store
            .transition_transaction(transaction_id, to, reason, log, now)
            .await?;

        if moved {
            info!(transaction_id = %transaction_id, status = %to, "Payment closed by gateway callback");
        } else {
            info!(transaction_id = %transaction_id, status = %to, "Callback for a settled transaction ignored");
        }
        Ok(moved)
    }
}

/// The gateway's answer must be a settled or pending payment for exactly
/// this transaction, amount and currency.
fn check_validation(transaction: &PaymentTransaction, validated: &ValidatedPayment) -> BookingResult<()> {
    if !validated.is_valid() && validated.status != ValidationStatus::Pending {
        return Err(BookingError::ValidationFailed(format!(
            "gateway reports {:?} for {}",
            validated.status, validated.validation_id
        )));
    }
    if validated.transaction_id != Some(transaction.id) {
        return Err(BookingError::ValidationFailed("transaction id mismatch".to_string()));
    }
    if validated.amount_minor != Some(transaction.amount_minor) {
        return Err(BookingError::ValidationFailed(format!(
            "amount mismatch: expected {}, gateway reported {:?}",
            transaction.amount_minor, validated.amount_minor
        )));
    }
    if let Some(currency) = &validated.currency {
        if !currency.eq_ignore_ascii_case(&transaction.currency) {
            return Err(BookingError::ValidationFailed(format!(
                "currency mismatch: expected {}, gateway reported {}",
                transaction.currency, currency
            )));
        }
    }
    Ok(())
}
