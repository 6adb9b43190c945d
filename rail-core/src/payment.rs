use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::BookingError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Initiated,
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Initiated => "INITIATED",
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Cancelled => "CANCELLED",
        }
    }

    /// Open transactions may still move; the rest are terminal.
    pub fn is_open(&self) -> bool {
        matches!(self, TransactionStatus::Initiated | TransactionStatus::Pending)
    }

    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        match (self, next) {
            (TransactionStatus::Initiated, TransactionStatus::Pending) => true,
            (from, to) if from.is_open() => !to.is_open(),
            _ => false,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIATED" => Ok(TransactionStatus::Initiated),
            "PENDING" => Ok(TransactionStatus::Pending),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            "CANCELLED" => Ok(TransactionStatus::Cancelled),
            other => Err(BookingError::Storage(format!("unknown transaction status {}", other))),
        }
    }
}

/// One payment attempt against a ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub user_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: TransactionStatus,
    pub session_key: Option<String>,
    pub gateway_url: Option<String>,
    pub validation_id: Option<String>,
    pub bank_transaction_id: Option<String>,
    pub card_type: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PaymentTransaction {
    pub fn initiated(ticket_id: Uuid, user_id: &str, amount_minor: i64, currency: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_id,
            user_id: user_id.to_string(),
            amount_minor,
            currency: currency.to_string(),
            status: TransactionStatus::Initiated,
            session_key: None,
            gateway_url: None,
            validation_id: None,
            bank_transaction_id: None,
            card_type: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentAction {
    Initiated,
    SessionCreated,
    GatewayRejected,
    Pending,
    Completed,
    Failed,
    Cancelled,
    Expired,
    TicketCancelled,
}

impl PaymentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentAction::Initiated => "INITIATED",
            PaymentAction::SessionCreated => "SESSION_CREATED",
            PaymentAction::GatewayRejected => "GATEWAY_REJECTED",
            PaymentAction::Pending => "PENDING",
            PaymentAction::Completed => "COMPLETED",
            PaymentAction::Failed => "FAILED",
            PaymentAction::Cancelled => "CANCELLED",
            PaymentAction::Expired => "EXPIRED",
            PaymentAction::TicketCancelled => "TICKET_CANCELLED",
        }
    }
}

impl FromStr for PaymentAction {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIATED" => Ok(PaymentAction::Initiated),
            "SESSION_CREATED" => Ok(PaymentAction::SessionCreated),
            "GATEWAY_REJECTED" => Ok(PaymentAction::GatewayRejected),
            "PENDING" => Ok(PaymentAction::Pending),
            "COMPLETED" => Ok(PaymentAction::Completed),
            "FAILED" => Ok(PaymentAction::Failed),
            "CANCELLED" => Ok(PaymentAction::Cancelled),
            "EXPIRED" => Ok(PaymentAction::Expired),
            "TICKET_CANCELLED" => Ok(PaymentAction::TicketCancelled),
            other => Err(BookingError::Storage(format!("unknown payment action {}", other))),
        }
    }
}

/// Append-only audit entry. Exactly one is written per transaction transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLog {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub action: PaymentAction,
    pub status: TransactionStatus,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl PaymentLog {
    pub fn new(
        transaction_id: Uuid,
        action: PaymentAction,
        status: TransactionStatus,
        details: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            action,
            status,
            details,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionRequest {
    pub transaction_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub customer_name: String,
    pub customer_id: String,
    pub product_name: String,
    pub success_url: String,
    pub fail_url: String,
    pub cancel_url: String,
    pub ipn_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewaySession {
    pub session_key: String,
    pub gateway_url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Valid,
    /// Valid, and already reported as validated by an earlier call.
    Validated,
    Pending,
    Invalid,
}

/// What the gateway says about a payment when asked directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedPayment {
    pub status: ValidationStatus,
    pub validation_id: String,
    pub transaction_id: Option<Uuid>,
    pub amount_minor: Option<i64>,
    pub currency: Option<String>,
    pub bank_transaction_id: Option<String>,
    pub card_type: Option<String>,
    pub card_brand: Option<String>,
}

impl ValidatedPayment {
    pub fn is_valid(&self) -> bool {
        matches!(self.status, ValidationStatus::Valid | ValidationStatus::Validated)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
    #[error("gateway unreachable: {0}")]
    Transport(String),
    #[error("malformed gateway response: {0}")]
    Malformed(String),
}

/// Outbound port to the payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: &SessionRequest) -> Result<GatewaySession, GatewayError>;

    async fn validate(&self, validation_id: &str) -> Result<ValidatedPayment, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_transitions() {
        use TransactionStatus::*;

        assert!(Initiated.can_transition_to(Pending));
        assert!(Initiated.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Initiated));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Completed));
    }

    #[test]
    fn test_validated_status_counts_as_valid() {
        let mut payment = ValidatedPayment {
            status: ValidationStatus::Validated,
            validation_id: "VAL-1".to_string(),
            transaction_id: Some(Uuid::new_v4()),
            amount_minor: Some(207_600),
            currency: Some("BDT".to_string()),
            bank_transaction_id: None,
            card_type: None,
            card_brand: None,
        };
        assert!(payment.is_valid());

        payment.status = ValidationStatus::Pending;
        assert!(!payment.is_valid());
    }
}
