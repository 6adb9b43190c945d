use axum::{
    extract::{Path, State},
    routing::post,
    Extension, Form, Json, Router,
};
use chrono::Utc;
use rail_booking::{PaymentOutcome, PaymentSession};
use rail_core::Principal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::bookings::TicketResponse;
use crate::error::AppError;
use crate::state::AppState;

/// Fields the gateway posts back on its success redirect.
#[derive(Debug, Deserialize)]
pub struct SuccessCallback {
    pub tran_id: Uuid,
    pub val_id: String,
}

/// Fields the gateway posts back on its fail and cancel redirects.
#[derive(Debug, Deserialize)]
pub struct ClosedCallback {
    pub tran_id: Uuid,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IpnNotification {
    #[serde(default)]
    pub tran_id: Option<Uuid>,
    #[serde(default)]
    pub val_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<TicketResponse>,
}

impl CallbackResponse {
    fn status(status: &'static str) -> Self {
        Self { status, ticket: None }
    }
}

impl From<PaymentOutcome> for CallbackResponse {
    fn from(outcome: PaymentOutcome) -> Self {
        match outcome {
            PaymentOutcome::Completed(ticket) => Self {
                status: "completed",
                ticket: Some(ticket.into()),
            },
            PaymentOutcome::AlreadyProcessed => Self::status("already_processed"),
            PaymentOutcome::AwaitingGateway => Self::status("pending"),
        }
    }
}

/// Routes that need an authenticated caller.
pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/payments/{ticket_id}/initiate", post(initiate_payment))
}

/// Routes the gateway and the customer's browser call without a token. Nothing
/// here is trusted until the gateway's validation API has confirmed it.
pub fn callback_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/payments/callback/success", post(payment_success))
        .route("/v1/payments/callback/fail", post(payment_fail))
        .route("/v1/payments/callback/cancel", post(payment_cancel))
        .route("/v1/payments/ipn", post(payment_ipn))
}

/// POST /v1/payments/{ticket_id}/initiate
async fn initiate_payment(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<PaymentSession>, AppError> {
    let session = state.payments.initiate_payment(&principal, ticket_id, Utc::now()).await?;
    Ok(Json(session))
}

fn record_outcome(state: &AppState, outcome: &PaymentOutcome) {
    if let PaymentOutcome::Completed(ticket) = outcome {
        state.metrics.payments_completed.inc();
        tracing::info!(ticket_number = %ticket.ticket_number, "Payment completed");
    }
}

/// POST /v1/payments/callback/success
async fn payment_success(
    State(state): State<AppState>,
    Form(callback): Form<SuccessCallback>,
) -> Result<Json<CallbackResponse>, AppError> {
    let outcome = state
        .payments
        .handle_success(callback.tran_id, &callback.val_id, Utc::now())
        .await?;
    record_outcome(&state, &outcome);
    Ok(Json(outcome.into()))
}

/// POST /v1/payments/callback/fail
async fn payment_fail(
    State(state): State<AppState>,
    Form(callback): Form<ClosedCallback>,
) -> Result<Json<CallbackResponse>, AppError> {
    state
        .payments
        .handle_failure(callback.tran_id, callback.error.as_deref(), Utc::now())
        .await?;
    Ok(Json(CallbackResponse::status("failed")))
}

/// POST /v1/payments/callback/cancel
async fn payment_cancel(
    State(state): State<AppState>,
    Form(callback): Form<ClosedCallback>,
) -> Result<Json<CallbackResponse>, AppError> {
    state
        .payments
        .handle_cancel(callback.tran_id, callback.error.as_deref(), Utc::now())
        .await?;
    Ok(Json(CallbackResponse::status("cancelled")))
}

/// POST /v1/payments/ipn
///
/// The notification is unauthenticated, so its own status is never trusted:
/// every IPN goes through gateway validation by `val_id`.
async fn payment_ipn(
    State(state): State<AppState>,
    Form(ipn): Form<IpnNotification>,
) -> Result<Json<CallbackResponse>, AppError> {
    let now = Utc::now();
    debug!(
        tran_id = ?ipn.tran_id,
        status = ?ipn.status,
        error = ?ipn.error,
        "IPN received"
    );

    let val_id = ipn
        .val_id
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest("IPN carries no val_id".to_string()))?;

    let outcome = state.payments.handle_ipn(&val_id, now).await?;
    record_outcome(&state, &outcome);
    Ok(Json(outcome.into()))
}
