use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use rail_booking::{BookingRequest, QuoteRequest};
use rail_catalog::pricing::format_major;
use rail_catalog::Segment;
use rail_core::ticket::Ticket;
use rail_core::Principal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    #[serde(flatten)]
    pub ticket: Ticket,
    /// Fare in major units, e.g. "2076.00".
    pub fare: String,
}

impl From<Ticket> for TicketResponse {
    fn from(ticket: Ticket) -> Self {
        let fare = format_major(ticket.fare_minor);
        Self { ticket, fare }
    }
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub segment: Segment,
    pub amount_minor: i64,
    pub amount: String,
    pub currency: String,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    #[serde(flatten)]
    pub ticket: TicketResponse,
    /// Pay before this instant or the seat goes back to the pool.
    pub payment_deadline: DateTime<Utc>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(book_ticket))
        .route("/v1/bookings/quote", post(quote_fare))
        .route("/v1/tickets/{id}", get(get_ticket))
        .route("/v1/tickets/{id}/cancel", post(cancel_ticket))
}

/// POST /v1/bookings
async fn book_ticket(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<BookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    match state.booking.book_ticket(&principal, req, Utc::now()).await {
        Ok(ticket) => {
            state.metrics.tickets_booked.inc();
            let payment_deadline = ticket.expires_at;
            Ok((
                StatusCode::CREATED,
                Json(BookingResponse {
                    ticket: ticket.into(),
                    payment_deadline,
                }),
            ))
        }
        Err(e) => {
            if e.is_conflict() {
                state.metrics.booking_conflicts.inc();
            }
            Err(e.into())
        }
    }
}

/// POST /v1/bookings/quote
async fn quote_fare(
    State(state): State<AppState>,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, AppError> {
    let quote = state.booking.quote_fare(&req).await?;
    Ok(Json(QuoteResponse {
        amount: quote.display_amount(),
        segment: quote.segment,
        amount_minor: quote.amount_minor,
        currency: quote.currency,
    }))
}

/// GET /v1/tickets/{id}
async fn get_ticket(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<TicketResponse>, AppError> {
    let ticket = state.booking.get_ticket(&principal, ticket_id).await?;
    Ok(Json(ticket.into()))
}

/// POST /v1/tickets/{id}/cancel
async fn cancel_ticket(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<TicketResponse>, AppError> {
    let ticket = state.booking.cancel_ticket(&principal, ticket_id, Utc::now()).await?;
    tracing::info!(ticket_number = %ticket.ticket_number, "Ticket cancelled by {}", principal.user_id);
    Ok(Json(ticket.into()))
}
