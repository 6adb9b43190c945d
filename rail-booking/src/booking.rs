use chrono::{DateTime, Duration, Utc};
use rail_catalog::FareQuote;
use rail_core::identity::{require_owner_or_admin, require_role};
use rail_core::schedule::{CompartmentInstance, TrainSchedule};
use rail_core::ticket::{validate_seat_number, NewTicket, Passenger, Ticket};
use rail_core::{BookingError, BookingResult, BookingStore, Principal, Role};
use rail_shared::{SeatAvailabilityEvent, SeatChange};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct BookingConfig {
    pub expiry_window: Duration,
    pub cancellation_cutoff: Duration,
    pub currency: String,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            expiry_window: Duration::minutes(10),
            cancellation_cutoff: Duration::hours(2),
            currency: "BDT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub schedule_id: Uuid,
    pub from_station_id: Uuid,
    pub to_station_id: Uuid,
    /// Compartment type; resolved against the scheduled train.
    pub compartment_id: Uuid,
    pub seat_number: String,
    pub passenger: Passenger,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub schedule_id: Uuid,
    pub from_station_id: Uuid,
    pub to_station_id: Uuid,
    pub compartment_id: Uuid,
}

/// Everything a booking was validated against, resolved once.
struct ResolvedTrip {
    schedule: TrainSchedule,
    compartment: CompartmentInstance,
    quote: FareQuote,
}

pub struct BookingService {
    store: Arc<dyn BookingStore>,
    config: BookingConfig,
    events: Option<broadcast::Sender<SeatAvailabilityEvent>>,
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>, config: BookingConfig) -> Self {
        Self {
            store,
            config,
            events: None,
        }
    }

    /// Publish seat changes on `sender` after each successful write.
    pub fn with_events(mut self, sender: broadcast::Sender<SeatAvailabilityEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn config(&self) -> &BookingConfig {
        &self.config
    }

    async fn resolve_trip(
        &self,
        schedule_id: Uuid,
        from_station_id: Uuid,
        to_station_id: Uuid,
        compartment_type_id: Uuid,
    ) -> BookingResult<ResolvedTrip> {
        let schedule = self
            .store
            .get_schedule(schedule_id)
            .await?
            .ok_or_else(|| BookingError::not_found("schedule", schedule_id))?;

        let route = self
            .store
            .get_route(schedule.route_id)
            .await?
            .ok_or_else(|| BookingError::not_found("route", schedule.route_id))?;

        let segment = route.segment(from_station_id, to_station_id)?;

        let compartment = self
            .store
            .find_compartment(schedule.train_id, compartment_type_id)
            .await?
            .ok_or(BookingError::CompartmentUnavailable(compartment_type_id))?;

        let quote = FareQuote::new(segment, compartment.pricing.clone(), &self.config.currency)?;

        Ok(ResolvedTrip {
            schedule,
            compartment,
            quote,
        })
    }

    /// Price a segment without holding anything.
    pub async fn quote_fare(&self, request: &QuoteRequest) -> BookingResult<FareQuote> {
        let trip = self
            .resolve_trip(
                request.schedule_id,
                request.from_station_id,
                request.to_station_id,
                request.compartment_id,
            )
            .await?;
        Ok(trip.quote)
    }

    /// Hold a seat as a `pending/pending` ticket that expires after the
    /// configured window unless paid.
    pub async fn book_ticket(
        &self,
        principal: &Principal,
        request: BookingRequest,
        now: DateTime<Utc>,
    ) -> BookingResult<Ticket> {
        require_role(principal, Role::User)?;
        request.passenger.validate()?;
        validate_seat_number(&request.seat_number)?;

        let trip = self
            .resolve_trip(
                request.schedule_id,
                request.from_station_id,
                request.to_station_id,
                request.compartment_id,
            )
            .await?;

        if trip.schedule.has_departed(now) {
            return Err(BookingError::InvalidState(format!(
                "schedule {} departed at {}",
                trip.schedule.id, trip.schedule.departure_at
            )));
        }

        let new_ticket = NewTicket {
            user_id: principal.user_id.clone(),
            schedule_id: trip.schedule.id,
            train_id: trip.schedule.train_id,
            train_code: trip.schedule.train_code.clone(),
            journey_date: trip.schedule.journey_date(),
            compartment_instance_id: trip.compartment.id,
            total_seats: trip.compartment.total_seats,
            seat_number: request.seat_number.to_uppercase(),
            from_station_id: trip.quote.segment.from_station_id,
            to_station_id: trip.quote.segment.to_station_id,
            distance_km: trip.quote.segment.distance_km,
            passenger: request.passenger,
            fare_minor: trip.quote.amount_minor,
            currency: trip.quote.currency.clone(),
            created_at: now,
            expires_at: now + self.config.expiry_window,
        };

        debug!(
            schedule_id = %new_ticket.schedule_id,
            seat = %new_ticket.seat_number,
            passenger = ?new_ticket.passenger.name,
            "Booking seat"
        );

        let ticket = match self.store.create_pending_ticket(new_ticket).await {
            Ok(ticket) => ticket,
            Err(e) if e.is_conflict() => {
                info!(schedule_id = %request.schedule_id, seat = %request.seat_number, reason = %e, "Booking conflict");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        info!(
            ticket_number = %ticket.ticket_number,
            fare = %trip.quote.display_amount(),
            expires_at = %ticket.expires_at,
            "Ticket held pending payment"
        );
        self.publish(&ticket, SeatChange::Booked, now);

        Ok(ticket)
    }

    pub async fn get_ticket(&self, principal: &Principal, ticket_id: Uuid) -> BookingResult<Ticket> {
        let ticket = self
            .store
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| BookingError::not_found("ticket", ticket_id))?;
        require_owner_or_admin(principal, &ticket.user_id)?;
        Ok(ticket)
    }

    /// Cancel a pending or confirmed ticket outside the departure cutoff.
    pub async fn cancel_ticket(
        &self,
        principal: &Principal,
        ticket_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<Ticket> {
        let ticket = self.get_ticket(principal, ticket_id).await?;

        let schedule = self
            .store
            .get_schedule(ticket.schedule_id)
            .await?
            .ok_or_else(|| BookingError::not_found("schedule", ticket.schedule_id))?;

        if now + self.config.cancellation_cutoff > schedule.departure_at {
            return Err(BookingError::CancellationWindowClosed {
                cutoff_hours: self.config.cancellation_cutoff.num_hours(),
            });
        }

        let reason = format!("ticket cancelled by {}", principal.user_id);
        let receipt = self.store.cancel_ticket(ticket_id, now, &reason).await?;

        info!(
            ticket_number = %receipt.ticket.ticket_number,
            payment_status = %receipt.ticket.payment_status,
            cancelled_transactions = receipt.cancelled_transactions,
            "Ticket cancelled"
        );
        self.publish(&receipt.ticket, SeatChange::Cancelled, now);

        Ok(receipt.ticket)
    }

    fn publish(&self, ticket: &Ticket, change: SeatChange, now: DateTime<Utc>) {
        publish_seat_change(self.events.as_ref(), ticket, change, now);
    }
}

pub(crate) fn publish_seat_change(
    sender: Option<&broadcast::Sender<SeatAvailabilityEvent>>,
    ticket: &Ticket,
    change: SeatChange,
    now: DateTime<Utc>,
) {
    let Some(sender) = sender else {
        return;
    };
    let event = SeatAvailabilityEvent::new(
        ticket.schedule_id,
        ticket.compartment_instance_id,
        &ticket.seat_number,
        change,
        now.timestamp(),
    );
    // No subscribers is fine; anything else is worth a note.
    if sender.receiver_count() > 0 && sender.send(event).is_err() {
        warn!(ticket_number = %ticket.ticket_number, "Seat event dropped");
    }
}
