use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rail_core::payment::PaymentAction;
use rail_core::repository::{CancellationReceipt, ExpiryOutcome, TicketRepository};
use rail_core::schedule::{LedgerSnapshot, Seat};
use rail_core::ticket::{generate_ticket_number, NewTicket, Ticket, TICKET_NUMBER_ATTEMPTS};
use rail_core::{BookingError, BookingResult};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog_repo::PgBookingStore;
use crate::ledger;
use crate::payment_repo::cancel_open_transactions;
use crate::rows::{db_err, tickets_from_rows, violated_constraint, TicketRow, ACTIVE_SEAT_INDEX, TICKET_COLUMNS};

pub(crate) const EXPIRY_REASON: &str = "booking expired due to payment timeout";

#[async_trait]
impl TicketRepository for PgBookingStore {
    async fn create_pending_ticket(&self, new_ticket: NewTicket) -> BookingResult<Ticket> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // The upsert locks the seat row, so concurrent bookings of one seat queue here.
        let seat_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO seats (id, compartment_instance_id, seat_number, is_available)
            VALUES ($1, $2, $3, TRUE)
            ON CONFLICT (compartment_instance_id, seat_number) DO UPDATE SET updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new_ticket.compartment_instance_id)
        .bind(&new_ticket.seat_number)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM tickets
                WHERE seat_id = $1 AND journey_date = $2 AND status IN ('pending', 'confirmed')
            )
            "#,
        )
        .bind(seat_id)
        .bind(new_ticket.journey_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        if taken {
            return Err(BookingError::SeatAlreadyBooked {
                seat_number: new_ticket.seat_number,
            });
        }

        let booked = ledger::reserve(
            &mut tx,
            new_ticket.schedule_id,
            new_ticket.compartment_instance_id,
            new_ticket.total_seats,
        )
        .await?;

        sqlx::query("UPDATE seats SET is_available = FALSE, updated_at = $2 WHERE id = $1")
            .bind(seat_id)
            .bind(new_ticket.created_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let ticket_id = Uuid::new_v4();
        let mut inserted: Option<TicketRow> = None;

        for attempt in 1..=TICKET_NUMBER_ATTEMPTS {
            let ticket_number =
                generate_ticket_number(&new_ticket.train_code, new_ticket.journey_date, &new_ticket.seat_number);

            let row: Option<TicketRow> = sqlx::query_as(&format!(
                r#"
                INSERT INTO tickets (
                    id, ticket_number, user_id, schedule_id, train_id, journey_date,
                    compartment_instance_id, seat_id, seat_number, from_station_id, to_station_id, distance_km,
                    passenger_name, passenger_age, passenger_gender, fare_minor, currency,
                    status, payment_status, expires_at, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                        'pending', 'pending', $18, $19, $19)
                ON CONFLICT (ticket_number) DO NOTHING
                RETURNING {}
                "#,
                TICKET_COLUMNS
            ))
            .bind(ticket_id)
            .bind(&ticket_number)
            .bind(&new_ticket.user_id)
            .bind(new_ticket.schedule_id)
            .bind(new_ticket.train_id)
            .bind(new_ticket.journey_date)
            .bind(new_ticket.compartment_instance_id)
            .bind(seat_id)
            .bind(&new_ticket.seat_number)
            .bind(new_ticket.from_station_id)
            .bind(new_ticket.to_station_id)
            .bind(new_ticket.distance_km)
            .bind(new_ticket.passenger.name.expose())
            .bind(new_ticket.passenger.age)
            .bind(new_ticket.passenger.gender.as_str())
            .bind(new_ticket.fare_minor)
            .bind(&new_ticket.currency)
            .bind(new_ticket.expires_at)
            .bind(new_ticket.created_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                if violated_constraint(&e) == Some(ACTIVE_SEAT_INDEX) {
                    BookingError::SeatAlreadyBooked {
                        seat_number: new_ticket.seat_number.clone(),
                    }
                } else {
                    db_err(e)
                }
            })?;

            if row.is_some() {
                inserted = row;
                break;
            }
            debug!(attempt, ticket_number = %ticket_number, "Ticket number collision, retrying");
        }

        let row = inserted.ok_or_else(|| {
            BookingError::Storage(format!(
                "no unused ticket number after {} attempts",
                TICKET_NUMBER_ATTEMPTS
            ))
        })?;
        let ticket = Ticket::try_from(row)?;

        tx.commit().await.map_err(|e| {
            if violated_constraint(&e) == Some(ACTIVE_SEAT_INDEX) {
                BookingError::SeatAlreadyBooked {
                    seat_number: ticket.seat_number.clone(),
                }
            } else {
                db_err(e)
            }
        })?;

        info!(
            ticket_number = %ticket.ticket_number,
            schedule_id = %ticket.schedule_id,
            booked_seats = booked,
            "Pending ticket created"
        );

        Ok(ticket)
    }

    async fn get_ticket(&self, id: Uuid) -> BookingResult<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as(&format!("SELECT {} FROM tickets WHERE id = $1", TICKET_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(Ticket::try_from).transpose()
    }

    async fn cancel_ticket(&self, id: Uuid, now: DateTime<Utc>, reason: &str) -> BookingResult<CancellationReceipt> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row: Option<TicketRow> = sqlx::query_as(&format!(
            r#"
            UPDATE tickets
            SET status = 'cancelled',
                payment_status = CASE WHEN payment_status = 'paid' THEN 'refunded' ELSE 'failed' END,
                cancelled_at = $2,
                updated_at = $2
            WHERE id = $1 AND status IN ('pending', 'confirmed')
            RETURNING {}
            "#,
            TICKET_COLUMNS
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            let status: Option<String> = sqlx::query_scalar("SELECT status FROM tickets WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
            return Err(match status {
                Some(status) => BookingError::InvalidState(format!("ticket is already {}", status)),
                None => BookingError::not_found("ticket", id),
            });
        };
        let ticket = Ticket::try_from(row)?;

        let cancelled_transactions =
            cancel_open_transactions(&mut tx, ticket.id, PaymentAction::TicketCancelled, reason, now).await?;
        ledger::release_hold(&mut tx, &ticket, now).await?;

        tx.commit().await.map_err(db_err)?;

        info!(ticket_number = %ticket.ticket_number, cancelled_transactions, "Ticket cancelled");

        Ok(CancellationReceipt {
            ticket,
            cancelled_transactions,
        })
    }

    async fn list_expired_pending(&self, now: DateTime<Utc>, limit: i64) -> BookingResult<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM tickets
            WHERE status = 'pending' AND payment_status = 'pending' AND expires_at < $1
            ORDER BY expires_at
            LIMIT $2
            "#,
            TICKET_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        tickets_from_rows(rows)
    }

    async fn expire_ticket(&self, id: Uuid, now: DateTime<Utc>) -> BookingResult<ExpiryOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Compare-and-swap against the payment path: only an unpaid hold moves.
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            r#"
            UPDATE tickets
            SET status = 'expired', payment_status = 'expired', updated_at = $2
            WHERE id = $1 AND status = 'pending' AND payment_status = 'pending' AND expires_at < $2
            RETURNING {}
            "#,
            TICKET_COLUMNS
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            debug!(ticket_id = %id, "Ticket left pending before expiry, skipping");
            return Ok(ExpiryOutcome::Skipped);
        };
        let ticket = Ticket::try_from(row)?;

        let cancelled_transactions =
            cancel_open_transactions(&mut tx, ticket.id, PaymentAction::Expired, EXPIRY_REASON, now).await?;

        if let Err(e) = ledger::release_hold(&mut tx, &ticket, now).await {
            warn!(ticket_number = %ticket.ticket_number, error = %e, "Could not release hold for expired ticket");
            return Err(e);
        }

        tx.commit().await.map_err(db_err)?;

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
        let row: Option<(i32, i32)> = sqlx::query_as(
            "SELECT booked_seats, total_seats FROM compartment_bookings WHERE schedule_id = $1 AND compartment_instance_id = $2",
        )
        .bind(schedule_id)
        .bind(compartment_instance_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|(booked_seats, total_seats)| LedgerSnapshot {
            schedule_id,
            compartment_instance_id,
            booked_seats,
            total_seats,
        }))
    }

    async fn get_seat(&self, compartment_instance_id: Uuid, seat_number: &str) -> BookingResult<Option<Seat>> {
        let row: Option<(Uuid, bool)> = sqlx::query_as(
            "SELECT id, is_available FROM seats WHERE compartment_instance_id = $1 AND seat_number = $2",
        )
        .bind(compartment_instance_id)
        .bind(seat_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|(id, is_available)| Seat {
            id,
            compartment_instance_id,
            seat_number: seat_number.to_string(),
            is_available,
        }))
    }
}
