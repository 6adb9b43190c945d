//! Capacity ledger and seat-flag primitives. Every path that takes or hands
//! back a seat goes through these, inside the caller's transaction.

use chrono::{DateTime, Utc};
use rail_core::ticket::Ticket;
use rail_core::{BookingError, BookingResult};
use sqlx::PgConnection;
use tracing::error;
use uuid::Uuid;

use crate::rows::db_err;

/// Seed the row on first use, then take one seat if any is left.
pub(crate) async fn reserve(
    conn: &mut PgConnection,
    schedule_id: Uuid,
    compartment_instance_id: Uuid,
    total_seats: i32,
) -> BookingResult<i32> {
    sqlx::query(
        r#"
        INSERT INTO compartment_bookings (schedule_id, compartment_instance_id, booked_seats, total_seats)
        VALUES ($1, $2, 0, $3)
        ON CONFLICT (schedule_id, compartment_instance_id) DO NOTHING
        "#,
    )
    .bind(schedule_id)
    .bind(compartment_instance_id)
    .bind(total_seats)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    let booked: Option<i32> = sqlx::query_scalar(
        r#"
        UPDATE compartment_bookings
        SET booked_seats = booked_seats + 1, updated_at = NOW()
        WHERE schedule_id = $1 AND compartment_instance_id = $2 AND booked_seats < total_seats
        RETURNING booked_seats
        "#,
    )
    .bind(schedule_id)
    .bind(compartment_instance_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)?;

    match booked {
        Some(booked) => Ok(booked),
        None => {
            let (booked, total): (i32, i32) = sqlx::query_as(
                "SELECT booked_seats, total_seats FROM compartment_bookings WHERE schedule_id = $1 AND compartment_instance_id = $2",
            )
            .bind(schedule_id)
            .bind(compartment_instance_id)
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err)?;
            Err(BookingError::CapacityExceeded { booked, total })
        }
    }
}

/// Hand one seat back. A missing row or a zero count is reported, never clamped.
pub(crate) async fn release(
    conn: &mut PgConnection,
    schedule_id: Uuid,
    compartment_instance_id: Uuid,
) -> BookingResult<i32> {
    let booked: Option<i32> = sqlx::query_scalar(
        r#"
        UPDATE compartment_bookings
        SET booked_seats = booked_seats - 1, updated_at = NOW()
        WHERE schedule_id = $1 AND compartment_instance_id = $2 AND booked_seats > 0
        RETURNING booked_seats
        "#,
    )
    .bind(schedule_id)
    .bind(compartment_instance_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_err)?;

    booked.ok_or_else(|| {
        error!(
            schedule_id = %schedule_id,
            compartment_id = %compartment_instance_id,
            "Ledger release with nothing booked"
        );
        BookingError::LedgerUnderflow {
            schedule_id,
            compartment_id: compartment_instance_id,
        }
    })
}

/// Release everything an active ticket held: the seat flag and one unit of
/// ledger capacity. The ticket row must already be out of the active states.
pub(crate) async fn release_hold(conn: &mut PgConnection, ticket: &Ticket, now: DateTime<Utc>) -> BookingResult<()> {
    // The seat stays flagged while another journey date still holds it.
    sqlx::query(
        r#"
        UPDATE seats
        SET is_available = NOT EXISTS (
                SELECT 1 FROM tickets
                WHERE seat_id = $1 AND status IN ('pending', 'confirmed')
            ),
            updated_at = $2
        WHERE id = $1
        "#,
    )
    .bind(ticket.seat_id)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    release(conn, ticket.schedule_id, ticket.compartment_instance_id).await?;
    Ok(())
}
