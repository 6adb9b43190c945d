use chrono::{DateTime, NaiveDate, Utc};
use rail_core::payment::{PaymentLog, PaymentTransaction};
use rail_core::ticket::{Passenger, Ticket};
use rail_core::BookingError;
use rail_shared::Masked;
use serde_json::Value;
use uuid::Uuid;

pub(crate) const TICKET_COLUMNS: &str = "id, ticket_number, user_id, schedule_id, train_id, journey_date, \
    compartment_instance_id, seat_id, seat_number, from_station_id, to_station_id, distance_km, \
    passenger_name, passenger_age, passenger_gender, fare_minor, currency, status, payment_status, \
    expires_at, confirmed_at, cancelled_at, created_at, updated_at";

pub(crate) const TRANSACTION_COLUMNS: &str = "id, ticket_id, user_id, amount_minor, currency, status, \
    session_key, gateway_url, validation_id, bank_transaction_id, card_type, failure_reason, \
    created_at, updated_at, completed_at";

pub(crate) const ACTIVE_SEAT_INDEX: &str = "tickets_active_seat_uidx";
pub(crate) const OPEN_TRANSACTION_INDEX: &str = "payment_transactions_open_uidx";

/// Every driver failure is transient from the caller's point of view unless a
/// repository recognises the constraint and maps it first.
pub(crate) fn db_err(err: sqlx::Error) -> BookingError {
    BookingError::Storage(err.to_string())
}

pub(crate) fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) => db.constraint(),
        _ => None,
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct TicketRow {
    id: Uuid,
    ticket_number: String,
    user_id: String,
    schedule_id: Uuid,
    train_id: Uuid,
    journey_date: NaiveDate,
    compartment_instance_id: Uuid,
    seat_id: Uuid,
    seat_number: String,
    from_station_id: Uuid,
    to_station_id: Uuid,
    distance_km: i32,
    passenger_name: String,
    passenger_age: i32,
    passenger_gender: String,
    fare_minor: i64,
    currency: String,
    status: String,
    payment_status: String,
    expires_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = BookingError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: row.id,
            ticket_number: row.ticket_number,
            user_id: row.user_id,
            schedule_id: row.schedule_id,
            train_id: row.train_id,
            journey_date: row.journey_date,
            compartment_instance_id: row.compartment_instance_id,
            seat_id: row.seat_id,
            seat_number: row.seat_number,
            from_station_id: row.from_station_id,
            to_station_id: row.to_station_id,
            distance_km: row.distance_km,
            passenger: Passenger {
                name: Masked::new(row.passenger_name),
                age: row.passenger_age,
                gender: row.passenger_gender.parse()?,
            },
            fare_minor: row.fare_minor,
            currency: row.currency,
            status: row.status.parse()?,
            payment_status: row.payment_status.parse()?,
            expires_at: row.expires_at,
            confirmed_at: row.confirmed_at,
            cancelled_at: row.cancelled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct TransactionRow {
    id: Uuid,
    ticket_id: Uuid,
    user_id: String,
    amount_minor: i64,
    currency: String,
    status: String,
    session_key: Option<String>,
    gateway_url: Option<String>,
    validation_id: Option<String>,
    bank_transaction_id: Option<String>,
    card_type: Option<String>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TransactionRow> for PaymentTransaction {
    type Error = BookingError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(PaymentTransaction {
            id: row.id,
            ticket_id: row.ticket_id,
            user_id: row.user_id,
            amount_minor: row.amount_minor,
            currency: row.currency,
            status: row.status.parse()?,
            session_key: row.session_key,
            gateway_url: row.gateway_url,
            validation_id: row.validation_id,
            bank_transaction_id: row.bank_transaction_id,
            card_type: row.card_type,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct LogRow {
    id: Uuid,
    transaction_id: Uuid,
    action: String,
    status: String,
    details: Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<LogRow> for PaymentLog {
    type Error = BookingError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        Ok(PaymentLog {
            id: row.id,
            transaction_id: row.transaction_id,
            action: row.action.parse()?,
            status: row.status.parse()?,
            details: row.details,
            created_at: row.created_at,
        })
    }
}

pub(crate) fn tickets_from_rows(rows: Vec<TicketRow>) -> Result<Vec<Ticket>, BookingError> {
    rows.into_iter().map(Ticket::try_from).collect()
}
