use chrono::{DateTime, NaiveDate, Utc};
use rail_shared::Masked;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{BookingError, BookingResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "pending",
            TicketStatus::Confirmed => "confirmed",
            TicketStatus::Cancelled => "cancelled",
            TicketStatus::Expired => "expired",
        }
    }

    /// Pending and confirmed tickets hold their seat.
    pub fn holds_seat(&self) -> bool {
        matches!(self, TicketStatus::Pending | TicketStatus::Confirmed)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TicketStatus::Pending),
            "confirmed" => Ok(TicketStatus::Confirmed),
            "cancelled" => Ok(TicketStatus::Cancelled),
            "expired" => Ok(TicketStatus::Expired),
            other => Err(BookingError::Storage(format!("unknown ticket status {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TicketPaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
    Expired,
}

impl TicketPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPaymentStatus::Pending => "pending",
            TicketPaymentStatus::Paid => "paid",
            TicketPaymentStatus::Failed => "failed",
            TicketPaymentStatus::Refunded => "refunded",
            TicketPaymentStatus::Expired => "expired",
        }
    }

    /// Payment status a ticket takes when its holder cancels it.
    pub fn on_cancellation(self) -> Self {
        match self {
            TicketPaymentStatus::Paid => TicketPaymentStatus::Refunded,
            _ => TicketPaymentStatus::Failed,
        }
    }
}

impl fmt::Display for TicketPaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketPaymentStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TicketPaymentStatus::Pending),
            "paid" => Ok(TicketPaymentStatus::Paid),
            "failed" => Ok(TicketPaymentStatus::Failed),
            "refunded" => Ok(TicketPaymentStatus::Refunded),
            "expired" => Ok(TicketPaymentStatus::Expired),
            other => Err(BookingError::Storage(format!("unknown payment status {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl FromStr for Gender {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            other => Err(BookingError::Storage(format!("unknown gender {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Passenger {
    pub name: Masked<String>,
    pub age: i32,
    pub gender: Gender,
}

impl Passenger {
    pub fn new(name: &str, age: i32, gender: Gender) -> Self {
        Self {
            name: Masked::new(name.trim().to_string()),
            age,
            gender,
        }
    }

    pub fn validate(&self) -> BookingResult<()> {
        let name = self.name.expose();
        if name.trim().is_empty() {
            return Err(BookingError::Validation("passenger name is required".to_string()));
        }
        if name.chars().count() > 100 {
            return Err(BookingError::Validation("passenger name exceeds 100 characters".to_string()));
        }
        if !(0..=120).contains(&self.age) {
            return Err(BookingError::Validation(format!("passenger age {} is out of range", self.age)));
        }
        Ok(())
    }
}

/// Seat numbers are short alphanumeric labels such as `AC01` or `S4-17`.
pub fn validate_seat_number(seat_number: &str) -> BookingResult<()> {
    let valid = !seat_number.is_empty()
        && seat_number.len() <= 16
        && seat_number.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(BookingError::Validation(format!("invalid seat number {:?}", seat_number)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_number: String,
    pub user_id: String,
    pub schedule_id: Uuid,
    pub train_id: Uuid,
    pub journey_date: NaiveDate,
    pub compartment_instance_id: Uuid,
    pub seat_id: Uuid,
    pub seat_number: String,
    pub from_station_id: Uuid,
    pub to_station_id: Uuid,
    pub distance_km: i32,
    pub passenger: Passenger,
    pub fare_minor: i64,
    pub currency: String,
    pub status: TicketStatus,
    pub payment_status: TicketPaymentStatus,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Still waiting for payment: the only state the sweep and the payment path may move.
    pub fn awaiting_payment(&self) -> bool {
        self.status == TicketStatus::Pending && self.payment_status == TicketPaymentStatus::Pending
    }

    pub fn hold_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Everything the store needs to write a pending ticket in one unit.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub user_id: String,
    pub schedule_id: Uuid,
    pub train_id: Uuid,
    pub train_code: String,
    pub journey_date: NaiveDate,
    pub compartment_instance_id: Uuid,
    pub total_seats: i32,
    pub seat_number: String,
    pub from_station_id: Uuid,
    pub to_station_id: Uuid,
    pub distance_km: i32,
    pub passenger: Passenger,
    pub fare_minor: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewTicket {
    pub fn into_ticket(self, id: Uuid, ticket_number: String, seat_id: Uuid) -> Ticket {
        Ticket {
            id,
            ticket_number,
            user_id: self.user_id,
            schedule_id: self.schedule_id,
            train_id: self.train_id,
            journey_date: self.journey_date,
            compartment_instance_id: self.compartment_instance_id,
            seat_id,
            seat_number: self.seat_number,
            from_station_id: self.from_station_id,
            to_station_id: self.to_station_id,
            distance_km: self.distance_km,
            passenger: self.passenger,
            fare_minor: self.fare_minor,
            currency: self.currency,
            status: TicketStatus::Pending,
            payment_status: TicketPaymentStatus::Pending,
            expires_at: self.expires_at,
            confirmed_at: None,
            cancelled_at: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Attempts a store makes before giving up on finding an unused ticket number.
pub const TICKET_NUMBER_ATTEMPTS: usize = 5;

/// Human-readable ticket number: `{TRAIN}-{YYYYMMDD}-{SEAT}-{SUFFIX}`.
pub fn generate_ticket_number(train_code: &str, journey_date: NaiveDate, seat_number: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();
    format!(
        "{}-{}-{}-{}",
        train_code.to_uppercase(),
        journey_date.format("%Y%m%d"),
        seat_number.to_uppercase(),
        suffix
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_number_format() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let number = generate_ticket_number("rj701", date, "ac01");

        assert!(number.starts_with("RJ701-20261018-AC01-"));
        let suffix = number.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 5);
        assert!(suffix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_passenger_validation() {
        assert!(Passenger::new("Meera Iyer", 34, Gender::Female).validate().is_ok());
        assert!(Passenger::new("   ", 34, Gender::Female).validate().is_err());
        assert!(Passenger::new("Meera Iyer", 130, Gender::Female).validate().is_err());
    }

    #[test]
    fn test_seat_number_validation() {
        assert!(validate_seat_number("AC01").is_ok());
        assert!(validate_seat_number("S4-17").is_ok());
        assert!(validate_seat_number("").is_err());
        assert!(validate_seat_number("A 1").is_err());
    }

    #[test]
    fn test_cancellation_payment_status() {
        assert_eq!(TicketPaymentStatus::Paid.on_cancellation(), TicketPaymentStatus::Refunded);
        assert_eq!(TicketPaymentStatus::Pending.on_cancellation(), TicketPaymentStatus::Failed);
    }

    #[test]
    fn test_status_round_trip_through_storage_names() {
        for status in [TicketStatus::Pending, TicketStatus::Confirmed, TicketStatus::Cancelled, TicketStatus::Expired] {
            assert_eq!(status.as_str().parse::<TicketStatus>().unwrap(), status);
        }
        assert!("unknown".parse::<TicketStatus>().is_err());
    }
}
