use chrono::{DateTime, NaiveDate, Utc};
use rail_catalog::CompartmentPricing;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A train bound to a route for one departure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSchedule {
    pub id: Uuid,
    pub train_id: Uuid,
    pub train_code: String,
    pub route_id: Uuid,
    pub departure_at: DateTime<Utc>,
}

impl TrainSchedule {
    pub fn journey_date(&self) -> NaiveDate {
        self.departure_at.date_naive()
    }

    pub fn has_departed(&self, now: DateTime<Utc>) -> bool {
        self.departure_at <= now
    }
}

/// A train's physical instance of a compartment type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompartmentInstance {
    pub id: Uuid,
    pub train_id: Uuid,
    pub compartment_type_id: Uuid,
    pub label: String,
    pub total_seats: i32,
    pub pricing: CompartmentPricing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Seat {
    pub id: Uuid,
    pub compartment_instance_id: Uuid,
    pub seat_number: String,
    pub is_available: bool,
}

/// Capacity ledger row for a `(schedule, compartment)` pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub schedule_id: Uuid,
    pub compartment_instance_id: Uuid,
    pub booked_seats: i32,
    pub total_seats: i32,
}

impl LedgerSnapshot {
    pub fn remaining(&self) -> i32 {
        self.total_seats - self.booked_seats
    }
}
