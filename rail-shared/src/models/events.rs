use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatChange {
    Booked,
    Cancelled,
    Expired,
}

/// Published whenever a seat on a schedule is taken or handed back to the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatAvailabilityEvent {
    pub schedule_id: Uuid,
    pub compartment_id: Uuid,
    pub seat_number: String,
    pub change: SeatChange,
    pub available: bool,
    pub timestamp: i64,
}

impl SeatAvailabilityEvent {
    pub fn new(schedule_id: Uuid, compartment_id: Uuid, seat_number: &str, change: SeatChange, timestamp: i64) -> Self {
        Self {
            schedule_id,
            compartment_id,
            seat_number: seat_number.to_string(),
            change,
            available: change != SeatChange::Booked,
            timestamp,
        }
    }
}
