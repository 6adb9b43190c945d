use uuid::Uuid;

pub mod route;
pub mod pricing;
pub mod ledger;

pub use route::{Route, RouteStop, Segment};
pub use pricing::{CompartmentPricing, FareQuote};
pub use ledger::{LedgerEntry, SeatLedger};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    #[error("Invalid segment: {0}")]
    InvalidSegment(String),

    #[error("Invalid pricing: {0}")]
    InvalidPricing(String),

    #[error("Capacity exceeded: {booked} of {total} seats booked")]
    CapacityExceeded {
        booked: i32,
        total: i32,
    },

    #[error("Ledger underflow for schedule {schedule_id}, compartment {compartment_id}")]
    LedgerUnderflow {
        schedule_id: Uuid,
        compartment_id: Uuid,
    },
}
