pub mod models;
pub mod pii;

pub use models::events::{SeatAvailabilityEvent, SeatChange};
pub use pii::Masked;
