pub mod error;
pub mod identity;
pub mod payment;
pub mod repository;
pub mod schedule;
pub mod ticket;

pub use error::{BookingError, BookingResult};
pub use identity::{Principal, Role};
pub use repository::BookingStore;
