use rail_catalog::CatalogError;
use uuid::Uuid;

use crate::payment::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: String,
    },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Invalid segment: {0}")]
    InvalidSegment(String),

    #[error("Train does not carry compartment type {0}")]
    CompartmentUnavailable(Uuid),

    #[error("Seat {seat_number} is already booked")]
    SeatAlreadyBooked {
        seat_number: String,
    },

    #[error("Compartment is full: {booked} of {total} seats booked")]
    CapacityExceeded {
        booked: i32,
        total: i32,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payment validation failed: {0}")]
    ValidationFailed(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Tickets can no longer be cancelled within {cutoff_hours} hours of departure")]
    CancellationWindowClosed {
        cutoff_hours: i64,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Ledger underflow for schedule {schedule_id}, compartment {compartment_id}")]
    LedgerUnderflow {
        schedule_id: Uuid,
        compartment_id: Uuid,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type BookingResult<T> = Result<T, BookingError>;

impl BookingError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        BookingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// The request lost a race for a seat or for capacity. The client should pick
    /// another seat rather than retry.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            BookingError::SeatAlreadyBooked { .. } | BookingError::CapacityExceeded { .. }
        )
    }

    /// Worth retrying later: the store or the gateway was unreachable.
    pub fn is_transient(&self) -> bool {
        matches!(self, BookingError::Storage(_) | BookingError::Gateway(_))
    }

    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::NotFound { .. } => "NOT_FOUND",
            BookingError::Validation(_) => "INVALID_REQUEST",
            BookingError::InvalidSegment(_) => "INVALID_SEGMENT",
            BookingError::CompartmentUnavailable(_) => "COMPARTMENT_UNAVAILABLE",
            BookingError::SeatAlreadyBooked { .. } => "SEAT_ALREADY_BOOKED",
            BookingError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            BookingError::Unauthorized(_) => "UNAUTHORIZED",
            BookingError::ValidationFailed(_) => "PAYMENT_VALIDATION_FAILED",
            BookingError::Gateway(_) => "GATEWAY_ERROR",
            BookingError::CancellationWindowClosed { .. } => "CANCELLATION_WINDOW_CLOSED",
            BookingError::InvalidState(_) => "INVALID_STATE",
            BookingError::LedgerUnderflow { .. } => "LEDGER_UNDERFLOW",
            BookingError::Storage(_) => "STORAGE_UNAVAILABLE",
        }
    }
}

impl From<CatalogError> for BookingError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::InvalidSegment(msg) => BookingError::InvalidSegment(msg),
            CatalogError::CapacityExceeded { booked, total } => BookingError::CapacityExceeded { booked, total },
            CatalogError::InvalidRoute(msg) | CatalogError::InvalidPricing(msg) => {
                BookingError::InvalidState(format!("catalog data is inconsistent: {}", msg))
            }
            CatalogError::LedgerUnderflow {
                schedule_id,
                compartment_id,
            } => BookingError::LedgerUnderflow {
                schedule_id,
                compartment_id,
            },
        }
    }
}

impl From<GatewayError> for BookingError {
    fn from(err: GatewayError) -> Self {
        BookingError::Gateway(err.to_string())
    }
}
