use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rail_core::BookingError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Authentication(String),
    BadRequest(String),
    Booking(BookingError),
    Internal(anyhow::Error),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
            AppError::Booking(err) => {
                let status = match err {
                    BookingError::NotFound { .. } => StatusCode::NOT_FOUND,
                    BookingError::Validation(_)
                    | BookingError::InvalidSegment(_)
                    | BookingError::CompartmentUnavailable(_) => StatusCode::BAD_REQUEST,
                    BookingError::SeatAlreadyBooked { .. }
                    | BookingError::CapacityExceeded { .. }
                    | BookingError::InvalidState(_) => StatusCode::CONFLICT,
                    BookingError::Unauthorized(_) => StatusCode::FORBIDDEN,
                    BookingError::ValidationFailed(_) | BookingError::CancellationWindowClosed { .. } => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    BookingError::Gateway(_) => StatusCode::BAD_GATEWAY,
                    BookingError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
                    BookingError::LedgerUnderflow { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();

        let message = match self {
            AppError::Authentication(msg) | AppError::BadRequest(msg) => msg,
            AppError::Booking(err) if err.is_transient() => {
                tracing::warn!(code, "Retryable failure: {}", err);
                err.to_string()
            }
            AppError::Booking(err) if status.is_server_error() => {
                tracing::error!(code, "Request failed: {}", err);
                err.to_string()
            }
            AppError::Booking(err) => err.to_string(),
            AppError::Internal(err) => {
                tracing::error!("Internal Server Error: {:#}", err);
                "Internal Server Error".to_string()
            }
        };

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        AppError::Booking(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}
