pub mod booking;
pub mod gateway;
pub mod orchestrator;
pub mod reclamation;

pub use booking::{BookingConfig, BookingRequest, BookingService, QuoteRequest};
pub use gateway::{HttpPaymentGateway, MockPaymentGateway};
pub use orchestrator::{CallbackUrls, PaymentOrchestrator, PaymentOutcome, PaymentSession};
pub use reclamation::{ReclamationSweep, SweepFailure, SweepReport};
