use std::sync::Arc;

use rail_booking::{BookingService, PaymentOrchestrator, ReclamationSweep};
use rail_shared::SeatAvailabilityEvent;
use rail_store::RedisClient;
use tokio::sync::broadcast;

use crate::metrics::Metrics;
use crate::middleware::resiliency::ResiliencyState;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub booking: Arc<BookingService>,
    pub payments: Arc<PaymentOrchestrator>,
    pub sweep: Arc<ReclamationSweep>,
    /// Rate limiting is off when no Redis is configured.
    pub redis: Option<Arc<RedisClient>>,
    pub seat_events: broadcast::Sender<SeatAvailabilityEvent>,
    pub auth: AuthConfig,
    pub metrics: Arc<Metrics>,
    pub resiliency: Arc<ResiliencyState>,
    pub rate_limit_per_minute: i64,
}
