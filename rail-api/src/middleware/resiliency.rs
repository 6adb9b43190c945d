use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    /// One trial request is let through after the reset timeout.
    HalfOpen,
}

pub struct CircuitBreaker {
    pub name: String,
    state: RwLock<CircuitState>,
    failure_count: AtomicUsize,
    failure_threshold: usize,
    reset_timeout: Duration,
    opened_at: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(name: &str, threshold: usize, reset_timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicUsize::new(0),
            failure_threshold: threshold,
            reset_timeout,
            opened_at: RwLock::new(None),
        }
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }

    /// Whether a request may go through right now.
    pub async fn allow(&self) -> bool {
        match *self.state.read().await {
            CircuitState::Closed | CircuitState::HalfOpen => return true,
            CircuitState::Open => {}
        }

        let cooled_down = self
            .opened_at
            .read()
            .await
            .map(|at| at.elapsed() >= self.reset_timeout)
            .unwrap_or(false);

        if cooled_down {
            *self.state.write().await = CircuitState::HalfOpen;
            tracing::info!(breaker = %self.name, "Circuit half-open, probing");
        }
        cooled_down
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        if *state == CircuitState::HalfOpen {
            tracing::info!(breaker = %self.name, "Circuit closed again");
        }
        *state = CircuitState::Closed;
        self.failure_count.store(0, Ordering::SeqCst);
    }

    pub async fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write().await;

        if count >= self.failure_threshold || *state == CircuitState::HalfOpen {
            *state = CircuitState::Open;
            *self.opened_at.write().await = Some(Instant::now());
            tracing::error!(breaker = %self.name, failures = count, "Circuit opened");
        }
    }
}

pub struct ResiliencyState {
    /// Guards the calls that open a checkout session at the payment gateway.
    pub gateway_cb: CircuitBreaker,
}

impl ResiliencyState {
    pub fn new(threshold: usize, reset_timeout: Duration) -> Self {
        Self {
            gateway_cb: CircuitBreaker::new("payment-gateway", threshold, reset_timeout),
        }
    }
}

impl Default for ResiliencyState {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(30))
    }
}

fn is_gateway_call(path: &str) -> bool {
    path.starts_with("/v1/payments/") && path.ends_with("/initiate")
}

pub async fn circuit_breaker_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !is_gateway_call(req.uri().path()) {
        return next.run(req).await;
    }

    let cb = &state.resiliency.gateway_cb;
    if !cb.allow().await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": format!("Circuit breaker [{}] is open", cb.name),
                "code": "CIRCUIT_OPEN",
            })),
        )
            .into_response();
    }

    let response = next.run(req).await;

    if response.status().is_server_error() {
        cb.record_failure().await;
    } else {
        cb.record_success().await;
    }

    response
}
