use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, Method, StatusCode},
    middleware::{self as axum_middleware, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod bookings;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod payments;
pub mod state;
pub mod stream;
pub mod worker;

pub use state::{AppState, AuthConfig};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::USER_AGENT]);

    let authenticated = Router::new()
        .merge(bookings::routes())
        .merge(payments::routes())
        .merge(admin::routes())
        .merge(stream::routes())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .merge(authenticated)
        .merge(payments::callback_routes())
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::circuit_breaker_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let (Some(redis), Some(ConnectInfo(addr))) = (
        state.redis.as_ref(),
        req.extensions().get::<ConnectInfo<SocketAddr>>().copied(),
    ) else {
        return next.run(req).await;
    };

    let key = format!("ratelimit:{}", addr.ip());

    match redis.check_rate_limit(&key, state.rate_limit_per_minute, 60).await {
        Ok(true) => next.run(req).await,
        Ok(false) => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response(),
        Err(e) => {
            // Fail open
            tracing::warn!("Rate limiter unavailable: {}", e);
            next.run(req).await
        }
    }
}
