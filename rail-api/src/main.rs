use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use rail_api::metrics::Metrics;
use rail_api::middleware::ResiliencyState;
use rail_api::{app, worker, AppState, AuthConfig};
use rail_booking::{
    BookingConfig, BookingService, CallbackUrls, HttpPaymentGateway, MockPaymentGateway, PaymentOrchestrator,
    ReclamationSweep,
};
use rail_core::payment::PaymentGateway;
use rail_core::BookingStore;
use rail_store::app_config::{Config, GatewayMode};
use rail_store::{DbClient, PgBookingStore, RedisClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rail_api=debug,rail_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting rail booking API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let rules = db
        .fetch_business_rules(config.business_rules.clone())
        .await
        .context("Failed to read business rules")?;

    let redis = match &config.redis {
        Some(redis_config) => Some(Arc::new(
            RedisClient::new(&redis_config.url)
                .await
                .context("Failed to connect to Redis")?,
        )),
        None => {
            tracing::warn!("No Redis configured, rate limiting disabled");
            None
        }
    };

    let gateway: Arc<dyn PaymentGateway> = match config.gateway.mode {
        GatewayMode::Http => Arc::new(
            HttpPaymentGateway::new(
                &config.gateway.base_url,
                &config.gateway.store_id,
                &config.gateway.store_password,
                std::time::Duration::from_secs(config.gateway.timeout_seconds),
            )
            .context("Failed to build gateway client")?,
        ),
        GatewayMode::Mock => {
            tracing::warn!("Using the mock payment gateway");
            Arc::new(MockPaymentGateway::new(&config.server.public_url, &rules.currency))
        }
    };

    let store: Arc<dyn BookingStore> = Arc::new(PgBookingStore::new(db.pool.clone()));
    let (seat_events, _) = tokio::sync::broadcast::channel(100);

    let booking_config = BookingConfig {
        expiry_window: chrono::Duration::minutes(rules.booking_expiry_minutes),
        cancellation_cutoff: chrono::Duration::hours(rules.cancellation_cutoff_hours),
        currency: rules.currency.clone(),
    };
    let booking = BookingService::new(store.clone(), booking_config).with_events(seat_events.clone());
    let payments = PaymentOrchestrator::new(store.clone(), gateway, CallbackUrls::under(&config.server.public_url));
    let sweep = Arc::new(ReclamationSweep::new(store, rules.sweep_batch_size).with_events(seat_events.clone()));
    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);

    tokio::spawn(worker::start_reclamation_worker(
        sweep.clone(),
        metrics.clone(),
        tokio::time::Duration::from_secs(rules.sweep_interval_seconds),
    ));

    let app_state = AppState {
        booking: Arc::new(booking),
        payments: Arc::new(payments),
        sweep,
        redis,
        seat_events,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        metrics,
        resiliency: Arc::new(ResiliencyState::default()),
        rate_limit_per_minute: config.server.rate_limit_per_minute,
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
