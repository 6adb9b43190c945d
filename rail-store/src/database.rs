use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{info, warn};

use crate::app_config::BusinessRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay rows from `business_rules` onto the file configuration.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<(String, Value)> = sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        Ok(apply_rule_overrides(defaults, rows))
    }
}

/// Rows are shaped `{"value": <number|string>}`; anything else is ignored.
pub fn apply_rule_overrides(defaults: BusinessRules, rows: Vec<(String, Value)>) -> BusinessRules {
    let mut rules = defaults;

    for (key, rule_value) in rows {
        let Some(v) = rule_value.get("value") else {
            warn!(rule = %key, "Business rule row has no value field");
            continue;
        };
        match key.as_str() {
            "booking_expiry_minutes" => {
                if let Some(n) = v.as_i64().filter(|n| *n > 0) {
                    rules.booking_expiry_minutes = n;
                }
            }
            "cancellation_cutoff_hours" => {
                if let Some(n) = v.as_i64().filter(|n| *n >= 0) {
                    rules.cancellation_cutoff_hours = n;
                }
            }
            "sweep_interval_seconds" => {
                if let Some(n) = v.as_u64().filter(|n| *n > 0) {
                    rules.sweep_interval_seconds = n;
                }
            }
            "sweep_batch_size" => {
                if let Some(n) = v.as_i64().filter(|n| *n > 0) {
                    rules.sweep_batch_size = n;
                }
            }
            "currency" => {
                if let Some(s) = v.as_str() {
                    rules.currency = s.to_string();
                }
            }
            _ => {}
        }
    }

    rules
}
