use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_expiry_minutes")]
    pub booking_expiry_minutes: i64,
    #[serde(default = "default_cutoff_hours")]
    pub cancellation_cutoff_hours: i64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_sweep_batch")]
    pub sweep_batch_size: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_expiry_minutes() -> i64 { 10 }
fn default_cutoff_hours() -> i64 { 2 }
fn default_sweep_interval() -> u64 { 120 }
fn default_sweep_batch() -> i64 { 500 }
fn default_currency() -> String { "BDT".to_string() }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            booking_expiry_minutes: default_expiry_minutes(),
            cancellation_cutoff_hours: default_cutoff_hours(),
            sweep_interval_seconds: default_sweep_interval(),
            sweep_batch_size: default_sweep_batch(),
            currency: default_currency(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Public base URL the gateway calls back on.
    pub public_url: String,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_rate_limit() -> i64 { 120 }

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 10 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    Http,
    Mock,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub mode: GatewayMode,
    pub base_url: String,
    pub store_id: String,
    pub store_password: String,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_seconds: u64,
}

fn default_gateway_timeout() -> u64 { 30 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, e.g. config/production.toml
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Untracked developer overrides
            .add_source(config::File::with_name("config/local").required(false))
            // RAIL__DATABASE__URL=... sets database.url
            .add_source(config::Environment::with_prefix("RAIL").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
