use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationErrors};

use crate::models::Coordinates;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const CONFIG_DIR: &str = "config";
const DEFAULT_SERVICE_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_GEOCODE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_GEOCODE_ATTEMPTS: u32 = 3;
const DEFAULT_GEOCODE_BACKOFF_MS: u64 = 1000;
const DEFAULT_DEBOUNCE_MS: u64 = 1000;
const DEFAULT_SUBMIT_COOLDOWN_MS: u64 = 1000;
const DEFAULT_WAREHOUSE_LATITUDE: f64 = 10.7769;
const DEFAULT_WAREHOUSE_LONGITUDE: f64 = 106.7009;

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Configuration validation failed: {0}")]
    Validation(ValidationErrors),
}

/// Checkout pipeline configuration with validation.
///
/// Everything tunable lives here: collaborator endpoints, retry policy,
/// debounce and cooldown windows, the warehouse origin, and the shipping
/// cost model.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Base URL of the geocoding collaborator
    #[serde(default = "default_service_base_url")]
    pub geocode_base_url: String,

    /// Base URL of the coupon validation collaborator
    #[serde(default = "default_service_base_url")]
    pub coupon_base_url: String,

    /// Per-attempt geocoding timeout in seconds
    #[serde(default = "default_geocode_timeout_secs")]
    pub geocode_timeout_secs: u64,

    /// Geocoding attempts before the failure is propagated (1-5)
    #[validate(range(min = 1, max = 5))]
    #[serde(default = "default_geocode_attempts")]
    pub geocode_attempts: u32,

    /// Fixed wait between failed geocoding attempts, in milliseconds
    #[serde(default = "default_geocode_backoff_ms")]
    pub geocode_backoff_ms: u64,

    /// Address-edit settling window before a quote is recomputed
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Minimum gap between completed order submissions
    #[serde(default = "default_submit_cooldown_ms")]
    pub submit_cooldown_ms: u64,

    /// Warehouse origin latitude used for distance pricing
    #[validate(range(min = -90.0, max = 90.0))]
    #[serde(default = "default_warehouse_latitude")]
    pub warehouse_latitude: f64,

    /// Warehouse origin longitude used for distance pricing
    #[validate(range(min = -180.0, max = 180.0))]
    #[serde(default = "default_warehouse_longitude")]
    pub warehouse_longitude: f64,

    /// Shipping cost per kilometre
    #[serde(default = "default_per_km_rate")]
    pub per_km_rate: Decimal,

    /// Base fee for bike-tier delivery
    #[serde(default = "default_bike_base_fee")]
    pub bike_base_fee: Decimal,

    /// Base fee for motorbike-tier delivery (also the unrecognised-tier fee)
    #[serde(default = "default_motorbike_base_fee")]
    pub motorbike_base_fee: Decimal,

    /// Base fee for car-tier delivery
    #[serde(default = "default_car_base_fee")]
    pub car_base_fee: Decimal,

    /// Flat share of the subtotal charged when the address is unresolved
    #[serde(default = "default_fallback_rate")]
    pub fallback_rate: Decimal,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,
}

fn default_service_base_url() -> String {
    DEFAULT_SERVICE_BASE_URL.to_string()
}
fn default_geocode_timeout_secs() -> u64 {
    DEFAULT_GEOCODE_TIMEOUT_SECS
}
fn default_geocode_attempts() -> u32 {
    DEFAULT_GEOCODE_ATTEMPTS
}
fn default_geocode_backoff_ms() -> u64 {
    DEFAULT_GEOCODE_BACKOFF_MS
}
fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}
fn default_submit_cooldown_ms() -> u64 {
    DEFAULT_SUBMIT_COOLDOWN_MS
}
fn default_warehouse_latitude() -> f64 {
    DEFAULT_WAREHOUSE_LATITUDE
}
fn default_warehouse_longitude() -> f64 {
    DEFAULT_WAREHOUSE_LONGITUDE
}
fn default_per_km_rate() -> Decimal {
    dec!(5)
}
fn default_bike_base_fee() -> Decimal {
    dec!(30)
}
fn default_motorbike_base_fee() -> Decimal {
    dec!(50)
}
fn default_car_base_fee() -> Decimal {
    dec!(70)
}
fn default_fallback_rate() -> Decimal {
    dec!(0.10)
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            geocode_base_url: default_service_base_url(),
            coupon_base_url: default_service_base_url(),
            geocode_timeout_secs: DEFAULT_GEOCODE_TIMEOUT_SECS,
            geocode_attempts: DEFAULT_GEOCODE_ATTEMPTS,
            geocode_backoff_ms: DEFAULT_GEOCODE_BACKOFF_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            submit_cooldown_ms: DEFAULT_SUBMIT_COOLDOWN_MS,
            warehouse_latitude: DEFAULT_WAREHOUSE_LATITUDE,
            warehouse_longitude: DEFAULT_WAREHOUSE_LONGITUDE,
            per_km_rate: default_per_km_rate(),
            bike_base_fee: default_bike_base_fee(),
            motorbike_base_fee: default_motorbike_base_fee(),
            car_base_fee: default_car_base_fee(),
            fallback_rate: default_fallback_rate(),
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl AppConfig {
    pub fn warehouse_origin(&self) -> Coordinates {
        Coordinates {
            latitude: self.warehouse_latitude,
            longitude: self.warehouse_longitude,
        }
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn geocode_timeout(&self) -> Duration {
        Duration::from_secs(self.geocode_timeout_secs)
    }

    pub fn geocode_backoff(&self) -> Duration {
        Duration::from_millis(self.geocode_backoff_ms)
    }

    pub fn submit_cooldown(&self) -> Duration {
        Duration::from_millis(self.submit_cooldown_ms)
    }
}

/// Loads configuration from built-in defaults, the optional `config/checkout`
/// file, and `CHECKOUT__`-prefixed environment variables (highest priority).
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    if !std::path::Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .add_source(File::with_name(&format!("{}/checkout", CONFIG_DIR)).required(false))
        .add_source(Environment::with_prefix("CHECKOUT").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    Ok(app_config)
}

/// Initialises the tracing subscriber. `RUST_LOG` overrides the configured
/// level; safe to call more than once (later calls are no-ops).
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("storefront_checkout={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init();
    }
}
