use std::env;
use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Default absolute deadline for a Draft session: 2 hours.
const DEFAULT_SESSION_TTL_SECS: u64 = 7_200;
/// Default webhook timestamp tolerance: 5 minutes.
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_SWEEPER_INTERVAL_SECS: u64 = 60;
/// Rates are configured in basis points to keep the config file free of
/// decimal-parsing ambiguity: 875 = 8.75%.
const DEFAULT_TAX_RATE_BPS: u32 = 875;
const DEFAULT_COMMISSION_RATE_BPS: u32 = 1_000;

/// Application configuration with validation.
///
/// Values are layered: built-in defaults, then `config/default.toml`, then
/// `config/<env>.toml`, then `APP__*` environment variables.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Runtime environment: development, staging, production
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON (for log shippers)
    #[serde(default)]
    pub log_json: bool,

    /// Run embedded migrations at startup
    #[serde(default = "default_true")]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    /// Draft checkout sessions expire this long after creation.
    #[serde(default = "default_session_ttl_secs")]
    pub checkout_session_ttl_secs: u64,

    /// How often the expiry sweeper runs.
    #[serde(default = "default_sweeper_interval_secs")]
    pub sweeper_interval_secs: u64,

    /// Tax rate applied when freezing a cart snapshot, in basis points.
    #[serde(default = "default_tax_rate_bps")]
    pub tax_rate_bps: u32,

    /// Vendor commission rate applied per order line, in basis points.
    #[serde(default = "default_commission_rate_bps")]
    pub vendor_commission_rate_bps: u32,

    /// Human-facing order number prefix.
    #[serde(default = "default_order_number_prefix")]
    pub order_number_prefix: String,

    /// Shared secret issued by the payment provider; used to verify webhook
    /// signatures. Required outside development.
    #[validate(length(min = 16, message = "webhook secret must be at least 16 characters"))]
    pub payment_webhook_secret: String,

    /// Maximum age of a signed webhook timestamp before it is rejected.
    #[serde(default = "default_webhook_tolerance_secs")]
    pub payment_webhook_tolerance_secs: u64,

    /// Comma-separated list of allowed CORS origins; unset means permissive.
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_true() -> bool {
    true
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_timeout_secs() -> u64 {
    8
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_session_ttl_secs() -> u64 {
    DEFAULT_SESSION_TTL_SECS
}
fn default_sweeper_interval_secs() -> u64 {
    DEFAULT_SWEEPER_INTERVAL_SECS
}
fn default_tax_rate_bps() -> u32 {
    DEFAULT_TAX_RATE_BPS
}
fn default_commission_rate_bps() -> u32 {
    DEFAULT_COMMISSION_RATE_BPS
}
fn default_order_number_prefix() -> String {
    "ORD".to_string()
}
fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

impl AppConfig {
    /// Minimal constructor for tests and tools.
    pub fn new(database_url: impl Into<String>, payment_webhook_secret: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            environment: "test".to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: 1,
            db_min_connections: 1,
            db_connect_timeout_secs: 8,
            db_acquire_timeout_secs: 8,
            db_idle_timeout_secs: 600,
            checkout_session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            sweeper_interval_secs: DEFAULT_SWEEPER_INTERVAL_SECS,
            tax_rate_bps: DEFAULT_TAX_RATE_BPS,
            vendor_commission_rate_bps: DEFAULT_COMMISSION_RATE_BPS,
            order_number_prefix: "ORD".to_string(),
            payment_webhook_secret: payment_webhook_secret.into(),
            payment_webhook_tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
            cors_allowed_origins: None,
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Basis points to decimal rate: 875 -> 0.0875.
    pub fn tax_rate(&self) -> Decimal {
        Decimal::new(self.tax_rate_bps as i64, 4)
    }

    pub fn vendor_commission_rate(&self) -> Decimal {
        Decimal::new(self.vendor_commission_rate_bps as i64, 4)
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let mut builder = Config::builder()
        .set_default("database_url", "sqlite://checkout.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    // Development gets a deterministic webhook secret; production must
    // provide its own via APP__PAYMENT_WEBHOOK_SECRET or config file.
    if run_env != "production" {
        builder = builder.set_default(
            "payment_webhook_secret",
            "dev_only_webhook_secret_not_for_production",
        )?;
    }

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("payment_webhook_secret").is_err() {
        error!(
            "Payment webhook secret is not configured. Set APP__PAYMENT_WEBHOOK_SECRET \
             with the secret issued by the payment provider."
        );
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "payment_webhook_secret is required but not configured".into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    Ok(app_config)
}

/// Initialize the tracing subscriber. `RUST_LOG` wins over the configured
/// level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("checkout_api={},tower_http=info", level);
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
