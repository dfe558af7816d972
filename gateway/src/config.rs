use std::time::Duration;

use config::{Config as ConfigLoader, ConfigError as ConfigCrateError, Environment, File};
use serde::Deserialize;

use crate::routing::BreakerConfig;

/// Gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub breaker: BreakerSettings,
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared secret for HS256 token validation.
    #[serde(default = "default_auth_secret")]
    pub secret: String,
    /// Development credential. Must be unset in production deployments.
    #[serde(default)]
    pub dev_token: Option<String>,
    /// Attribute credential-less requests to their network identity instead
    /// of rejecting them.
    #[serde(default)]
    pub allow_anonymous: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_throttle_limit")]
    pub limit: u32,
    #[serde(default = "default_throttle_window_secs")]
    pub window_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Per-call backend timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retry a failed call once against a different endpoint.
    #[serde(default = "default_retry_on_failure")]
    pub retry_on_failure: bool,
    /// Version used when a request omits one.
    #[serde(default = "default_model_version")]
    pub default_version: String,
    /// Backends registered at startup.
    #[serde(default)]
    pub backends: Vec<StaticBackend>,
}

/// A backend pinned in configuration rather than registered at runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticBackend {
    pub model: String,
    pub version: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "default_breaker_min_requests")]
    pub min_requests: u32,
    #[serde(default = "default_breaker_failure_ratio")]
    pub failure_ratio: f64,
    #[serde(default = "default_breaker_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_breaker_open_secs")]
    pub open_secs: u64,
    #[serde(default = "default_breaker_trial_budget")]
    pub trial_budget: u32,
}

impl BreakerSettings {
    pub fn to_breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            min_requests: self.min_requests,
            failure_ratio: self.failure_ratio,
            window: Duration::from_secs(self.window_secs),
            open_for: Duration::from_secs(self.open_secs),
            trial_budget: self.trial_budget,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    #[serde(default = "default_kafka_brokers")]
    pub brokers: String,
    #[serde(default = "default_kafka_topic")]
    pub topic: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_metadata_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Defaults
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_auth_secret() -> String { "change-me-in-production".to_string() }
fn default_throttle_limit() -> u32 { 60 }
fn default_throttle_window_secs() -> u64 { 60 }
fn default_request_timeout_secs() -> u64 { 30 }
fn default_retry_on_failure() -> bool { true }
fn default_model_version() -> String { "v1".to_string() }
fn default_breaker_min_requests() -> u32 { 3 }
fn default_breaker_failure_ratio() -> f64 { 0.6 }
fn default_breaker_window_secs() -> u64 { 10 }
fn default_breaker_open_secs() -> u64 { 30 }
fn default_breaker_trial_budget() -> u32 { 3 }
fn default_kafka_brokers() -> String { "localhost:9092".to_string() }
fn default_kafka_topic() -> String { "inference-jobs".to_string() }
fn default_store_url() -> String { "sqlite:./data/jobs.db".to_string() }
fn default_metadata_base_url() -> String { "http://localhost:8083".to_string() }
fn default_log_level() -> String { "info".to_string() }

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: default_auth_secret(),
            dev_token: None,
            allow_anonymous: false,
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            limit: default_throttle_limit(),
            window_secs: default_throttle_window_secs(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            retry_on_failure: default_retry_on_failure(),
            default_version: default_model_version(),
            backends: Vec::new(),
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            min_requests: default_breaker_min_requests(),
            failure_ratio: default_breaker_failure_ratio(),
            window_secs: default_breaker_window_secs(),
            open_secs: default_breaker_open_secs(),
            trial_budget: default_breaker_trial_budget(),
        }
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: default_kafka_brokers(),
            topic: default_kafka_topic(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { url: default_store_url() }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self { base_url: default_metadata_base_url() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth: AuthConfig::default(),
            throttle: ThrottleConfig::default(),
            routing: RoutingConfig::default(),
            breaker: BreakerSettings::default(),
            kafka: KafkaConfig::default(),
            store: StoreConfig::default(),
            metadata: MetadataConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    LoadError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

impl Config {
    /// Load configuration from config.toml (if it exists) and environment
    /// variables. Environment variables override file settings.
    /// Env var format: MODELMESH__SECTION__KEY (e.g. MODELMESH__KAFKA__TOPIC).
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .set_default("host", default_host())?
            .set_default("port", default_port() as i64)?
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("MODELMESH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(ConfigError::from)
    }
}
