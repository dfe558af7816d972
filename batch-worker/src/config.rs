use config::{Config as ConfigLoader, ConfigError as ConfigCrateError, Environment, File};
use serde::Deserialize;

/// Batch worker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    #[serde(default = "default_kafka_brokers")]
    pub brokers: String,
    #[serde(default = "default_kafka_topic")]
    pub topic: String,
    #[serde(default = "default_kafka_group_id")]
    pub group_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStoreConfig {
    /// Custom endpoint for S3-compatible stores; unset means plain AWS.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_object_store_region")]
    pub region: String,
    #[serde(default = "default_object_store_bucket")]
    pub bucket: String,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Validity of presigned result URLs.
    #[serde(default = "default_url_ttl_secs")]
    pub url_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_pool_workers")]
    pub workers: usize,
    #[serde(default = "default_item_timeout_secs")]
    pub item_timeout_secs: u64,
    /// Budget for draining in-flight work on shutdown.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Base URL of the gateway exposing the internal routing endpoint.
    #[serde(default = "default_router_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Defaults
fn default_kafka_brokers() -> String { "localhost:9092".to_string() }
fn default_kafka_topic() -> String { "inference-jobs".to_string() }
fn default_kafka_group_id() -> String { "modelmesh-workers".to_string() }
fn default_store_url() -> String { "sqlite:./data/jobs.db".to_string() }
fn default_object_store_region() -> String { "us-east-1".to_string() }
fn default_object_store_bucket() -> String { "modelmesh-results".to_string() }
fn default_url_ttl_secs() -> u64 { 7 * 24 * 3600 }
fn default_pool_workers() -> usize { 4 }
fn default_item_timeout_secs() -> u64 { 30 }
fn default_shutdown_grace_secs() -> u64 { 30 }
fn default_router_base_url() -> String { "http://localhost:8080".to_string() }
fn default_log_level() -> String { "info".to_string() }

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: default_kafka_brokers(),
            topic: default_kafka_topic(),
            group_id: default_kafka_group_id(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { url: default_store_url() }
    }
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: default_object_store_region(),
            bucket: default_object_store_bucket(),
            access_key: None,
            secret_key: None,
            url_ttl_secs: default_url_ttl_secs(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_pool_workers(),
            item_timeout_secs: default_item_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { base_url: default_router_base_url() }
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
            kafka: KafkaConfig::default(),
            store: StoreConfig::default(),
            object_store: ObjectStoreConfig::default(),
            pool: PoolConfig::default(),
            router: RouterConfig::default(),
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
    /// variables. Env var format: WORKER__SECTION__KEY.
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("WORKER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(ConfigError::from)
    }
}
