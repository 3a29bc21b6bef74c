//! Configuration management for ShelfSync services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration (availability cache and live events)
    pub redis: RedisConfig,

    /// Queue configuration (SQS)
    pub queue: QueueConfig,

    /// Catalog provider configuration
    pub catalog: CatalogConfig,

    /// Availability refresh configuration
    pub availability: AvailabilityConfig,

    /// Worker loop configuration
    pub worker: WorkerConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    pub max_connections: u32,

    /// Minimum number of connections
    pub min_connections: u32,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    pub idle_timeout_secs: u64,

    /// Create missing tables and indexes on startup
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL; caching and live events are disabled when unset
    pub url: Option<String>,

    /// Key prefix for namespacing
    pub key_prefix: String,

    /// Default TTL in seconds
    pub default_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// SQS queue carrying sync run submissions
    pub sync_queue_url: Option<String>,

    /// SQS queue carrying shelf import batches
    pub import_queue_url: Option<String>,

    /// Maximum messages to receive per poll
    pub batch_size: u32,

    /// Long polling timeout in seconds
    pub poll_timeout_secs: u64,

    /// Visibility timeout in seconds
    pub visibility_timeout_secs: u64,

    /// Attempts made when submitting a message before giving up
    pub submit_max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog provider: fixture, http
    pub provider: String,

    /// Path of the JSON catalog used by the fixture provider
    pub fixture_path: String,

    /// Base URL of the live catalog integration
    pub base_url: Option<String>,

    /// API key for the live catalog integration
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum retries for transient failures
    pub max_retries: u32,

    /// Candidates requested per search
    pub search_limit: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AvailabilityConfig {
    /// TTL of cached availability entries in seconds
    pub cache_ttl_secs: u64,

    /// Shelf items processed per sync batch
    pub batch_size: usize,

    /// Library system used when the user has not picked one
    pub default_library_system: String,

    /// Formats refreshed when the user has no preference
    pub default_formats: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Wall-clock limit for a single sync run in seconds
    pub job_timeout_secs: u64,

    /// Consecutive failures before the polling loop pauses
    pub max_consecutive_failures: u32,

    /// Pause applied when the failure limit is reached, in seconds
    pub circuit_break_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    pub log_level: String,

    /// Enable JSON logging
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    pub metrics_port: u16,

    /// Service name for tracing
    pub service_name: String,
}

// Default value functions
fn default_database_url() -> String { "postgres://localhost/shelfsync".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_key_prefix() -> String { "shelfsync".to_string() }
fn default_redis_ttl() -> u64 { 300 }
fn default_queue_batch_size() -> u32 { 10 }
fn default_queue_poll_timeout() -> u64 { 20 }
fn default_visibility_timeout() -> u64 { 900 }
fn default_submit_attempts() -> u32 { 3 }
fn default_catalog_provider() -> String { "fixture".to_string() }
fn default_fixture_path() -> String { "fixtures/catalog_fixture.json".to_string() }
fn default_catalog_timeout() -> u64 { 15 }
fn default_catalog_retries() -> u32 { 3 }
fn default_search_limit() -> usize { 10 }
fn default_cache_ttl() -> u64 { 300 }
fn default_sync_batch_size() -> usize { 50 }
fn default_library_system() -> String { "default".to_string() }
fn default_formats() -> Vec<String> { vec!["ebook".to_string(), "audiobook".to_string()] }
fn default_job_timeout() -> u64 { 600 }
fn default_max_failures() -> u32 { 5 }
fn default_circuit_break() -> u64 { 30 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "shelfsync".to_string() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            auto_migrate: false,
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            key_prefix: default_key_prefix(),
            default_ttl_secs: default_redis_ttl(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            sync_queue_url: None,
            import_queue_url: None,
            batch_size: default_queue_batch_size(),
            poll_timeout_secs: default_queue_poll_timeout(),
            visibility_timeout_secs: default_visibility_timeout(),
            submit_max_attempts: default_submit_attempts(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            provider: default_catalog_provider(),
            fixture_path: default_fixture_path(),
            base_url: None,
            api_key: None,
            timeout_secs: default_catalog_timeout(),
            max_retries: default_catalog_retries(),
            search_limit: default_search_limit(),
        }
    }
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            batch_size: default_sync_batch_size(),
            default_library_system: default_library_system(),
            default_formats: default_formats(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            job_timeout_secs: default_job_timeout(),
            max_consecutive_failures: default_max_failures(),
            circuit_break_secs: default_circuit_break(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__AVAILABILITY__BATCH_SIZE=25
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("availability.default_formats")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the sync run timeout as Duration
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.worker.job_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.availability.batch_size, 50);
        assert_eq!(config.availability.cache_ttl_secs, 300);
        assert_eq!(config.catalog.search_limit, 10);
        assert_eq!(config.catalog.provider, "fixture");
        assert_eq!(config.job_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = Config::builder()
            .add_source(config::File::from_str(
                "[availability]\nbatch_size = 25\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.availability.batch_size, 25);
        assert_eq!(config.availability.cache_ttl_secs, 300);
        assert_eq!(config.worker.job_timeout_secs, 600);
        assert!(config.redis.url.is_none());
    }
}
