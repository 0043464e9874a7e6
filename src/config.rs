//! Configuration management for the namespace service
//!
//! TOML file support, `KNS_*` environment variable overrides and defaults
//! for every field, so an empty file is a valid configuration.

use crate::fetch::{DEFAULT_FETCH_WORKERS, DEFAULT_REQUEST_TIMEOUT};
use crate::ingest::DEFAULT_RECEIVER;
use crate::namespace::NamespaceConfig;
use crate::naming::DEFAULT_MIN_SEGMENTS;
use crate::resample::DEFAULT_MAX_SLOTS;
use crate::redis::{RedisConfig, RetryPolicy, DEFAULT_KEY_PREFIX};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// HTTP server
    #[serde(default)]
    pub server: ServerConfig,

    /// Namespace store backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Namespace index tuning
    #[serde(default)]
    pub namespace: NamespaceSettings,

    /// Datapoint backend
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Monitoring and observability
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allow cross-origin requests
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

/// Which namespace store to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process, lost on restart
    Memory,
    /// Redis
    Redis,
}

/// Namespace store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Backend selection
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,

    /// Redis URL (`redis://` or `rediss://`)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Prefix for every Redis key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Maximum concurrent Redis commands
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_store_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Command timeout in seconds
    #[serde(default = "default_store_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Retries for failed commands
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Use TLS (requires the `redis-tls` feature)
    #[serde(default)]
    pub tls_enabled: bool,
}

/// Namespace index configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NamespaceSettings {
    /// Minimum segments in a new leaf name
    #[serde(default = "default_min_segments")]
    pub min_segments: usize,

    /// Only resolve aliases for paths containing this fragment
    #[serde(default)]
    pub linkable_fragment: Option<String>,

    /// Node cache capacity
    #[serde(default = "default_node_cache_capacity")]
    pub node_cache_capacity: usize,

    /// Query cache TTL in seconds
    #[serde(default = "default_query_cache_ttl_secs")]
    pub query_cache_ttl_secs: u64,

    /// Maximum cached query patterns
    #[serde(default = "default_query_cache_max_entries")]
    pub query_cache_max_entries: usize,
}

/// Which datapoint backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchBackend {
    /// In-process, lost on restart
    Memory,
    /// KairosDB over HTTP
    Kairosdb,
}

/// Datapoint backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Backend selection
    #[serde(default = "default_fetch_backend")]
    pub backend: FetchBackend,

    /// KairosDB base URL
    #[serde(default = "default_kairosdb_url")]
    pub kairosdb_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Concurrent fetch workers
    #[serde(default = "default_fetch_workers")]
    pub workers: usize,

    /// Value of the `receiver` tag on ingested datapoints
    #[serde(default = "default_receiver")]
    pub receiver: String,

    /// Upper bound on values per resampled series
    #[serde(default = "default_max_slots")]
    pub max_slots: usize,

    /// Widest `/render` window accepted, in seconds
    #[serde(default = "default_max_render_window_secs")]
    pub max_render_window_secs: i64,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Expose Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds between sweeps of expired query cache entries (0 = never)
    #[serde(default = "default_purge_interval_secs")]
    pub cache_purge_interval_secs: u64,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8090 }
fn default_store_backend() -> StoreBackend { StoreBackend::Memory }
fn default_redis_url() -> String { "redis://127.0.0.1:6379".to_string() }
fn default_key_prefix() -> String { DEFAULT_KEY_PREFIX.to_string() }
fn default_pool_size() -> u32 { 10 }
fn default_store_timeout_secs() -> u64 { 5 }
fn default_max_retries() -> u32 { 3 }
fn default_min_segments() -> usize { DEFAULT_MIN_SEGMENTS }
fn default_node_cache_capacity() -> usize { NamespaceConfig::default().node_cache_capacity }
fn default_query_cache_ttl_secs() -> u64 { NamespaceConfig::default().query_cache_ttl.as_secs() }
fn default_query_cache_max_entries() -> usize { NamespaceConfig::default().query_cache_max_entries }
fn default_fetch_backend() -> FetchBackend { FetchBackend::Memory }
fn default_kairosdb_url() -> String { "http://localhost:8080".to_string() }
fn default_request_timeout_secs() -> u64 { DEFAULT_REQUEST_TIMEOUT.as_secs() }
fn default_fetch_workers() -> usize { DEFAULT_FETCH_WORKERS }
fn default_receiver() -> String { DEFAULT_RECEIVER.to_string() }
fn default_max_slots() -> usize { DEFAULT_MAX_SLOTS }
fn default_max_render_window_secs() -> i64 { 366 * 86_400 }
fn default_log_level() -> String { "info".to_string() }
fn default_purge_interval_secs() -> u64 { 300 }
fn default_true() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: true,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
            pool_size: default_pool_size(),
            connection_timeout_secs: default_store_timeout_secs(),
            command_timeout_secs: default_store_timeout_secs(),
            max_retries: default_max_retries(),
            tls_enabled: false,
        }
    }
}

impl Default for NamespaceSettings {
    fn default() -> Self {
        Self {
            min_segments: default_min_segments(),
            linkable_fragment: None,
            node_cache_capacity: default_node_cache_capacity(),
            query_cache_ttl_secs: default_query_cache_ttl_secs(),
            query_cache_max_entries: default_query_cache_max_entries(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            backend: default_fetch_backend(),
            kairosdb_url: default_kairosdb_url(),
            request_timeout_secs: default_request_timeout_secs(),
            workers: default_fetch_workers(),
            receiver: default_receiver(),
            max_slots: default_max_slots(),
            max_render_window_secs: default_max_render_window_secs(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            log_level: default_log_level(),
            cache_purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path, e))?;

        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file {}: {}", path, e))
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> Result<Self, String> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply `KNS_*` environment variable overrides
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        // Server
        if let Ok(host) = std::env::var("KNS_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("KNS_PORT") {
            self.server.port = port;
        }

        // Store
        match std::env::var("KNS_STORE_BACKEND").as_deref() {
            Ok("memory") => self.store.backend = StoreBackend::Memory,
            Ok("redis") => self.store.backend = StoreBackend::Redis,
            _ => {},
        }
        if let Ok(url) = std::env::var("KNS_REDIS_URL") {
            self.store.redis_url = url;
        }
        if let Ok(prefix) = std::env::var("KNS_KEY_PREFIX") {
            self.store.key_prefix = prefix;
        }
        if let Some(size) = env_parse("KNS_REDIS_POOL_SIZE") {
            self.store.pool_size = size;
        }

        // Namespace
        if let Some(min) = env_parse("KNS_MIN_SEGMENTS") {
            self.namespace.min_segments = min;
        }
        if let Ok(fragment) = std::env::var("KNS_LINKABLE_FRAGMENT") {
            self.namespace.linkable_fragment = Some(fragment).filter(|f| !f.is_empty());
        }
        if let Some(capacity) = env_parse("KNS_NODE_CACHE_CAPACITY") {
            self.namespace.node_cache_capacity = capacity;
        }
        if let Some(ttl) = env_parse("KNS_QUERY_CACHE_TTL_SECS") {
            self.namespace.query_cache_ttl_secs = ttl;
        }

        // Fetch
        match std::env::var("KNS_FETCH_BACKEND").as_deref() {
            Ok("memory") => self.fetch.backend = FetchBackend::Memory,
            Ok("kairosdb") => self.fetch.backend = FetchBackend::Kairosdb,
            _ => {},
        }
        if let Ok(url) = std::env::var("KNS_KAIROSDB_URL") {
            self.fetch.kairosdb_url = url;
        }
        if let Some(workers) = env_parse("KNS_FETCH_WORKERS") {
            self.fetch.workers = workers;
        }
        if let Some(max_slots) = env_parse("KNS_FETCH_MAX_SLOTS") {
            self.fetch.max_slots = max_slots;
        }
        if let Some(window) = env_parse("KNS_MAX_RENDER_WINDOW_SECS") {
            self.fetch.max_render_window_secs = window;
        }

        // Monitoring
        if let Ok(log_level) = std::env::var("KNS_LOG_LEVEL") {
            self.monitoring.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.store.backend == StoreBackend::Redis {
            self.redis_config().validate()?;
            if self.store.key_prefix.is_empty() {
                return Err("Redis key prefix cannot be empty".to_string());
            }
        }

        if self.namespace.min_segments == 0 {
            return Err("Minimum segments must be > 0".to_string());
        }
        if self.namespace.node_cache_capacity == 0 {
            return Err("Node cache capacity must be > 0".to_string());
        }
        if self.namespace.query_cache_ttl_secs == 0 {
            return Err("Query cache TTL must be > 0".to_string());
        }

        if self.fetch.workers == 0 {
            return Err("Fetch workers must be > 0".to_string());
        }
        if self.fetch.max_slots == 0 {
            return Err("Fetch max slots must be > 0".to_string());
        }
        if self.fetch.max_render_window_secs <= 0 {
            return Err("Max render window must be > 0".to_string());
        }
        if self.fetch.request_timeout_secs == 0 {
            return Err("Fetch request timeout must be > 0".to_string());
        }
        if self.fetch.backend == FetchBackend::Kairosdb
            && url::Url::parse(&self.fetch.kairosdb_url).is_err()
        {
            return Err(format!("Invalid KairosDB URL: {}", self.fetch.kairosdb_url));
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: &str) -> Result<(), String> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        std::fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file {}: {}", path, e))
    }

    /// Redis pool settings from the `store` section
    pub fn redis_config(&self) -> RedisConfig {
        let retry = RetryPolicy {
            max_retries: self.store.max_retries,
            ..RetryPolicy::default()
        };
        RedisConfig::with_url(self.store.redis_url.clone())
            .pool_size(self.store.pool_size)
            .connection_timeout(Duration::from_secs(self.store.connection_timeout_secs))
            .command_timeout(Duration::from_secs(self.store.command_timeout_secs))
            .retry_policy(retry)
            .tls(self.store.tls_enabled)
    }

    /// Namespace settings from the `namespace` section
    pub fn namespace_config(&self) -> NamespaceConfig {
        NamespaceConfig {
            min_segments: self.namespace.min_segments,
            linkable_fragment: self.namespace.linkable_fragment.clone(),
            node_cache_capacity: self.namespace.node_cache_capacity,
            query_cache_ttl: Duration::from_secs(self.namespace.query_cache_ttl_secs),
            query_cache_max_entries: self.namespace.query_cache_max_entries,
        }
    }

    /// KairosDB request timeout
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8090);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.namespace.min_segments, 3);
        assert_eq!(config.namespace.query_cache_ttl_secs, 3600);
        assert_eq!(config.fetch.workers, 10);
        assert_eq!(config.fetch.request_timeout_secs, 15);
        assert!(config.monitoring.metrics_enabled);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_render_limits() {
        let mut config = Config::default();
        assert_eq!(config.fetch.max_slots, DEFAULT_MAX_SLOTS);
        config.fetch.max_render_window_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.fetch.max_slots = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_kairosdb_url() {
        let mut config = Config::default();
        config.fetch.backend = FetchBackend::Kairosdb;
        config.fetch.kairosdb_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [store]
            backend = "redis"
            key_prefix = "metrics"

            [namespace]
            linkable_fragment = "sites"
            "#,
        )
        .unwrap();

        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.key_prefix, "metrics");
        assert_eq!(config.store.pool_size, 10);
        assert_eq!(config.namespace.linkable_fragment.as_deref(), Some("sites"));
        assert_eq!(config.server.port, 8090);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kns.toml");
        let path = path.to_str().unwrap();

        let mut config = Config::default();
        config.fetch.backend = FetchBackend::Kairosdb;
        config.namespace.min_segments = 4;
        config.save_to_file(path).unwrap();

        let loaded = Config::from_file(path).unwrap();
        assert_eq!(loaded.fetch.backend, FetchBackend::Kairosdb);
        assert_eq!(loaded.namespace.min_segments, 4);
    }

    #[test]
    fn test_namespace_config_conversion() {
        let mut config = Config::default();
        config.namespace.query_cache_ttl_secs = 60;
        config.namespace.linkable_fragment = Some("sites".to_string());

        let ns = config.namespace_config();
        assert_eq!(ns.query_cache_ttl, Duration::from_secs(60));
        assert_eq!(ns.linkable_fragment.as_deref(), Some("sites"));
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("KNS_PORT", "9999");
        std::env::set_var("KNS_STORE_BACKEND", "redis");
        let config = Config::from_env();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        std::env::remove_var("KNS_PORT");
        std::env::remove_var("KNS_STORE_BACKEND");
    }
}
