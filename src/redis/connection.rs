//! Redis connection handling
//!
//! A single multiplexed connection shared by all callers, gated by a
//! semaphore so at most `pool_size` commands are in flight. Commands run
//! under a timeout and are retried with exponential backoff when the
//! failure looks transient.
//!
//! ```rust,no_run
//! use kuba_namespace::redis::{RedisConfig, RedisPool};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RedisConfig::with_url("redis://localhost:6379")
//!     .pool_size(32)
//!     .command_timeout(Duration::from_millis(500));
//! let pool = RedisPool::new(config).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::StoreError;

use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};

use super::util::safe_redis_error;

/// Redis connection settings
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// Server URL, `redis://` or `rediss://`
    pub url: String,

    /// Maximum concurrent commands
    /// Default: 16
    pub pool_size: u32,

    /// Timeout for establishing the connection
    /// Default: 5 seconds
    pub connection_timeout: Duration,

    /// Timeout for a single command or pipeline
    /// Default: 1 second
    pub command_timeout: Duration,

    /// Retry policy for transient failures
    pub retry_policy: RetryPolicy,

    /// Use TLS (requires the `redis-tls` feature)
    pub tls_enabled: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 16,
            connection_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(1),
            retry_policy: RetryPolicy::default(),
            tls_enabled: false,
        }
    }
}

impl RedisConfig {
    /// Default settings pointed at `url`
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the maximum concurrent commands
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the per-command timeout
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the retry policy
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Enable or disable TLS
    pub fn tls(mut self, enabled: bool) -> Self {
        self.tls_enabled = enabled;
        self
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }
        if self.pool_size == 0 || self.pool_size > 1000 {
            return Err(format!(
                "Redis pool size must be between 1 and 1000, got {}",
                self.pool_size
            ));
        }

        #[cfg(not(feature = "redis-tls"))]
        if self.tls_enabled {
            return Err(
                "Redis TLS is enabled but the 'redis-tls' feature is not compiled in".to_string(),
            );
        }

        if self.tls_enabled != self.url.starts_with("rediss://") {
            return Err(
                "Redis URL scheme must be 'rediss://' when TLS is enabled and 'redis://' otherwise"
                    .to_string(),
            );
        }

        Ok(())
    }
}

/// Exponential backoff for transient Redis failures
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    /// Default: 3
    pub max_retries: u32,

    /// Delay before the first retry
    /// Default: 100ms
    pub initial_delay: Duration,

    /// Upper bound on any single delay
    /// Default: 5 seconds
    pub max_delay: Duration,

    /// Growth factor per attempt
    /// Default: 2.0
    pub multiplier: f64,

    /// Add up to 25% random jitter
    /// Default: true
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        let delay = if self.jitter {
            capped * (1.0 + rand::random::<f64>() * 0.25)
        } else {
            capped
        };
        Duration::from_millis(delay as u64)
    }

    /// True if another retry is allowed after `attempt` failures
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Command counters for the pool
#[derive(Debug, Default)]
pub struct PoolMetrics {
    /// Connections established
    pub connections_created: AtomicU64,
    /// Failed connection attempts
    pub connection_failures: AtomicU64,
    /// Commands that succeeded
    pub commands_executed: AtomicU64,
    /// Commands that failed (each attempt counts)
    pub command_failures: AtomicU64,
    /// Retries scheduled
    pub retries: AtomicU64,
    /// Sum of successful command latencies
    pub total_latency_us: AtomicU64,
}

impl PoolMetrics {
    /// Mean latency of successful commands in microseconds
    pub fn average_latency_us(&self) -> f64 {
        let total = self.total_latency_us.load(Ordering::Relaxed);
        let count = self.commands_executed.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    fn record_command(&self, latency: Duration) {
        self.commands_executed.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }
}

/// Shared Redis connection with bounded concurrency and retries
pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    config: RedisConfig,
    metrics: Arc<PoolMetrics>,
    semaphore: Arc<Semaphore>,
}

impl RedisPool {
    /// Validate `config`, open the client and establish the first connection
    pub async fn new(config: RedisConfig) -> Result<Self, StoreError> {
        config.validate().map_err(StoreError::ConnectionError)?;

        let client = Client::open(config.url.as_str())
            .map_err(|e| StoreError::ConnectionError(safe_redis_error(&config.url, &e)))?;

        let semaphore = Arc::new(Semaphore::new(config.pool_size as usize));
        let pool = Self {
            client,
            connection: RwLock::new(None),
            config,
            metrics: Arc::new(PoolMetrics::default()),
            semaphore,
        };

        pool.connect().await?;
        debug!("Redis connection pool initialized");
        Ok(pool)
    }

    async fn connect(&self) -> Result<MultiplexedConnection, StoreError> {
        let start = Instant::now();
        let conn = tokio::time::timeout(
            self.config.connection_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            self.metrics
                .connection_failures
                .fetch_add(1, Ordering::Relaxed);
            StoreError::ConnectionError("Redis connection timeout".to_string())
        })?
        .map_err(|e| {
            self.metrics
                .connection_failures
                .fetch_add(1, Ordering::Relaxed);
            StoreError::ConnectionError(safe_redis_error(&self.config.url, &e))
        })?;

        *self.connection.write().await = Some(conn.clone());
        self.metrics
            .connections_created
            .fetch_add(1, Ordering::Relaxed);
        debug!("Redis connection established in {:?}", start.elapsed());
        Ok(conn)
    }

    async fn current(&self) -> Result<MultiplexedConnection, StoreError> {
        let existing = self.connection.read().await.clone();
        match existing {
            Some(conn) => Ok(conn),
            None => self.connect().await,
        }
    }

    /// Run `f` against the connection with timeout and retry
    ///
    /// `f` may be invoked more than once, so it must be safe to repeat.
    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: Fn(MultiplexedConnection) -> Fut,
        Fut: Future<Output = Result<T, RedisError>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| StoreError::ConnectionError("Redis pool closed".to_string()))?;

        let mut attempt = 0;
        loop {
            let conn = self.current().await?;
            let start = Instant::now();
            let result = tokio::time::timeout(self.config.command_timeout, f(conn)).await;

            let retriable = match result {
                Ok(Ok(value)) => {
                    self.metrics.record_command(start.elapsed());
                    return Ok(value);
                },
                Ok(Err(e)) => {
                    self.metrics.command_failures.fetch_add(1, Ordering::Relaxed);
                    if !is_retriable_error(&e) || !self.config.retry_policy.should_retry(attempt) {
                        return Err(StoreError::CommandFailed(safe_redis_error(
                            &self.config.url,
                            &e,
                        )));
                    }
                    if is_connection_error(&e) {
                        *self.connection.write().await = None;
                    }
                    safe_redis_error(&self.config.url, &e)
                },
                Err(_) => {
                    self.metrics.command_failures.fetch_add(1, Ordering::Relaxed);
                    if !self.config.retry_policy.should_retry(attempt) {
                        return Err(StoreError::ConnectionError(
                            "Redis command timeout".to_string(),
                        ));
                    }
                    "command timeout".to_string()
                },
            };

            self.metrics.retries.fetch_add(1, Ordering::Relaxed);
            let delay = self.config.retry_policy.delay_for_attempt(attempt);
            warn!(
                "Redis command failed (attempt {}), retrying in {:?}: {}",
                attempt + 1,
                delay,
                retriable
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Send PING and report whether the server answered
    pub async fn ping(&self) -> Result<Duration, StoreError> {
        let start = Instant::now();
        self.execute(|mut conn| async move {
            redis::cmd("PING").query_async::<String>(&mut conn).await
        })
        .await?;
        Ok(start.elapsed())
    }

    /// Pool counters
    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    /// Pool configuration
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }
}

fn is_retriable_error(e: &RedisError) -> bool {
    e.is_connection_dropped()
        || e.is_timeout()
        || e.is_io_error()
        || matches!(e.kind(), redis::ErrorKind::BusyLoadingError | redis::ErrorKind::TryAgain)
}

fn is_connection_error(e: &RedisError) -> bool {
    e.is_connection_dropped() || e.is_io_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RedisConfig::default();
        assert_eq!(config.pool_size, 16);
        assert_eq!(config.command_timeout, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(RedisConfig::with_url("").validate().is_err());
        assert!(RedisConfig::default().pool_size(0).validate().is_err());
        assert!(RedisConfig::default().pool_size(1001).validate().is_err());
        assert!(RedisConfig::with_url("rediss://secure:6380").validate().is_err());
    }

    #[cfg(not(feature = "redis-tls"))]
    #[test]
    fn test_tls_requires_feature() {
        let err = RedisConfig::with_url("rediss://secure:6380")
            .tls(true)
            .validate()
            .unwrap_err();
        assert!(err.contains("redis-tls"));
    }

    #[test]
    fn test_builder() {
        let config = RedisConfig::with_url("redis://localhost:6380")
            .pool_size(4)
            .connection_timeout(Duration::from_secs(2))
            .retry_policy(RetryPolicy::none());
        assert_eq!(config.url, "redis://localhost:6380");
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.connection_timeout, Duration::from_secs(2));
        assert_eq!(config.retry_policy.max_retries, 0);
    }

    #[test]
    fn test_retry_delays_grow_and_cap() {
        let policy = RetryPolicy {
            jitter: false,
            ..Default::default()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(12), Duration::from_secs(5));
    }

    #[test]
    fn test_retry_jitter_bounded() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.delay_for_attempt(0);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(125));
        }
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::none().should_retry(0));
    }

    #[test]
    fn test_average_latency() {
        let metrics = PoolMetrics::default();
        assert_eq!(metrics.average_latency_us(), 0.0);
        metrics.record_command(Duration::from_micros(100));
        metrics.record_command(Duration::from_micros(300));
        assert_eq!(metrics.average_latency_us(), 200.0);
    }

    #[tokio::test]
    async fn test_unreachable_server_errors() {
        let config = RedisConfig::with_url("redis://127.0.0.1:1")
            .connection_timeout(Duration::from_millis(200));
        assert!(matches!(
            RedisPool::new(config).await,
            Err(StoreError::ConnectionError(_))
        ));
    }
}
