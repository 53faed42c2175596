//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use consumer::{ConsumerConfig, RetryConfigError, RetryPolicy};

/// Server, consumer and store configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `8081`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `EVENTS_TOPIC` / `CONSUMER_GROUP`: log subscription
/// - `CONSUMER_MAX_RETRIES`, `CONSUMER_INITIAL_BACKOFF_MS`,
///   `CONSUMER_MAX_BACKOFF_MS`, `CONSUMER_BACKOFF_FACTOR`: retry schedule
/// - `CONSUMER_POLL_TIMEOUT_MS`, `CONSUMER_PULL_ERROR_BACKOFF_MS`,
///   `HANDLER_TIMEOUT_MS`: consumer timing
/// - `READ_TIMEOUT_MS`, `CACHE_TTL_SECS`, `COLLECTION_CACHE_LIMIT`: read path
/// - `DATABASE_URL`: PostgreSQL document store (in-memory when unset)
/// - `REDIS_URL`: Redis cache, `redis` feature only (in-memory when unset)
/// - `EVENT_LOG_URL`, `CONSUMER_NAME`, `EVENT_LOG_MIN_REPLICAS`: Redis Streams
///   event log, `redis` feature only (in-process log when unset)
/// - `SEED_DATA`: load the sample catalog at startup
///
/// Unparsable values fall back to the default.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub events_topic: String,
    pub consumer_group: String,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_factor: f64,
    pub poll_timeout: Duration,
    pub pull_error_backoff: Duration,
    pub handler_timeout: Duration,
    pub read_timeout: Duration,
    pub cache_ttl: Duration,
    pub collection_cache_limit: usize,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub event_log_url: Option<String>,
    pub consumer_name: String,
    pub event_log_min_replicas: u32,
    pub seed_data: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |name: &str, default: Duration| {
            lookup(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT", defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            events_topic: lookup("EVENTS_TOPIC").unwrap_or(defaults.events_topic),
            consumer_group: lookup("CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
            max_retries: parsed(&lookup, "CONSUMER_MAX_RETRIES", defaults.max_retries),
            initial_backoff: millis("CONSUMER_INITIAL_BACKOFF_MS", defaults.initial_backoff),
            max_backoff: millis("CONSUMER_MAX_BACKOFF_MS", defaults.max_backoff),
            backoff_factor: parsed(&lookup, "CONSUMER_BACKOFF_FACTOR", defaults.backoff_factor),
            poll_timeout: millis("CONSUMER_POLL_TIMEOUT_MS", defaults.poll_timeout),
            pull_error_backoff: millis(
                "CONSUMER_PULL_ERROR_BACKOFF_MS",
                defaults.pull_error_backoff,
            ),
            handler_timeout: millis("HANDLER_TIMEOUT_MS", defaults.handler_timeout),
            read_timeout: millis("READ_TIMEOUT_MS", defaults.read_timeout),
            cache_ttl: lookup("CACHE_TTL_SECS")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            collection_cache_limit: parsed(
                &lookup,
                "COLLECTION_CACHE_LIMIT",
                defaults.collection_cache_limit,
            ),
            database_url: lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            redis_url: lookup("REDIS_URL").filter(|v| !v.trim().is_empty()),
            event_log_url: lookup("EVENT_LOG_URL").filter(|v| !v.trim().is_empty()),
            consumer_name: lookup("CONSUMER_NAME")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.consumer_name),
            event_log_min_replicas: parsed(
                &lookup,
                "EVENT_LOG_MIN_REPLICAS",
                defaults.event_log_min_replicas,
            ),
            seed_data: lookup("SEED_DATA")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.seed_data),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the consumer retry schedule, rejecting inconsistent values.
    pub fn retry_policy(&self) -> Result<RetryPolicy, RetryConfigError> {
        RetryPolicy::new(
            self.max_retries,
            self.initial_backoff,
            self.max_backoff,
            self.backoff_factor,
        )
    }

    pub fn consumer_config(&self) -> Result<ConsumerConfig, RetryConfigError> {
        Ok(ConsumerConfig {
            retry: self.retry_policy()?,
            handler_timeout: self.handler_timeout,
            poll_timeout: self.poll_timeout,
            pull_error_backoff: self.pull_error_backoff,
        })
    }
}

fn parsed<T: FromStr>(lookup: impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    lookup(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            log_level: "info".to_string(),
            events_topic: "query-service-events".to_string(),
            consumer_group: "query-service-group".to_string(),
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            backoff_factor: 2.0,
            poll_timeout: Duration::from_secs(1),
            pull_error_backoff: Duration::from_secs(1),
            handler_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(600),
            collection_cache_limit: 500,
            database_url: None,
            redis_url: None,
            event_log_url: None,
            consumer_name: "query-service".to_string(),
            event_log_min_replicas: 0,
            seed_data: false,
        }
    }
}
