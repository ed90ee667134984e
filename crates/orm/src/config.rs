//! Client configuration
//!
//! Settings for the remote API (base URL, batch endpoint), the durable cache
//! namespace and the retry policy for transient failures. Values can be
//! built in code or read from `CONVEX_*` environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use convex_cache::CacheConfig;
use service_builder::builder;

use crate::error::{ModelError, ModelResult};

/// Retry policy for the server-busy status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// The only status code that is retried
    pub status: u16,
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled on every further attempt
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            status: 503,
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Whether a response with `status` should be retried after `attempt` tries
    pub fn should_retry(&self, status: u16, attempt: u32) -> bool {
        status == self.status && attempt <= self.max_retries
    }
}

/// Configuration of a convex client
#[derive(Debug, Clone, PartialEq, Eq)]
#[builder]
pub struct ConvexConfig {
    /// Base URL prepended to every request path
    #[builder(default = "\"http://localhost:3000\".to_string()", getter)]
    pub base_url: String,

    /// Path of the batch endpoint
    #[builder(default = "\"/batch\".to_string()", getter)]
    pub batch_path: String,

    /// Namespace for durable cache keys
    #[builder(default = "convex_cache::DEFAULT_NAMESPACE.to_string()")]
    pub cache_namespace: String,

    /// Retry policy for transient failures
    #[builder(default = "RetryPolicy::default()", getter)]
    pub retry: RetryPolicy,

    /// Per-request timeout of the HTTP transport
    #[builder(default = "Duration::from_secs(30)", getter)]
    pub timeout: Duration,
}

impl Default for ConvexConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ConvexConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            batch_path: "/batch".to_string(),
            cache_namespace: convex_cache::DEFAULT_NAMESPACE.to_string(),
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Configuration for tests: fixed base URL and near-instant retries
    pub fn testing() -> Self {
        Self {
            base_url: "https://api.test".to_string(),
            retry: RetryPolicy {
                base_delay: Duration::from_millis(1),
                ..RetryPolicy::default()
            },
            timeout: Duration::from_secs(5),
            ..Self::new()
        }
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the batch endpoint path
    pub fn with_batch_path(mut self, batch_path: impl Into<String>) -> Self {
        self.batch_path = batch_path.into();
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Cache configuration derived from this client configuration
    pub fn cache_config(&self) -> ModelResult<CacheConfig> {
        CacheConfig::builder()
            .namespace(self.cache_namespace.clone())
            .build()
            .map_err(|e| ModelError::Configuration(format!("Invalid cache configuration: {:?}", e)))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> ModelResult<Self> {
        let mut config = Self::new();

        if let Ok(base_url) = env::var("CONVEX_BASE_URL") {
            config.base_url = base_url;
        }

        if let Ok(batch_path) = env::var("CONVEX_BATCH_PATH") {
            config.batch_path = batch_path;
        }

        if let Ok(namespace) = env::var("CONVEX_CACHE_NAMESPACE") {
            config.cache_namespace = namespace;
        }

        if let Some(status) = parse_env::<u16>("CONVEX_RETRY_STATUS", "HTTP status code")? {
            config.retry.status = status;
        }

        if let Some(max_retries) = parse_env::<u32>("CONVEX_MAX_RETRIES", "non-negative integer")? {
            config.retry.max_retries = max_retries;
        }

        if let Some(secs) = parse_env::<u64>("CONVEX_TIMEOUT_SECS", "number of seconds")? {
            config.timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ModelResult<()> {
        if self.base_url.ends_with('/') {
            return Err(ModelError::Configuration(format!(
                "base_url '{}' must not end with '/'",
                self.base_url
            )));
        }

        if !self.batch_path.starts_with('/') {
            return Err(ModelError::Configuration(format!(
                "batch_path '{}' must start with '/'",
                self.batch_path
            )));
        }

        if !(100..=599).contains(&self.retry.status) {
            return Err(ModelError::Configuration(format!(
                "retry status {} is not an HTTP status code",
                self.retry.status
            )));
        }

        if self.timeout.is_zero() {
            return Err(ModelError::Configuration("timeout must be greater than zero".to_string()));
        }

        Ok(())
    }
}

impl ConvexConfigBuilder {
    /// Builder preset pointing at a local development server
    pub fn development() -> Self {
        ConvexConfigBuilder::new()
            .base_url("http://localhost:3000".to_string())
            .retry(RetryPolicy::disabled())
    }
}

fn parse_env<T: FromStr>(name: &str, expected: &str) -> ModelResult<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw.parse().map(Some).map_err(|_| {
            ModelError::Configuration(format!(
                "Invalid value for {}: '{}'. Expected: {}",
                name, raw, expected
            ))
        }),
        Err(_) => Ok(None),
    }
}
