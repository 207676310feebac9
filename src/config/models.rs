//! Configuration data structures for the retry middleware.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. They are
//! intentionally serde‑friendly and include defaults so that minimal configs remain concise.
//! The builder is considered part of the public API for embedding.
use serde::{Deserialize, Serialize};

use crate::core::RetryPolicy;

/// Default function for the replay budget
fn default_max_retries() -> u32 {
    crate::core::MAX_RETRY_COUNT
}

/// Default function for the log level
fn default_log_level() -> String {
    "info".to_string()
}

/// Retry behavior applied to every request carrying a timeout rule
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum replays issued per request after the original pass-through
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

impl RetryConfig {
    /// Convert into the policy the engine consumes.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
        }
    }
}

/// Logging configuration feeding [`crate::tracing_setup::init_tracing_from_config`]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or EnvFilter directive (e.g. "info", "volley=debug")
    pub level: String,
    /// Emit JSON log lines instead of pretty console output
    pub json_format: bool,
    /// Include span context in JSON output
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: true,
            include_spans: true,
        }
    }
}

/// Top-level middleware configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct MiddlewareConfig {
    /// Retry behavior
    pub retry: RetryConfig,
    /// Logging behavior
    pub logging: LoggingConfig,
}

impl MiddlewareConfig {
    /// Create a new middleware configuration builder
    pub fn builder() -> MiddlewareConfigBuilder {
        MiddlewareConfigBuilder::default()
    }
}

/// Builder for MiddlewareConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct MiddlewareConfigBuilder {
    retry: Option<RetryConfig>,
    logging: Option<LoggingConfig>,
}

impl MiddlewareConfigBuilder {
    /// Set the replay budget
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry = Some(RetryConfig { max_retries });
        self
    }

    /// Set the logging configuration
    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// Build the final MiddlewareConfig
    pub fn build(self) -> MiddlewareConfig {
        MiddlewareConfig {
            retry: self.retry.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
        }
    }
}
