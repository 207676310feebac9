use tracing_subscriber::EnvFilter;

use crate::config::models::{LoggingConfig, MiddlewareConfig, RetryConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Upper bound accepted for the configurable replay budget. Each replay
/// holds the caller for up to one more timeout window, so a runaway budget
/// turns a stalled upstream into a very long hang.
const MAX_CONFIGURABLE_RETRIES: u32 = 25;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid log level '{level}': {reason}")]
    InvalidLogLevel { level: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Middleware configuration validator
pub struct MiddlewareConfigValidator;

impl MiddlewareConfigValidator {
    /// Validate the entire middleware configuration
    pub fn validate(config: &MiddlewareConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_retry(&config.retry) {
            errors.push(e);
        }

        if let Err(e) = Self::validate_logging(&config.logging) {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate the retry budget
    fn validate_retry(config: &RetryConfig) -> ValidationResult<()> {
        if config.max_retries == 0 {
            return Err(ValidationError::InvalidField {
                field: "retry.max_retries".to_string(),
                message: "Replay budget must be at least 1; to disable retries, do not attach a timeout rule".to_string(),
            });
        }

        if config.max_retries > MAX_CONFIGURABLE_RETRIES {
            return Err(ValidationError::InvalidField {
                field: "retry.max_retries".to_string(),
                message: format!(
                    "Replay budget must be at most {MAX_CONFIGURABLE_RETRIES}, got {}",
                    config.max_retries
                ),
            });
        }

        Ok(())
    }

    /// Validate the logging configuration
    fn validate_logging(config: &LoggingConfig) -> ValidationResult<()> {
        if let Err(e) = EnvFilter::try_new(&config.level) {
            return Err(ValidationError::InvalidLogLevel {
                level: config.level.clone(),
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_default_config() {
        let config = MiddlewareConfig::default();
        assert!(MiddlewareConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn validate_accepts_builder_config() {
        let config = MiddlewareConfig::builder().max_retries(10).build();
        assert!(MiddlewareConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn validate_rejects_zero_replay_budget() {
        let config = MiddlewareConfig::builder().max_retries(0).build();
        let err = MiddlewareConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("retry.max_retries"));
    }

    #[test]
    fn validate_rejects_oversized_replay_budget() {
        let config = MiddlewareConfig::builder().max_retries(26).build();
        assert!(MiddlewareConfigValidator::validate(&config).is_err());
    }

    fn bogus_logging() -> LoggingConfig {
        LoggingConfig {
            level: "not=a=filter".to_string(),
            ..LoggingConfig::default()
        }
    }

    #[test]
    fn validate_rejects_bogus_log_level() {
        let config = MiddlewareConfig {
            logging: bogus_logging(),
            ..MiddlewareConfig::default()
        };
        let err = MiddlewareConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("not=a=filter"));
    }

    #[test]
    fn validate_aggregates_all_errors() {
        let config = MiddlewareConfig {
            retry: RetryConfig { max_retries: 0 },
            logging: bogus_logging(),
        };
        let err = MiddlewareConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("2 validation errors"));
    }
}
