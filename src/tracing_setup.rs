use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Initialize structured logging with JSON output
pub fn init_tracing() -> Result<()> {
    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Structured logging initialized with JSON output");
    Ok(())
}

/// Initialize console-friendly logging for development
pub fn init_console_tracing() -> Result<()> {
    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Console logging initialized");
    Ok(())
}

/// Initialize tracing with custom configuration
pub fn init_tracing_with_config(level: &str, json_format: bool, include_spans: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}"))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json_format {
        Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(include_spans)
                    .with_span_list(include_spans),
            )
            .init();
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .init();
    }

    tracing::info!(
        level,
        json = json_format,
        spans = include_spans,
        "Logging initialized with custom configuration"
    );
    Ok(())
}

/// Initialize tracing from a loaded [`LoggingConfig`]
pub fn init_tracing_from_config(config: &LoggingConfig) -> Result<()> {
    init_tracing_with_config(&config.level, config.json_format, config.include_spans)
}

/// Create a span covering one guarded exchange end to end
pub fn create_exchange_span(method: &str, url: &str, request_id: &str) -> tracing::Span {
    tracing::info_span!(
        "exchange",
        http.method = method,
        http.url = url,
        request.id = request_id,
        outcome = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

/// Create a span covering one replay attempt
pub fn create_replay_span(method: &str, url: &str, attempt: u32) -> tracing::Span {
    tracing::info_span!(
        "replay",
        http.method = method,
        http.url = url,
        retry.attempt = attempt,
        http.status_code = tracing::field::Empty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_with_config() {
        let result = init_tracing_with_config("debug", true, true);
        assert!(result.is_ok());
    }

    #[test]
    fn test_init_rejects_bogus_level() {
        let result = init_tracing_with_config("not=a=filter", false, false);
        assert!(result.is_err());
    }

    #[test]
    fn test_create_exchange_span() {
        let span = create_exchange_span("GET", "http://upstream.test/api", "req-123");
        assert_eq!(span.metadata().map(|m| m.name()), Some("exchange"));
    }

    #[test]
    fn test_create_replay_span() {
        let span = create_replay_span("POST", "http://upstream.test/data", 2);
        assert_eq!(span.metadata().map(|m| m.name()), Some("replay"));
    }
}
