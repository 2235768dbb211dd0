//! # Structured Logging
//!
//! Installs the process-wide `tracing` subscriber. The library itself only
//! emits events through the `tracing` macros; the host process calls
//! [`init_logging`] once at startup.

use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::core::error::{ServiceError, ServiceResult};
use crate::observability::config::{LogConfig, LogFormat, LogOutput};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Build the filter: `RUST_LOG` if set, otherwise the configured directive
pub fn build_filter(config: &LogConfig) -> ServiceResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| ServiceError::config(format!("invalid log level '{}': {}", config.level, e)))
}

fn fmt_layer(config: &LogConfig) -> BoxedLayer {
    match (config.format, config.output) {
        (LogFormat::Json, LogOutput::Stdout) => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        (LogFormat::Json, LogOutput::Stderr) => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        (LogFormat::Text, LogOutput::Stdout) => fmt::layer().with_target(true).boxed(),
        (LogFormat::Text, LogOutput::Stderr) => fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    }
}

/// Install the global subscriber.
///
/// A second call (or a subscriber installed by a test harness) is tolerated:
/// the existing subscriber stays in place and a warning is logged.
pub fn init_logging(config: &LogConfig) -> ServiceResult<()> {
    let filter = build_filter(config)?;

    let subscriber = Registry::default().with(fmt_layer(config)).with(filter);
    if subscriber.try_init().is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
        return Ok(());
    }

    info!(format = ?config.format, level = %config.level, "Structured logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_configuration_error() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LogConfig {
            level: "campus_cache=notalevel".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            build_filter(&config),
            Err(ServiceError::Configuration { .. })
        ));
    }

    #[test]
    fn test_repeated_init_is_tolerated() {
        let config = LogConfig {
            format: LogFormat::Text,
            output: LogOutput::Stderr,
            ..Default::default()
        };
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&config).is_ok());
    }
}
