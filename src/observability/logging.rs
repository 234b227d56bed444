//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` takes precedence
//! over the configured level.

use crate::core::config::{LogFormat, LoggingConfig};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Filter built from `RUST_LOG`, falling back to the configured level
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()))
}

/// Initialize the global subscriber. Returns false if one was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = env_filter(config);

    let installed = match config.format {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init()
            .is_ok(),
        LogFormat::Pretty => Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
            .is_ok(),
    };

    if installed {
        info!(level = %config.level, format = ?config.format, "Structured logging initialized");
    } else {
        warn!("Tracing subscriber already initialized, skipping initialization");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
        };
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }
}
