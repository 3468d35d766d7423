//! Structured logging setup.
//!
//! Installs a global `tracing` subscriber and bridges `log` records into it,
//! so the worker pool's `log` macros and the pipeline's spans end up in the
//! same stream.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

/// Builds the level filter. `RUST_LOG` takes precedence over the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Initializes global logging. Returns `false` when a subscriber was
/// already installed, in which case the existing one is left untouched.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let output: Box<dyn Layer<Registry> + Send + Sync> = if config.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(false).boxed()
    };

    let subscriber = Registry::default().with(output).with(env_filter(config));

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return false;
    }

    // The log bridge may already be set by a host application.
    if let Err(e) = tracing_log::LogTracer::init() {
        tracing::debug!("log bridge not installed: {}", e);
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_init_logging_is_idempotent() {
        let config = LoggingConfig::default();
        let _first = init_logging(&config);
        // A second install never replaces the first.
        assert!(!init_logging(&config));
    }

    #[test]
    #[serial]
    fn test_env_filter_uses_configured_level() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "warn".to_string(),
            json: true,
        };
        let filter = env_filter(&config);
        assert_eq!(filter.to_string(), "warn");
    }
}
