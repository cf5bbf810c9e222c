//! Tracing subscriber setup
//!
//! Logs go to stderr; stdout is reserved for CSV output.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber
///
/// `RUST_LOG` wins over the configured level when set.
///
/// # Returns
///
/// * `Err(TryInitError)` if a global subscriber is already installed
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(build_filter(&config.level));

    if config.json {
        let layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_ansi(false);
        registry.with(layer).try_init()
    } else {
        let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
        registry.with(layer).try_init()
    }
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error_not_a_panic() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
