//! Tracing subscriber setup shared by embedding applications and tools.

use crate::config::ObservabilityConfig;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the log filter: `RUST_LOG` wins, otherwise the configured level.
#[must_use]
pub fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let json_layer = config
        .json_logs
        .then(|| tracing_subscriber::fmt::layer().json());
    let plain_layer = (!config.json_logs).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(json_layer)
        .with(plain_layer)
        .try_init()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_uses_configured_level() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = ObservabilityConfig {
            log_level: "media_session=debug".to_string(),
            json_logs: false,
        };
        assert_eq!(env_filter(&config).to_string(), "media_session=debug");
    }

    #[test]
    fn test_second_init_is_rejected() {
        let config = ObservabilityConfig::default();
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
