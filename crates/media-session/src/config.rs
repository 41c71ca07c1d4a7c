//! Media session configuration.
//!
//! Configuration is loaded from environment variables, falling back to
//! defaults for anything unset.

use common::config::{ObservabilityConfig, DEFAULT_LOG_LEVEL};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Default number of thumbnail slots (the main slot comes on top).
pub const DEFAULT_THUMBNAIL_COUNT: usize = 4;

/// Largest accepted thumbnail count.
pub const MAX_THUMBNAIL_COUNT: usize = 16;

/// Default capacity of the session mailbox.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// Media session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Number of thumbnail slots (default: 4). Slot count is this plus one.
    pub thumbnail_count: usize,

    /// Capacity of the UI command mailbox (default: 64).
    pub mailbox_capacity: usize,

    /// Where the last-used display name is remembered, if anywhere.
    pub preferences_path: Option<PathBuf>,

    /// Log level and output format.
    pub observability: ObservabilityConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            thumbnail_count: DEFAULT_THUMBNAIL_COUNT,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            preferences_path: None,
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl SessionConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let thumbnail_count = match vars.get("MS_THUMBNAIL_COUNT") {
            Some(raw) => {
                let value: usize = raw.parse().map_err(|e| {
                    ConfigError::InvalidValue(format!("MS_THUMBNAIL_COUNT={raw}: {e}"))
                })?;
                if value == 0 || value > MAX_THUMBNAIL_COUNT {
                    return Err(ConfigError::InvalidValue(format!(
                        "MS_THUMBNAIL_COUNT must be between 1 and {MAX_THUMBNAIL_COUNT}, got {value}"
                    )));
                }
                value
            }
            None => DEFAULT_THUMBNAIL_COUNT,
        };

        let mailbox_capacity = match vars.get("MS_MAILBOX_CAPACITY") {
            Some(raw) => {
                let value: usize = raw.parse().map_err(|e| {
                    ConfigError::InvalidValue(format!("MS_MAILBOX_CAPACITY={raw}: {e}"))
                })?;
                if value == 0 {
                    return Err(ConfigError::InvalidValue(
                        "MS_MAILBOX_CAPACITY must be greater than 0".to_string(),
                    ));
                }
                value
            }
            None => DEFAULT_MAILBOX_CAPACITY,
        };

        let preferences_path = vars
            .get("MS_PREFERENCES_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let log_level = vars
            .get("MS_LOG_LEVEL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let json_logs = match vars.get("MS_JSON_LOGS").map(String::as_str) {
            None | Some("" | "0" | "false") => false,
            Some("1" | "true") => true,
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "MS_JSON_LOGS must be true or false, got {other}"
                )));
            }
        };

        Ok(SessionConfig {
            thumbnail_count,
            mailbox_capacity,
            preferences_path,
            observability: ObservabilityConfig {
                log_level,
                json_logs,
            },
        })
    }

    /// Total number of display slots (one main slot plus the thumbnails).
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.thumbnail_count + 1
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config =
            SessionConfig::from_vars(&HashMap::new()).expect("Config should load successfully");

        assert_eq!(config.thumbnail_count, DEFAULT_THUMBNAIL_COUNT);
        assert_eq!(config.slot_count(), DEFAULT_THUMBNAIL_COUNT + 1);
        assert_eq!(config.mailbox_capacity, DEFAULT_MAILBOX_CAPACITY);
        assert!(config.preferences_path.is_none());
        assert_eq!(config.observability.log_level, DEFAULT_LOG_LEVEL);
        assert!(!config.observability.json_logs);
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            ("MS_THUMBNAIL_COUNT".to_string(), "8".to_string()),
            ("MS_MAILBOX_CAPACITY".to_string(), "16".to_string()),
            (
                "MS_PREFERENCES_PATH".to_string(),
                "/tmp/prefs.json".to_string(),
            ),
            ("MS_LOG_LEVEL".to_string(), "debug".to_string()),
            ("MS_JSON_LOGS".to_string(), "true".to_string()),
        ]);

        let config = SessionConfig::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.thumbnail_count, 8);
        assert_eq!(config.slot_count(), 9);
        assert_eq!(config.mailbox_capacity, 16);
        assert_eq!(
            config.preferences_path,
            Some(PathBuf::from("/tmp/prefs.json"))
        );
        assert_eq!(config.observability.log_level, "debug");
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_thumbnail_count_out_of_range() {
        for raw in ["0", "17", "-1", "four"] {
            let vars = HashMap::from([("MS_THUMBNAIL_COUNT".to_string(), raw.to_string())]);
            let result = SessionConfig::from_vars(&vars);
            assert!(
                matches!(result, Err(ConfigError::InvalidValue(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_zero_mailbox_capacity_rejected() {
        let vars = HashMap::from([("MS_MAILBOX_CAPACITY".to_string(), "0".to_string())]);
        let result = SessionConfig::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(msg)) if msg.contains("MS_MAILBOX_CAPACITY")));
    }

    #[test]
    fn test_invalid_json_logs_flag() {
        let vars = HashMap::from([("MS_JSON_LOGS".to_string(), "yes".to_string())]);
        assert!(SessionConfig::from_vars(&vars).is_err());
    }

    #[test]
    fn test_empty_preferences_path_ignored() {
        let vars = HashMap::from([("MS_PREFERENCES_PATH".to_string(), "  ".to_string())]);
        let config = SessionConfig::from_vars(&vars).unwrap();
        assert!(config.preferences_path.is_none());
    }
}
