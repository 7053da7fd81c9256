//! Orchestrator configuration.
//!
//! # Example
//!
//! ```toml
//! [card]
//! discovery_timeout = "30s"
//!
//! [pairing]
//! delete_key_on_failure = true
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Every key can be overridden from the environment, e.g.
//! `CARDWALL__CARD__DISCOVERY_TIMEOUT=10s`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading or merging the sources failed.
    #[error("config build error: {0}")]
    Build(#[from] config::ConfigError),

    /// The merged configuration is not usable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CardwallConfig {
    pub card: CardConfig,
    pub pairing: PairingConfig,
    pub logging: LoggingConfig,
}

impl CardwallConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.card.discovery_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::Invalid(
                "card.discovery_timeout must be > 0 when set".into(),
            ));
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        Ok(())
    }
}

/// Card discovery settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CardConfig {
    /// How long to wait for the first card connection. Unset waits forever.
    #[serde(with = "humantime_serde")]
    pub discovery_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PairingConfig {
    /// Delete the freshly generated key when pairing fails.
    pub delete_key_on_failure: bool,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            delete_key_on_failure: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

pub mod loader {
    use super::{CardwallConfig, ConfigError};
    use config::{Config, Environment, File};
    use std::path::Path;

    /// Loads configuration from an optional TOML file plus `CARDWALL__*`
    /// environment overrides, then validates it.
    pub fn load_config(path: Option<&Path>) -> Result<CardwallConfig, ConfigError> {
        let mut builder = Config::builder();
        if let Some(p) = path {
            if p.exists() {
                builder = builder.add_source(File::from(p));
            }
        }
        // Environment variable overrides, e.g., CARDWALL__PAIRING__DELETE_KEY_ON_FAILURE=false
        builder = builder.add_source(
            Environment::with_prefix("CARDWALL")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let merged: CardwallConfig = builder.build()?.try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CardwallConfig::default();
        assert_eq!(config.card.discovery_timeout, None);
        assert!(config.pairing.delete_key_on_failure);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config: CardwallConfig = toml::from_str(
            r#"
            [card]
            discovery_timeout = "15s"

            [pairing]
            delete_key_on_failure = false
            "#,
        )
        .unwrap();
        assert_eq!(config.card.discovery_timeout, Some(Duration::from_secs(15)));
        assert!(!config.pairing.delete_key_on_failure);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validation() {
        let mut config = CardwallConfig::default();
        config.logging.level = "verbose".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = CardwallConfig::default();
        config.card.discovery_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
