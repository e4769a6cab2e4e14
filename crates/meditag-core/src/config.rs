//! Plugin configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_SCAN_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_TEXT_LANGUAGE: &str = "en";

/// Longest language code a text record header can describe.
const MAX_LANGUAGE_LEN: usize = 63;

/// Settings read from the `plugins.meditag` section of the app config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TagConfig {
    pub scan_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub text_language: String,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            scan_timeout_ms: DEFAULT_SCAN_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            text_language: DEFAULT_TEXT_LANGUAGE.to_string(),
        }
    }
}

impl TagConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("scanTimeoutMs"));
        }
        if self.write_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("writeTimeoutMs"));
        }
        let language = &self.text_language;
        if language.is_empty() || language.len() > MAX_LANGUAGE_LEN || !language.is_ascii() {
            return Err(ConfigError::InvalidLanguage(language.clone()));
        }
        Ok(())
    }

    /// Returns this config, or the defaults if it does not validate.
    pub fn validated_or_default(self) -> Self {
        match self.validate() {
            Ok(()) => self,
            Err(e) => {
                tracing::warn!("[MeditagConfig] {}, using defaults", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: TagConfig = serde_json::from_str(r#"{"scanTimeoutMs":5000}"#).unwrap();
        assert_eq!(config.scan_timeout(), Duration::from_secs(5));
        assert_eq!(config.write_timeout_ms, DEFAULT_WRITE_TIMEOUT_MS);
        assert_eq!(config.text_language, "en");
    }

    #[test]
    fn test_validate() {
        assert!(TagConfig::default().validate().is_ok());

        let zero = TagConfig {
            write_timeout_ms: 0,
            ..TagConfig::default()
        };
        assert_eq!(
            zero.validate(),
            Err(ConfigError::ZeroTimeout("writeTimeoutMs"))
        );

        let long = TagConfig {
            text_language: "x".repeat(64),
            ..TagConfig::default()
        };
        assert!(matches!(long.validate(), Err(ConfigError::InvalidLanguage(_))));

        let empty = TagConfig {
            text_language: String::new(),
            ..TagConfig::default()
        };
        assert_eq!(
            empty.validate(),
            Err(ConfigError::InvalidLanguage(String::new()))
        );
    }

    #[test]
    fn test_invalid_falls_back() {
        let config = TagConfig {
            scan_timeout_ms: 0,
            text_language: "de".to_string(),
            ..TagConfig::default()
        };
        assert_eq!(config.validated_or_default(), TagConfig::default());

        let good = TagConfig {
            text_language: "de".to_string(),
            ..TagConfig::default()
        };
        assert_eq!(good.clone().validated_or_default(), good);
    }
}
