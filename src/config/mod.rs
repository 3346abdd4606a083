//! Settings loading for the feedwatch binary
//!
//! Settings come from a TOML file with environment-variable overrides for
//! the logging section. The `[modules]` table is not interpreted here: it
//! is handed to [`crate::app::App::apply_config`] as an opaque mapping
//! keyed by module name, and each module deserializes its own subtree.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Top-level settings for the binary
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-module config subtrees, keyed by module name
    #[serde(default)]
    pub modules: Value,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, then apply env overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut settings = Self::from_toml_str(&text)?;
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML text (no env overrides, no validation)
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("FEEDWATCH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("FEEDWATCH_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate the settings shape
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(Error::config(format!(
                "unknown log format '{}': expected text or json",
                self.logging.format
            )));
        }
        if !matches!(self.modules, Value::Object(_) | Value::Null) {
            return Err(Error::config(
                "[modules] must be a table keyed by module name",
            ));
        }
        Ok(())
    }
}
