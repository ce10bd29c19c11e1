//! Engine configuration.
//!
//! This module provides configuration for the assembly and execution
//! engines: template lookup roots, backend endpoint, and the fallback
//! directories used when a project does not carry its own.

use std::path::PathBuf;
use thiserror::Error;

/// Default automation output directory used when neither the project nor
/// the environment provides one.
pub const DEFAULT_AUTOMATION_DIR: &str = "automation/output";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the template and execution engines.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ordered candidate base paths tried for every template fetch.
    pub template_roots: Vec<PathBuf>,
    /// Base URL of the execution backend.
    pub backend_url: String,
    /// Fallback scope directory used when neither the start call nor the
    /// project provides one.
    pub default_scope_directory: Option<String>,
    /// Fallback automation output directory.
    pub default_automation_directory: String,
    /// Whether assembled prompts receive reference-document excerpts.
    pub include_references: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            template_roots: vec![
                PathBuf::from("templates"),
                PathBuf::from("public/templates"),
                PathBuf::from("assets/templates"),
                PathBuf::from("../templates"),
            ],
            backend_url: "http://localhost:8787".to_string(),
            default_scope_directory: None,
            default_automation_directory: DEFAULT_AUTOMATION_DIR.to_string(),
            include_references: true,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PROMPTFORGE_TEMPLATE_ROOTS`: Comma-separated candidate base paths
    /// - `PROMPTFORGE_BACKEND_URL`: Backend base URL (default: http://localhost:8787)
    /// - `PROMPTFORGE_SCOPE_DIR`: Fallback scope directory
    /// - `PROMPTFORGE_AUTOMATION_DIR`: Fallback automation output directory
    /// - `PROMPTFORGE_INCLUDE_REFERENCES`: Enable reference splicing (default: true)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PROMPTFORGE_TEMPLATE_ROOTS") {
            config.template_roots = val
                .split(',')
                .map(|s| PathBuf::from(s.trim()))
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }

        if let Ok(val) = std::env::var("PROMPTFORGE_BACKEND_URL") {
            config.backend_url = val;
        }

        if let Ok(val) = std::env::var("PROMPTFORGE_SCOPE_DIR") {
            if !val.trim().is_empty() {
                config.default_scope_directory = Some(val);
            }
        }

        if let Ok(val) = std::env::var("PROMPTFORGE_AUTOMATION_DIR") {
            config.default_automation_directory = val;
        }

        if let Ok(val) = std::env::var("PROMPTFORGE_INCLUDE_REFERENCES") {
            config.include_references = parse_env_bool(&val, "PROMPTFORGE_INCLUDE_REFERENCES")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any value is unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.template_roots.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one template root is required".to_string(),
            ));
        }

        if self.backend_url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "backend_url must not be empty".to_string(),
            ));
        }

        if self.default_automation_directory.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "default_automation_directory must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parses a boolean environment variable value.
fn parse_env_bool(val: &str, key: &str) -> Result<bool, ConfigError> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{}'", val),
        }),
    }
}
