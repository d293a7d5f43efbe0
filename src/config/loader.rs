//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::DispatchConfig;
use crate::config::store::Field;
use crate::config::validation::{validate_config, ValidationError};
use crate::headers::HeaderError;

/// Error type for configuration loading and mutation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    InvalidHeader(#[from] HeaderError),

    #[error("Unknown delegate '{0}'")]
    UnknownDelegate(String),

    #[error("Delegate '{id}' failed to initialize: {reason}")]
    DelegateInit { id: String, reason: String },

    #[error("Unknown configuration field '{0}'")]
    UnknownField(String),

    #[error("Field '{field}' expects a {expected} value")]
    TypeMismatch { field: Field, expected: &'static str },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: Field, reason: String },
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<DispatchConfig, ConfigError> {
    let config: DispatchConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<DispatchConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}
