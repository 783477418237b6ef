//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The file format is unknown or its cargo feature is disabled.
    #[error("Unsupported configuration format: .{0}")]
    UnsupportedFormat(String),

    /// figment could not extract the configuration.
    #[error("Failed to extract configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    /// A value is out of range or inconsistent.
    #[error("Invalid configuration: {message}")]
    Validation { message: String },

    /// A required field is empty.
    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Extract(Box::new(err))
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
