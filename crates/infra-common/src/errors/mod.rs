//! Infrastructure error type

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for infra-common operations
pub type InfraResult<T> = Result<T, InfraError>;

/// Errors raised while bootstrapping logging or loading configuration
#[derive(Error, Debug)]
pub enum InfraError {
    /// The configuration file could not be read
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration text is not valid TOML for the requested type
    #[error("invalid configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A configuration value parsed but is out of range
    #[error("invalid configuration value for {field}: {message}")]
    ConfigValue { field: String, message: String },

    /// Logging could not be initialized
    #[error("logging setup failed: {0}")]
    Logging(String),
}

impl InfraError {
    /// Build a [`InfraError::ConfigValue`]
    pub fn config_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        InfraError::ConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }
}
