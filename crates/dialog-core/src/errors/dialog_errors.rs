use thiserror::Error;

use crate::transport::TransportError;

/// Result alias used across dialog-core
pub type DialogResult<T> = Result<T, DialogError>;

/// Synchronous error codes of the engine
#[derive(Error, Debug)]
pub enum DialogError {
    /// A required argument is missing, empty or out of range
    #[error("Bad parameter: {message}")]
    BadParameter { message: String },

    /// A bounded resource (arena, id space) is exhausted
    #[error("Out of resources: {message}")]
    NoMemory { message: String },

    /// The transaction, dialog, call or subscription is not known
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// The object is in a state that does not accept the operation
    #[error("Wrong state: {message}")]
    WrongState { message: String },

    /// The transport collaborator failed outside of a transaction
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The event fifo reached its bounded capacity
    #[error("Event queue full ({capacity} entries)")]
    QueueFull { capacity: usize },

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] sipstate_infra_common::InfraError),

    /// Anything else
    #[error("Undefined error: {message}")]
    Undefined { message: String },
}

impl DialogError {
    pub fn bad_parameter(message: impl Into<String>) -> Self {
        DialogError::BadParameter { message: message.into() }
    }

    pub fn no_memory(message: impl Into<String>) -> Self {
        DialogError::NoMemory { message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        DialogError::NotFound { message: message.into() }
    }

    pub fn wrong_state(message: impl Into<String>) -> Self {
        DialogError::WrongState { message: message.into() }
    }

    pub fn undefined(message: impl Into<String>) -> Self {
        DialogError::Undefined { message: message.into() }
    }

    /// True for [`DialogError::NotFound`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DialogError::NotFound { .. })
    }
}

impl From<String> for DialogError {
    fn from(s: String) -> Self {
        DialogError::Undefined { message: s }
    }
}

impl From<&str> for DialogError {
    fn from(s: &str) -> Self {
        DialogError::Undefined { message: s.to_string() }
    }
}
