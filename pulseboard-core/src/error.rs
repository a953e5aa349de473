//! Error types for Pulseboard operations

use thiserror::Error;

/// Key-value store errors.
///
/// Raised by the store primitives. The cache façade swallows these; only
/// startup (`connect`) and queue admission ever surface them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store is not connected")]
    NotConnected,

    #[error("Connection to {target} failed: {reason}")]
    ConnectionFailed { target: String, reason: String },

    #[error("{command} failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Build a `CommandFailed` error for the given command name.
    pub fn command(command: &str, reason: impl ToString) -> Self {
        Self::CommandFailed {
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Pulseboard errors.
#[derive(Debug, Clone, Error)]
pub enum PulseError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for store primitives.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for Pulseboard operations.
pub type PulseResult<T> = Result<T, PulseError>;
