//! Error types for hashline switch operations.
//!
//! Admission rejections and empty routing results are ordinary outcomes and
//! never surface here; these variants cover malformed input, transport
//! failures and broken internal state.

use thiserror::Error;

/// Errors that can occur in switch operations.
#[derive(Debug, Error)]
pub enum SwitchError {
    /// Endpoint string could not be parsed as `ip:port`
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Hex identifier could not be decoded
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A telex field had an unexpected shape
    #[error("Malformed telex field {field}: {reason}")]
    MalformedField {
        /// Offending key
        field: String,
        /// What was wrong with it
        reason: String,
    },

    /// Operation requires a connected switch
    #[error("Switch is not connected")]
    NotConnected,

    /// A lock guarding switch state was poisoned by a panicking thread
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    /// Network I/O errors
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] hashline_core::CoreError),
}

impl<T> From<std::sync::PoisonError<T>> for SwitchError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        SwitchError::LockPoisoned(err.to_string())
    }
}

/// Result type for switch operations.
pub type SwitchResult<T> = Result<T, SwitchError>;
