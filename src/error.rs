//! Error types for ipthrottle.
//!
//! Store failures are not part of this enum: they stay inside the limiter
//! as [`crate::ratelimit::StoreError`] and are resolved by its failure policy.

use thiserror::Error;

/// Main error type for ipthrottle operations.
#[derive(Error, Debug)]
pub enum ThrottleError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ThrottleError {
    fn from(err: config::ConfigError) -> Self {
        ThrottleError::Config(err.to_string())
    }
}

/// Result type alias for ipthrottle operations.
pub type Result<T> = std::result::Result<T, ThrottleError>;
