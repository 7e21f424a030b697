//! Common error types for mesh session components.

use thiserror::Error;

/// Common errors that can occur across mesh session components
#[derive(Error, Debug)]
pub enum CommonError {
    /// An identifier could not be parsed
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Tracing subscriber could not be installed
    #[error("Observability error: {0}")]
    Observability(String),
}

/// Result type alias using `CommonError`
pub type Result<T> = std::result::Result<T, CommonError>;
