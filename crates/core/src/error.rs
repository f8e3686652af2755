//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing required configuration: {}", .keys.join(", "))]
    MissingConfig { keys: Vec<String> },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid upload ID: {0}")]
    InvalidUploadId(String),

    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
