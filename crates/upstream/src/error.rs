//! Upstream provider error types.

use thiserror::Error;

/// Errors raised while talking to a storage provider.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("missing required configuration: {}", .keys.join(", "))]
    MissingConfig { keys: Vec<String> },

    #[error("configuration error: {0}")]
    Config(String),

    /// The caller omitted something this provider needs.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Credential exchange or upload-target acquisition was rejected.
    #[error("upstream authorization failed{}: {body}", status_suffix(.status))]
    Auth { status: Option<u16>, body: String },

    /// The byte-streaming step was rejected.
    #[error("upstream upload failed ({status}): {body}")]
    Upload { status: u16, body: String },

    /// The provider answered with something we could not use.
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl UpstreamError {
    /// Provider status code, when the provider answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } => *status,
            Self::Upload { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Raw provider body, for diagnosis.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Auth { body, .. } | Self::Upload { body, .. } => Some(body),
            _ => None,
        }
    }
}

impl From<uprelay_core::Error> for UpstreamError {
    fn from(e: uprelay_core::Error) -> Self {
        match e {
            uprelay_core::Error::MissingConfig { keys } => Self::MissingConfig { keys },
            other => Self::Config(other.to_string()),
        }
    }
}

/// Result type for upstream operations.
pub type UpstreamResult<T> = std::result::Result<T, UpstreamError>;
