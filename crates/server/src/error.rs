//! API error types.

use axum::Json;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use uprelay_upstream::UpstreamError;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Error code for programmatic handling.
    pub code: String,
    /// Originating cause, when there is one worth showing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("file exceeds the {limit} byte upload limit")]
    PayloadTooLarge { limit: u64 },

    #[error("missing required configuration: {}", .keys.join(", "))]
    Configuration { keys: Vec<String> },

    /// Credential exchange or upload target acquisition failed.
    #[error("{0}")]
    UpstreamAuth(UpstreamError),

    /// The byte transfer itself failed.
    #[error("{0}")]
    UpstreamUpload(UpstreamError),

    #[error("upload timed out after {secs}s")]
    UploadTimeout { secs: u64 },

    /// A direct-upload ticket could not be issued.
    #[error("Failed to get upload URL")]
    DirectTicket(UpstreamError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Configuration { .. } => "configuration_error",
            Self::UpstreamAuth(_) => "upstream_auth_error",
            Self::UpstreamUpload(_) => "upstream_upload_error",
            Self::UploadTimeout { .. } => "upload_timeout",
            Self::DirectTicket(UpstreamError::InvalidRequest(_)) => "invalid_request",
            Self::DirectTicket(_) => "upstream_auth_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::DirectTicket(UpstreamError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
            Self::Configuration { .. }
            | Self::UpstreamAuth(_)
            | Self::UpstreamUpload(_)
            | Self::UploadTimeout { .. }
            | Self::DirectTicket(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Provider status and body, or the underlying message.
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::UpstreamAuth(e) | Self::UpstreamUpload(e) => Some(upstream_details(e)),
            Self::DirectTicket(e) => Some(Value::String(e.to_string())),
            _ => None,
        }
    }
}

fn upstream_details(e: &UpstreamError) -> Value {
    match (e.status(), e.body()) {
        (status, Some(body)) => json!({ "status": status, "body": body }),
        (Some(status), None) => json!({ "status": status }),
        (None, None) => Value::String(e.to_string()),
    }
}

impl From<uprelay_core::Error> for ApiError {
    fn from(e: uprelay_core::Error) -> Self {
        match e {
            uprelay_core::Error::InvalidUploadId(_) => Self::InvalidRequest(e.to_string()),
            uprelay_core::Error::MissingConfig { keys } => Self::Configuration { keys },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::InvalidRequest(format!(
            "expected a multipart/form-data body: {}",
            rejection.body_text()
        ))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
            details: self.details(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
