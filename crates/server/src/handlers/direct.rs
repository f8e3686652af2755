//! Direct-upload tickets for clients that push bytes to the provider
//! themselves.

use crate::error::{ApiError, ApiResult};
use crate::metrics::DIRECT_TICKETS_ISSUED;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::Deserialize;
use uprelay_core::UploadId;
use uprelay_upstream::DirectUploadTicket;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectUploadRequest {
    /// Name of the file the client is about to upload.
    #[serde(default)]
    pub file_name: Option<String>,
}

/// POST /upload-url - Issue a one-time upload target.
///
/// The body is optional JSON `{"fileName": "..."}`; a request without a
/// `Content-Type` is an empty request. When a file name is
/// given, the configured naming policy decides the stored object name and
/// the ticket carries it along with the eventual public URL.
pub async fn create_upload_url(
    State(state): State<AppState>,
    body: Result<Option<Json<DirectUploadRequest>>, JsonRejection>,
) -> ApiResult<Json<DirectUploadTicket>> {
    let request = body?.map(|Json(request)| request).unwrap_or_default();
    let object_name = request
        .file_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| state.config.server.naming.object_name(&UploadId::new(), name));

    let ticket = state
        .provider
        .direct_upload_ticket(object_name.as_deref())
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Failed to issue direct upload ticket");
            ApiError::DirectTicket(e)
        })?;

    DIRECT_TICKETS_ISSUED.inc();
    tracing::info!(
        object = ?ticket.file_name,
        bucket = %ticket.bucket_name,
        "Direct upload ticket issued"
    );
    Ok(Json(ticket))
}
