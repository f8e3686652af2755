//! Relay upload handler.

use crate::error::{ApiError, ApiResult};
use crate::metrics::UPLOADS_STARTED;
use crate::relay::{RelayJob, SpooledFile, multipart_error, spawn_relay, spool_field};
use crate::state::AppState;
use axum::Json;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use uprelay_core::UploadId;

/// Header a client may use to choose the upload ID.
pub const UPLOAD_ID_HEADER: &str = "x-upload-id";

/// Multipart field carrying the file.
const FILE_FIELD: &str = "file";

/// Multipart field a client may use to choose the upload ID.
const UPLOAD_ID_FIELD: &str = "uploadId";

/// When the relay answers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// After the provider has stored the object.
    #[default]
    Sync,
    /// As soon as the file is spooled; the outcome is read from `/progress`.
    Async,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    #[serde(default)]
    pub mode: UploadMode,
}

/// Response for a completed upload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub upload_id: UploadId,
    pub file_url: String,
}

/// Response for an accepted asynchronous upload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAccepted {
    pub success: bool,
    pub upload_id: UploadId,
}

fn header_upload_id(headers: &HeaderMap) -> ApiResult<Option<UploadId>> {
    headers
        .get(UPLOAD_ID_HEADER)
        .map(|value| -> ApiResult<UploadId> {
            let value = value
                .to_str()
                .map_err(|_| ApiError::InvalidRequest("invalid X-Upload-Id header".to_string()))?;
            Ok(UploadId::parse(value.trim())?)
        })
        .transpose()
}

/// POST /upload - Relay one multipart file to the storage provider.
///
/// The upload ID comes from the `uploadId` field, the `X-Upload-Id` header,
/// or is generated. The session exists from the moment the file is spooled,
/// so clients that chose their ID can follow progress before this returns.
pub async fn upload_file(
    State(state): State<AppState>,
    query: Result<Query<UploadQuery>, QueryRejection>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;
    let mut multipart = multipart?;
    let limit = state.config.server.max_upload_size;
    let temp_dir = state.config.server.temp_dir();

    let mut upload_id = header_upload_id(&headers)?;
    let mut spooled: Option<SpooledFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(UPLOAD_ID_FIELD) => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, limit))?;
                let id = UploadId::parse(value.trim())?;
                if state.sessions.contains(&id) {
                    return Err(ApiError::Conflict(format!("upload {id} already exists")));
                }
                upload_id = Some(id);
            }
            Some(FILE_FIELD) if spooled.is_none() => {
                spooled = Some(spool_field(field, &temp_dir, limit).await?);
            }
            _ => {}
        }
    }

    let file = spooled.ok_or_else(|| ApiError::InvalidRequest("No file uploaded".to_string()))?;
    let id = upload_id.unwrap_or_default();
    let object_name = state
        .config
        .server
        .naming
        .object_name(&id, &file.file_name);

    let writer = state.sessions.create(
        id.clone(),
        file.file_name.clone(),
        file.content_type.clone(),
        file.size,
    )?;
    UPLOADS_STARTED.inc();
    tracing::info!(
        upload_id = %id,
        file_name = %file.file_name,
        object = %object_name,
        size = file.size,
        mode = ?query.mode,
        "Upload accepted"
    );

    let relay = spawn_relay(
        state.provider.clone(),
        state.config.server.upload_timeout(),
        RelayJob {
            writer,
            file,
            object_name,
        },
    );

    match query.mode {
        UploadMode::Async => Ok((
            StatusCode::ACCEPTED,
            Json(UploadAccepted {
                success: true,
                upload_id: id,
            }),
        )
            .into_response()),
        UploadMode::Sync => {
            let file_url = relay
                .await
                .map_err(|e| ApiError::Internal(format!("relay task failed: {e}")))??;
            Ok(Json(UploadResponse {
                success: true,
                upload_id: id,
                file_url,
            })
            .into_response())
        }
    }
}
