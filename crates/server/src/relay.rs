//! Upload relay: spool the client's file, then push it upstream.
//!
//! The upstream sequence runs in its own task so a client that hangs up does
//! not cancel a transfer the provider has already started receiving. The
//! spooled temp file is owned by that task and removed when it ends, on
//! success, failure, or timeout alike.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{
    BYTES_RELAYED, UPLOAD_DURATION, UPLOADS_COMPLETED, record_upload_failure,
};
use crate::sessions::SessionWriter;
use axum::extract::multipart::{Field, MultipartError};
use axum::http::StatusCode;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uprelay_core::ProgressSink;
use uprelay_upstream::{StorageProvider, UploadSource};

/// A client file written to local disk.
#[derive(Debug)]
pub struct SpooledFile {
    /// Deleted when dropped.
    pub path: TempPath,
    pub file_name: String,
    pub content_type: Option<String>,
    pub size: u64,
}

/// Map a multipart read failure, keeping the body limit distinct.
pub fn multipart_error(e: MultipartError, limit: u64) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge { limit }
    } else {
        ApiError::InvalidRequest(format!("malformed multipart body: {}", e.body_text()))
    }
}

/// Stream one multipart field to a temp file under `dir`.
///
/// Fails with `PayloadTooLarge` as soon as more than `limit` bytes arrive;
/// the partial file is removed.
pub async fn spool_field(mut field: Field<'_>, dir: &Path, limit: u64) -> ApiResult<SpooledFile> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(str::to_string);

    let (file, path) = tempfile::Builder::new()
        .prefix("uprelay-")
        .tempfile_in(dir)
        .map_err(|e| ApiError::Internal(format!("failed to create temp file: {e}")))?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut size: u64 = 0;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        size += chunk.len() as u64;
        if size > limit {
            return Err(ApiError::PayloadTooLarge { limit });
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::Internal(format!("failed to spool upload: {e}")))?;
    }
    file.flush()
        .await
        .map_err(|e| ApiError::Internal(format!("failed to spool upload: {e}")))?;

    tracing::debug!(file_name = %file_name, size = size, "Upload spooled");

    Ok(SpooledFile {
        path,
        file_name,
        content_type,
        size,
    })
}

/// Everything a relay task needs.
pub struct RelayJob {
    pub writer: SessionWriter,
    pub file: SpooledFile,
    pub object_name: String,
}

/// Run the three upstream steps, returning the public URL.
async fn transfer(
    provider: &dyn StorageProvider,
    file: &SpooledFile,
    object_name: String,
    progress: Arc<dyn ProgressSink>,
) -> ApiResult<String> {
    let auth = provider.authorize().await.map_err(|e| {
        record_upload_failure("authorize");
        ApiError::UpstreamAuth(e)
    })?;

    let target = provider.get_upload_target(&auth).await.map_err(|e| {
        record_upload_failure("get_upload_target");
        ApiError::UpstreamAuth(e)
    })?;

    let source = UploadSource::from_file(&file.path, object_name, file.content_type.clone())
        .await
        .map_err(|e| ApiError::Internal(format!("failed to open spooled upload: {e}")))?;

    let stored = provider
        .upload(&target, source, progress)
        .await
        .map_err(|e| {
            record_upload_failure("upload");
            ApiError::UpstreamUpload(e)
        })?;

    Ok(provider.public_url(&auth, &stored))
}

/// Start the relay task for a spooled upload.
///
/// The task records the outcome on the session before returning it.
pub fn spawn_relay(
    provider: Arc<dyn StorageProvider>,
    timeout: Duration,
    job: RelayJob,
) -> JoinHandle<ApiResult<String>> {
    let RelayJob {
        writer,
        file,
        object_name,
    } = job;
    let span = tracing::info_span!(
        "relay",
        upload_id = %writer.id(),
        object = %object_name,
        size = file.size,
        provider = provider.name(),
    );

    tokio::spawn(
        async move {
            let writer = Arc::new(writer);
            let started = Instant::now();
            let size = file.size;

            let result = match tokio::time::timeout(
                timeout,
                transfer(provider.as_ref(), &file, object_name, writer.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => {
                    record_upload_failure("timeout");
                    Err(ApiError::UploadTimeout {
                        secs: timeout.as_secs(),
                    })
                }
            };

            match &result {
                Ok(url) => {
                    writer.complete(url);
                    UPLOADS_COMPLETED.inc();
                    BYTES_RELAYED.inc_by(size);
                    UPLOAD_DURATION.observe(started.elapsed().as_secs_f64());
                    tracing::info!(file_url = %url, "Upload stored");
                }
                Err(e) => {
                    writer.fail(&e.to_string());
                    tracing::warn!(error = %e, "Upload failed");
                }
            }

            drop(file);
            result
        }
        .instrument(span),
    )
}
