//! Storage provider trait definitions.

use crate::error::UpstreamResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use uprelay_core::ProgressSink;

/// A boxed stream of bytes for streaming uploads.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Content type used when the client declared none.
pub const DEFAULT_CONTENT_TYPE: &str = "b2/x-auto";

/// Read size when streaming a spooled file upstream.
const FILE_CHUNK_SIZE: usize = 64 * 1024;

/// Short-lived session with the provider's API.
#[derive(Clone)]
pub struct Authorization {
    /// Root for subsequent API calls.
    pub api_url: String,
    /// Bearer token for subsequent API calls.
    pub token: String,
    /// Root for public downloads.
    pub download_url: String,
}

impl std::fmt::Debug for Authorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorization")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .field("download_url", &self.download_url)
            .finish()
    }
}

/// One-time target for a single object upload.
#[derive(Clone)]
pub struct UploadTarget {
    /// URL receiving the object bytes.
    pub upload_url: String,
    /// Upload-scoped token.
    pub token: String,
}

impl std::fmt::Debug for UploadTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadTarget")
            .field("upload_url", &self.upload_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// The object to push upstream.
pub struct UploadSource {
    /// Name the object is stored under.
    pub object_name: String,
    /// Declared content type.
    pub content_type: Option<String>,
    /// Exact body length, sent as `Content-Length`.
    pub content_length: u64,
    pub body: ByteStream,
}

impl UploadSource {
    /// Stream a file from disk. The length is taken from file metadata.
    pub async fn from_file(
        path: &Path,
        object_name: impl Into<String>,
        content_type: Option<String>,
    ) -> UpstreamResult<Self> {
        let file = tokio::fs::File::open(path).await?;
        let content_length = file.metadata().await?.len();
        Ok(Self {
            object_name: object_name.into(),
            content_type,
            content_length,
            body: Box::pin(ReaderStream::with_capacity(file, FILE_CHUNK_SIZE)),
        })
    }

    /// Content type to send, falling back to provider auto-detection.
    pub fn content_type_or_default(&self) -> &str {
        self.content_type
            .as_deref()
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}

/// What the provider stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// Server-assigned object name.
    pub file_name: String,
    /// Provider object ID, when the provider returns one.
    pub file_id: Option<String>,
}

/// Target for a client-side upload that bypasses the relay.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectUploadTicket {
    pub upload_url: String,
    /// Upload-scoped token. Absent for providers whose only credential is
    /// the long-lived service key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_token: Option<String>,
    pub download_url: String,
    pub bucket_name: String,
    /// Name the client must store the object under, when fixed up front.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Public URL of the object, when the object name is fixed up front.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

/// The three-step provider protocol: authorize, acquire an upload target,
/// push the bytes.
#[async_trait]
pub trait StorageProvider: Send + Sync + 'static {
    /// Short provider name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Exchange long-lived credentials for an API session.
    async fn authorize(&self) -> UpstreamResult<Authorization>;

    /// Request a one-time upload URL and upload-scoped token.
    async fn get_upload_target(&self, auth: &Authorization) -> UpstreamResult<UploadTarget>;

    /// Stream the object to the target, reporting cumulative bytes handed
    /// to the connection.
    async fn upload(
        &self,
        target: &UploadTarget,
        source: UploadSource,
        progress: Arc<dyn ProgressSink>,
    ) -> UpstreamResult<StoredObject>;

    /// Public download reference for a stored object.
    fn public_url(&self, auth: &Authorization, stored: &StoredObject) -> String;

    /// Issue a target the client can upload to directly.
    async fn direct_upload_ticket(
        &self,
        object_name: Option<&str>,
    ) -> UpstreamResult<DirectUploadTicket>;
}
