//! Supabase Storage client.
//!
//! Supabase has no credential exchange or one-time upload URLs: the service
//! key is the bearer token and the object URL is the upload target. The
//! three-step protocol still applies, with the first two steps computed
//! locally.

use crate::encoding::encode_component;
use crate::error::{UpstreamError, UpstreamResult};
use crate::progress::ProgressStream;
use crate::traits::{
    Authorization, DirectUploadTicket, StorageProvider, StoredObject, UploadSource, UploadTarget,
};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use uprelay_core::ProgressSink;
use uprelay_core::config::SupabaseSettings;

const UPSERT_HEADER: &str = "x-upsert";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Content type for uploads that declared none. Supabase has no
/// auto-detection token.
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
struct UploadObjectResponse {
    #[serde(rename = "Key", default)]
    key: Option<String>,
}

/// Supabase Storage provider.
pub struct SupabaseBackend {
    http: reqwest::Client,
    settings: SupabaseSettings,
}

impl std::fmt::Debug for SupabaseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseBackend")
            .field("url", &self.settings.url)
            .field("bucket", &self.settings.bucket)
            .finish_non_exhaustive()
    }
}

impl SupabaseBackend {
    pub fn new(settings: SupabaseSettings) -> UpstreamResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self::with_client(http, settings))
    }

    pub fn with_client(http: reqwest::Client, settings: SupabaseSettings) -> Self {
        Self { http, settings }
    }

    /// `{url}/storage/v1/object/{bucket}/{object}`.
    fn object_url(&self, object_name: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.settings.url,
            encode_component(&self.settings.bucket),
            encode_component(object_name)
        )
    }

    /// `{url}/storage/v1/object/public/{bucket}/{object}`.
    fn public_object_url(&self, object_name: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.settings.url,
            encode_component(&self.settings.bucket),
            encode_component(object_name)
        )
    }
}

#[async_trait]
impl StorageProvider for SupabaseBackend {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn authorize(&self) -> UpstreamResult<Authorization> {
        Ok(Authorization {
            api_url: format!("{}/storage/v1", self.settings.url),
            token: self.settings.service_key.clone(),
            download_url: format!("{}/storage/v1/object/public", self.settings.url),
        })
    }

    async fn get_upload_target(&self, auth: &Authorization) -> UpstreamResult<UploadTarget> {
        // The object name is only known at upload time; the target carries
        // the bucket root.
        Ok(UploadTarget {
            upload_url: format!(
                "{}/object/{}",
                auth.api_url,
                encode_component(&self.settings.bucket)
            ),
            token: auth.token.clone(),
        })
    }

    #[instrument(
        skip(self, target, source, progress),
        fields(backend = "supabase", object = %source.object_name, size = source.content_length)
    )]
    async fn upload(
        &self,
        target: &UploadTarget,
        source: UploadSource,
        progress: Arc<dyn ProgressSink>,
    ) -> UpstreamResult<StoredObject> {
        let content_type = source
            .content_type
            .as_deref()
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();
        let url = format!(
            "{}/{}",
            target.upload_url,
            encode_component(&source.object_name)
        );
        let body = reqwest::Body::wrap_stream(ProgressStream::new(source.body, progress));

        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", target.token))
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, source.content_length)
            .header(UPSERT_HEADER, "true")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(UpstreamError::Upload {
                status: status.as_u16(),
                body,
            });
        }

        let key = serde_json::from_str::<UploadObjectResponse>(&body)
            .ok()
            .and_then(|r| r.key);
        tracing::debug!(key = ?key, "Supabase upload acknowledged");

        Ok(StoredObject {
            file_name: source.object_name,
            file_id: key,
        })
    }

    fn public_url(&self, _auth: &Authorization, stored: &StoredObject) -> String {
        self.public_object_url(&stored.file_name)
    }

    async fn direct_upload_ticket(
        &self,
        object_name: Option<&str>,
    ) -> UpstreamResult<DirectUploadTicket> {
        let object_name = object_name.ok_or_else(|| {
            UpstreamError::InvalidRequest("supabase direct uploads require a fileName".to_string())
        })?;

        Ok(DirectUploadTicket {
            upload_url: self.object_url(object_name),
            authorization_token: None,
            download_url: format!("{}/storage/v1/object/public", self.settings.url),
            bucket_name: self.settings.bucket.clone(),
            file_name: Some(object_name.to_string()),
            public_url: Some(self.public_object_url(object_name)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SupabaseBackend {
        SupabaseBackend::with_client(
            reqwest::Client::new(),
            SupabaseSettings {
                url: "https://proj.supabase.co".to_string(),
                service_key: "service-key".to_string(),
                bucket: "audio files".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn ticket_never_exposes_service_key() {
        let ticket = backend()
            .direct_upload_ticket(Some("1700000000000-a.mp3"))
            .await
            .unwrap();
        assert!(ticket.authorization_token.is_none());
        assert_eq!(
            ticket.upload_url,
            "https://proj.supabase.co/storage/v1/object/audio%20files/1700000000000-a.mp3"
        );
        assert_eq!(
            ticket.public_url.as_deref(),
            Some("https://proj.supabase.co/storage/v1/object/public/audio%20files/1700000000000-a.mp3")
        );
        let json = serde_json::to_string(&ticket).unwrap();
        assert!(!json.contains("service-key"));
    }

    #[tokio::test]
    async fn ticket_requires_file_name() {
        assert!(matches!(
            backend().direct_upload_ticket(None).await,
            Err(UpstreamError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn upload_target_is_bucket_root() {
        let backend = backend();
        let auth = backend.authorize().await.unwrap();
        let target = backend.get_upload_target(&auth).await.unwrap();
        assert_eq!(
            target.upload_url,
            "https://proj.supabase.co/storage/v1/object/audio%20files"
        );
        assert_eq!(target.token, "service-key");
    }
}
