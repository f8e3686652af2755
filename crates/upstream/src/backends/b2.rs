//! Backblaze B2 native API client (b2api v2).

use crate::encoding::encode_component;
use crate::error::{UpstreamError, UpstreamResult};
use crate::progress::ProgressStream;
use crate::traits::{
    Authorization, DirectUploadTicket, StorageProvider, StoredObject, UploadSource, UploadTarget,
};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use uprelay_core::ProgressSink;
use uprelay_core::config::B2Settings;

/// Header carrying the percent-encoded object name.
const FILE_NAME_HEADER: &str = "X-Bz-File-Name";

/// Header carrying the content hash policy.
const CONTENT_SHA1_HEADER: &str = "X-Bz-Content-Sha1";

/// Hashing is skipped: the body is streamed and never buffered for SHA-1.
const DO_NOT_VERIFY: &str = "do_not_verify";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeAccountResponse {
    api_url: String,
    authorization_token: String,
    download_url: String,
    #[serde(default)]
    account_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetUploadUrlResponse {
    #[serde(default)]
    bucket_id: Option<String>,
    upload_url: String,
    authorization_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadFileResponse {
    file_name: String,
    #[serde(default)]
    file_id: Option<String>,
}

/// Backblaze B2 provider.
pub struct B2Backend {
    http: reqwest::Client,
    settings: B2Settings,
}

impl std::fmt::Debug for B2Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("B2Backend")
            .field("api_url", &self.settings.api_url)
            .field("key_id", &self.settings.key_id)
            .field("bucket_id", &self.settings.bucket_id)
            .field("bucket_name", &self.settings.bucket_name)
            .finish_non_exhaustive()
    }
}

impl B2Backend {
    /// Create a new B2 backend with its own HTTP client.
    pub fn new(settings: B2Settings) -> UpstreamResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self::with_client(http, settings))
    }

    /// Create a B2 backend on a caller-provided HTTP client.
    pub fn with_client(http: reqwest::Client, settings: B2Settings) -> Self {
        Self { http, settings }
    }

    pub fn bucket_name(&self) -> &str {
        &self.settings.bucket_name
    }

    fn basic_auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.settings.key_id, self.settings.application_key);
        format!("Basic {}", STANDARD.encode(credentials))
    }
}

/// Read a response body, turning non-success statuses into `Auth` errors.
async fn read_auth_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    step: &str,
) -> UpstreamResult<T> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(UpstreamError::Auth {
            status: Some(status.as_u16()),
            body,
        });
    }
    serde_json::from_str(&body)
        .map_err(|e| UpstreamError::InvalidResponse(format!("{step} response: {e}: {body}")))
}

#[async_trait]
impl StorageProvider for B2Backend {
    fn name(&self) -> &'static str {
        "b2"
    }

    #[instrument(skip(self), fields(backend = "b2"))]
    async fn authorize(&self) -> UpstreamResult<Authorization> {
        let url = format!("{}/b2api/v2/b2_authorize_account", self.settings.api_url);
        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, self.basic_auth_header())
            .send()
            .await
            .map_err(|e| UpstreamError::Auth {
                status: None,
                body: format!("provider unreachable: {e}"),
            })?;

        let auth: AuthorizeAccountResponse =
            read_auth_response(response, "b2_authorize_account").await?;

        tracing::debug!(
            api_url = %auth.api_url,
            account_id = ?auth.account_id,
            "B2 account authorized"
        );

        Ok(Authorization {
            api_url: auth.api_url.trim_end_matches('/').to_string(),
            token: auth.authorization_token,
            download_url: auth.download_url.trim_end_matches('/').to_string(),
        })
    }

    #[instrument(skip(self, auth), fields(backend = "b2"))]
    async fn get_upload_target(&self, auth: &Authorization) -> UpstreamResult<UploadTarget> {
        let url = format!("{}/b2api/v2/b2_get_upload_url", auth.api_url);
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, &auth.token)
            .json(&serde_json::json!({ "bucketId": self.settings.bucket_id }))
            .send()
            .await
            .map_err(|e| UpstreamError::Auth {
                status: None,
                body: format!("provider unreachable: {e}"),
            })?;

        let target: GetUploadUrlResponse =
            read_auth_response(response, "b2_get_upload_url").await?;

        if let Some(bucket_id) = target.bucket_id.as_deref()
            && bucket_id != self.settings.bucket_id
        {
            return Err(UpstreamError::InvalidResponse(format!(
                "upload URL issued for bucket {bucket_id}, expected {}",
                self.settings.bucket_id
            )));
        }

        Ok(UploadTarget {
            upload_url: target.upload_url,
            token: target.authorization_token,
        })
    }

    #[instrument(
        skip(self, target, source, progress),
        fields(backend = "b2", object = %source.object_name, size = source.content_length)
    )]
    async fn upload(
        &self,
        target: &UploadTarget,
        source: UploadSource,
        progress: Arc<dyn ProgressSink>,
    ) -> UpstreamResult<StoredObject> {
        let content_type = source.content_type_or_default().to_string();
        let body = reqwest::Body::wrap_stream(ProgressStream::new(source.body, progress));

        let response = self
            .http
            .post(&target.upload_url)
            .header(AUTHORIZATION, &target.token)
            .header(FILE_NAME_HEADER, encode_component(&source.object_name))
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, source.content_length)
            .header(CONTENT_SHA1_HEADER, DO_NOT_VERIFY)
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

        let uploaded: UploadFileResponse = serde_json::from_str(&body).map_err(|e| {
            UpstreamError::InvalidResponse(format!("b2_upload_file response: {e}: {body}"))
        })?;

        tracing::debug!(
            file_name = %uploaded.file_name,
            file_id = ?uploaded.file_id,
            "B2 upload acknowledged"
        );

        Ok(StoredObject {
            file_name: uploaded.file_name,
            file_id: uploaded.file_id,
        })
    }

    fn public_url(&self, auth: &Authorization, stored: &StoredObject) -> String {
        format!(
            "{}/file/{}/{}",
            auth.download_url,
            self.settings.bucket_name,
            encode_component(&stored.file_name)
        )
    }

    async fn direct_upload_ticket(
        &self,
        object_name: Option<&str>,
    ) -> UpstreamResult<DirectUploadTicket> {
        let auth = self.authorize().await?;
        let target = self.get_upload_target(&auth).await?;
        let public_url = object_name.map(|name| {
            self.public_url(
                &auth,
                &StoredObject {
                    file_name: name.to_string(),
                    file_id: None,
                },
            )
        });

        Ok(DirectUploadTicket {
            upload_url: target.upload_url,
            authorization_token: Some(target.token),
            download_url: auth.download_url,
            bucket_name: self.settings.bucket_name.clone(),
            file_name: object_name.map(str::to_string),
            public_url,
        })
    }
}
