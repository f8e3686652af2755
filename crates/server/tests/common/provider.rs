//! In-process storage provider double.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uprelay_core::ProgressSink;
use uprelay_upstream::encoding::encode_component;
use uprelay_upstream::{
    Authorization, DirectUploadTicket, ProgressStream, StorageProvider, StoredObject,
    UploadSource, UploadTarget, UpstreamError, UpstreamResult,
};

pub const DOWNLOAD_URL: &str = "https://f001.example.test";
pub const BUCKET: &str = "mybucket";

/// Records each protocol step and drains upload bodies at a set pace.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedProvider {
    calls: Mutex<Vec<&'static str>>,
    received: Mutex<Vec<(String, u64)>>,
    reject_auth: bool,
    fail_upload: bool,
    chunk_delay: Duration,
}

#[allow(dead_code)]
impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Provider whose credential exchange is refused.
    pub fn rejecting_credentials() -> Arc<Self> {
        Arc::new(Self {
            reject_auth: true,
            ..Default::default()
        })
    }

    /// Provider that refuses the upload step.
    pub fn failing_uploads() -> Arc<Self> {
        Arc::new(Self {
            fail_upload: true,
            ..Default::default()
        })
    }

    /// Provider that sleeps between body chunks.
    pub fn slow(chunk_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            chunk_delay,
            ..Default::default()
        })
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    /// Object names and byte counts of every upload drained.
    pub fn received(&self) -> Vec<(String, u64)> {
        self.received.lock().unwrap().clone()
    }

    fn record(&self, step: &'static str) {
        self.calls.lock().unwrap().push(step);
    }
}

#[async_trait]
impl StorageProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn authorize(&self) -> UpstreamResult<Authorization> {
        self.record("authorize");
        if self.reject_auth {
            return Err(UpstreamError::Auth {
                status: Some(401),
                body: r#"{"code":"unauthorized"}"#.to_string(),
            });
        }
        Ok(Authorization {
            api_url: "https://api.example.test".to_string(),
            token: "account-token".to_string(),
            download_url: DOWNLOAD_URL.to_string(),
        })
    }

    async fn get_upload_target(&self, _auth: &Authorization) -> UpstreamResult<UploadTarget> {
        self.record("get_upload_target");
        Ok(UploadTarget {
            upload_url: "https://pod.example.test/upload".to_string(),
            token: "upload-token".to_string(),
        })
    }

    async fn upload(
        &self,
        _target: &UploadTarget,
        source: UploadSource,
        progress: Arc<dyn ProgressSink>,
    ) -> UpstreamResult<StoredObject> {
        self.record("upload");
        let mut body = ProgressStream::new(source.body, progress);
        let mut total = 0u64;
        while let Some(chunk) = body.next().await {
            total += chunk?.len() as u64;
            if !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
        }

        if self.fail_upload {
            return Err(UpstreamError::Upload {
                status: 503,
                body: "service_unavailable".to_string(),
            });
        }

        self.received
            .lock()
            .unwrap()
            .push((source.object_name.clone(), total));
        Ok(StoredObject {
            file_name: source.object_name,
            file_id: Some("file-id".to_string()),
        })
    }

    fn public_url(&self, auth: &Authorization, stored: &StoredObject) -> String {
        format!(
            "{}/file/{}/{}",
            auth.download_url,
            BUCKET,
            encode_component(&stored.file_name)
        )
    }

    async fn direct_upload_ticket(
        &self,
        object_name: Option<&str>,
    ) -> UpstreamResult<DirectUploadTicket> {
        self.record("direct_upload_ticket");
        Ok(DirectUploadTicket {
            upload_url: "https://pod.example.test/upload".to_string(),
            authorization_token: Some("upload-token".to_string()),
            download_url: DOWNLOAD_URL.to_string(),
            bucket_name: BUCKET.to_string(),
            file_name: object_name.map(str::to_string),
            public_url: object_name.map(|name| {
                format!("{DOWNLOAD_URL}/file/{BUCKET}/{}", encode_component(name))
            }),
        })
    }
}
