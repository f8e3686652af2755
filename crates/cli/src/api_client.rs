use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::Url;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::Path;
use tokio_util::io::ReaderStream;

pub const UPLOAD_ID_HEADER: &str = "X-Upload-Id";

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid server URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("failed to build API URL")
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = req
            .send()
            .await
            .with_context(|| format!("failed to reach server at {}", self.base_url))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let response = self.send(req).await?;
        let body = response.text().await.unwrap_or_default();
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.url("/health")?;
        self.send_json(self.http.get(url)).await
    }

    /// Stream a local file to `POST /upload` under the given id.
    pub async fn upload(
        &self,
        path: &Path,
        upload_id: &str,
        async_mode: bool,
    ) -> Result<UploadResponse> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        let len = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, len)
            .file_name(file_name)
            .mime_str(content_type_for(path).essence_str())?;
        let form = Form::new().text("uploadId", upload_id.to_string()).part("file", part);

        let mut url = self.url("/upload")?;
        if async_mode {
            url.set_query(Some("mode=async"));
        }
        let req = self
            .http
            .post(url)
            .header(UPLOAD_ID_HEADER, upload_id)
            .multipart(form);
        self.send_json(req).await
    }

    pub async fn progress(&self, upload_id: &str) -> Result<ProgressResponse> {
        let url = self.url(&format!("/progress/{upload_id}"))?;
        self.send_json(self.http.get(url)).await
    }

    /// Follow the progress event stream, calling `on_percent` per event,
    /// until the server closes it. Returns the last percentage seen.
    pub async fn watch<F>(&self, upload_id: &str, mut on_percent: F) -> Result<Option<u8>>
    where
        F: FnMut(u8),
    {
        let url = self.url(&format!("/progress/{upload_id}"))?;
        let response = self
            .send(self.http.get(url).header("Accept", "text/event-stream"))
            .await?;

        let mut decoder = EventDecoder::default();
        let mut last = None;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.context("progress stream interrupted")?;
            for percent in decoder.push(&chunk) {
                last = Some(percent);
                on_percent(percent);
            }
        }
        Ok(last)
    }

    pub async fn upload_url(&self, file_name: Option<&str>) -> Result<DirectUploadTicket> {
        let url = self.url("/upload-url")?;
        let req = DirectUploadRequest {
            file_name: file_name.map(str::to_string),
        };
        self.send_json(self.http.post(url).json(&req)).await
    }
}

/// Splits a `text/event-stream` body into progress percentages.
#[derive(Default)]
pub struct EventDecoder {
    buffer: String,
}

impl EventDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<u8> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            if let Some(percent) = parse_data_line(line.trim_end_matches(['\r', '\n'])) {
                out.push(percent);
            }
        }
        out
    }
}

fn parse_data_line(line: &str) -> Option<u8> {
    let value = line.strip_prefix("data:")?;
    value.trim().parse().ok()
}

fn content_type_for(path: &Path) -> mime_guess::Mime {
    mime_guess::from_path(path).first_or_octet_stream()
}

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub provider: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub upload_id: String,
    /// Absent when the server accepted the upload asynchronously.
    #[serde(default)]
    pub file_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub progress: f64,
    pub percent: u8,
    pub status: String,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectUploadRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectUploadTicket {
    pub upload_url: String,
    #[serde(default)]
    pub authorization_token: Option<String>,
    pub download_url: String,
    pub bucket_name: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub public_url: Option<String>,
}
