/// Typed HTTP client for the Clearmark backend.
///
/// All heavy lifting (fetching, transcoding, watermark removal) happens
/// server-side; this wrapper speaks the backend's JSON contracts and maps
/// `{success: false, error}` payloads into the error taxonomy.
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::errors::{ClientError, ClientResult};
use crate::models::{
    clean_share_url, validate_url, CacheStatus, DownloadReady, DownloadRequest, InstagramContent,
    ProgressReport, VideoInfo,
};

/// Outcome of `POST /download-video`: either a JSON completion payload or
/// the artifact body itself (streaming variant).
pub enum DownloadStarted {
    Ready(DownloadReady),
    Stream(reqwest::Response),
}

/// HTTP client bound to one backend base URL.
pub struct BackendClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl BackendClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Map a `{success: false, error}` payload to a backend error.
    fn check_success(body: &serde_json::Value) -> ClientResult<()> {
        if body.get("success").and_then(|v| v.as_bool()) == Some(false) {
            let message = body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("request failed");
            return Err(ClientError::Backend(message.to_string()));
        }
        Ok(())
    }

    /// `POST /fetch-video-info` - metadata for the URL before downloading.
    pub async fn fetch_video_info(&self, url: &str) -> ClientResult<VideoInfo> {
        validate_url(url)?;
        debug!("Fetching video info for {}", url);
        let response = self
            .http
            .post(self.endpoint("/fetch-video-info"))
            .json(&serde_json::json!({ "url": url.trim() }))
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = response.json().await?;
        Self::check_success(&body)?;
        let info = body
            .get("video_info")
            .cloned()
            .ok_or_else(|| ClientError::Backend("missing video_info in response".to_string()))?;
        Ok(serde_json::from_value(info)?)
    }

    /// `POST /download-video` - start a download. The backend answers either
    /// with `{success, download_url, filename}` or with the artifact body
    /// itself; dispatch on the response Content-Type.
    pub async fn start_download(&self, request: &DownloadRequest) -> ClientResult<DownloadStarted> {
        request.validate()?;
        info!(
            "Requesting {} download of {} ({} / {})",
            request.media_type, request.url, request.quality, request.format
        );
        let response = self
            .http
            .post(self.endpoint("/download-video"))
            .json(request)
            .send()
            .await?
            .error_for_status()?;

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("application/json"))
            .unwrap_or(false);
        if !is_json {
            return Ok(DownloadStarted::Stream(response));
        }

        let body: serde_json::Value = response.json().await?;
        Self::check_success(&body)?;
        Ok(DownloadStarted::Ready(serde_json::from_value(body)?))
    }

    /// `GET /download-progress` - one poll tick.
    pub async fn download_progress(&self) -> ClientResult<ProgressReport> {
        let response = self
            .http
            .get(self.endpoint("/download-progress"))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// `GET /api/download/cache-status`.
    pub async fn cache_status(&self) -> ClientResult<CacheStatus> {
        let response = self
            .http
            .get(self.endpoint("/api/download/cache-status"))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// `POST /instagram-download` - list a profile's posts. The share URL is
    /// cleaned (query string, trailing slash) before submission.
    pub async fn instagram_download(&self, url: &str) -> ClientResult<InstagramContent> {
        let cleaned = clean_share_url(url.trim());
        validate_url(&cleaned)?;
        let response = self
            .http
            .post(self.endpoint("/instagram-download"))
            .json(&serde_json::json!({ "url": cleaned }))
            .send()
            .await?;

        // Errors arrive as JSON bodies on non-OK statuses here.
        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("download failed");
            return Err(ClientError::Backend(message.to_string()));
        }
        Self::check_success(&body)?;
        let content = body
            .get("content")
            .cloned()
            .ok_or_else(|| ClientError::Backend("missing content in response".to_string()))?;
        Ok(serde_json::from_value(content)?)
    }

    /// `POST /upload-video` - multipart upload of a local video plus the
    /// serialized `regions` field for watermark removal. An empty region
    /// field never leaves the client.
    pub async fn upload_video(&self, file: &Path, regions_field: &str) -> ClientResult<DownloadReady> {
        if regions_field.is_empty() {
            return Err(ClientError::EmptyRegionSet);
        }
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ClientError::Validation(format!("Not a file: {}", file.display())))?;
        let bytes = tokio::fs::read(file).await?;
        info!("Uploading {} ({} regions field bytes)", filename, regions_field.len());

        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("regions", regions_field.to_string());
        let response = self
            .http
            .post(self.endpoint("/upload-video"))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = response.json().await?;
        Self::check_success(&body)?;
        Ok(serde_json::from_value(body)?)
    }

    /// Save a completed artifact from its server-provided opaque URL into
    /// the download directory. No integrity verification happens here; the
    /// artifact is the server's responsibility.
    pub async fn save_artifact(&self, ready: &DownloadReady) -> ClientResult<PathBuf> {
        let url = if ready.download_url.starts_with("http") {
            ready.download_url.clone()
        } else {
            self.endpoint(&ready.download_url)
        };
        debug!("Saving artifact {} from {}", ready.filename, url);

        let mut response = self.http.get(url).send().await?.error_for_status()?;
        tokio::fs::create_dir_all(&self.config.download_dir).await?;
        let path = PathBuf::from(&self.config.download_dir).join(&ready.filename);
        let mut file = tokio::fs::File::create(&path).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(path)
    }
}
