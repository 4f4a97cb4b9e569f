/// Wire and domain models shared across the Clearmark client.
use serde::{Deserialize, Serialize};

/// Requested media kind for a download.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Video,
    Audio,
}

impl MediaType {
    pub fn as_str(&self) -> &str {
        match self {
            MediaType::Video => "video",
            MediaType::Audio => "audio",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Body of `POST /download-video`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    #[serde(rename = "downloadType")]
    pub media_type: MediaType,
    pub quality: String,
    pub format: String,
}

impl DownloadRequest {
    /// Build a request with the quality string normalized.
    pub fn new(url: impl Into<String>, media_type: MediaType, quality: &str, format: &str) -> Self {
        Self {
            url: url.into(),
            media_type,
            quality: normalize_quality(quality),
            format: format.to_string(),
        }
    }

    /// Reject empty or malformed URLs before any network call.
    pub fn validate(&self) -> Result<(), crate::errors::ClientError> {
        validate_url(&self.url)
    }
}

/// Check that a URL is non-empty and well-formed.
pub fn validate_url(url: &str) -> Result<(), crate::errors::ClientError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(crate::errors::ClientError::Validation(
            "Please enter a URL".to_string(),
        ));
    }
    reqwest::Url::parse(trimmed)
        .map_err(|_| crate::errors::ClientError::Validation(format!("Not a valid URL: {}", trimmed)))?;
    Ok(())
}

/// Normalize a quality string: bare resolution numbers gain a `p` suffix
/// ("720" -> "720p"); "best" and already-suffixed values pass through.
pub fn normalize_quality(quality: &str) -> String {
    let q = quality.trim();
    if q.chars().all(|c| c.is_ascii_digit()) && !q.is_empty() {
        format!("{}p", q)
    } else {
        q.to_string()
    }
}

/// Strip query parameters and trailing slashes from a share URL
/// (Instagram links arrive with tracking queries attached).
pub fn clean_share_url(url: &str) -> String {
    let base = url.split('?').next().unwrap_or(url);
    base.trim_end_matches('/').to_string()
}

// ====== PROGRESS ======

/// Raw wire shape of `GET /download-progress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub status: String,
}

/// Classified status of one progress snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Pending,
    Downloading,
    Processing,
    Complete,
    Error,
}

impl std::fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotStatus::Pending => write!(f, "pending"),
            SnapshotStatus::Downloading => write!(f, "downloading"),
            SnapshotStatus::Processing => write!(f, "processing"),
            SnapshotStatus::Complete => write!(f, "complete"),
            SnapshotStatus::Error => write!(f, "error"),
        }
    }
}

/// One polled progress report, classified and ready to render.
/// Transient: polled repeatedly, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Percent complete, 0-100.
    pub percent: f64,
    pub status: SnapshotStatus,
    pub message: String,
}

impl ProgressSnapshot {
    /// Classify a raw report using the configured error prefix.
    ///
    /// Status string conventions from the backend: "Processing...",
    /// strings prefixed "Error", or numeric completion via progress >= 100.
    pub fn from_report(report: &ProgressReport, error_prefix: &str) -> Self {
        let percent = report.progress.clamp(0.0, 100.0);
        if report.status.starts_with(error_prefix) {
            return Self {
                percent,
                status: SnapshotStatus::Error,
                message: report.status.clone(),
            };
        }
        // Post-processing can hold at 100% for a while; the explicit status
        // outranks the percent, so polling continues until it clears.
        if report.status == "Processing..." {
            return Self {
                percent,
                status: SnapshotStatus::Processing,
                message: "Processing video, please wait...".to_string(),
            };
        }
        if report.progress >= 100.0 || report.status == "complete" {
            return Self {
                percent: 100.0,
                status: SnapshotStatus::Complete,
                message: "Download complete!".to_string(),
            };
        }
        let message = if report.status.is_empty() {
            format!("Downloading: {}%", percent.round())
        } else {
            report.status.clone()
        };
        Self {
            percent,
            status: SnapshotStatus::Downloading,
            message,
        }
    }

    /// Snapshot shown before the first report arrives.
    pub fn starting() -> Self {
        Self {
            percent: 0.0,
            status: SnapshotStatus::Pending,
            message: "Starting download...".to_string(),
        }
    }

    /// Terminal snapshot used when the request resolves directly.
    pub fn complete() -> Self {
        Self {
            percent: 100.0,
            status: SnapshotStatus::Complete,
            message: "Download complete!".to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, SnapshotStatus::Complete | SnapshotStatus::Error)
    }
}

// ====== VIDEO INFO ======

/// Metadata returned by `POST /fetch-video-info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub title: String,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub uploader: String,
    #[serde(default)]
    pub view_count: u64,
    /// Available video heights, e.g. [2160, 1080, 720].
    #[serde(default)]
    pub available_qualities: Vec<u32>,
}

impl VideoInfo {
    /// Duration as "M:SS".
    pub fn duration_display(&self) -> String {
        format!("{}:{:02}", self.duration / 60, self.duration % 60)
    }

    /// Quality menu entries as (value, label), "best" first.
    pub fn quality_options(&self) -> Vec<(String, String)> {
        let mut options = vec![("best".to_string(), "Best".to_string())];
        for &height in &self.available_qualities {
            let label = if height >= 2160 {
                format!("4K ({}p)", height)
            } else if height >= 1440 {
                format!("2K ({}p)", height)
            } else {
                format!("{}p", height)
            };
            options.push((height.to_string(), label));
        }
        options
    }
}

/// Completion payload: opaque URL plus suggested filename for the
/// client-side save. No integrity verification happens client-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadReady {
    pub download_url: String,
    pub filename: String,
}

/// Payload of `GET /api/download/cache-status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    #[serde(default)]
    pub cached_videos: u64,
}

// ====== INSTAGRAM ======

/// Profile contents returned by `POST /instagram-download`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramContent {
    pub username: String,
    #[serde(default)]
    pub videos: Vec<InstagramPost>,
}

/// One post in an Instagram profile listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramPost {
    /// "reel", "video" or "photo".
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub duration_string: String,
    #[serde(default)]
    pub view_count: u64,
    /// Extra media URLs for carousel posts.
    #[serde(default)]
    pub additional_media: Vec<String>,
}
