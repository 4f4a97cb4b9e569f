/// Client configuration: backend location, polling cadence, error-marker
/// convention, and where saved artifacts land.
use std::time::Duration;

/// Configuration for a [`crate::api::BackendClient`] and its sessions.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the backend, no trailing slash.
    pub base_url: String,
    /// Fixed polling cadence for `GET /download-progress`.
    pub poll_interval: Duration,
    /// Prefix marking an error status string from the progress endpoint.
    pub error_prefix: String,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Directory where completed artifacts are saved.
    pub download_dir: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            poll_interval: Duration::from_millis(1000),
            error_prefix: "Error".to_string(),
            request_timeout: Duration::from_secs(30),
            download_dir: "./downloads".to_string(),
        }
    }
}

impl ClientConfig {
    /// Read configuration from the environment, falling back to defaults.
    ///
    /// Variables: CLEARMARK_BASE_URL, CLEARMARK_POLL_INTERVAL_MS,
    /// CLEARMARK_ERROR_PREFIX, CLEARMARK_REQUEST_TIMEOUT_SECS, DOWNLOAD_DIR.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let poll_ms: u64 = std::env::var("CLEARMARK_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.poll_interval.as_millis() as u64);
        let timeout_secs: u64 = std::env::var("CLEARMARK_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.request_timeout.as_secs());
        Self {
            base_url: std::env::var("CLEARMARK_BASE_URL")
                .unwrap_or(defaults.base_url)
                .trim_end_matches('/')
                .to_string(),
            poll_interval: Duration::from_millis(poll_ms),
            error_prefix: std::env::var("CLEARMARK_ERROR_PREFIX").unwrap_or(defaults.error_prefix),
            request_timeout: Duration::from_secs(timeout_secs),
            download_dir: std::env::var("DOWNLOAD_DIR").unwrap_or(defaults.download_dir),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<String>) -> Self {
        self.download_dir = dir.into();
        self
    }
}
