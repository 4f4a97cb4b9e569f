/// Unified error types for the Clearmark client.
use thiserror::Error;

/// Top-level error type for client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Input rejected before any network call (empty/malformed URL, bad size).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transport-level failure: connect error, timeout, non-OK status.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Application-level `{success: false, error}` payload from the backend.
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A download session is already in Requesting or Polling state.
    #[error("A download is already in progress")]
    SessionBusy,

    /// The progress stream reported an error-prefixed status.
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Region form submitted with no regions selected.
    #[error("No regions selected")]
    EmptyRegionSet,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Whether this error came from a single network exchange and should be
    /// treated as transient by the polling loop (logged, next tick retries).
    /// Protocol-level errors such as a malformed payload or an explicit
    /// backend rejection are not retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Http(_) | ClientError::Io(_))
    }
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = ClientError::Backend("Video unavailable".to_string());
        assert_eq!(err.to_string(), "Backend error: Video unavailable");
    }

    #[test]
    fn test_busy_is_not_transient() {
        assert!(!ClientError::SessionBusy.is_transient());
        assert!(!ClientError::EmptyRegionSet.is_transient());
        assert!(!ClientError::Backend("oops".to_string()).is_transient());
    }

    #[test]
    fn test_io_is_transient() {
        let err = ClientError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ));
        assert!(err.is_transient());
    }
}
