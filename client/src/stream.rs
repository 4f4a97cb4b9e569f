/// Streaming progress source: when `POST /download-video` answers with the
/// artifact body itself instead of JSON, progress is computed from
/// incremental reads against the Content-Length header, with instantaneous
/// speed and ETA derived from elapsed wall-clock time.
///
/// Same UI contract as the polling source: snapshot in, render out.
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::errors::ClientResult;
use crate::models::{ProgressSnapshot, SnapshotStatus};
use crate::tracker::{ProgressView, Tracker};

/// Byte accounting for one streamed response.
#[derive(Debug)]
pub struct StreamStats {
    received: u64,
    total: Option<u64>,
}

impl StreamStats {
    pub fn new(total: Option<u64>) -> Self {
        Self { received: 0, total }
    }

    pub fn add(&mut self, bytes: u64) {
        self.received += bytes;
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// Percent complete; None when the length is unknown.
    pub fn percent(&self) -> Option<f64> {
        let total = self.total?;
        if total == 0 {
            return None;
        }
        Some((self.received as f64 / total as f64 * 100.0).min(100.0))
    }

    /// Bytes per second over the elapsed wall-clock time.
    pub fn speed_bps(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.received as f64 / secs
    }

    /// Estimated remaining time from bytes-so-far and elapsed time.
    pub fn eta(&self, elapsed: Duration) -> Option<Duration> {
        let total = self.total?;
        let remaining = total.saturating_sub(self.received);
        let speed = self.speed_bps(elapsed);
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / speed))
    }

    /// Render-ready snapshot for the current byte count.
    pub fn snapshot(&self, elapsed: Duration) -> ProgressSnapshot {
        let speed = format_speed(self.speed_bps(elapsed));
        match self.percent() {
            Some(percent) => {
                let eta = self
                    .eta(elapsed)
                    .map(|d| format!(", ETA {}s", d.as_secs()))
                    .unwrap_or_default();
                ProgressSnapshot {
                    percent,
                    status: SnapshotStatus::Downloading,
                    message: format!("Downloading: {}% ({}{})", percent.round(), speed, eta),
                }
            }
            None => ProgressSnapshot {
                percent: 0.0,
                status: SnapshotStatus::Downloading,
                message: format!("Downloading: {} ({})", format_bytes(self.received), speed),
            },
        }
    }
}

/// Format a byte count as MB/KB/B.
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a transfer rate as MB/s or KB/s.
pub fn format_speed(bps: f64) -> String {
    if bps >= 1024.0 * 1024.0 {
        format!("{:.1} MB/s", bps / (1024.0 * 1024.0))
    } else {
        format!("{:.1} KB/s", bps / 1024.0)
    }
}

/// Pick a filename for a streamed response: Content-Disposition first, then
/// the final URL path segment, then a fixed default.
pub fn response_filename(response: &reqwest::Response) -> String {
    if let Some(value) = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(name) = value
            .split(';')
            .filter_map(|part| part.trim().strip_prefix("filename="))
            .next()
        {
            let name = name.trim_matches('"');
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }
    response
        .url()
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "clearmark-download".to_string())
}

/// Consume a streamed download response: write the body to the download
/// directory while feeding progress snapshots through the tracker and view.
/// Returns None when cancelled (the partial file is removed).
pub async fn consume<V: ProgressView>(
    mut response: reqwest::Response,
    config: &ClientConfig,
    tracker: &mut Tracker,
    view: &mut V,
    cancel: &CancellationToken,
) -> ClientResult<Option<PathBuf>> {
    let filename = response_filename(&response);
    let total = response.content_length();
    debug!(
        "Streaming {} ({})",
        filename,
        total.map(format_bytes).unwrap_or_else(|| "unknown length".to_string())
    );

    tokio::fs::create_dir_all(&config.download_dir).await?;
    let path = PathBuf::from(&config.download_dir).join(&filename);
    let mut file = tokio::fs::File::create(&path).await?;

    let mut stats = StreamStats::new(total);
    let started = Instant::now();
    let mut last_rendered: i64 = -1;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                warn!("Stream cancelled after {}", format_bytes(stats.received()));
                drop(file);
                let _ = tokio::fs::remove_file(&path).await;
                tracker.cancel();
                return Ok(None);
            }
            chunk = response.chunk() => chunk?,
        };
        let Some(chunk) = chunk else { break };

        file.write_all(&chunk).await?;
        stats.add(chunk.len() as u64);

        // Re-render only when the visible number moves.
        let marker = stats
            .percent()
            .map(|p| p.round() as i64)
            .unwrap_or_else(|| (stats.received() / (1024 * 1024)) as i64);
        if marker != last_rendered {
            last_rendered = marker;
            let snapshot = stats.snapshot(started.elapsed());
            view.render(&snapshot);
            tracker.observe(&snapshot);
        }
    }

    file.flush().await?;
    tracker.complete();
    view.render(&ProgressSnapshot::complete());
    info!("Stream complete: {}", path.display());
    Ok(Some(path))
}
