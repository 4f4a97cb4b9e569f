/// Download progress tracker: a session state machine driven by a fixed-
/// cadence polling loop against `GET /download-progress`.
///
/// The machine itself is synchronous and pure; the async plumbing around it
/// owns the cadence, the at-most-one-outstanding-poll rule, and
/// cancellation.
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{BackendClient, DownloadStarted};
use crate::errors::{ClientError, ClientResult};
use crate::models::{DownloadRequest, ProgressReport, ProgressSnapshot, SnapshotStatus};

/// Phase of a download session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    Idle,
    Requesting,
    Polling,
    /// Terminal: artifact ready.
    Complete,
    /// Terminal: progress stream reported an error.
    Failed,
}

impl std::fmt::Display for TrackerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerPhase::Idle => write!(f, "idle"),
            TrackerPhase::Requesting => write!(f, "requesting"),
            TrackerPhase::Polling => write!(f, "polling"),
            TrackerPhase::Complete => write!(f, "complete"),
            TrackerPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of feeding one snapshot to the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// Stay in Polling.
    Continue,
    /// Terminal: stop the loop, artifact is ready.
    Complete,
    /// Terminal: stop the loop, surface the message.
    Failed(String),
}

/// Rendering surface for progress. A terminal, a GUI panel, or a test
/// recorder all satisfy this.
pub trait ProgressView {
    /// Reflect one snapshot in the UI.
    fn render(&mut self, snapshot: &ProgressSnapshot);
    /// Surface an error or notice to the user.
    fn alert(&mut self, message: &str);
}

/// The session state machine. One instance tracks at most one concurrent
/// download; a submit while Requesting or Polling is rejected.
#[derive(Debug)]
pub struct Tracker {
    phase: TrackerPhase,
    failure: Option<String>,
}

impl Tracker {
    pub fn new() -> Self {
        Self { phase: TrackerPhase::Idle, failure: None }
    }

    pub fn phase(&self) -> TrackerPhase {
        self.phase
    }

    /// Message of the failure that ended the last session, if any.
    /// Left in place so a failed session stays inspectable.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.phase, TrackerPhase::Requesting | TrackerPhase::Polling)
    }

    /// Start a fresh cycle. Allowed from Idle and from terminal states;
    /// rejected while a session is live.
    pub fn begin(&mut self) -> ClientResult<()> {
        if self.is_busy() {
            return Err(ClientError::SessionBusy);
        }
        self.phase = TrackerPhase::Requesting;
        self.failure = None;
        Ok(())
    }

    /// The download request was dispatched; polling may begin.
    pub fn accepted(&mut self) {
        if self.phase == TrackerPhase::Requesting {
            self.phase = TrackerPhase::Polling;
        }
    }

    /// The download request was rejected before producing progress.
    /// Back to Idle; the error is surfaced by the caller.
    pub fn rejected(&mut self) {
        self.phase = TrackerPhase::Idle;
    }

    /// Explicit user cancellation: stop deterministically, ready for a new
    /// submit.
    pub fn cancel(&mut self) {
        debug!("Session cancelled in phase {}", self.phase);
        self.phase = TrackerPhase::Idle;
    }

    /// Mark completion reached outside the polling loop (direct response or
    /// end of stream).
    pub fn complete(&mut self) {
        self.phase = TrackerPhase::Complete;
    }

    /// Mark failure reached outside the snapshot stream (a poll exchange
    /// that cannot be retried).
    pub fn fail(&mut self, message: impl Into<String>) {
        self.phase = TrackerPhase::Failed;
        self.failure = Some(message.into());
    }

    /// Feed one snapshot. Only a live Polling session transitions; terminal
    /// phases are reached exactly once.
    pub fn observe(&mut self, snapshot: &ProgressSnapshot) -> Tick {
        if self.phase != TrackerPhase::Polling {
            return Tick::Continue;
        }
        match snapshot.status {
            SnapshotStatus::Complete => {
                self.phase = TrackerPhase::Complete;
                Tick::Complete
            }
            SnapshotStatus::Error => {
                self.phase = TrackerPhase::Failed;
                self.failure = Some(snapshot.message.clone());
                Tick::Failed(snapshot.message.clone())
            }
            _ => Tick::Continue,
        }
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive the polling loop until a terminal snapshot or cancellation.
///
/// Each tick is one independent request-response exchange; the tick body
/// awaits the poll to completion, so a second poll can never start before
/// the previous one settles. Transient tick failures are logged and
/// swallowed - the next tick retries; non-transient ones fail the session.
/// Cancellation abandons both the wait and any in-flight poll, so a late
/// result never reaches the view.
pub async fn run_poll_loop<V, F, Fut>(
    tracker: &mut Tracker,
    view: &mut V,
    interval: Duration,
    error_prefix: &str,
    cancel: &CancellationToken,
    mut poll: F,
) -> TrackerPhase
where
    V: ProgressView,
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<ProgressReport>>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Poll loop cancelled in phase {}", tracker.phase());
                return tracker.phase();
            }
            _ = ticker.tick() => {}
        }

        let report = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Poll loop cancelled mid-request");
                return tracker.phase();
            }
            result = poll() => match result {
                Ok(report) => report,
                Err(e) if e.is_transient() => {
                    // A single failed exchange does not move the state
                    // machine; the next tick retries.
                    warn!("Progress poll failed: {}", e);
                    continue;
                }
                Err(e) => {
                    // Protocol-level rejection: the stream is not coming
                    // back on its own.
                    warn!("Progress poll failed fatally: {}", e);
                    view.alert(&format!("Download failed: {}", e));
                    tracker.fail(e.to_string());
                    return tracker.phase();
                }
            }
        };

        let snapshot = ProgressSnapshot::from_report(&report, error_prefix);
        view.render(&snapshot);
        match tracker.observe(&snapshot) {
            Tick::Continue => {}
            Tick::Complete => {
                info!("Polling finished: download complete");
                return tracker.phase();
            }
            Tick::Failed(message) => {
                view.alert(&format!("Download failed: {}", message));
                return tracker.phase();
            }
        }
    }
}

/// Outcome of racing the polling loop against the download request itself.
enum SessionOutcome {
    Started(ClientResult<DownloadStarted>),
    PollFailed,
    Cancelled,
}

/// Run one full download session: validate, submit, poll, and save the
/// artifact on completion. Returns the saved path, or None if cancelled.
pub async fn run_session<V: ProgressView>(
    client: &BackendClient,
    tracker: &mut Tracker,
    view: &mut V,
    cancel: &CancellationToken,
    request: &DownloadRequest,
) -> ClientResult<Option<PathBuf>> {
    request.validate()?;
    tracker.begin()?;
    view.render(&ProgressSnapshot::starting());

    info!("Starting download session for {}", request.url);
    tracker.accepted();

    let poll_cancel = cancel.child_token();
    let outcome = {
        let config = client.config();
        let loop_fut = run_poll_loop(
            &mut *tracker,
            &mut *view,
            config.poll_interval,
            &config.error_prefix,
            &poll_cancel,
            || client.download_progress(),
        );
        tokio::pin!(loop_fut);
        let start_fut = client.start_download(request);
        tokio::pin!(start_fut);

        tokio::select! {
            _ = cancel.cancelled() => SessionOutcome::Cancelled,
            started = &mut start_fut => SessionOutcome::Started(started),
            phase = &mut loop_fut => {
                if phase == TrackerPhase::Failed {
                    SessionOutcome::PollFailed
                } else {
                    // Polling observed completion first; the request itself
                    // still carries the artifact location.
                    tokio::select! {
                        _ = cancel.cancelled() => SessionOutcome::Cancelled,
                        started = &mut start_fut => SessionOutcome::Started(started),
                    }
                }
            }
        }
    };
    poll_cancel.cancel();

    match outcome {
        SessionOutcome::Started(Ok(DownloadStarted::Ready(ready))) => {
            tracker.complete();
            view.render(&ProgressSnapshot::complete());
            let path = client.save_artifact(&ready).await?;
            info!("Artifact saved to {}", path.display());
            Ok(Some(path))
        }
        SessionOutcome::Started(Ok(DownloadStarted::Stream(response))) => {
            // Streaming variant: progress comes from incremental reads.
            crate::stream::consume(response, client.config(), &mut *tracker, &mut *view, cancel).await
        }
        SessionOutcome::Started(Err(e)) => {
            tracker.rejected();
            view.alert(&e.to_string());
            Err(e)
        }
        SessionOutcome::PollFailed => {
            // The loop already surfaced the alert; leave the tracker in its
            // failed-but-inspectable state.
            let message = tracker.failure().unwrap_or("download failed").to_string();
            Err(ClientError::DownloadFailed(message))
        }
        SessionOutcome::Cancelled => {
            tracker.cancel();
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::ready;

    /// Records renders and alerts for assertions.
    struct TestView {
        snapshots: Vec<ProgressSnapshot>,
        alerts: Vec<String>,
    }

    impl TestView {
        fn new() -> Self {
            Self { snapshots: Vec::new(), alerts: Vec::new() }
        }
    }

    impl ProgressView for TestView {
        fn render(&mut self, snapshot: &ProgressSnapshot) {
            self.snapshots.push(snapshot.clone());
        }
        fn alert(&mut self, message: &str) {
            self.alerts.push(message.to_string());
        }
    }

    fn live_tracker() -> Tracker {
        let mut tracker = Tracker::new();
        tracker.begin().unwrap();
        tracker.accepted();
        tracker
    }

    fn report(progress: f64, status: &str) -> ProgressReport {
        ProgressReport { progress, status: status.to_string() }
    }

    #[test]
    fn test_submit_rejected_while_busy() {
        let mut tracker = Tracker::new();
        tracker.begin().unwrap();
        assert!(matches!(tracker.begin(), Err(ClientError::SessionBusy)));
        tracker.accepted();
        assert!(matches!(tracker.begin(), Err(ClientError::SessionBusy)));
    }

    #[test]
    fn test_terminal_allows_fresh_cycle() {
        let mut tracker = live_tracker();
        let snap = ProgressSnapshot::from_report(&report(100.0, ""), "Error");
        assert_eq!(tracker.observe(&snap), Tick::Complete);
        assert_eq!(tracker.phase(), TrackerPhase::Complete);
        assert!(tracker.begin().is_ok());
        assert_eq!(tracker.phase(), TrackerPhase::Requesting);
    }

    #[test]
    fn test_rejected_returns_to_idle() {
        let mut tracker = Tracker::new();
        tracker.begin().unwrap();
        tracker.rejected();
        assert_eq!(tracker.phase(), TrackerPhase::Idle);
        assert!(tracker.begin().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_loop_reaches_complete_once() {
        let mut tracker = live_tracker();
        let mut view = TestView::new();
        let cancel = CancellationToken::new();

        let mut reports = vec![report(10.0, ""), report(50.0, ""), report(100.0, "")].into_iter();
        let calls = std::cell::Cell::new(0usize);
        let phase = run_poll_loop(
            &mut tracker,
            &mut view,
            Duration::from_millis(1000),
            "Error",
            &cancel,
            || {
                calls.set(calls.get() + 1);
                ready(Ok(reports.next().expect("no ticks after terminal")))
            },
        )
        .await;

        assert_eq!(phase, TrackerPhase::Complete);
        assert_eq!(calls.get(), 3);
        assert_eq!(view.snapshots.len(), 3);
        assert_eq!(view.snapshots[2].status, SnapshotStatus::Complete);
        assert!(view.alerts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_loop_fails_on_error_prefix() {
        let mut tracker = live_tracker();
        let mut view = TestView::new();
        let cancel = CancellationToken::new();

        let mut reports =
            vec![report(30.0, ""), report(30.0, "Error: format unavailable")].into_iter();
        let phase = run_poll_loop(
            &mut tracker,
            &mut view,
            Duration::from_millis(1000),
            "Error",
            &cancel,
            || ready(Ok(reports.next().expect("loop must stop on error"))),
        )
        .await;

        assert_eq!(phase, TrackerPhase::Failed);
        assert_eq!(tracker.failure(), Some("Error: format unavailable"));
        assert_eq!(view.alerts.len(), 1);
        assert!(view.alerts[0].contains("format unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_processing_stays_in_polling() {
        let mut tracker = live_tracker();
        let mut view = TestView::new();
        let cancel = CancellationToken::new();

        // Post-processing holds at 100% with the Processing status; the loop
        // must keep ticking until the status clears.
        let mut reports =
            vec![report(99.0, "Processing..."), report(100.0, "Processing..."), report(100.0, "")]
                .into_iter();
        let phase = run_poll_loop(
            &mut tracker,
            &mut view,
            Duration::from_millis(1000),
            "Error",
            &cancel,
            || ready(Ok(reports.next().unwrap())),
        )
        .await;

        assert_eq!(phase, TrackerPhase::Complete);
        assert_eq!(view.snapshots[0].status, SnapshotStatus::Processing);
        assert_eq!(view.snapshots[0].message, "Processing video, please wait...");
        assert_eq!(view.snapshots[1].status, SnapshotStatus::Processing);
        assert_eq!(view.snapshots[2].status, SnapshotStatus::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_swallowed() {
        let mut tracker = live_tracker();
        let mut view = TestView::new();
        let cancel = CancellationToken::new();

        let calls = std::cell::Cell::new(0usize);
        let phase = run_poll_loop(
            &mut tracker,
            &mut view,
            Duration::from_millis(1000),
            "Error",
            &cancel,
            || {
                calls.set(calls.get() + 1);
                if calls.get() == 1 {
                    ready(Err(ClientError::Io(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "connection reset",
                    ))))
                } else {
                    ready(Ok(report(100.0, "")))
                }
            },
        )
        .await;

        assert_eq!(phase, TrackerPhase::Complete);
        assert_eq!(calls.get(), 2);
        // The failed tick rendered nothing.
        assert_eq!(view.snapshots.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_poll_error_fails_session() {
        let mut tracker = live_tracker();
        let mut view = TestView::new();
        let cancel = CancellationToken::new();

        let calls = std::cell::Cell::new(0usize);
        let phase = run_poll_loop(
            &mut tracker,
            &mut view,
            Duration::from_millis(1000),
            "Error",
            &cancel,
            || {
                calls.set(calls.get() + 1);
                ready(Err(ClientError::Backend("progress unavailable".to_string())))
            },
        )
        .await;

        // A protocol-level rejection is not retried.
        assert_eq!(phase, TrackerPhase::Failed);
        assert_eq!(calls.get(), 1);
        assert_eq!(tracker.failure(), Some("Backend error: progress unavailable"));
        assert_eq!(view.alerts.len(), 1);
        assert!(view.snapshots.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_loop() {
        let mut tracker = live_tracker();
        let mut view = TestView::new();
        let cancel = CancellationToken::new();

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            stopper.cancel();
        });

        let calls = std::cell::Cell::new(0usize);
        let phase = run_poll_loop(
            &mut tracker,
            &mut view,
            Duration::from_millis(1000),
            "Error",
            &cancel,
            || {
                calls.set(calls.get() + 1);
                ready(Ok(report(25.0, "")))
            },
        )
        .await;

        // Never reached a terminal snapshot; the token stopped the loop.
        assert_eq!(phase, TrackerPhase::Polling);
        assert!(calls.get() >= 1);
        assert!(calls.get() <= 3);
    }
}
