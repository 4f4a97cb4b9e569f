/// Terminal rendering for download progress.
use std::io::Write;

use clearmark_client::{ProgressSnapshot, ProgressView};
use tracing::error;

/// Single-line progress display, re-rendered in place only when the visible
/// content changes.
pub struct TerminalProgress {
    last_line: String,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self { last_line: String::new() }
    }

    /// Move past the in-place progress line once the session is over.
    pub fn finish(&mut self) {
        if !self.last_line.is_empty() {
            eprintln!();
            self.last_line.clear();
        }
    }
}

impl ProgressView for TerminalProgress {
    fn render(&mut self, snapshot: &ProgressSnapshot) {
        let line = format!(
            "{} {:>3}% {}",
            progress_bar(snapshot.percent),
            snapshot.percent.round(),
            snapshot.message
        );
        if line != self.last_line {
            eprint!("\r{:<78}", line);
            let _ = std::io::stderr().flush();
            self.last_line = line;
        }
    }

    fn alert(&mut self, message: &str) {
        self.finish();
        error!("{}", message);
    }
}

/// Generate a simple text progress bar.
fn progress_bar(percent: f64) -> String {
    let filled = (percent.clamp(0.0, 100.0) as usize) / 5; // 20 chars total
    let empty = 20_usize.saturating_sub(filled);
    format!("[{}{}]", "=".repeat(filled), " ".repeat(empty))
}
