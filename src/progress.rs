// src/progress.rs

//! Progress reporting for packaging stages
//!
//! Hashing and compression of multi-hundred-megabyte toolchains take a
//! while, so stages report through the `ProgressTracker` trait:
//! - `CliProgress`: an indicatif bar for interactive terminals
//! - `LogProgress`: periodic tracing lines for CI logs
//! - `SilentProgress`: no-op for tests and `--quiet`

use indicatif::ProgressBar;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;

/// Progress reporting style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressStyle {
    /// Progress bar with percentage (for known totals)
    #[default]
    Bar,
    /// Spinner (for unknown totals)
    Spinner,
    /// Bytes transfer (shows bytes/total and throughput)
    Bytes,
}

/// Core trait for progress tracking
///
/// Implementations are thread-safe so parallel hashing workers can report.
pub trait ProgressTracker: Send + Sync {
    /// Set the current status message
    fn set_message(&self, message: &str);

    /// Increment progress by the given amount
    fn increment(&self, amount: u64);

    /// Set progress to a specific position
    fn set_position(&self, position: u64);

    /// Set the total (length) of the progress
    fn set_length(&self, length: u64);

    /// Get current position
    fn position(&self) -> u64;

    /// Get total length
    fn length(&self) -> u64;

    /// Finish progress successfully with a message
    fn finish_with_message(&self, message: &str);

    /// Check if progress is finished
    fn is_finished(&self) -> bool;
}

/// Silent progress tracker (no-op)
#[derive(Debug, Default)]
pub struct SilentProgress {
    position: AtomicU64,
    length: AtomicU64,
    finished: AtomicBool,
}

impl SilentProgress {
    /// Create a new silent progress tracker
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressTracker for SilentProgress {
    fn set_message(&self, _message: &str) {}

    fn increment(&self, amount: u64) {
        self.position.fetch_add(amount, Ordering::Relaxed);
    }

    fn set_position(&self, position: u64) {
        self.position.store(position, Ordering::Relaxed);
        self.finished.store(false, Ordering::Relaxed);
    }

    fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn length(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, _message: &str) {
        self.finished.store(true, Ordering::Relaxed);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Logging progress tracker
///
/// Logs roughly ten progress lines per unit of work at info level.
#[derive(Debug)]
pub struct LogProgress {
    name: String,
    message: std::sync::Mutex<String>,
    position: AtomicU64,
    length: AtomicU64,
    finished: AtomicBool,
}

impl LogProgress {
    /// Create a new logging progress tracker
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: std::sync::Mutex::new(String::new()),
            position: AtomicU64::new(0),
            length: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        }
    }

    fn current_message(&self) -> String {
        self.message
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl ProgressTracker for LogProgress {
    fn set_message(&self, message: &str) {
        if let Ok(mut current) = self.message.lock() {
            *current = message.to_string();
        }
        info!("{}: {}", self.name, message);
    }

    fn increment(&self, amount: u64) {
        let old_pos = self.position.fetch_add(amount, Ordering::Relaxed);
        let new_pos = old_pos + amount;
        let length = self.length.load(Ordering::Relaxed);

        if length > 0 {
            let interval = std::cmp::max(1, length / 10);
            if new_pos / interval > old_pos / interval {
                let percent = (new_pos.min(length) * 100) / length;
                info!(
                    "{}: {} {}% ({}/{})",
                    self.name,
                    self.current_message(),
                    percent,
                    new_pos,
                    length
                );
            }
        }
    }

    fn set_position(&self, position: u64) {
        self.position.store(position, Ordering::Relaxed);
        self.finished.store(false, Ordering::Relaxed);
    }

    fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn length(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        info!("{}: {}", self.name, message);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Terminal progress bar backed by indicatif
pub struct CliProgress {
    bar: ProgressBar,
    finished: AtomicBool,
}

impl CliProgress {
    /// Create a new bar in the given style
    pub fn new(style: ProgressStyle) -> Self {
        let bar = ProgressBar::new(0);
        let template = match style {
            ProgressStyle::Bar => "{msg} ({pos}/{len}) [{bar:40.green/dim}] {percent}%",
            ProgressStyle::Bytes => {
                "{msg} [{bar:40.cyan/dim}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})"
            }
            ProgressStyle::Spinner => "{spinner:.green} {msg}",
        };
        if let Ok(indicatif_style) = indicatif::ProgressStyle::default_bar().template(template) {
            bar.set_style(indicatif_style.progress_chars("##-"));
        }
        Self {
            bar,
            finished: AtomicBool::new(false),
        }
    }
}

impl ProgressTracker for CliProgress {
    fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn increment(&self, amount: u64) {
        self.bar.inc(amount);
    }

    fn set_position(&self, position: u64) {
        if self.finished.swap(false, Ordering::Relaxed) {
            self.bar.reset();
        }
        self.bar.set_position(position);
    }

    fn set_length(&self, length: u64) {
        self.bar.set_length(length);
    }

    fn position(&self) -> u64 {
        self.bar.position()
    }

    fn length(&self) -> u64 {
        self.bar.length().unwrap_or(0)
    }

    fn finish_with_message(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        self.bar.finish_with_message(message.to_string());
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_progress() {
        let progress = SilentProgress::new();
        progress.set_length(100);

        progress.set_message("test");
        progress.increment(10);
        assert_eq!(progress.position(), 10);

        progress.set_position(50);
        assert_eq!(progress.position(), 50);

        assert!(!progress.is_finished());
        progress.finish_with_message("done");
        assert!(progress.is_finished());
    }

    #[test]
    fn test_log_progress() {
        let progress = LogProgress::new("compress");
        progress.set_length(100);

        progress.increment(25);
        assert_eq!(progress.position(), 25);

        progress.increment(25);
        assert_eq!(progress.position(), 50);

        progress.finish_with_message("complete");
        assert!(progress.is_finished());
    }

    #[test]
    fn test_cli_progress_hidden_target() {
        let progress = CliProgress::new(ProgressStyle::Bytes);
        progress.set_length(1024);
        progress.increment(512);
        assert_eq!(progress.position(), 512);
        assert_eq!(progress.length(), 1024);
    }
}
