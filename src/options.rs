// src/options.rs

//! Run-time controls shared by long-running stages

use crate::error::{Error, Result};
use crate::progress::ProgressTracker;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Options for controlling stage execution
#[derive(Default, Clone)]
pub struct RunOptions {
    /// Cancel token - set to true to request cancellation
    pub cancel: Option<Arc<AtomicBool>>,
    /// Progress tracker for reporting operation progress
    pub progress: Option<Arc<dyn ProgressTracker>>,
}

impl RunOptions {
    /// Create new options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cancel token
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Set the progress tracker
    pub fn with_progress(mut self, progress: Arc<dyn ProgressTracker>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Check if cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }

    /// Return Cancelled error if cancellation requested
    pub fn check_cancelled(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled(operation.to_string()))
        } else {
            Ok(())
        }
    }

    /// Start a unit of work with a known total
    pub fn begin(&self, message: &str, total: u64) {
        if let Some(ref progress) = self.progress {
            progress.set_position(0);
            progress.set_length(total);
            progress.set_message(message);
        }
    }

    /// Advance progress if a tracker is available
    pub fn advance(&self, amount: u64) {
        if let Some(ref progress) = self.progress {
            progress.increment(amount);
        }
    }

    /// Finish the current unit of work
    pub fn finish(&self, message: &str) {
        if let Some(ref progress) = self.progress {
            progress.finish_with_message(message);
        }
    }
}
