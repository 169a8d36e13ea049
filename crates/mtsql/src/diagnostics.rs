//! Per-call diagnostic and progress sinks
//!
//! Sinks are passed explicitly to each call. They only observe: leaving them
//! out never changes what a call does or returns.

use tracing::{info, warn};

use crate::error::Error;

/// Receives notices about failures that did not end the call
pub trait DiagnosticSink: Send + Sync {
    /// A trial failed with a transient error and another trial may follow
    fn transient_failure(&self, trial: u32, max_trials: u32, operation: &str, error: &Error);

    /// A failure was tolerated under the caller's policy
    fn warning(&self, _message: &str, _error: &Error) {}
}

/// Receives progress of a chunked read
pub trait ProgressSink: Send + Sync {
    /// Streaming of `statement` is about to start
    fn started(&self, _statement: &str) {}

    /// A batch arrived; `rows` is the running total
    fn progress(&self, _rows: usize, _rows_per_sec: f64) {}

    /// The stream ended normally
    fn succeeded(&self, _rows: usize) {}

    /// The stream was interrupted by an error
    fn failed(&self, _rows: usize) {}
}

/// Sink forwarding everything to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn transient_failure(&self, trial: u32, max_trials: u32, operation: &str, error: &Error) {
        warn!(
            trial,
            max_trials,
            operation,
            error = %error,
            "trial {}/{} to execute `{}` failed",
            trial,
            max_trials,
            operation
        );
    }

    fn warning(&self, message: &str, error: &Error) {
        warn!(error = %error, "{}", message);
    }
}

impl ProgressSink for TracingSink {
    fn started(&self, statement: &str) {
        info!(statement, "reading");
    }

    fn progress(&self, rows: usize, rows_per_sec: f64) {
        info!(rows, "{} rows received ({:.2} rows/s)", rows, rows_per_sec);
    }

    fn succeeded(&self, rows: usize) {
        info!(rows, "read completed");
    }

    fn failed(&self, rows: usize) {
        warn!(rows, "read interrupted");
    }
}

/// Optional sinks for a read call
#[derive(Clone, Copy, Default)]
pub struct Sinks<'a> {
    /// Transient-failure and warning notices
    pub diagnostics: Option<&'a dyn DiagnosticSink>,
    /// Chunked-read progress
    pub progress: Option<&'a dyn ProgressSink>,
}

impl<'a> Sinks<'a> {
    /// No sinks at all
    pub const fn none() -> Self {
        Self {
            diagnostics: None,
            progress: None,
        }
    }

    /// Set the diagnostic sink
    pub fn with_diagnostics(mut self, sink: &'a dyn DiagnosticSink) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    /// Set the progress sink
    pub fn with_progress(mut self, sink: &'a dyn ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Both sinks backed by [`TracingSink`]
    pub fn tracing() -> Sinks<'static> {
        static SINK: TracingSink = TracingSink;
        Sinks {
            diagnostics: Some(&SINK),
            progress: Some(&SINK),
        }
    }
}

impl std::fmt::Debug for Sinks<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sinks")
            .field("diagnostics", &self.diagnostics.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}
