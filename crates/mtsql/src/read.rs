//! Reads, whole or chunked
//!
//! Without a batch size a read is one retried query. With a batch size the
//! driver streams row batches which a [`ChunkAccumulator`] collects inside a
//! single scope:
//!
//! ```text
//! Open ──push──▶ Streaming ──end of stream──▶ Exhausted
//!   │                │
//!   └────error───────┴──────────────────────▶ Failed
//! ```
//!
//! Retries cover starting the stream only. Batches already delivered cannot be
//! requested again, so a mid-stream error goes to the caller's
//! [`PartialFailurePolicy`] instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, warn};

use crate::connection::{BatchStream, ExecutionHandle};
use crate::diagnostics::{DiagnosticSink, ProgressSink, Sinks};
use crate::dialect::select_all;
use crate::error::{Error, Result};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::scope::Scope;
use crate::statement::{normalize, Statement};
use crate::types::Table;

const READ_OPERATION: &str = concat!(module_path!(), "::read");
const FETCH_OPERATION: &str = concat!(module_path!(), "::fetch_batches");

/// What to do when a chunked read fails part way
///
/// Unknown names are kept as [`PartialFailurePolicy::Unrecognized`] and only
/// rejected when a failure actually reaches the policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PartialFailurePolicy {
    /// Propagate the error; no rows are returned (`"raise"`)
    #[default]
    Raise,
    /// Warn and return the rows received so far (`"warn"`)
    WarnAndReturnPartial,
    /// Any other name
    Unrecognized(String),
}

impl PartialFailurePolicy {
    /// Name of the policy
    pub fn as_str(&self) -> &str {
        match self {
            Self::Raise => "raise",
            Self::WarnAndReturnPartial => "warn",
            Self::Unrecognized(name) => name,
        }
    }
}

impl From<&str> for PartialFailurePolicy {
    fn from(name: &str) -> Self {
        match name {
            "raise" => Self::Raise,
            "warn" => Self::WarnAndReturnPartial,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

impl From<String> for PartialFailurePolicy {
    fn from(name: String) -> Self {
        match name.as_str() {
            "raise" => Self::Raise,
            "warn" => Self::WarnAndReturnPartial,
            _ => Self::Unrecognized(name),
        }
    }
}

impl From<PartialFailurePolicy> for String {
    fn from(policy: PartialFailurePolicy) -> Self {
        policy.as_str().to_string()
    }
}

impl fmt::Display for PartialFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for [`read`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOptions {
    /// Retry policy for running the query or starting the stream
    pub retry: RetryPolicy,
    /// Rows per batch; `None` reads everything in one go
    pub batch_size: Option<usize>,
    /// Applied when a chunked read fails part way
    pub failure_policy: PartialFailurePolicy,
}

impl ReadOptions {
    /// Default options: three trials, no chunking, raise on failure
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Read in batches of `batch_size` rows
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Set the partial-failure policy
    pub fn with_failure_policy(mut self, policy: impl Into<PartialFailurePolicy>) -> Self {
        self.failure_policy = policy.into();
        self
    }

    /// Check the options before any I/O
    ///
    /// The failure policy is deliberately not checked here.
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        if self.batch_size == Some(0) {
            return Err(Error::config("batch_size must be at least 1"));
        }
        Ok(())
    }
}

/// Lifecycle of a chunked read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No batch received yet
    Open,
    /// At least one batch received
    Streaming,
    /// Stream ended normally
    Exhausted,
    /// Stream ended with an error
    Failed,
}

/// Collects batches in arrival order and reports progress
pub struct ChunkAccumulator<'s> {
    batches: Vec<Table>,
    rows: usize,
    started: Instant,
    state: StreamState,
    progress: Option<&'s dyn ProgressSink>,
}

impl<'s> ChunkAccumulator<'s> {
    /// Start accumulating
    pub fn new(progress: Option<&'s dyn ProgressSink>) -> Self {
        Self {
            batches: Vec::new(),
            rows: 0,
            started: Instant::now(),
            state: StreamState::Open,
            progress,
        }
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Rows received so far
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Append a batch
    pub fn push(&mut self, batch: Table) {
        debug_assert!(matches!(
            self.state,
            StreamState::Open | StreamState::Streaming
        ));
        self.state = StreamState::Streaming;
        self.rows += batch.row_count();
        self.batches.push(batch);

        if let Some(progress) = self.progress {
            let elapsed = self.started.elapsed().as_secs_f64() + 0.001;
            progress.progress(self.rows, self.rows as f64 / elapsed);
        }
    }

    /// Consume a stream until it ends or fails
    ///
    /// Leaves the accumulator `Exhausted` or `Failed`.
    pub async fn drain<S: BatchStream + ?Sized>(&mut self, stream: &mut S) -> Result<()> {
        loop {
            match stream.next_batch().await {
                Ok(Some(batch)) => self.push(batch),
                Ok(None) => {
                    self.state = StreamState::Exhausted;
                    return Ok(());
                }
                Err(e) => {
                    self.state = StreamState::Failed;
                    return Err(e);
                }
            }
        }
    }

    /// Complete a stream that ended normally
    pub fn finish(self) -> Table {
        if let Some(progress) = self.progress {
            progress.succeeded(self.rows);
        }
        debug!(rows = self.rows, batches = self.batches.len(), "chunked read completed");
        Table::concat(self.batches)
    }

    /// Complete a stream that ended with `error`
    pub fn interrupt(self, error: Error) -> Interrupted {
        if let Some(progress) = self.progress {
            progress.failed(self.rows);
        }
        debug!(rows = self.rows, error = %error, "chunked read interrupted");
        Interrupted {
            rows: self.rows,
            partial: Table::concat(self.batches),
            error,
        }
    }
}

impl fmt::Debug for ChunkAccumulator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkAccumulator")
            .field("batches", &self.batches.len())
            .field("rows", &self.rows)
            .field("state", &self.state)
            .finish()
    }
}

/// A chunked read that failed part way
#[derive(Debug)]
pub struct Interrupted {
    /// Batches received before the failure, concatenated
    pub partial: Table,
    /// Rows in `partial`
    pub rows: usize,
    /// The error that ended the stream
    pub error: Error,
}

impl Interrupted {
    /// Apply the caller's policy
    pub fn resolve(
        self,
        policy: &PartialFailurePolicy,
        diagnostics: Option<&dyn DiagnosticSink>,
    ) -> Result<Table> {
        match policy {
            PartialFailurePolicy::Raise => Err(self.error),
            PartialFailurePolicy::WarnAndReturnPartial => {
                if let Some(sink) = diagnostics {
                    let message = format!(
                        "chunked read interrupted after {} rows; returning partial result",
                        self.rows
                    );
                    sink.warning(&message, &self.error);
                }
                Ok(self.partial)
            }
            PartialFailurePolicy::Unrecognized(value) => Err(Error::InvalidPolicy {
                value: value.clone(),
                source: Box::new(self.error),
            }),
        }
    }
}

/// Read a statement into a [`Table`]
///
/// # Example
///
/// ```rust,ignore
/// use mtsql::prelude::*;
///
/// let options = ReadOptions::new()
///     .with_batch_size(10_000)
///     .with_failure_policy("warn");
/// let sink = TracingSink;
/// let sinks = Sinks::none().with_diagnostics(&sink).with_progress(&sink);
///
/// let table = read("SELECT * FROM events", ExecutionHandle::Engine(&engine), &options, sinks).await?;
/// ```
pub async fn read(
    statement: impl Into<Statement>,
    handle: ExecutionHandle<'_>,
    options: &ReadOptions,
    sinks: Sinks<'_>,
) -> Result<Table> {
    options.validate()?;
    let statement = statement.into();
    let normalized = normalize(&statement, handle.database_type())?;
    let exec = &normalized.executable;

    let Some(batch_size) = options.batch_size else {
        debug!(statement = %normalized.display, "reading");
        let scope = Scope::begin(handle).await?;
        let conn = scope.connection();
        let result = run_with_retry(READ_OPERATION, &options.retry, sinks.diagnostics, move || {
            conn.query(&exec.sql, &exec.params)
        })
        .await
        .map(Table::from_rows);
        return scope.finish(result).await;
    };

    debug!(statement = %normalized.display, batch_size, "reading in chunks");
    if let Some(progress) = sinks.progress {
        progress.started(&normalized.display);
    }

    let scope = match Scope::begin(handle).await {
        Ok(scope) => scope,
        Err(e) => {
            if let Some(progress) = sinks.progress {
                progress.failed(0);
            }
            return Err(e);
        }
    };

    // the stream borrows the scope's connection and must be gone before the
    // scope is committed or rolled back
    let streamed = {
        let conn = scope.connection();
        let started = run_with_retry(FETCH_OPERATION, &options.retry, sinks.diagnostics, move || {
            conn.fetch_batches(&exec.sql, &exec.params, batch_size)
        })
        .await;
        match started {
            Ok(mut stream) => {
                let mut acc = ChunkAccumulator::new(sinks.progress);
                let drained = acc.drain(&mut *stream).await;
                Ok((acc, drained))
            }
            Err(e) => Err(e),
        }
    };

    let (acc, drained) = match streamed {
        Ok(streamed) => streamed,
        Err(e) => {
            if let Some(progress) = sinks.progress {
                progress.failed(0);
            }
            return scope.finish(Err(e)).await;
        }
    };

    match drained {
        Ok(()) => scope.finish(Ok(acc.finish())).await,
        Err(e) => {
            let interrupted = acc.interrupt(e);
            // rows read so far are returned, never committed alongside a failure
            if let Err(rollback_err) = scope.rollback().await {
                warn!(error = %rollback_err, "rollback failed after interrupted read");
            }
            interrupted.resolve(&options.failure_policy, sinks.diagnostics)
        }
    }
}

/// Read a whole table (`SELECT * FROM <schema>.<table>`)
pub async fn read_table(
    table: &str,
    schema: Option<&str>,
    handle: ExecutionHandle<'_>,
    options: &ReadOptions,
    sinks: Sinks<'_>,
) -> Result<Table> {
    read(select_all(schema, table), handle, options, sinks).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn batch(ids: &[i64]) -> Table {
        Table::from_values(
            ["id"],
            ids.iter().map(|id| vec![Value::Int64(*id)]).collect(),
        )
    }

    #[test]
    fn test_policy_names() {
        assert_eq!(PartialFailurePolicy::from("raise"), PartialFailurePolicy::Raise);
        assert_eq!(
            PartialFailurePolicy::from("warn"),
            PartialFailurePolicy::WarnAndReturnPartial
        );
        assert_eq!(
            PartialFailurePolicy::from("ignore"),
            PartialFailurePolicy::Unrecognized("ignore".into())
        );
        assert_eq!(PartialFailurePolicy::WarnAndReturnPartial.to_string(), "warn");
    }

    #[test]
    fn test_read_options_validate() {
        assert!(ReadOptions::new().validate().is_ok());
        assert!(ReadOptions::new().with_batch_size(0).validate().is_err());
        assert!(ReadOptions::new()
            .with_failure_policy("bogus")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_accumulator_states() {
        let mut acc = ChunkAccumulator::new(None);
        assert_eq!(acc.state(), StreamState::Open);
        acc.push(batch(&[1, 2]));
        acc.push(batch(&[3]));
        assert_eq!(acc.state(), StreamState::Streaming);
        assert_eq!(acc.rows(), 3);
        assert_eq!(acc.finish(), batch(&[1, 2, 3]));
    }

    #[test]
    fn test_interrupted_resolve() {
        let interrupted = || Interrupted {
            partial: batch(&[1]),
            rows: 1,
            error: Error::connection("reset"),
        };

        let err = interrupted()
            .resolve(&PartialFailurePolicy::Raise, None)
            .unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));

        let table = interrupted()
            .resolve(&PartialFailurePolicy::WarnAndReturnPartial, None)
            .unwrap();
        assert_eq!(table.row_count(), 1);

        let err = interrupted()
            .resolve(&PartialFailurePolicy::Unrecognized("skip".into()), None)
            .unwrap_err();
        match err {
            Error::InvalidPolicy { value, source } => {
                assert_eq!(value, "skip");
                assert!(matches!(*source, Error::Connection { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
