//! Testing utilities
//!
//! In-memory [`Engine`], [`Connection`] and sink implementations for testing
//! code built on mtsql without a database server.
//!
//! # Example
//!
//! ```rust,ignore
//! use mtsql::prelude::*;
//! use mtsql::testing::*;
//!
//! #[tokio::test]
//! async fn test_update_is_retried() {
//!     let db = MockDatabase::new()
//!         .fail_next(MockCall::Execute, Error::connection("reset"));
//!     let engine = db.engine();
//!
//!     execute("UPDATE t SET x = 1", ExecutionHandle::Engine(&engine), &RetryPolicy::default(), None)
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(db.rollbacks(), 1);
//!     assert_eq!(db.committed_statements(), vec!["UPDATE t SET x = 1"]);
//! }
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::connection::{BatchStream, Connection, DatabaseType, Engine, Transaction};
use crate::diagnostics::{DiagnosticSink, ProgressSink};
use crate::error::{Error, Result};
use crate::types::{Row, Table, Value};

// ============================================================================
// Mock Database
// ============================================================================

/// Kind of call made against a [`MockDatabase`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockCall {
    /// [`Engine::begin`]
    Begin,
    /// [`Connection::query`]
    Query,
    /// [`Connection::execute`]
    Execute,
    /// [`Connection::fetch_batches`]
    FetchBatches,
    /// [`Transaction::commit`]
    Commit,
    /// [`Transaction::rollback`]
    Rollback,
}

#[derive(Debug)]
struct MockState {
    database_type: DatabaseType,
    calls: Vec<MockCall>,
    failures: VecDeque<(MockCall, Error)>,
    responses: Vec<(String, Vec<Row>)>,
    batches: Option<Vec<Table>>,
    stream_failure: Option<(usize, Error)>,
    rows_affected: u64,
    executed: Vec<String>,
    committed: Vec<String>,
    begins: usize,
    commits: usize,
    rollbacks: usize,
}

/// Shared state behind mock engines and connections
///
/// Clones share the same state, so a test can keep one handle for
/// assertions while the code under test uses another.
#[derive(Debug, Clone)]
pub struct MockDatabase {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDatabase {
    /// Create an empty PostgreSQL-flavoured mock
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                database_type: DatabaseType::PostgreSQL,
                calls: Vec::new(),
                failures: VecDeque::new(),
                responses: Vec::new(),
                batches: None,
                stream_failure: None,
                rows_affected: 1,
                executed: Vec::new(),
                committed: Vec::new(),
                begins: 0,
                commits: 0,
                rollbacks: 0,
            })),
        }
    }

    /// Report a different database flavour
    pub fn with_database_type(self, database_type: DatabaseType) -> Self {
        self.state.lock().database_type = database_type;
        self
    }

    /// Fail the next call of kind `call` with `error`
    ///
    /// Failures queue up; each one is consumed by a single call.
    pub fn fail_next(self, call: MockCall, error: Error) -> Self {
        self.state.lock().failures.push_back((call, error));
        self
    }

    /// Answer queries whose SQL contains `fragment` with `rows`
    ///
    /// The first matching fragment wins. Unmatched queries return no rows.
    pub fn respond_to(self, fragment: impl Into<String>, rows: Vec<Row>) -> Self {
        self.state.lock().responses.push((fragment.into(), rows));
        self
    }

    /// Batches handed out by every [`Connection::fetch_batches`] call
    ///
    /// Without this the query response is split by the requested batch size.
    pub fn with_batches(self, batches: Vec<Table>) -> Self {
        self.state.lock().batches = Some(batches);
        self
    }

    /// Make the next stream fail with `error` after `batches` batches
    pub fn fail_stream_after(self, batches: usize, error: Error) -> Self {
        self.state.lock().stream_failure = Some((batches, error));
        self
    }

    /// Affected row count reported by every execute
    pub fn with_rows_affected(self, rows: u64) -> Self {
        self.state.lock().rows_affected = rows;
        self
    }

    /// Engine handing out transactions on this database
    pub fn engine(&self) -> MockEngine {
        MockEngine { db: self.clone() }
    }

    /// Connection standing in for one the caller already owns
    pub fn connection(&self) -> MockConnection {
        MockConnection { db: self.clone() }
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    /// Number of calls of kind `call`
    pub fn call_count(&self, call: MockCall) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == call).count()
    }

    /// Transactions begun
    pub fn begins(&self) -> usize {
        self.state.lock().begins
    }

    /// Transactions committed
    pub fn commits(&self) -> usize {
        self.state.lock().commits
    }

    /// Transactions rolled back
    pub fn rollbacks(&self) -> usize {
        self.state.lock().rollbacks
    }

    /// SQL of every successful execute, committed or not
    pub fn executed_statements(&self) -> Vec<String> {
        self.state.lock().executed.clone()
    }

    /// SQL of executes that became durable through a commit
    pub fn committed_statements(&self) -> Vec<String> {
        self.state.lock().committed.clone()
    }

    fn database_type(&self) -> DatabaseType {
        self.state.lock().database_type
    }

    fn record(&self, call: MockCall) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(call);
        match state.failures.iter().position(|(c, _)| *c == call) {
            Some(idx) => match state.failures.remove(idx) {
                Some((_, error)) => Err(error),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    fn rows_for(&self, sql: &str) -> Vec<Row> {
        self.state
            .lock()
            .responses
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        self.record(MockCall::Query)?;
        Ok(self.rows_for(sql))
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.record(MockCall::Execute)?;
        let mut state = self.state.lock();
        state.executed.push(sql.to_string());
        Ok(state.rows_affected)
    }

    async fn fetch_batches(&self, sql: &str, batch_size: usize) -> Result<MockBatchStream> {
        self.record(MockCall::FetchBatches)?;
        let configured = self.state.lock().batches.clone();
        let batches = match configured {
            Some(batches) => batches,
            None => self
                .rows_for(sql)
                .chunks(batch_size.max(1))
                .map(|chunk| Table::from_rows(chunk.to_vec()))
                .collect(),
        };
        let failure = self.state.lock().stream_failure.take();
        Ok(MockBatchStream::new(batches, failure))
    }
}

// ============================================================================
// Mock Engine / Connection / Transaction
// ============================================================================

/// [`Engine`] over a [`MockDatabase`]
#[derive(Debug, Clone)]
pub struct MockEngine {
    db: MockDatabase,
}

#[async_trait]
impl Engine for MockEngine {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        self.db.record(MockCall::Begin)?;
        self.db.state.lock().begins += 1;
        Ok(Box::new(MockTransaction {
            db: self.db.clone(),
            pending: Mutex::new(Vec::new()),
        }))
    }

    fn database_type(&self) -> DatabaseType {
        self.db.database_type()
    }
}

/// Caller-owned [`Connection`] over a [`MockDatabase`]
///
/// Writes are recorded as executed but never committed by mtsql.
#[derive(Debug, Clone)]
pub struct MockConnection {
    db: MockDatabase,
}

#[async_trait]
impl Connection for MockConnection {
    async fn query(&self, sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
        self.db.query(sql).await
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<u64> {
        self.db.execute(sql).await
    }

    async fn fetch_batches<'a>(
        &'a self,
        sql: &str,
        _params: &[Value],
        batch_size: usize,
    ) -> Result<Box<dyn BatchStream + 'a>> {
        Ok(Box::new(self.db.fetch_batches(sql, batch_size).await?))
    }

    fn database_type(&self) -> DatabaseType {
        self.db.database_type()
    }
}

/// [`Transaction`] handed out by [`MockEngine`]
///
/// Executed statements become durable only on commit.
#[derive(Debug)]
pub struct MockTransaction {
    db: MockDatabase,
    pending: Mutex<Vec<String>>,
}

#[async_trait]
impl Connection for MockTransaction {
    async fn query(&self, sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
        self.db.query(sql).await
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<u64> {
        let affected = self.db.execute(sql).await?;
        self.pending.lock().push(sql.to_string());
        Ok(affected)
    }

    async fn fetch_batches<'a>(
        &'a self,
        sql: &str,
        _params: &[Value],
        batch_size: usize,
    ) -> Result<Box<dyn BatchStream + 'a>> {
        Ok(Box::new(self.db.fetch_batches(sql, batch_size).await?))
    }

    fn database_type(&self) -> DatabaseType {
        self.db.database_type()
    }
}

#[async_trait]
impl Transaction for MockTransaction {
    fn as_connection(&self) -> &dyn Connection {
        self
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.db.record(MockCall::Commit)?;
        let pending = std::mem::take(&mut *self.pending.lock());
        let mut state = self.db.state.lock();
        state.commits += 1;
        state.committed.extend(pending);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.db.record(MockCall::Rollback)?;
        self.db.state.lock().rollbacks += 1;
        Ok(())
    }
}

/// [`BatchStream`] that can fail part way
#[derive(Debug)]
pub struct MockBatchStream {
    batches: VecDeque<Table>,
    delivered: usize,
    failure: Option<(usize, Error)>,
}

impl MockBatchStream {
    /// Stream `batches`, failing with the error once `failure.0` batches were delivered
    pub fn new(batches: Vec<Table>, failure: Option<(usize, Error)>) -> Self {
        Self {
            batches: batches.into(),
            delivered: 0,
            failure,
        }
    }
}

impl BatchStream for MockBatchStream {
    fn next_batch(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Table>>> + Send + '_>> {
        let fail_now = matches!(&self.failure, Some((after, _)) if *after <= self.delivered);
        let next = if fail_now {
            match self.failure.take() {
                Some((_, error)) => Err(error),
                None => Ok(None),
            }
        } else {
            let batch = self.batches.pop_front();
            if batch.is_some() {
                self.delivered += 1;
            }
            Ok(batch)
        };
        Box::pin(async move { next })
    }
}

// ============================================================================
// Recording Sink
// ============================================================================

/// Event captured by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// [`DiagnosticSink::transient_failure`]
    TransientFailure {
        /// Failed trial, 1-based
        trial: u32,
        /// Trial limit
        max_trials: u32,
        /// Operation name
        operation: String,
        /// Rendered error
        error: String,
    },
    /// [`DiagnosticSink::warning`]
    Warning {
        /// Warning text
        message: String,
        /// Rendered error
        error: String,
    },
    /// [`ProgressSink::started`]
    Started(String),
    /// [`ProgressSink::progress`] running row total
    Progress(usize),
    /// [`ProgressSink::succeeded`]
    Succeeded(usize),
    /// [`ProgressSink::failed`]
    Failed(usize),
}

/// Sink that records every notice it receives
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    /// Transient failures received so far
    pub fn transient_failures(&self) -> Vec<SinkEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, SinkEvent::TransientFailure { .. }))
            .cloned()
            .collect()
    }

    /// Warnings received so far
    pub fn warnings(&self) -> Vec<SinkEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Warning { .. }))
            .cloned()
            .collect()
    }

    fn push(&self, event: SinkEvent) {
        self.events.lock().push(event);
    }
}

impl DiagnosticSink for RecordingSink {
    fn transient_failure(&self, trial: u32, max_trials: u32, operation: &str, error: &Error) {
        self.push(SinkEvent::TransientFailure {
            trial,
            max_trials,
            operation: operation.to_string(),
            error: error.to_string(),
        });
    }

    fn warning(&self, message: &str, error: &Error) {
        self.push(SinkEvent::Warning {
            message: message.to_string(),
            error: error.to_string(),
        });
    }
}

impl ProgressSink for RecordingSink {
    fn started(&self, statement: &str) {
        self.push(SinkEvent::Started(statement.to_string()));
    }

    fn progress(&self, rows: usize, _rows_per_sec: f64) {
        self.push(SinkEvent::Progress(rows));
    }

    fn succeeded(&self, rows: usize) {
        self.push(SinkEvent::Succeeded(rows));
    }

    fn failed(&self, rows: usize) {
        self.push(SinkEvent::Failed(rows));
    }
}

/// Row with a single `id` column
pub fn id_row(id: i64) -> Row {
    Row::new(vec!["id".to_string()], vec![Value::Int64(id)])
}

/// Table with a single `id` column
pub fn id_table(ids: &[i64]) -> Table {
    Table::from_rows(ids.iter().copied().map(id_row).collect())
}

/// Row with a single `name` column, the shape of catalog queries
pub fn name_row(name: &str) -> Row {
    Row::new(vec!["name".to_string()], vec![Value::String(name.to_string())])
}
