//! Driver contracts consumed by mtsql
//!
//! mtsql never talks to a server itself. A driver adapter implements:
//! - [`Connection`]: query/execute plus batched fetching
//! - [`Transaction`]: a connection that can be committed or rolled back
//! - [`Engine`]: a connection pool that hands out fresh transactions
//! - [`BatchStream`]: forward-only row batches for chunked reads
//!
//! Callers pass either side to the public API through [`ExecutionHandle`].

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::types::{Row, Table, Value};

/// One server session that statements run against
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run a statement and collect every row it returns
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a statement that modifies data, returns affected row count
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Start a streaming read that yields at most `batch_size` rows per batch
    ///
    /// The default runs the query in one go and splits the result; drivers
    /// with server-side cursors should override it.
    async fn fetch_batches<'a>(
        &'a self,
        sql: &str,
        params: &[Value],
        batch_size: usize,
    ) -> Result<Box<dyn BatchStream + 'a>> {
        let rows = self.query(sql, params).await?;
        Ok(Box::new(VecBatchStream::from_rows(rows, batch_size)))
    }

    /// Database flavour behind this connection
    fn database_type(&self) -> DatabaseType;
}

/// A [`Connection`] whose work becomes visible only on commit
#[async_trait]
pub trait Transaction: Connection {
    /// View this transaction as a plain connection
    fn as_connection(&self) -> &dyn Connection;

    /// Make the work durable, consuming the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard the work, consuming the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// A connection pool that owns connection and transaction lifecycles
#[async_trait]
pub trait Engine: Send + Sync {
    /// Acquire a connection and begin a transaction on it
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    /// Database flavour behind this engine
    fn database_type(&self) -> DatabaseType;
}

/// Forward-only sequence of row batches
///
/// A stream is consumed exactly once and cannot be restarted. `Ok(None)`
/// signals exhaustion.
pub trait BatchStream: Send {
    /// Get the next batch
    fn next_batch(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Table>>> + Send + '_>>;
}

/// [`BatchStream`] over batches that are already in memory
#[derive(Debug, Default)]
pub struct VecBatchStream {
    batches: std::collections::VecDeque<Table>,
}

impl VecBatchStream {
    /// Stream the given batches in order
    pub fn new(batches: Vec<Table>) -> Self {
        Self {
            batches: batches.into(),
        }
    }

    /// Split rows into batches of at most `batch_size` rows
    pub fn from_rows(rows: Vec<Row>, batch_size: usize) -> Self {
        let size = batch_size.max(1);
        let mut batches = Vec::with_capacity(rows.len().div_ceil(size));
        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            let chunk: Vec<Row> = rows.by_ref().take(size).collect();
            batches.push(Table::from_rows(chunk));
        }
        Self::new(batches)
    }
}

impl BatchStream for VecBatchStream {
    fn next_batch(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<Table>>> + Send + '_>> {
        let next = self.batches.pop_front();
        Box::pin(async move { Ok(next) })
    }
}

/// Database type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseType {
    /// PostgreSQL
    PostgreSQL,
    /// MySQL/MariaDB
    MySQL,
    /// SQLite
    SQLite,
    /// Unknown/custom
    Unknown,
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PostgreSQL => write!(f, "PostgreSQL"),
            Self::MySQL => write!(f, "MySQL"),
            Self::SQLite => write!(f, "SQLite"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// What a public operation runs against
///
/// An `Engine` handle makes each call open and close its own transaction. A
/// `Connection` handle is assumed to sit inside a transaction the caller owns;
/// mtsql never commits, rolls back or closes it.
#[derive(Clone, Copy)]
pub enum ExecutionHandle<'a> {
    /// Connection pool; calls own their transactions
    Engine(&'a dyn Engine),
    /// Live connection owned by the caller
    Connection(&'a dyn Connection),
}

impl<'a> ExecutionHandle<'a> {
    /// Whether a scope opened on this handle owns its transaction
    #[inline]
    pub fn is_owned_scope(&self) -> bool {
        matches!(self, Self::Engine(_))
    }

    /// Database flavour behind the handle
    pub fn database_type(&self) -> DatabaseType {
        match self {
            Self::Engine(engine) => engine.database_type(),
            Self::Connection(conn) => conn.database_type(),
        }
    }
}

impl fmt::Debug for ExecutionHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine(engine) => f
                .debug_tuple("Engine")
                .field(&engine.database_type())
                .finish(),
            Self::Connection(conn) => f
                .debug_tuple("Connection")
                .field(&conn.database_type())
                .finish(),
        }
    }
}

impl<'a> From<&'a dyn Engine> for ExecutionHandle<'a> {
    fn from(engine: &'a dyn Engine) -> Self {
        Self::Engine(engine)
    }
}

impl<'a> From<&'a dyn Connection> for ExecutionHandle<'a> {
    fn from(conn: &'a dyn Connection) -> Self {
        Self::Connection(conn)
    }
}
