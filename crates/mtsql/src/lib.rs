//! # mtsql
//!
//! Resilient SQL execution on top of any async database driver.
//!
//! mtsql wraps the statements an application sends to a relational database
//! with the handling production code keeps re-writing by hand:
//!
//! ## Features
//!
//! - **Failure Classification**: driver errors sorted into fatal, transient and unknown, with SQLSTATE class lookup
//! - **Bounded Retry**: transient failures retried up to a trial limit, with optional backoff
//! - **Transactional Scope**: engine calls run in their own transaction; caller connections are left alone
//! - **Chunked Reads**: batched streaming with progress reporting and a partial-failure policy
//! - **Statement Formatting**: text or sea-query statements rendered for the target dialect
//! - **Catalog and DDL Helpers**: schemas, tables, views, columns, indexes and temp id tables
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mtsql::prelude::*;
//!
//! let config = SqlConfig::from_json(r#"{"max_trials": 5, "chunk_size": 10000}"#)?;
//! let handle = ExecutionHandle::Engine(&engine);
//!
//! let outcome = execute(
//!     "DELETE FROM sessions WHERE expires_at < now()",
//!     handle,
//!     &config.retry_policy(),
//!     Some(&TracingSink),
//! )
//! .await?;
//!
//! let events = read("SELECT * FROM events", handle, &config.read_options(), Sinks::tracing()).await?;
//! ```
//!
//! Drivers plug in by implementing [`connection::Connection`],
//! [`connection::Transaction`] and [`connection::Engine`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod classify;
pub mod config;
pub mod connection;
pub mod diagnostics;
pub mod dialect;
pub mod error;
pub mod execute;
pub mod read;
pub mod retry;
pub mod schema;
pub mod scope;
pub mod security;
pub mod statement;
pub mod temp;
pub mod testing;
pub mod types;

/// Prelude module for convenient imports
pub mod prelude {
    // Error types
    pub use crate::classify::{classify, disposition, ClassifiedError, Disposition};
    pub use crate::error::{Error, ErrorCategory, Result};

    // Value and type system
    pub use crate::types::{ColumnMetadata, Row, Table, Value};

    // Driver contracts
    pub use crate::connection::{
        BatchStream, Connection, DatabaseType, Engine, ExecutionHandle, Transaction,
        VecBatchStream,
    };
    pub use crate::scope::Scope;

    // Configuration and policies
    pub use crate::config::SqlConfig;
    pub use crate::diagnostics::{DiagnosticSink, ProgressSink, Sinks, TracingSink};
    pub use crate::read::{PartialFailurePolicy, ReadOptions};
    pub use crate::retry::{run_with_retry, Backoff, RetryPolicy};

    // Statements and dialects
    pub use crate::dialect::{dialect_for, SqlDialect};
    pub use crate::statement::{normalize, Statement};

    // Operations
    pub use crate::execute::{execute, ExecutionOutcome};
    pub use crate::read::{read, read_table};
    pub use crate::schema::{
        drop_column, drop_table, list_columns, list_indexes, list_schemas, list_tables,
        list_views, make_index, rename_column, rename_table, table_exists, IndexMetadata,
        SchemaProvider,
    };
    pub use crate::temp::{create_temp_id_table, drop_temp_table, find_unused_temp_table_id};
}

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use types::Value;
