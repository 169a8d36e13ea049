//! Error types for mtsql
//!
//! Every failure a driver adapter can report is expressed as an [`Error`]
//! variant, so the retry executor never has to look at driver types. Variants
//! fall into three groups:
//! - what the driver saw (connectivity, malformed SQL, constraint checks)
//! - what the server reported, tagged with its SQLSTATE ([`Error::Database`])
//! - what mtsql itself produced ([`Error::ExhaustedRetries`], [`Error::InvalidPolicy`])
//!
//! Whether a variant is worth another trial is decided in [`crate::classify`].

use std::fmt;
use thiserror::Error;

/// Result type for mtsql operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed underlying cause attached by a driver adapter
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Label for an [`Error`], used as a structured logging field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ErrorCategory {
    Connection,
    Query,
    Transaction,
    Constraint,
    TypeConversion,
    Timeout,
    Deadlock,
    Authentication,
    Configuration,
    PoolExhausted,
    Schema,
    Database,
    Retry,
    Policy,
    Other,
}

impl ErrorCategory {
    /// Snake-case label
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Query => "query",
            Self::Transaction => "transaction",
            Self::Constraint => "constraint",
            Self::TypeConversion => "type_conversion",
            Self::Timeout => "timeout",
            Self::Deadlock => "deadlock",
            Self::Authentication => "authentication",
            Self::Configuration => "configuration",
            Self::PoolExhausted => "pool_exhausted",
            Self::Schema => "schema",
            Self::Database => "database",
            Self::Retry => "retry",
            Self::Policy => "policy",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for mtsql
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    // -- reported by the driver --------------------------------------------
    /// The link to the server broke or could not be opened
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The server refused the statement as written
    #[error("query rejected: {message}")]
    Query {
        message: String,
        sql: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    /// BEGIN, COMMIT or ROLLBACK did not go through
    #[error("transaction failed: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Primary key, foreign key, unique or check constraint tripped
    #[error("constraint {constraint_name} violated: {message}")]
    Constraint {
        constraint_name: String,
        message: String,
    },

    /// A value could not be carried between Rust and SQL types
    #[error("cannot convert value: {message}")]
    TypeConversion { message: String },

    /// The statement ran past its deadline
    #[error("timeout: {message}")]
    Timeout { message: String },

    /// Chosen as a deadlock victim
    #[error("deadlock detected")]
    Deadlock,

    #[error("authentication rejected: {message}")]
    Authentication { message: String },

    /// No pooled connection became available
    #[error("no connection available: {message}")]
    PoolExhausted { message: String },

    /// Catalog lookups disagreed with what the caller expected
    #[error("schema mismatch: {message}")]
    Schema { message: String },

    #[error("no such table: {table}")]
    TableNotFound { table: String },

    /// Backend cannot do what was asked
    #[error("not supported by this backend: {message}")]
    Unsupported { message: String },

    // -- reported by the server --------------------------------------------
    /// Server error identified only by its SQLSTATE code
    #[error("database error: {message}")]
    Database {
        sqlstate: Option<String>,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    // -- produced by mtsql -------------------------------------------------
    /// Invalid settings or an identifier refused before any SQL was sent
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Every permitted trial failed with a transient error
    #[error("attempted {trials} times to execute `{operation}` but failed")]
    ExhaustedRetries {
        operation: String,
        trials: u32,
        #[source]
        last: Box<Error>,
    },

    /// A mid-stream failure reached a partial-failure policy nobody recognizes
    #[error("unknown value for partial failure policy: '{value}'")]
    InvalidPolicy {
        value: String,
        #[source]
        source: Box<Error>,
    },

    /// Broken internal assumption
    #[error("internal error: {message}")]
    Internal { message: String },
}

macro_rules! message_constructors {
    ($($(#[$doc:meta])* $fn_name:ident => $variant:ident;)+) => {
        $(
            $(#[$doc])*
            pub fn $fn_name(message: impl Into<String>) -> Self {
                Self::$variant { message: message.into() }
            }
        )+
    };
}

impl Error {
    message_constructors! {
        /// Statement ran past its deadline
        timeout => Timeout;
        /// Invalid settings, refused before touching the database
        config => Configuration;
        /// Value could not be converted
        type_conversion => TypeConversion;
        /// Catalog disagreement
        schema => Schema;
        /// Operation the backend cannot perform
        unsupported => Unsupported;
        /// Broken internal assumption
        internal => Internal;
    }

    /// Connection broke or could not be opened
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Statement rejected by the server
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: None,
            source: None,
        }
    }

    /// Statement rejected by the server, remembering the offending SQL
    pub fn query_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: Some(sql.into()),
            source: None,
        }
    }

    /// BEGIN, COMMIT or ROLLBACK failed
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            source: None,
        }
    }

    /// Raw server error tagged with a SQLSTATE code
    pub fn database(sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            sqlstate: Some(sqlstate.into()),
            message: message.into(),
            source: None,
        }
    }

    /// Attach the driver's own error as the cause
    ///
    /// Only variants that carry a source slot keep it; for the others the
    /// cause is dropped and the error is returned unchanged.
    pub fn with_source(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        match &mut self {
            Self::Connection { source, .. }
            | Self::Query { source, .. }
            | Self::Transaction { source, .. }
            | Self::Database { source, .. } => *source = Some(Box::new(cause)),
            _ => {}
        }
        self
    }

    /// Logging label for this error
    pub fn category(&self) -> ErrorCategory {
        use ErrorCategory as C;
        match self {
            Self::Connection { .. } => C::Connection,
            Self::Query { .. } => C::Query,
            Self::Transaction { .. } => C::Transaction,
            Self::Constraint { .. } => C::Constraint,
            Self::TypeConversion { .. } => C::TypeConversion,
            Self::Timeout { .. } => C::Timeout,
            Self::Deadlock => C::Deadlock,
            Self::Authentication { .. } => C::Authentication,
            Self::PoolExhausted { .. } => C::PoolExhausted,
            Self::Schema { .. } | Self::TableNotFound { .. } => C::Schema,
            Self::Database { .. } => C::Database,
            Self::Configuration { .. } => C::Configuration,
            Self::ExhaustedRetries { .. } => C::Retry,
            Self::InvalidPolicy { .. } => C::Policy,
            Self::Unsupported { .. } | Self::Internal { .. } => C::Other,
        }
    }

    /// Whether the retry executor would try this error again
    #[inline]
    pub fn is_retriable(&self) -> bool {
        crate::classify::disposition(self).is_transient()
    }

    /// SQLSTATE code reported by the server, if any
    pub fn sqlstate(&self) -> Option<&str> {
        if let Self::Database { sqlstate, .. } = self {
            sqlstate.as_deref()
        } else {
            None
        }
    }
}
