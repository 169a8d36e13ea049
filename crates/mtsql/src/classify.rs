//! Failure classification
//!
//! Every failed trial is classified exactly once into a closed [`Disposition`]:
//!
//! | Disposition | Examples | Retry executor |
//! |-------------|----------|----------------|
//! | `Fatal`     | malformed SQL, constraint violation | propagate at once |
//! | `Transient` | connection reset, server timeout, deadlock | retry until exhausted |
//! | `Unknown`   | anything not recognized above | propagate at once |
//!
//! Raw server errors ([`Error::Database`]) are classified by SQLSTATE class
//! through [`SQLSTATE_CLASSES`].

use crate::error::Error;
use std::fmt;

/// How the retry executor treats a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Never retried
    Fatal,
    /// Eligible for retry
    Transient,
    /// Not recognized; propagated without retry
    Unknown,
}

impl Disposition {
    /// Whether the retry executor tries again
    #[inline]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::Transient => write!(f, "transient"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A failure tagged with its disposition
#[derive(Debug)]
pub enum ClassifiedError {
    /// Client-side error that must not be retried
    Fatal(Error),
    /// Temporary server or network condition
    Transient(Error),
    /// Anything else
    Unknown(Error),
}

impl ClassifiedError {
    /// Disposition of the wrapped error
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Fatal(_) => Disposition::Fatal,
            Self::Transient(_) => Disposition::Transient,
            Self::Unknown(_) => Disposition::Unknown,
        }
    }

    /// Borrow the wrapped error
    pub fn error(&self) -> &Error {
        match self {
            Self::Fatal(e) | Self::Transient(e) | Self::Unknown(e) => e,
        }
    }

    /// Unwrap into the original error
    pub fn into_error(self) -> Error {
        match self {
            Self::Fatal(e) | Self::Transient(e) | Self::Unknown(e) => e,
        }
    }

    /// Whether the retry executor tries again
    #[inline]
    pub fn is_transient(&self) -> bool {
        self.disposition().is_transient()
    }
}

/// SQLSTATE class prefixes and their disposition, matched in order
///
/// Codes outside the table are [`Disposition::Unknown`] and are not retried.
pub const SQLSTATE_CLASSES: &[(&str, Disposition)] = &[
    // connection exception
    ("08", Disposition::Transient),
    // transaction rollback (serialization failure, deadlock)
    ("40", Disposition::Transient),
    // insufficient resources
    ("53", Disposition::Transient),
    // object not in prerequisite state (lock not available)
    ("55", Disposition::Transient),
    // operator intervention (admin shutdown, cannot connect now)
    ("57", Disposition::Transient),
    // system error
    ("58", Disposition::Transient),
    // internal error
    ("XX", Disposition::Transient),
    // ODBC timeout
    ("HYT", Disposition::Transient),
    // case not found
    ("20", Disposition::Fatal),
    // cardinality violation
    ("21", Disposition::Fatal),
    // data exception
    ("22", Disposition::Fatal),
    // integrity constraint violation
    ("23", Disposition::Fatal),
    // invalid transaction state (in failed transaction block)
    ("25", Disposition::Fatal),
    // invalid SQL statement name
    ("26", Disposition::Fatal),
    // triggered data change violation
    ("27", Disposition::Fatal),
    // dependent privilege descriptors still exist
    ("2B", Disposition::Fatal),
    // invalid transaction termination
    ("2D", Disposition::Fatal),
    // invalid cursor name
    ("34", Disposition::Fatal),
    // invalid catalog name
    ("3D", Disposition::Fatal),
    // invalid schema name
    ("3F", Disposition::Fatal),
    // syntax error or access rule violation
    ("42", Disposition::Fatal),
    // WITH CHECK OPTION violation
    ("44", Disposition::Fatal),
    // feature not supported
    ("0A", Disposition::Fatal),
    // PL/pgSQL RAISE EXCEPTION and friends
    ("P0", Disposition::Fatal),
    // invalid authorization
    ("28", Disposition::Unknown),
];

/// Look up the disposition for a SQLSTATE code
///
/// Returns `None` when no class prefix matches.
pub fn disposition_for_sqlstate(sqlstate: &str) -> Option<Disposition> {
    let code = sqlstate.trim().to_ascii_uppercase();
    SQLSTATE_CLASSES
        .iter()
        .find(|(prefix, _)| code.starts_with(prefix))
        .map(|(_, disposition)| *disposition)
}

/// Decide how an error is treated without consuming it
pub fn disposition(error: &Error) -> Disposition {
    match error {
        Error::Query { .. }
        | Error::Constraint { .. }
        | Error::TypeConversion { .. }
        | Error::Schema { .. }
        | Error::TableNotFound { .. } => Disposition::Fatal,

        Error::Connection { .. }
        | Error::Timeout { .. }
        | Error::Deadlock
        | Error::PoolExhausted { .. }
        | Error::Transaction { .. } => Disposition::Transient,

        // no code at all: the server failed without blaming the statement
        Error::Database { sqlstate: None, .. } => Disposition::Transient,
        Error::Database {
            sqlstate: Some(code),
            ..
        } => disposition_for_sqlstate(code).unwrap_or(Disposition::Unknown),

        Error::ExhaustedRetries { .. }
        | Error::InvalidPolicy { .. }
        | Error::Authentication { .. }
        | Error::Configuration { .. }
        | Error::Unsupported { .. }
        | Error::Internal { .. } => Disposition::Unknown,
    }
}

/// Classify a failed call
pub fn classify(error: Error) -> ClassifiedError {
    match disposition(&error) {
        Disposition::Fatal => ClassifiedError::Fatal(error),
        Disposition::Transient => ClassifiedError::Transient(error),
        Disposition::Unknown => ClassifiedError::Unknown(error),
    }
}
