//! Retried statement execution
//!
//! Every trial of [`execute`] opens its own scope, so on an engine a failed
//! trial is rolled back before the next one begins and nothing half-applied is
//! ever committed.

use tracing::debug;

use crate::connection::ExecutionHandle;
use crate::diagnostics::DiagnosticSink;
use crate::error::Result;
use crate::retry::{run_with_retry, RetryPolicy};
use crate::scope::Scope;
use crate::statement::{normalize, Statement};

const EXECUTE_OPERATION: &str = concat!(module_path!(), "::execute");

/// Result of a successful [`execute`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Rows affected as reported by the driver
    pub rows_affected: u64,
    /// One-line display form of the executed statement
    pub statement: String,
}

/// Execute a statement with bounded retry
///
/// # Example
///
/// ```rust,ignore
/// use mtsql::prelude::*;
///
/// let outcome = execute(
///     "UPDATE users SET active = false WHERE last_seen < now() - interval '1 year'",
///     ExecutionHandle::Engine(&engine),
///     &RetryPolicy::default(),
///     Some(&TracingSink),
/// )
/// .await?;
/// println!("{} rows deactivated", outcome.rows_affected);
/// ```
pub async fn execute(
    statement: impl Into<Statement>,
    handle: ExecutionHandle<'_>,
    policy: &RetryPolicy,
    diagnostics: Option<&dyn DiagnosticSink>,
) -> Result<ExecutionOutcome> {
    let statement = statement.into();
    let normalized = normalize(&statement, handle.database_type())?;
    let exec = &normalized.executable;
    debug!(statement = %normalized.display, owned = handle.is_owned_scope(), "executing");

    let rows_affected = run_with_retry(EXECUTE_OPERATION, policy, diagnostics, move || async move {
        let scope = Scope::begin(handle).await?;
        let result = scope.connection().execute(&exec.sql, &exec.params).await;
        scope.finish(result).await
    })
    .await?;

    Ok(ExecutionOutcome {
        rows_affected,
        statement: normalized.display,
    })
}

/// Run one statement in its own scope without retry
pub(crate) async fn execute_once(handle: ExecutionHandle<'_>, sql: &str) -> Result<u64> {
    debug!(statement = %sql, "executing once");
    let scope = Scope::begin(handle).await?;
    let result = scope.connection().execute(sql, &[]).await;
    scope.finish(result).await
}
