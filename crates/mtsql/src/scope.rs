//! Transactional scope
//!
//! A [`Scope`] is opened on an [`ExecutionHandle`]. On an engine it owns a
//! fresh transaction which [`Scope::finish`] commits on success and rolls back
//! on failure. On a caller's connection it is transparent: no begin, commit or
//! rollback is ever issued.
//!
//! ```rust,ignore
//! let scope = Scope::begin(handle).await?;
//! let result = scope.connection().execute(sql, &[]).await;
//! let affected = scope.finish(result).await?;
//! ```

use tracing::{debug, warn};

use crate::connection::{Connection, ExecutionHandle, Transaction};
use crate::error::Result;

enum ScopeKind<'a> {
    Owned(Box<dyn Transaction>),
    Borrowed(&'a dyn Connection),
}

/// Scoped execution context opened on a handle
pub struct Scope<'a> {
    kind: ScopeKind<'a>,
}

impl<'a> Scope<'a> {
    /// Open a scope, beginning a transaction when the handle is an engine
    pub async fn begin(handle: ExecutionHandle<'a>) -> Result<Scope<'a>> {
        let kind = match handle {
            ExecutionHandle::Engine(engine) => {
                let tx = engine.begin().await?;
                debug!(database = %engine.database_type(), "began owned transaction");
                ScopeKind::Owned(tx)
            }
            ExecutionHandle::Connection(conn) => ScopeKind::Borrowed(conn),
        };
        Ok(Self { kind })
    }

    /// Whether this scope owns its transaction
    #[inline]
    pub fn is_owned(&self) -> bool {
        matches!(self.kind, ScopeKind::Owned(_))
    }

    /// Connection to run statements on inside the scope
    pub fn connection(&self) -> &dyn Connection {
        match &self.kind {
            ScopeKind::Owned(tx) => tx.as_connection(),
            ScopeKind::Borrowed(conn) => *conn,
        }
    }

    /// Commit an owned transaction; no-op on a borrowed connection
    pub async fn commit(self) -> Result<()> {
        match self.kind {
            ScopeKind::Owned(tx) => {
                tx.commit().await?;
                debug!("committed owned transaction");
                Ok(())
            }
            ScopeKind::Borrowed(_) => Ok(()),
        }
    }

    /// Roll back an owned transaction; no-op on a borrowed connection
    pub async fn rollback(self) -> Result<()> {
        match self.kind {
            ScopeKind::Owned(tx) => {
                tx.rollback().await?;
                debug!("rolled back owned transaction");
                Ok(())
            }
            ScopeKind::Borrowed(_) => Ok(()),
        }
    }

    /// Close the scope according to the outcome of the work done in it
    ///
    /// `Ok` commits. `Err` rolls back and returns the original error; a
    /// failing rollback is logged and does not replace it.
    pub async fn finish<T>(self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback().await {
                    warn!(error = %rollback_err, "rollback failed after error: {}", e);
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("owned", &self.is_owned())
            .finish()
    }
}
