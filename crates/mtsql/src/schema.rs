//! Schema discovery and management
//!
//! Provides:
//! - [`SchemaProvider`]: read-only catalog discovery on one connection
//! - [`CatalogSchemaProvider`]: provider backed by the dialect's catalog SQL
//! - Handle-level catalog calls, each retried in its own scope
//! - DDL helpers executed through [`execute`](crate::execute::execute)

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::connection::{Connection, ExecutionHandle};
use crate::diagnostics::DiagnosticSink;
use crate::dialect::{dialect_for, index_name, SqlDialect};
use crate::error::{Error, Result};
use crate::execute::{execute, ExecutionOutcome};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::scope::Scope;
use crate::security::validate_sql_identifiers;
use crate::types::{ColumnMetadata, Row};

/// Index as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    /// Index name
    pub name: String,
    /// Indexed table
    pub table: String,
    /// Definition text (DDL, or indexed columns where the server has no DDL)
    pub definition: Option<String>,
}

/// Schema provider for read-only schema discovery
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// List all schemas/databases
    async fn list_schemas(&self) -> Result<BTreeSet<String>>;

    /// List base tables in a schema (default schema when `None`)
    async fn list_tables(&self, schema: Option<&str>) -> Result<BTreeSet<String>>;

    /// List views in a schema
    async fn list_views(&self, schema: Option<&str>) -> Result<BTreeSet<String>>;

    /// Check if a table exists
    async fn table_exists(&self, schema: Option<&str>, table: &str) -> Result<bool> {
        Ok(self.list_tables(schema).await?.contains(table))
    }

    /// Columns of a table in ordinal order
    async fn list_columns(&self, schema: Option<&str>, table: &str) -> Result<Vec<ColumnMetadata>>;

    /// Indexes in a schema
    async fn list_indexes(&self, schema: Option<&str>) -> Result<Vec<IndexMetadata>>;
}

/// [`SchemaProvider`] running the dialect's catalog queries on a connection
pub struct CatalogSchemaProvider<'a> {
    conn: &'a dyn Connection,
    dialect: Box<dyn SqlDialect>,
}

impl<'a> CatalogSchemaProvider<'a> {
    /// Provider using the dialect matching the connection
    pub fn new(conn: &'a dyn Connection) -> Self {
        Self {
            conn,
            dialect: dialect_for(conn.database_type()),
        }
    }

    /// Provider with an explicit dialect
    pub fn with_dialect(conn: &'a dyn Connection, dialect: Box<dyn SqlDialect>) -> Self {
        Self { conn, dialect }
    }

    /// Dialect in use
    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    async fn names(&self, sql: &str) -> Result<BTreeSet<String>> {
        let rows = self.conn.query(sql, &[]).await?;
        rows.iter().map(first_column_string).collect()
    }
}

fn first_column_string(row: &Row) -> Result<String> {
    row.get(0)
        .and_then(|v| v.as_string())
        .ok_or_else(|| Error::schema("catalog query returned a row without a name"))
}

fn column_from_row(row: &Row) -> Result<ColumnMetadata> {
    let name = row
        .get_by_name("column_name")
        .and_then(|v| v.as_string())
        .ok_or_else(|| Error::schema("catalog row is missing column_name"))?;
    let type_name = row
        .get_by_name("data_type")
        .and_then(|v| v.as_string())
        .unwrap_or_default();

    let mut column = ColumnMetadata::new(name, type_name);
    if let Some(nullable) = row.get_by_name("nullable").and_then(|v| v.as_bool()) {
        column.nullable = nullable;
    }
    column.ordinal = row
        .get_by_name("ordinal_position")
        .and_then(|v| v.as_i64())
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0);
    column.default_value = row
        .get_by_name("column_default")
        .and_then(|v| v.as_string());
    Ok(column)
}

#[async_trait]
impl SchemaProvider for CatalogSchemaProvider<'_> {
    async fn list_schemas(&self) -> Result<BTreeSet<String>> {
        self.names(&self.dialect.list_schemas_sql()).await
    }

    async fn list_tables(&self, schema: Option<&str>) -> Result<BTreeSet<String>> {
        self.names(&self.dialect.list_tables_sql(schema)).await
    }

    async fn list_views(&self, schema: Option<&str>) -> Result<BTreeSet<String>> {
        self.names(&self.dialect.list_views_sql(schema)).await
    }

    async fn table_exists(&self, schema: Option<&str>, table: &str) -> Result<bool> {
        let sql = self.dialect.table_exists_sql(schema, table);
        let rows = self.conn.query(&sql, &[]).await?;
        Ok(rows
            .first()
            .and_then(|r| r.get(0))
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn list_columns(&self, schema: Option<&str>, table: &str) -> Result<Vec<ColumnMetadata>> {
        let sql = self.dialect.list_columns_sql(schema, table);
        let rows = self.conn.query(&sql, &[]).await?;
        rows.iter().map(column_from_row).collect()
    }

    async fn list_indexes(&self, schema: Option<&str>) -> Result<Vec<IndexMetadata>> {
        let sql = self.dialect.list_indexes_sql(schema);
        let rows = self.conn.query(&sql, &[]).await?;
        rows.iter()
            .map(|row| {
                let name = first_column_string(row)?;
                let table = row.get(1).and_then(|v| v.as_string()).unwrap_or_default();
                let definition = row.get(2).and_then(|v| v.as_string());
                Ok(IndexMetadata {
                    name,
                    table,
                    definition,
                })
            })
            .collect()
    }
}

// ===========================================================================
// Handle-level catalog calls
// ===========================================================================

/// List all schema names
pub async fn list_schemas(
    handle: ExecutionHandle<'_>,
    policy: &RetryPolicy,
    diagnostics: Option<&dyn DiagnosticSink>,
) -> Result<BTreeSet<String>> {
    run_with_retry(
        concat!(module_path!(), "::list_schemas"),
        policy,
        diagnostics,
        move || async move {
            let scope = Scope::begin(handle).await?;
            let result = CatalogSchemaProvider::new(scope.connection())
                .list_schemas()
                .await;
            scope.finish(result).await
        },
    )
    .await
}

/// List base table names in a schema
pub async fn list_tables(
    handle: ExecutionHandle<'_>,
    schema: Option<&str>,
    policy: &RetryPolicy,
    diagnostics: Option<&dyn DiagnosticSink>,
) -> Result<BTreeSet<String>> {
    run_with_retry(
        concat!(module_path!(), "::list_tables"),
        policy,
        diagnostics,
        move || async move {
            let scope = Scope::begin(handle).await?;
            let result = CatalogSchemaProvider::new(scope.connection())
                .list_tables(schema)
                .await;
            scope.finish(result).await
        },
    )
    .await
}

/// List view names in a schema
pub async fn list_views(
    handle: ExecutionHandle<'_>,
    schema: Option<&str>,
    policy: &RetryPolicy,
    diagnostics: Option<&dyn DiagnosticSink>,
) -> Result<BTreeSet<String>> {
    run_with_retry(
        concat!(module_path!(), "::list_views"),
        policy,
        diagnostics,
        move || async move {
            let scope = Scope::begin(handle).await?;
            let result = CatalogSchemaProvider::new(scope.connection())
                .list_views(schema)
                .await;
            scope.finish(result).await
        },
    )
    .await
}

/// Check whether a table exists
pub async fn table_exists(
    table: &str,
    schema: Option<&str>,
    handle: ExecutionHandle<'_>,
    policy: &RetryPolicy,
    diagnostics: Option<&dyn DiagnosticSink>,
) -> Result<bool> {
    run_with_retry(
        concat!(module_path!(), "::table_exists"),
        policy,
        diagnostics,
        move || async move {
            let scope = Scope::begin(handle).await?;
            let result = CatalogSchemaProvider::new(scope.connection())
                .table_exists(schema, table)
                .await;
            scope.finish(result).await
        },
    )
    .await
}

/// Columns of a table in ordinal order
pub async fn list_columns(
    table: &str,
    schema: Option<&str>,
    handle: ExecutionHandle<'_>,
    policy: &RetryPolicy,
    diagnostics: Option<&dyn DiagnosticSink>,
) -> Result<Vec<ColumnMetadata>> {
    run_with_retry(
        concat!(module_path!(), "::list_columns"),
        policy,
        diagnostics,
        move || async move {
            let scope = Scope::begin(handle).await?;
            let result = CatalogSchemaProvider::new(scope.connection())
                .list_columns(schema, table)
                .await;
            scope.finish(result).await
        },
    )
    .await
}

/// Indexes in a schema
pub async fn list_indexes(
    handle: ExecutionHandle<'_>,
    schema: Option<&str>,
    policy: &RetryPolicy,
    diagnostics: Option<&dyn DiagnosticSink>,
) -> Result<Vec<IndexMetadata>> {
    run_with_retry(
        concat!(module_path!(), "::list_indexes"),
        policy,
        diagnostics,
        move || async move {
            let scope = Scope::begin(handle).await?;
            let result = CatalogSchemaProvider::new(scope.connection())
                .list_indexes(schema)
                .await;
            scope.finish(result).await
        },
    )
    .await
}

// ===========================================================================
// DDL helpers
// ===========================================================================

fn validated<'s>(schema: Option<&'s str>, names: &[&'s str]) -> Result<()> {
    validate_sql_identifiers(schema.into_iter().chain(names.iter().copied()))
}

/// Rename a table within its schema
pub async fn rename_table(
    from: &str,
    to: &str,
    schema: Option<&str>,
    handle: ExecutionHandle<'_>,
    policy: &RetryPolicy,
    diagnostics: Option<&dyn DiagnosticSink>,
) -> Result<ExecutionOutcome> {
    validated(schema, &[from, to])?;
    let sql = dialect_for(handle.database_type()).rename_table_sql(schema, from, to);
    execute(sql, handle, policy, diagnostics).await
}

/// Drop a table if it exists
pub async fn drop_table(
    table: &str,
    schema: Option<&str>,
    handle: ExecutionHandle<'_>,
    policy: &RetryPolicy,
    diagnostics: Option<&dyn DiagnosticSink>,
) -> Result<ExecutionOutcome> {
    validated(schema, &[table])?;
    let sql = dialect_for(handle.database_type()).drop_table_if_exists_sql(schema, table);
    execute(sql, handle, policy, diagnostics).await
}

/// Rename a column
pub async fn rename_column(
    table: &str,
    from: &str,
    to: &str,
    schema: Option<&str>,
    handle: ExecutionHandle<'_>,
    policy: &RetryPolicy,
    diagnostics: Option<&dyn DiagnosticSink>,
) -> Result<ExecutionOutcome> {
    validated(schema, &[table, from, to])?;
    let sql = dialect_for(handle.database_type()).rename_column_sql(schema, table, from, to);
    execute(sql, handle, policy, diagnostics).await
}

/// Drop a column
pub async fn drop_column(
    table: &str,
    column: &str,
    schema: Option<&str>,
    handle: ExecutionHandle<'_>,
    policy: &RetryPolicy,
    diagnostics: Option<&dyn DiagnosticSink>,
) -> Result<ExecutionOutcome> {
    validated(schema, &[table, column])?;
    let sql = dialect_for(handle.database_type()).drop_column_sql(schema, table, column);
    execute(sql, handle, policy, diagnostics).await
}

/// Create `ix_<table>_<column>` unless it already exists
///
/// Returns whether an index was created.
pub async fn make_index(
    table: &str,
    column: &str,
    schema: Option<&str>,
    handle: ExecutionHandle<'_>,
    policy: &RetryPolicy,
    diagnostics: Option<&dyn DiagnosticSink>,
) -> Result<bool> {
    validated(schema, &[table, column])?;
    let name = index_name(table, column);

    let existing = list_indexes(handle, schema, policy, diagnostics).await?;
    if existing.iter().any(|ix| ix.name.eq_ignore_ascii_case(&name)) {
        return Ok(false);
    }

    let sql = dialect_for(handle.database_type()).create_index_sql(schema, table, column);
    execute(sql, handle, policy, diagnostics).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn test_column_from_row() {
        let row = Row::new(
            vec![
                "column_name".into(),
                "data_type".into(),
                "nullable".into(),
                "ordinal_position".into(),
                "column_default".into(),
            ],
            vec![
                Value::from("id"),
                Value::from("bigint"),
                Value::Bool(false),
                Value::Int32(1),
                Value::Null,
            ],
        );
        let column = column_from_row(&row).unwrap();
        assert_eq!(column.name, "id");
        assert_eq!(column.type_name, "bigint");
        assert!(!column.nullable);
        assert_eq!(column.ordinal, 1);
        assert_eq!(column.default_value, None);
    }

    #[test]
    fn test_rejects_bad_identifiers_before_io() {
        assert!(validated(Some("public"), &["users", "email"]).is_ok());
        assert!(validated(Some("pub lic"), &["users"]).is_err());
        assert!(validated(None, &["users; DROP TABLE x"]).is_err());
    }
}
