//! Temporary id tables
//!
//! Temp tables are named `mttmp_<id>`. A new id is one past the largest id in
//! use, counting both regular tables and the session's temp tables, so ids
//! never collide with a table that still exists. Id discovery is retried like
//! any catalog call; creating and dropping are single-shot and any failure is
//! returned as-is.

use sea_query::{Alias, Query};
use std::collections::BTreeSet;
use tracing::debug;

use crate::connection::{Connection, ExecutionHandle};
use crate::diagnostics::DiagnosticSink;
use crate::dialect::dialect_for;
use crate::error::{Error, Result};
use crate::execute::execute_once;
use crate::retry::{run_with_retry, RetryPolicy};
use crate::schema::{CatalogSchemaProvider, SchemaProvider};
use crate::scope::Scope;
use crate::statement::{normalize, Statement};

/// Prefix of every temp table name
pub const TEMP_TABLE_PREFIX: &str = "mttmp_";

/// Ids inserted per INSERT statement
const INSERT_CHUNK: usize = 1000;

/// Name of the temp table with the given id
pub fn temp_table_name(id: u64) -> String {
    format!("{}{}", TEMP_TABLE_PREFIX, id)
}

/// Id of a temp table name, if it is one
pub fn parse_temp_table_id(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(TEMP_TABLE_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// One past the largest temp table id among `names`, or 0 when there is none
pub fn next_unused_temp_table_id<I, S>(names: I) -> u64
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| parse_temp_table_id(name.as_ref()))
        .max()
        .map_or(0, |max| max.saturating_add(1))
}

/// Names that a new temp table must not reuse
///
/// Base tables of the default schema plus the session's own temp tables,
/// which the base-table listing does not show.
async fn taken_table_names(conn: &dyn Connection) -> Result<BTreeSet<String>> {
    let dialect = dialect_for(conn.database_type());
    let mut taken = CatalogSchemaProvider::new(conn).list_tables(None).await?;
    for row in conn.query(&dialect.list_temp_tables_sql(), &[]).await? {
        if let Some(name) = row.get(0).and_then(|v| v.as_string()) {
            taken.insert(name);
        }
    }
    Ok(taken)
}

/// Find a temp table id used neither by a table nor by a session temp table
pub async fn find_unused_temp_table_id(
    handle: ExecutionHandle<'_>,
    policy: &RetryPolicy,
    diagnostics: Option<&dyn DiagnosticSink>,
) -> Result<u64> {
    let taken = run_with_retry(
        concat!(module_path!(), "::find_unused_temp_table_id"),
        policy,
        diagnostics,
        move || async move {
            let scope = Scope::begin(handle).await?;
            let result = taken_table_names(scope.connection()).await;
            scope.finish(result).await
        },
    )
    .await?;
    Ok(next_unused_temp_table_id(&taken))
}

/// Create a temp table holding `ids` on `conn` and return its name
///
/// The table lives as long as the connection's session. Duplicate ids are
/// stored once.
pub async fn create_temp_id_table(ids: &[i64], conn: &dyn Connection) -> Result<String> {
    let db = conn.database_type();
    let dialect = dialect_for(db);

    let taken = taken_table_names(conn).await?;
    let name = temp_table_name(next_unused_temp_table_id(&taken));

    conn.execute(&dialect.create_temp_id_table_sql(&name), &[])
        .await?;

    let unique: BTreeSet<i64> = ids.iter().copied().collect();
    let unique: Vec<i64> = unique.into_iter().collect();
    for chunk in unique.chunks(INSERT_CHUNK) {
        let mut insert = Query::insert();
        insert
            .into_table(Alias::new(name.as_str()))
            .columns([Alias::new("id")]);
        for id in chunk {
            insert
                .values([(*id).into()])
                .map_err(|e| Error::internal(format!("building temp table insert: {}", e)))?;
        }
        let normalized = normalize(&Statement::Insert(insert), db)?;
        conn.execute(&normalized.executable.sql, &normalized.executable.params)
            .await?;
    }

    debug!(table = %name, ids = unique.len(), "created temp id table");
    Ok(name)
}

/// Drop a temp table if it exists
pub async fn drop_temp_table(id: u64, handle: ExecutionHandle<'_>) -> Result<()> {
    let sql =
        dialect_for(handle.database_type()).drop_table_if_exists_sql(None, &temp_table_name(id));
    execute_once(handle, &sql).await?;
    Ok(())
}
