//! SQL dialect abstraction
//!
//! Catalog and DDL statements differ per server and cannot take identifiers as
//! bound parameters, so each dialect renders them as complete SQL text:
//! - Identifier quoting and qualified table names
//! - Catalog queries (schemas, tables, views, columns, indexes)
//! - DDL (rename/drop table, rename/drop column, create index, temp tables)
//!
//! Pre-built sea-query statements are rendered with the query builder that
//! matches the [`DatabaseType`].

use crate::connection::DatabaseType;
use crate::security::escape_string_literal;
use sea_query::{
    Alias, Asterisk, IntoIden, MysqlQueryBuilder, PostgresQueryBuilder, Query,
    QueryStatementWriter, SelectStatement, SqliteQueryBuilder, TableRef, Values,
};

fn sea_table_ref(schema: Option<&str>, table: &str) -> TableRef {
    match schema {
        Some(s) => TableRef::SchemaTable(Alias::new(s).into_iden(), Alias::new(table).into_iden()),
        None => TableRef::Table(Alias::new(table).into_iden()),
    }
}

/// Name of the index [`SqlDialect::create_index_sql`] creates on one column
pub fn index_name(table: &str, column: &str) -> String {
    format!("ix_{}_{}", table, column)
}

/// `SELECT * FROM <schema>.<table>`
pub fn select_all(schema: Option<&str>, table: &str) -> SelectStatement {
    Query::select()
        .column(Asterisk)
        .from(sea_table_ref(schema, table))
        .to_owned()
}

/// Build a statement into placeholder SQL and its bound values
pub fn build_query<S: QueryStatementWriter>(stmt: &S, db: DatabaseType) -> (String, Values) {
    match db {
        DatabaseType::MySQL => stmt.build(MysqlQueryBuilder),
        DatabaseType::SQLite => stmt.build(SqliteQueryBuilder),
        DatabaseType::PostgreSQL | DatabaseType::Unknown => stmt.build(PostgresQueryBuilder),
    }
}

/// Render a statement with its values inlined as literals
///
/// Only for display; never execute the result.
pub fn inline_query<S: QueryStatementWriter>(stmt: &S, db: DatabaseType) -> String {
    match db {
        DatabaseType::MySQL => stmt.to_string(MysqlQueryBuilder),
        DatabaseType::SQLite => stmt.to_string(SqliteQueryBuilder),
        DatabaseType::PostgreSQL | DatabaseType::Unknown => stmt.to_string(PostgresQueryBuilder),
    }
}

/// SQL dialect for vendor-specific SQL generation
///
/// Catalog queries return one name per row in the first column, except:
/// - `table_exists_sql`: a single boolean-like value
/// - `list_columns_sql`: `column_name, data_type, nullable, ordinal_position, column_default`
/// - `list_indexes_sql`: `index_name, table_name, definition`
///
/// Identifiers must be validated before they reach the DDL methods.
pub trait SqlDialect: Send + Sync {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Database type this dialect speaks
    fn database_type(&self) -> DatabaseType;

    /// Quote an identifier (table, column name)
    fn quote_identifier(&self, name: &str) -> String;

    /// Quoted, optionally schema-qualified table name
    fn qualified_table(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(s) => format!("{}.{}", self.quote_identifier(s), self.quote_identifier(table)),
            None => self.quote_identifier(table),
        }
    }

    /// SQL listing all schema names
    fn list_schemas_sql(&self) -> String;

    /// SQL listing base table names in a schema (default schema when `None`)
    fn list_tables_sql(&self, schema: Option<&str>) -> String;

    /// SQL listing temporary table names visible to the session
    fn list_temp_tables_sql(&self) -> String {
        self.list_tables_sql(None)
    }

    /// SQL listing view names in a schema
    fn list_views_sql(&self, schema: Option<&str>) -> String;

    /// SQL checking table existence
    fn table_exists_sql(&self, schema: Option<&str>, table: &str) -> String;

    /// SQL listing columns of a table
    fn list_columns_sql(&self, schema: Option<&str>, table: &str) -> String;

    /// SQL listing indexes in a schema
    fn list_indexes_sql(&self, schema: Option<&str>) -> String;

    /// Rename a table within its schema
    fn rename_table_sql(&self, schema: Option<&str>, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.qualified_table(schema, from),
            self.quote_identifier(to)
        )
    }

    /// Drop a table if it exists
    fn drop_table_if_exists_sql(&self, schema: Option<&str>, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.qualified_table(schema, table))
    }

    /// Rename a column
    fn rename_column_sql(&self, schema: Option<&str>, table: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.qualified_table(schema, table),
            self.quote_identifier(from),
            self.quote_identifier(to)
        )
    }

    /// Drop a column
    fn drop_column_sql(&self, schema: Option<&str>, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.qualified_table(schema, table),
            self.quote_identifier(column)
        )
    }

    /// Create the single-column index named by [`index_name`]
    fn create_index_sql(&self, schema: Option<&str>, table: &str, column: &str) -> String {
        format!(
            "CREATE INDEX {} ON {} ({})",
            self.quote_identifier(&index_name(table, column)),
            self.qualified_table(schema, table),
            self.quote_identifier(column)
        )
    }

    /// Create a session-scoped table holding one BIGINT key column `id`
    fn create_temp_id_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TEMPORARY TABLE {} (id BIGINT PRIMARY KEY)",
            self.quote_identifier(table)
        )
    }
}

fn schema_filter(schema: Option<&str>, default: &str) -> String {
    match schema {
        Some(s) => format!("'{}'", escape_string_literal(s)),
        None => default.to_string(),
    }
}

// ===========================================================================
// PostgreSQL
// ===========================================================================

/// PostgreSQL dialect
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn list_schemas_sql(&self) -> String {
        "SELECT schema_name FROM information_schema.schemata ORDER BY schema_name".to_string()
    }

    fn list_tables_sql(&self, schema: Option<&str>) -> String {
        format!(
            "SELECT table_name FROM information_schema.tables WHERE table_schema = {} AND table_type = 'BASE TABLE'",
            schema_filter(schema, "current_schema()")
        )
    }

    fn list_temp_tables_sql(&self) -> String {
        "SELECT table_name FROM information_schema.tables WHERE table_type = 'LOCAL TEMPORARY'"
            .to_string()
    }

    fn list_views_sql(&self, schema: Option<&str>) -> String {
        format!(
            "SELECT table_name FROM information_schema.views WHERE table_schema = {}",
            schema_filter(schema, "current_schema()")
        )
    }

    fn table_exists_sql(&self, schema: Option<&str>, table: &str) -> String {
        format!(
            "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_schema = {} AND table_name = '{}')",
            schema_filter(schema, "current_schema()"),
            escape_string_literal(table)
        )
    }

    fn list_columns_sql(&self, schema: Option<&str>, table: &str) -> String {
        format!(
            r#"SELECT
                column_name,
                data_type,
                is_nullable = 'YES' AS nullable,
                ordinal_position,
                column_default
            FROM information_schema.columns
            WHERE table_schema = {} AND table_name = '{}'
            ORDER BY ordinal_position"#,
            schema_filter(schema, "current_schema()"),
            escape_string_literal(table)
        )
    }

    fn list_indexes_sql(&self, schema: Option<&str>) -> String {
        format!(
            "SELECT indexname, tablename, indexdef FROM pg_indexes WHERE schemaname = {}",
            schema_filter(schema, "current_schema()")
        )
    }
}

// ===========================================================================
// MySQL
// ===========================================================================

/// MySQL dialect
#[derive(Debug, Clone, Default)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn list_schemas_sql(&self) -> String {
        "SELECT schema_name FROM information_schema.schemata ORDER BY schema_name".to_string()
    }

    fn list_tables_sql(&self, schema: Option<&str>) -> String {
        format!(
            "SELECT table_name FROM information_schema.tables WHERE table_schema = {} AND table_type = 'BASE TABLE'",
            schema_filter(schema, "DATABASE()")
        )
    }

    fn list_views_sql(&self, schema: Option<&str>) -> String {
        format!(
            "SELECT table_name FROM information_schema.views WHERE table_schema = {}",
            schema_filter(schema, "DATABASE()")
        )
    }

    fn table_exists_sql(&self, schema: Option<&str>, table: &str) -> String {
        format!(
            "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_schema = {} AND table_name = '{}')",
            schema_filter(schema, "DATABASE()"),
            escape_string_literal(table)
        )
    }

    fn list_columns_sql(&self, schema: Option<&str>, table: &str) -> String {
        format!(
            r#"SELECT
                column_name,
                column_type AS data_type,
                is_nullable = 'YES' AS nullable,
                ordinal_position,
                column_default
            FROM information_schema.columns
            WHERE table_schema = {} AND table_name = '{}'
            ORDER BY ordinal_position"#,
            schema_filter(schema, "DATABASE()"),
            escape_string_literal(table)
        )
    }

    fn list_indexes_sql(&self, schema: Option<&str>) -> String {
        format!(
            r#"SELECT
                index_name,
                table_name,
                GROUP_CONCAT(column_name ORDER BY seq_in_index) AS definition
            FROM information_schema.statistics
            WHERE table_schema = {}
            GROUP BY index_name, table_name"#,
            schema_filter(schema, "DATABASE()")
        )
    }

    // an unqualified target would move the table into the default database
    fn rename_table_sql(&self, schema: Option<&str>, from: &str, to: &str) -> String {
        format!(
            "RENAME TABLE {} TO {}",
            self.qualified_table(schema, from),
            self.qualified_table(schema, to)
        )
    }
}

// ===========================================================================
// SQLite
// ===========================================================================

/// SQLite dialect
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    fn master_table(&self, schema: Option<&str>) -> String {
        format!(
            "{}.sqlite_master",
            self.quote_identifier(schema.unwrap_or("main"))
        )
    }
}

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn list_schemas_sql(&self) -> String {
        "SELECT name FROM pragma_database_list ORDER BY seq".to_string()
    }

    fn list_tables_sql(&self, schema: Option<&str>) -> String {
        format!(
            "SELECT name FROM {} WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            self.master_table(schema)
        )
    }

    fn list_temp_tables_sql(&self) -> String {
        self.list_tables_sql(Some("temp"))
    }

    fn list_views_sql(&self, schema: Option<&str>) -> String {
        format!(
            "SELECT name FROM {} WHERE type = 'view'",
            self.master_table(schema)
        )
    }

    fn table_exists_sql(&self, schema: Option<&str>, table: &str) -> String {
        format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE type = 'table' AND name = '{}')",
            self.master_table(schema),
            escape_string_literal(table)
        )
    }

    fn list_columns_sql(&self, schema: Option<&str>, table: &str) -> String {
        format!(
            r#"SELECT
                name AS column_name,
                type AS data_type,
                "notnull" = 0 AS nullable,
                cid + 1 AS ordinal_position,
                dflt_value AS column_default
            FROM pragma_table_info('{}', '{}')
            ORDER BY cid"#,
            escape_string_literal(table),
            escape_string_literal(schema.unwrap_or("main"))
        )
    }

    fn list_indexes_sql(&self, schema: Option<&str>) -> String {
        format!(
            "SELECT name, tbl_name, sql FROM {} WHERE type = 'index'",
            self.master_table(schema)
        )
    }

    // the schema goes on the index name, not on the table
    fn create_index_sql(&self, schema: Option<&str>, table: &str, column: &str) -> String {
        format!(
            "CREATE INDEX {} ON {} ({})",
            self.qualified_table(schema, &index_name(table, column)),
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }
}

/// Get the dialect for a database type
///
/// Unknown servers get the PostgreSQL dialect, which sticks to
/// `information_schema` for its catalog queries.
pub fn dialect_for(db: DatabaseType) -> Box<dyn SqlDialect> {
    match db {
        DatabaseType::PostgreSQL | DatabaseType::Unknown => Box::new(PostgresDialect),
        DatabaseType::MySQL => Box::new(MySqlDialect),
        DatabaseType::SQLite => Box::new(SqliteDialect),
    }
}
