//! Statement normalization
//!
//! A [`Statement`] is either raw SQL text or a pre-built sea-query statement.
//! [`normalize`] turns it into an [`ExecutableStatement`] (placeholder SQL plus
//! bound parameters) and a one-line display string for logs and progress.
//!
//! Pre-built statements are executed through their placeholders; the display
//! string inlines the values and is never executed.

use sea_query::{DeleteStatement, InsertStatement, SelectStatement, UpdateStatement};

use crate::connection::DatabaseType;
use crate::dialect::{build_query, inline_query};
use crate::error::{Error, Result};
use crate::types::Value;

/// SQL supplied by a caller
#[derive(Debug, Clone)]
pub enum Statement {
    /// Raw SQL text with optional positional parameters
    Text {
        /// SQL text in the driver's dialect
        sql: String,
        /// Positional parameters
        params: Vec<Value>,
    },
    /// Pre-built SELECT
    Select(SelectStatement),
    /// Pre-built INSERT
    Insert(InsertStatement),
    /// Pre-built UPDATE
    Update(UpdateStatement),
    /// Pre-built DELETE
    Delete(DeleteStatement),
}

impl Statement {
    /// Raw SQL without parameters
    pub fn text(sql: impl Into<String>) -> Self {
        Self::Text {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Raw SQL with positional parameters
    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self::Text {
            sql: sql.into(),
            params,
        }
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Self::text(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Self::text(sql)
    }
}

impl From<SelectStatement> for Statement {
    fn from(stmt: SelectStatement) -> Self {
        Self::Select(stmt)
    }
}

impl From<InsertStatement> for Statement {
    fn from(stmt: InsertStatement) -> Self {
        Self::Insert(stmt)
    }
}

impl From<UpdateStatement> for Statement {
    fn from(stmt: UpdateStatement) -> Self {
        Self::Update(stmt)
    }
}

impl From<DeleteStatement> for Statement {
    fn from(stmt: DeleteStatement) -> Self {
        Self::Delete(stmt)
    }
}

/// What is handed to the driver
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutableStatement {
    /// SQL with placeholders
    pub sql: String,
    /// Values bound to the placeholders, in order
    pub params: Vec<Value>,
}

/// A statement ready to run plus its display form
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedStatement {
    /// Executed form
    pub executable: ExecutableStatement,
    /// Single-line rendering for logs and progress
    pub display: String,
}

/// Normalize a statement for the given database
pub fn normalize(statement: &Statement, db: DatabaseType) -> Result<NormalizedStatement> {
    let (executable, rendered) = match statement {
        Statement::Text { sql, params } => (
            ExecutableStatement {
                sql: sql.clone(),
                params: params.clone(),
            },
            sql.clone(),
        ),
        Statement::Select(s) => prepare(s, db)?,
        Statement::Insert(s) => prepare(s, db)?,
        Statement::Update(s) => prepare(s, db)?,
        Statement::Delete(s) => prepare(s, db)?,
    };

    Ok(NormalizedStatement {
        executable,
        display: collapse_whitespace(&rendered),
    })
}

fn prepare<S: sea_query::QueryStatementWriter>(
    stmt: &S,
    db: DatabaseType,
) -> Result<(ExecutableStatement, String)> {
    let (sql, values) = build_query(stmt, db);
    let params = values
        .0
        .iter()
        .map(convert_value)
        .collect::<Result<Vec<_>>>()?;
    Ok((ExecutableStatement { sql, params }, inline_query(stmt, db)))
}

/// Collapse every whitespace run, line breaks included, to one space
pub fn collapse_whitespace(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn convert_value(value: &sea_query::Value) -> Result<Value> {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use rust_decimal::Decimal;
    use sea_query::Value as Sea;
    use uuid::Uuid;

    let converted = match value {
        Sea::Bool(v) => v.map(Value::Bool),
        Sea::TinyInt(v) => v.map(Value::Int8),
        Sea::SmallInt(v) => v.map(Value::Int16),
        Sea::Int(v) => v.map(Value::Int32),
        Sea::BigInt(v) => v.map(Value::Int64),
        Sea::TinyUnsigned(v) => v.map(|n| Value::Int16(n.into())),
        Sea::SmallUnsigned(v) => v.map(|n| Value::Int32(n.into())),
        Sea::Unsigned(v) => v.map(|n| Value::Int64(n.into())),
        Sea::BigUnsigned(v) => match v {
            Some(n) => Some(Value::Int64(i64::try_from(*n).map_err(|_| {
                Error::type_conversion(format!("unsigned value {} does not fit in BIGINT", n))
            })?)),
            None => None,
        },
        Sea::Float(v) => v.map(Value::Float32),
        Sea::Double(v) => v.map(Value::Float64),
        Sea::String(v) => v.as_ref().map(|s| Value::String(String::clone(s))),
        Sea::Char(v) => v.map(|c| Value::String(c.to_string())),
        Sea::Bytes(v) => v.as_ref().map(|b| Value::Bytes(Vec::<u8>::clone(b))),
        Sea::Json(v) => v
            .as_ref()
            .map(|j| Value::Json(serde_json::Value::clone(j))),
        Sea::ChronoDate(v) => v.as_ref().map(|d| Value::Date(NaiveDate::clone(d))),
        Sea::ChronoTime(v) => v.as_ref().map(|t| Value::Time(NaiveTime::clone(t))),
        Sea::ChronoDateTime(v) => v
            .as_ref()
            .map(|t| Value::DateTime(NaiveDateTime::clone(t))),
        Sea::ChronoDateTimeUtc(v) => v
            .as_ref()
            .map(|t| Value::DateTimeTz(DateTime::<Utc>::clone(t))),
        Sea::Uuid(v) => v.as_ref().map(|u| Value::Uuid(Uuid::clone(u))),
        Sea::Decimal(v) => v.as_ref().map(|d| Value::Decimal(Decimal::clone(d))),
        other => {
            return Err(Error::type_conversion(format!(
                "unsupported bound value: {:?}",
                other
            )))
        }
    };
    Ok(converted.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_query::{Alias, Expr, Query};

    #[test]
    fn test_text_statement_display() {
        let stmt = Statement::text("SELECT *\n  FROM users\n\tWHERE  id = 1\n");
        let normalized = normalize(&stmt, DatabaseType::PostgreSQL).unwrap();
        assert_eq!(normalized.display, "SELECT * FROM users WHERE id = 1");
        assert_eq!(
            normalized.executable.sql,
            "SELECT *\n  FROM users\n\tWHERE  id = 1\n"
        );
        assert!(normalized.executable.params.is_empty());
    }

    #[test]
    fn test_text_statement_keeps_params() {
        let stmt = Statement::with_params("SELECT * FROM t WHERE id = $1", vec![Value::Int64(7)]);
        let normalized = normalize(&stmt, DatabaseType::PostgreSQL).unwrap();
        assert_eq!(normalized.executable.params, vec![Value::Int64(7)]);
    }

    #[test]
    fn test_prebuilt_select_binds_params() {
        let select = Query::select()
            .column(Alias::new("name"))
            .from(Alias::new("users"))
            .and_where(Expr::col(Alias::new("id")).eq(42))
            .to_owned();

        let normalized = normalize(&select.into(), DatabaseType::PostgreSQL).unwrap();
        assert_eq!(
            normalized.executable.sql,
            "SELECT \"name\" FROM \"users\" WHERE \"id\" = $1"
        );
        assert_eq!(normalized.executable.params, vec![Value::Int32(42)]);
        assert_eq!(
            normalized.display,
            "SELECT \"name\" FROM \"users\" WHERE \"id\" = 42"
        );
    }

    #[test]
    fn test_prebuilt_insert_uses_dialect_placeholders() {
        let insert = Query::insert()
            .into_table(Alias::new("t"))
            .columns([Alias::new("a"), Alias::new("b")])
            .values_panic([1i64.into(), "x".into()])
            .to_owned();

        let normalized = normalize(&insert.into(), DatabaseType::MySQL).unwrap();
        assert_eq!(
            normalized.executable.sql,
            "INSERT INTO `t` (`a`, `b`) VALUES (?, ?)"
        );
        assert_eq!(
            normalized.executable.params,
            vec![Value::Int64(1), Value::String("x".into())]
        );
    }

    #[test]
    fn test_big_unsigned_out_of_range() {
        let err = convert_value(&sea_query::Value::BigUnsigned(Some(u64::MAX))).unwrap_err();
        assert!(matches!(err, Error::TypeConversion { .. }));
        assert_eq!(
            convert_value(&sea_query::Value::BigUnsigned(None)).unwrap(),
            Value::Null
        );
    }
}
