//! Value, row and table types
//!
//! [`Table`] is the materialized result of a read: an ordered column layout
//! plus rows in the order the driver delivered them.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single SQL value, as bound into a statement or read back from a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Value {
    Null,
    Bool(bool),
    /// TINYINT
    Int8(i8),
    /// SMALLINT
    Int16(i16),
    /// INTEGER
    Int32(i32),
    /// BIGINT
    Int64(i64),
    /// REAL
    Float32(f32),
    /// DOUBLE PRECISION
    Float64(f64),
    /// NUMERIC / DECIMAL
    Decimal(Decimal),
    String(String),
    /// BYTEA / BLOB
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    /// TIMESTAMP without zone
    DateTime(NaiveDateTime),
    /// TIMESTAMPTZ, normalized to UTC
    DateTimeTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

impl Value {
    /// SQL NULL?
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view of any integer column
    fn as_integer(&self) -> Option<i64> {
        Some(match *self {
            Self::Int8(n) => n.into(),
            Self::Int16(n) => n.into(),
            Self::Int32(n) => n.into(),
            Self::Int64(n) => n,
            _ => return None,
        })
    }

    /// Read a flag
    ///
    /// Catalog views disagree on how they spell booleans: some return a
    /// real boolean, some an integer, some `'YES'`/`'NO'`.
    pub fn as_bool(&self) -> Option<bool> {
        if let Some(n) = self.as_integer() {
            return Some(n != 0);
        }
        match self {
            Self::Bool(b) => Some(*b),
            Self::String(s) => {
                let s = s.trim();
                if ["true", "t", "yes", "y", "1"].iter().any(|w| s.eq_ignore_ascii_case(w)) {
                    Some(true)
                } else if ["false", "f", "no", "n", "0"].iter().any(|w| s.eq_ignore_ascii_case(w)) {
                    Some(false)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Read a whole number, truncating floats and parsing text
    pub fn as_i64(&self) -> Option<i64> {
        if let Some(n) = self.as_integer() {
            return Some(n);
        }
        match self {
            Self::Float32(f) if f.is_finite() => Some(*f as i64),
            Self::Float64(f) if f.is_finite() => Some(*f as i64),
            Self::Decimal(d) => d.trunc().to_string().parse().ok(),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Borrow text without converting
    pub fn as_str(&self) -> Option<&str> {
        if let Self::String(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// Render scalar values as text; NULL, binary and composite values give `None`
    pub fn as_string(&self) -> Option<String> {
        if let Some(n) = self.as_integer() {
            return Some(n.to_string());
        }
        Some(match self {
            Self::String(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Float32(f) => f.to_string(),
            Self::Float64(f) => f.to_string(),
            Self::Decimal(d) => d.to_string(),
            Self::Uuid(u) => u.to_string(),
            _ => return None,
        })
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )+
    };
}

value_from! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    Decimal => Decimal,
    String => String,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
    DateTime<Utc> => DateTimeTz,
    Uuid => Uuid,
    serde_json::Value => Json,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// One result row: column names paired positionally with values
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Pair `columns` with `values`; both must have the same length
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len(), "row width mismatch");
        Self { columns, values }
    }

    /// Number of columns
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Row without columns?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    #[allow(missing_docs)]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[inline]
    #[allow(missing_docs)]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value at position `idx`
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Value of the column called `name`, ignoring ASCII case
    ///
    /// Catalog views upper-case their column names on some backends.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))?;
        self.values.get(idx)
    }
}

/// Column description returned by [`crate::schema::list_columns`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    /// Column name
    pub name: String,
    /// Backend type name, as the catalog spells it
    pub type_name: String,
    /// Accepts NULL
    pub nullable: bool,
    /// 1-based position; 0 when the catalog did not say
    pub ordinal: u32,
    /// DEFAULT expression, verbatim
    pub default_value: Option<String>,
}

impl ColumnMetadata {
    /// Nullable column with unknown position and no default
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable: true,
            ordinal: 0,
            default_value: None,
        }
    }
}

/// Materialized result set
///
/// Rows keep the order in which they were appended. A table with no rows is
/// still a valid table, which is what a read returns when nothing arrived.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    /// Create a table from a column layout and rows
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Table with no columns and no rows
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table whose layout is taken from the first row
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|r| r.columns().to_vec())
            .unwrap_or_default();
        Self { columns, rows }
    }

    /// Build a table from a column layout and raw value rows
    pub fn from_values<I, C>(columns: I, values: Vec<Vec<Value>>) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let rows = values
            .into_iter()
            .map(|v| Row::new(columns.clone(), v))
            .collect();
        Self { columns, rows }
    }

    /// Column names
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in arrival order
    #[inline]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Take ownership of the rows
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Number of rows
    #[inline]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no rows
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Concatenate tables in the given order
    ///
    /// The column layout is that of the first table that has one.
    /// Concatenating nothing yields an empty table.
    pub fn concat<I>(tables: I) -> Self
    where
        I: IntoIterator<Item = Table>,
    {
        let mut out = Self::empty();
        for table in tables {
            if out.columns.is_empty() {
                out.columns = table.columns;
            }
            out.rows.extend(table.rows);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(42i32).as_i64(), Some(42));
        assert_eq!(Value::from(" 7 ").as_i64(), Some(7));
        assert_eq!(Value::Decimal(Decimal::new(129, 1)).as_i64(), Some(12));
        assert_eq!(Value::Float64(f64::NAN).as_i64(), None);
        assert!(Value::from(None::<i64>).is_null());
        assert_eq!(Value::from(Some("x")).as_str(), Some("x"));
    }

    #[test]
    fn test_catalog_flags() {
        assert_eq!(Value::from("YES").as_bool(), Some(true));
        assert_eq!(Value::from("no").as_bool(), Some(false));
        assert_eq!(Value::Int16(0).as_bool(), Some(false));
        assert_eq!(Value::from("maybe").as_bool(), None);
        assert_eq!(Value::Null.as_bool(), None);
    }

    #[test]
    fn test_as_string_skips_binary_and_null() {
        assert_eq!(Value::Int8(-3).as_string().as_deref(), Some("-3"));
        assert_eq!(Value::Bool(true).as_string().as_deref(), Some("true"));
        assert_eq!(Value::Bytes(vec![1]).as_string(), None);
        assert_eq!(Value::Null.as_string(), None);
    }

    #[test]
    fn test_row_lookup() {
        let row = Row::new(
            vec!["ID".into(), "name".into()],
            vec![Value::Int64(1), Value::from("alice")],
        );
        assert_eq!(row.len(), 2);
        assert_eq!(row.get_by_name("id"), Some(&Value::Int64(1)));
        assert_eq!(row.get(1).and_then(Value::as_str), Some("alice"));
        assert!(row.get_by_name("missing").is_none());
    }

    #[test]
    fn test_concat_keeps_order_and_layout() {
        let a = Table::from_values(["id"], vec![vec![Value::Int64(1)], vec![Value::Int64(2)]]);
        let b = Table::from_values(["id"], vec![vec![Value::Int64(3)]]);

        let all = Table::concat(vec![Table::empty(), a, b]);
        assert_eq!(all.columns(), ["id".to_string()]);
        let ids: Vec<_> = all.rows().iter().filter_map(|r| r.get(0)?.as_i64()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(all.row_count(), 3);
    }

    #[test]
    fn test_concat_nothing_is_empty_table() {
        let t = Table::concat(Vec::new());
        assert!(t.is_empty());
        assert!(t.columns().is_empty());
        assert_eq!(t, Table::empty());
    }
}
