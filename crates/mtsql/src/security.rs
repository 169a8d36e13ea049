//! Guards for SQL text that has to be assembled by hand
//!
//! DDL and catalog statements take identifiers and names that cannot be bound
//! as parameters. Identifiers are validated before they are quoted into DDL;
//! names compared against catalog columns are escaped as string literals.

use crate::error::{Error, Result};

/// Longest identifier accepted by [`validate_sql_identifier`]
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// Check that `name` can be quoted into DDL as a table, column, schema or index name
///
/// Accepted names are 1 to [`MAX_IDENTIFIER_LEN`] bytes of ASCII letters,
/// digits and underscores, not starting with a digit.
///
/// ```
/// use mtsql::security::validate_sql_identifier;
///
/// assert!(validate_sql_identifier("mttmp_12").is_ok());
/// assert!(validate_sql_identifier("ix_users_email").is_ok());
///
/// assert!(validate_sql_identifier("users; DROP TABLE accounts").is_err());
/// assert!(validate_sql_identifier("2024_events").is_err());
/// ```
pub fn validate_sql_identifier(name: &str) -> Result<()> {
    let reject = |reason: &str| Err(Error::config(format!("refusing identifier '{}': {}", name, reason)));

    if name.is_empty() {
        return reject("empty");
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return reject("longer than 255 bytes");
    }
    for (pos, c) in name.chars().enumerate() {
        let allowed = c == '_' || c.is_ascii_alphabetic() || (pos > 0 && c.is_ascii_digit());
        if !allowed {
            return reject(&format!("unexpected character {:?} at position {}", c, pos));
        }
    }
    Ok(())
}

/// Validate every identifier in `names`, stopping at the first bad one
pub fn validate_sql_identifiers<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<()> {
    names.into_iter().try_for_each(validate_sql_identifier)
}

/// Escape `value` for use inside a single-quoted SQL literal
///
/// ```
/// use mtsql::security::escape_string_literal;
///
/// assert_eq!(escape_string_literal("o'neil"), "o''neil");
/// ```
pub fn escape_string_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_names() {
        for name in ["users", "_staging", "mttmp_0", "ix_orders_created_at"] {
            assert!(validate_sql_identifier(name).is_ok(), "{name}");
        }
        assert!(validate_sql_identifier(&"t".repeat(MAX_IDENTIFIER_LEN)).is_ok());
    }

    #[test]
    fn test_rejects_injection_and_odd_names() {
        for name in [
            "",
            "9lives",
            "public.users",
            "order items",
            "users--",
            "x' OR '1'='1",
            "tabl\u{0435}",
        ] {
            assert!(validate_sql_identifier(name).is_err(), "{name:?}");
        }
        assert!(validate_sql_identifier(&"t".repeat(MAX_IDENTIFIER_LEN + 1)).is_err());
    }

    #[test]
    fn test_error_names_the_identifier() {
        let err = validate_sql_identifier("a-b").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("'a-b'"));
        assert!(err.to_string().contains("position 1"));
    }

    #[test]
    fn test_validate_many_stops_at_first_bad() {
        assert!(validate_sql_identifiers(["a", "b_1"]).is_ok());
        let err = validate_sql_identifiers(["a", "b;", "c;"]).unwrap_err();
        assert!(err.to_string().contains("'b;'"));
    }

    #[test]
    fn test_escape_string_literal() {
        assert_eq!(escape_string_literal(""), "");
        assert_eq!(escape_string_literal("plain"), "plain");
        assert_eq!(escape_string_literal("''"), "''''");
        assert_eq!(
            escape_string_literal("x'; DELETE FROM t; --"),
            "x''; DELETE FROM t; --"
        );
    }
}
