//! Driver value types
//!
//! This module defines the values database drivers hand back and accept, and
//! how they are rendered as SQL literals for the destination dialect.

use super::database_types::DatabaseType;
use std::fmt::Write;

/// Value as produced by a database driver, before coercion into a record
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit floating point
    Float(f32),
    /// 64-bit floating point
    Double(f64),
    /// String value
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// Timestamp (Unix timestamp in microseconds)
    Timestamp(i64),
}

impl DatabaseValue {
    /// Render the value as a SQL literal for the given dialect.
    ///
    /// Strings are single-quoted with embedded quotes doubled. Non-finite
    /// floats are rendered as quoted strings (`'NaN'`, `'Infinity'`), which
    /// PostgreSQL accepts for float columns.
    pub fn to_sql_literal(&self, dialect: DatabaseType) -> String {
        match self {
            DatabaseValue::Null => "NULL".to_string(),
            DatabaseValue::Bool(v) => match dialect {
                DatabaseType::Postgres => {
                    let literal = if *v { "TRUE" } else { "FALSE" };
                    literal.to_string()
                }
                _ => (*v as i32).to_string(),
            },
            DatabaseValue::Int(v) => v.to_string(),
            DatabaseValue::Long(v) => v.to_string(),
            DatabaseValue::Float(v) => float_literal(*v as f64),
            DatabaseValue::Double(v) => float_literal(*v),
            DatabaseValue::String(s) => quote_string(s),
            DatabaseValue::Bytes(b) => {
                let mut hex = String::with_capacity(b.len() * 2);
                for byte in b {
                    let _ = write!(hex, "{:02x}", byte);
                }
                match dialect {
                    DatabaseType::Postgres => format!("'\\x{}'::bytea", hex),
                    _ => format!("X'{}'", hex),
                }
            }
            DatabaseValue::Timestamp(v) => v.to_string(),
        }
    }
}

fn float_literal(v: f64) -> String {
    if v.is_nan() {
        "'NaN'".to_string()
    } else if v.is_infinite() {
        if v > 0.0 {
            "'Infinity'".to_string()
        } else {
            "'-Infinity'".to_string()
        }
    } else {
        // Debug keeps a fractional part so the literal stays a float
        format!("{:?}", v)
    }
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl From<bool> for DatabaseValue {
    fn from(v: bool) -> Self {
        DatabaseValue::Bool(v)
    }
}

impl From<i32> for DatabaseValue {
    fn from(v: i32) -> Self {
        DatabaseValue::Int(v)
    }
}

impl From<i64> for DatabaseValue {
    fn from(v: i64) -> Self {
        DatabaseValue::Long(v)
    }
}

impl From<f64> for DatabaseValue {
    fn from(v: f64) -> Self {
        DatabaseValue::Double(v)
    }
}

impl From<String> for DatabaseValue {
    fn from(v: String) -> Self {
        DatabaseValue::String(v)
    }
}

impl From<&str> for DatabaseValue {
    fn from(v: &str) -> Self {
        DatabaseValue::String(v.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(v: Vec<u8>) -> Self {
        DatabaseValue::Bytes(v)
    }
}

impl<T: Into<DatabaseValue>> From<Option<T>> for DatabaseValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => DatabaseValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        assert_eq!(DatabaseValue::from(42), DatabaseValue::Int(42));
        assert_eq!(DatabaseValue::from(Some("x")), DatabaseValue::String("x".to_string()));

        let val: DatabaseValue = Option::<i32>::None.into();
        assert_eq!(val, DatabaseValue::Null);
    }

    #[test]
    fn test_string_literal_escapes_quotes() {
        let val = DatabaseValue::from("O'Brien");
        assert_eq!(val.to_sql_literal(DatabaseType::Sqlite), "'O''Brien'");
    }

    #[test]
    fn test_numeric_literals() {
        assert_eq!(DatabaseValue::Long(-5).to_sql_literal(DatabaseType::Sqlite), "-5");
        assert_eq!(DatabaseValue::Double(2.0).to_sql_literal(DatabaseType::Sqlite), "2.0");
        assert_eq!(
            DatabaseValue::Double(f64::NAN).to_sql_literal(DatabaseType::Postgres),
            "'NaN'"
        );
        assert_eq!(DatabaseValue::Null.to_sql_literal(DatabaseType::Postgres), "NULL");
    }

    #[test]
    fn test_bytes_literal_per_dialect() {
        let val = DatabaseValue::Bytes(vec![0xde, 0xad]);
        assert_eq!(val.to_sql_literal(DatabaseType::Sqlite), "X'dead'");
        assert_eq!(val.to_sql_literal(DatabaseType::Postgres), "'\\xdead'::bytea");
    }

    #[test]
    fn test_bool_literal_per_dialect() {
        assert_eq!(DatabaseValue::Bool(true).to_sql_literal(DatabaseType::Sqlite), "1");
        assert_eq!(DatabaseValue::Bool(false).to_sql_literal(DatabaseType::Postgres), "FALSE");
    }
}
