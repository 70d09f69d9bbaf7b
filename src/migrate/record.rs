//! Records flowing through the migration pipeline
//!
//! Every record of one run shares a single column list, so key set and key
//! order are identical across the run by construction.

use crate::core::{DatabaseType, DatabaseValue};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Ordered column names shared by every record of a run
pub type Columns = Arc<[String]>;

/// Build a shared column list
pub fn columns<I, S>(names: I) -> Columns
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Into::into).collect()
}

/// Value of one record field after coercion
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// Missing value
    Null,
    /// Text value
    Text(String),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Bytes that are not valid UTF-8
    Raw(Vec<u8>),
}

impl RecordValue {
    /// Whether the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, RecordValue::Null)
    }

    /// Textual form used by the file writers. Null renders as empty.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            RecordValue::Null => Cow::Borrowed(""),
            RecordValue::Text(s) => Cow::Borrowed(s),
            RecordValue::Integer(v) => Cow::Owned(v.to_string()),
            RecordValue::Float(v) => Cow::Owned(v.to_string()),
            RecordValue::Raw(b) => String::from_utf8_lossy(b),
        }
    }

    /// Byte form used by the delimited writer, which can carry raw bytes
    pub fn to_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            RecordValue::Raw(b) => Cow::Borrowed(b),
            RecordValue::Text(s) => Cow::Borrowed(s.as_bytes()),
            other => match other.to_text() {
                Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
                Cow::Owned(s) => Cow::Owned(s.into_bytes()),
            },
        }
    }

    /// Render as a SQL literal for `dialect`
    pub fn to_sql_literal(&self, dialect: DatabaseType) -> String {
        DatabaseValue::from(self.clone()).to_sql_literal(dialect)
    }
}

impl From<RecordValue> for DatabaseValue {
    fn from(value: RecordValue) -> Self {
        match value {
            RecordValue::Null => DatabaseValue::Null,
            RecordValue::Text(s) => DatabaseValue::String(s),
            RecordValue::Integer(v) => DatabaseValue::Long(v),
            RecordValue::Float(v) => DatabaseValue::Double(v),
            RecordValue::Raw(b) => DatabaseValue::Bytes(b),
        }
    }
}

impl From<&str> for RecordValue {
    fn from(v: &str) -> Self {
        RecordValue::Text(v.to_string())
    }
}

impl From<String> for RecordValue {
    fn from(v: String) -> Self {
        RecordValue::Text(v)
    }
}

impl From<i64> for RecordValue {
    fn from(v: i64) -> Self {
        RecordValue::Integer(v)
    }
}

impl From<f64> for RecordValue {
    fn from(v: f64) -> Self {
        RecordValue::Float(v)
    }
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// One row or element of data: ordered column name -> value
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Columns,
    values: Vec<RecordValue>,
}

impl Record {
    /// Create a record. Returns `None` if the value count does not match the
    /// column count.
    pub fn new(columns: Columns, values: Vec<RecordValue>) -> Option<Self> {
        if columns.len() != values.len() {
            return None;
        }
        Some(Self { columns, values })
    }

    /// Column names in order
    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    /// Values in column order
    pub fn values(&self) -> &[RecordValue] {
        &self.values
    }

    /// Look up a value by column name
    pub fn get(&self, column: &str) -> Option<&RecordValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    /// Iterate `(column, value)` pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RecordValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Take the values, dropping the column list
    pub fn into_values(self) -> Vec<RecordValue> {
        self.values
    }
}
