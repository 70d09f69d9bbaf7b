//! Value coercion
//!
//! Normalizes driver values into [`RecordValue`] once, at the reader
//! boundary, so nothing downstream inspects driver types.

use super::record::{Columns, Record, RecordValue};
use crate::core::{DatabaseValue, MigrateError, Result};
use chrono::{DateTime, SecondsFormat};

/// Coerce one driver value.
///
/// Byte sequences become text when they are valid UTF-8 and stay raw
/// otherwise. Booleans become `true`/`false` text, which PostgreSQL accepts
/// for boolean columns. Timestamps become RFC 3339 text.
pub fn coerce(value: DatabaseValue) -> Result<RecordValue> {
    Ok(match value {
        DatabaseValue::Null => RecordValue::Null,
        DatabaseValue::Bool(v) => RecordValue::Text(v.to_string()),
        DatabaseValue::Int(v) => RecordValue::Integer(v as i64),
        DatabaseValue::Long(v) => RecordValue::Integer(v),
        // Widen through the shortest decimal form so 0.1f32 stays 0.1
        DatabaseValue::Float(v) => RecordValue::Float(v.to_string().parse().unwrap_or(f64::from(v))),
        DatabaseValue::Double(v) => RecordValue::Float(v),
        DatabaseValue::String(s) => RecordValue::Text(s),
        DatabaseValue::Bytes(b) => match String::from_utf8(b) {
            Ok(s) => RecordValue::Text(s),
            Err(e) => RecordValue::Raw(e.into_bytes()),
        },
        DatabaseValue::Timestamp(micros) => {
            let ts = DateTime::from_timestamp_micros(micros).ok_or_else(|| {
                MigrateError::unsupported_value("<timestamp>", format!("timestamp {}", micros))
            })?;
            RecordValue::Text(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
    })
}

/// Coerce a slot-per-column driver row into a record.
///
/// `row` is the 1-based position in the source, used for error messages.
pub fn coerce_row(columns: &Columns, values: Vec<DatabaseValue>, row: u64) -> Result<Record> {
    if values.len() != columns.len() {
        return Err(MigrateError::row(
            row,
            format!(
                "expected {} values, driver returned {}",
                columns.len(),
                values.len()
            ),
        ));
    }

    let coerced = values
        .into_iter()
        .map(coerce)
        .collect::<Result<Vec<_>>>()?;

    Record::new(columns.clone(), coerced)
        .ok_or_else(|| MigrateError::row(row, "column count changed during coercion"))
}
