//! Property-based tests for batching and records using proptest

use proptest::prelude::*;
use rust_batch_migrator::core::query_builder::limit_raw_query;
use rust_batch_migrator::migrate::record::columns;
use rust_batch_migrator::migrate::{coerce, BatchBuffer, Record, RecordValue};
use rust_batch_migrator::prelude::*;
use std::sync::Arc;

fn record(cols: &rust_batch_migrator::migrate::Columns, n: usize) -> Record {
    Record::new(cols.clone(), vec![RecordValue::Integer(n as i64)]).expect("width matches")
}

// ============================================================================
// Batch Buffer Tests
// ============================================================================

proptest! {
    /// N adds with threshold T yield floor(N/T) full batches, then a tail of
    /// N mod T records
    #[test]
    fn test_batch_sizes(n in 0usize..500, threshold in 1usize..64) {
        let cols = columns(["n"]);
        let mut buffer = BatchBuffer::new(threshold);

        let mut full = Vec::new();
        for i in 0..n {
            if let Some(batch) = buffer.add(record(&cols, i)) {
                full.push(batch);
            }
        }
        let tail = buffer.flush_remaining();

        prop_assert_eq!(full.len(), n / threshold);
        prop_assert!(full.iter().all(|b| b.len() == threshold));
        prop_assert_eq!(tail.len(), n % threshold);
        prop_assert!(buffer.flush_remaining().is_empty());
    }

    /// Records leave the buffer in insertion order, none lost or duplicated
    #[test]
    fn test_batches_preserve_order(n in 0usize..300, threshold in 1usize..32) {
        let cols = columns(["n"]);
        let mut buffer = BatchBuffer::new(threshold);

        let mut seen = Vec::new();
        for i in 0..n {
            if let Some(batch) = buffer.add(record(&cols, i)) {
                seen.extend(batch);
            }
        }
        seen.extend(buffer.flush_remaining());

        let values: Vec<i64> = seen
            .iter()
            .map(|r| match r.values()[0] {
                RecordValue::Integer(v) => v,
                _ => -1,
            })
            .collect();
        let expected: Vec<i64> = (0..n as i64).collect();
        prop_assert_eq!(values, expected);
    }
}

// ============================================================================
// Record Invariant Tests
// ============================================================================

proptest! {
    /// Every record built from one column list shares its key set and order
    #[test]
    fn test_records_share_columns(
        names in prop::collection::btree_set("[a-z]{1,8}", 1..8),
        rows in 1usize..20,
    ) {
        let cols = columns(names.iter().cloned());
        let records: Vec<Record> = (0..rows)
            .map(|i| {
                let values = (0..cols.len()).map(|_| RecordValue::Integer(i as i64)).collect();
                Record::new(cols.clone(), values).expect("width matches")
            })
            .collect();

        for record in &records {
            prop_assert!(Arc::ptr_eq(record.columns(), &cols));
            let keys: Vec<&str> = record.iter().map(|(k, _)| k).collect();
            let expected: Vec<&str> = names.iter().map(String::as_str).collect();
            prop_assert_eq!(keys, expected);
        }
    }

    /// Records never accept a value count different from the column count
    #[test]
    fn test_record_width_checked(width in 1usize..10, values in 0usize..10) {
        let cols = columns((0..width).map(|i| format!("c{}", i)));
        let record = Record::new(cols, vec![RecordValue::Null; values]);
        prop_assert_eq!(record.is_some(), width == values);
    }
}

// ============================================================================
// Coercion Tests
// ============================================================================

proptest! {
    /// Valid UTF-8 bytes become text, unchanged
    #[test]
    fn test_utf8_bytes_become_text(s in ".*") {
        let value = coerce(DatabaseValue::Bytes(s.clone().into_bytes())).expect("coerce");
        prop_assert_eq!(value, RecordValue::Text(s));
    }

    /// Integers of every width become Integer
    #[test]
    fn test_integers_coerce(v in any::<i32>()) {
        prop_assert_eq!(coerce(DatabaseValue::Int(v)).expect("coerce"), RecordValue::Integer(v as i64));
    }

    /// Limiting a raw query strips trailing semicolons and whitespace and
    /// leaves any limit of its own inside the derived table
    #[test]
    fn test_limit_raw_query_strips_terminators(
        body in "SELECT [a-z]{1,10} FROM [a-z]{1,10}( LIMIT [0-9]{1,3})?",
        tail in "[ ;\n\t]{0,6}",
    ) {
        let query = format!("{}{}", body, tail);
        prop_assert_eq!(
            limit_raw_query(&query, 1),
            format!("SELECT * FROM ({}) AS \"src\" LIMIT 1", body)
        );
    }
}
