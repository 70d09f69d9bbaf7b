//! Batch buffering
//!
//! Records accumulate in a [`BatchBuffer`] until the configured threshold is
//! reached, then leave as one [`Batch`] owned by the writer.

use super::record::Record;

/// Default number of records per batch
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// A bounded, ordered group of records flushed together
#[derive(Debug, Default, PartialEq)]
pub struct Batch {
    records: Vec<Record>,
}

impl Batch {
    /// Number of records in the batch
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Borrow the records in order
    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

impl IntoIterator for Batch {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Accumulates records up to a threshold
#[derive(Debug)]
pub struct BatchBuffer {
    threshold: usize,
    records: Vec<Record>,
}

impl BatchBuffer {
    /// Create a buffer that yields batches of `threshold` records.
    ///
    /// A threshold of zero is treated as one.
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            records: Vec::with_capacity(threshold),
        }
    }

    /// Configured batch size
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Number of records currently buffered
    pub fn pending(&self) -> usize {
        self.records.len()
    }

    /// Add a record, yielding a full batch when the threshold is reached
    pub fn add(&mut self, record: Record) -> Option<Batch> {
        self.records.push(record);
        if self.records.len() >= self.threshold {
            Some(self.take())
        } else {
            None
        }
    }

    /// Yield whatever is buffered, possibly nothing, and reset
    pub fn flush_remaining(&mut self) -> Batch {
        self.take()
    }

    fn take(&mut self) -> Batch {
        let records = std::mem::replace(&mut self.records, Vec::with_capacity(self.threshold));
        Batch { records }
    }
}

impl Default for BatchBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}
