//! Record streams
//!
//! The two seams of a pipeline: something that yields records one at a time,
//! and something that accepts flushed batches. Files and databases implement
//! both, so the engine drives every topology with the same loop.

use super::batch::Batch;
use super::record::{Columns, Record};
use crate::core::Result;
use async_trait::async_trait;

/// Source side of a pipeline
#[async_trait]
pub trait RecordReader: Send {
    /// Column list shared by every record this reader yields
    fn columns(&self) -> &Columns;

    /// Next record, or `None` at end of stream
    async fn next_record(&mut self) -> Result<Option<Record>>;

    /// Release the underlying handle. Closing twice is not an error.
    async fn close(&mut self) -> Result<()>;
}

/// Target side of a pipeline
#[async_trait]
pub trait RecordWriter: Send {
    /// Write one flushed batch. Ownership of the records moves to the writer.
    async fn write_batch(&mut self, batch: Batch) -> Result<()>;

    /// Complete the output (trailers, final flush) after the last batch
    async fn finish(&mut self) -> Result<()>;

    /// Release the underlying handle. Closing twice is not an error.
    async fn close(&mut self) -> Result<()>;
}
