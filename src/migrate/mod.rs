//! Batch migration pipeline
//!
//! Records flow one way: source reader, value coercion, batch buffer, target
//! writer. The [`engine`] picks the reader and writer from the descriptor's
//! endpoints and drives them.

pub mod batch;
pub mod coerce;
pub mod database;
pub mod descriptor;
pub mod discover;
pub mod engine;
pub mod file;
pub mod record;
pub mod stream;

pub use batch::{Batch, BatchBuffer, DEFAULT_BATCH_SIZE};
pub use coerce::coerce;
pub use descriptor::{
    BatchErrorPolicy, DatabaseLocator, EndpointKind, FileFormat, FileLocator, MigrationDescriptor,
    Selection, SourceEndpoint, TargetEndpoint,
};
pub use discover::Discovered;
pub use engine::{run, MigrationReport};
pub use record::{Columns, Record, RecordValue};
pub use stream::{RecordReader, RecordWriter};
