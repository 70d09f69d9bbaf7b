//! Migration engine
//!
//! Runs one migration start to finish as a single sequential pass:
//! discovery, then read a batch and write it, strictly alternating, until the
//! source is exhausted. Every handle opened along the way is released before
//! [`run`] returns, whether the migration succeeded or not.

use super::batch::{Batch, BatchBuffer};
use super::database::{ensure_table, DatabaseReader, DatabaseWriter};
use super::descriptor::{
    BatchErrorPolicy, DatabaseLocator, EndpointKind, MigrationDescriptor, SourceEndpoint,
    TargetEndpoint,
};
use super::discover;
use super::file;
use super::record::Columns;
use super::stream::{RecordReader, RecordWriter};
use crate::backends;
use crate::core::{ColumnDescriptor, Database, MigrateError, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Outcome of a successful migration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Records written to the target
    pub records_migrated: u64,
    /// Non-empty batches written successfully
    pub batches_flushed: u64,
    /// Batches whose write failed and was tolerated
    pub batches_failed: u64,
    /// Whether the target table was created by this run
    pub table_created: bool,
    pub elapsed: Duration,
}

/// Handles owned by one run
#[derive(Default)]
struct Resources {
    reader: Option<Box<dyn RecordReader>>,
    writer: Option<Box<dyn RecordWriter>>,
    source_db: Option<Arc<dyn Database>>,
    target_db: Option<Arc<dyn Database>>,
}

impl Resources {
    /// Close everything, source side first. Failures are logged, never raised.
    async fn release(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            if let Err(e) = reader.close().await {
                warn!(error = %e, "Failed to close source reader");
            }
        }
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.close().await {
                warn!(error = %e, "Failed to close target writer");
            }
        }
        for (side, db) in [
            ("source", self.source_db.take()),
            ("target", self.target_db.take()),
        ] {
            if let Some(db) = db {
                if let Err(e) = db.disconnect().await {
                    warn!(side, error = %e, "Failed to disconnect database");
                }
            }
        }
    }
}

/// Run one migration.
///
/// On error the target may be partially populated: batches flushed before
/// the failure are not rolled back.
pub async fn run(descriptor: MigrationDescriptor) -> Result<MigrationReport> {
    let started = Instant::now();
    let (source_kind, target_kind) = descriptor.topology();
    info!(
        source = %source_kind,
        target = %target_kind,
        batch_size = descriptor.batch_size,
        policy = ?descriptor.on_batch_error,
        "Starting migration"
    );

    let mut resources = Resources::default();
    let mut report = MigrationReport::default();

    let outcome = execute(&descriptor, &mut resources, &mut report).await;
    resources.release().await;
    outcome?;

    report.elapsed = started.elapsed();
    info!(
        records = report.records_migrated,
        batches = report.batches_flushed,
        failed_batches = report.batches_failed,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Migration complete"
    );
    Ok(report)
}

async fn execute(
    descriptor: &MigrationDescriptor,
    resources: &mut Resources,
    report: &mut MigrationReport,
) -> Result<()> {
    let columns = open_source(descriptor, resources).await?;
    let names: Columns = match resources.reader.as_ref() {
        Some(reader) => reader.columns().clone(),
        None => return Err(MigrateError::other("source reader was not opened")),
    };

    open_target(descriptor, &columns, &names, resources, report).await?;

    match (resources.reader.as_mut(), resources.writer.as_mut()) {
        (Some(reader), Some(writer)) => {
            pump(
                reader.as_mut(),
                writer.as_mut(),
                descriptor.batch_size,
                descriptor.on_batch_error,
                report,
            )
            .await
        }
        _ => Err(MigrateError::other("pipeline endpoints were not opened")),
    }
}

async fn connect(locator: &DatabaseLocator) -> Result<Arc<dyn Database>> {
    let db: Arc<dyn Database> = Arc::from(backends::create(locator.db_type)?);
    db.connect(&locator.connection_string).await?;
    info!(database = %locator, "Connected");
    Ok(db)
}

/// Discover the source columns and open the reader
async fn open_source(
    descriptor: &MigrationDescriptor,
    resources: &mut Resources,
) -> Result<Vec<ColumnDescriptor>> {
    match &descriptor.source {
        SourceEndpoint::File(locator) => {
            let reader = file::open_reader(locator)?;
            let columns = reader
                .columns()
                .iter()
                .map(ColumnDescriptor::text)
                .collect();
            info!(path = %locator.path.display(), format = %locator.format, "Opened source file");
            resources.reader = Some(reader);
            Ok(columns)
        }
        SourceEndpoint::Database {
            database,
            selection,
        } => {
            let db = connect(database).await?;
            resources.source_db = Some(db.clone());

            let discovered = discover::discover(db.as_ref(), selection).await?;
            let cursor = db.open_cursor(&discovered.scan_query).await?;
            let reader = DatabaseReader::new(cursor, &discovered.names(), descriptor.batch_size)?;
            resources.reader = Some(Box::new(reader));
            Ok(discovered.columns)
        }
    }
}

/// Prepare the target and open the writer
async fn open_target(
    descriptor: &MigrationDescriptor,
    columns: &[ColumnDescriptor],
    names: &Columns,
    resources: &mut Resources,
    report: &mut MigrationReport,
) -> Result<()> {
    match &descriptor.target {
        TargetEndpoint::File(locator) => {
            let writer = file::create_writer(locator, names)?;
            info!(path = %locator.path.display(), format = %locator.format, "Opened target file");
            resources.writer = Some(writer);
        }
        TargetEndpoint::Database { database, table } => {
            let db = connect(database).await?;
            resources.target_db = Some(db.clone());

            match descriptor.source.kind() {
                EndpointKind::Database => {
                    report.table_created = ensure_table(db.as_ref(), table, columns).await?;
                }
                EndpointKind::File => {
                    if !db.table_exists(table).await? {
                        return Err(MigrateError::TableNotFound(table.clone()));
                    }
                }
            }
            resources.writer = Some(Box::new(DatabaseWriter::new(db, table.as_str(), names)));
        }
    }
    Ok(())
}

/// Move every record from `reader` to `writer` in batches
async fn pump(
    reader: &mut dyn RecordReader,
    writer: &mut dyn RecordWriter,
    batch_size: usize,
    policy: BatchErrorPolicy,
    report: &mut MigrationReport,
) -> Result<()> {
    let mut buffer = BatchBuffer::new(batch_size);
    let mut batch_no: u64 = 0;

    while let Some(record) = reader.next_record().await? {
        if let Some(batch) = buffer.add(record) {
            batch_no += 1;
            flush(writer, batch, batch_no, policy, report).await?;
        }
    }

    let tail = buffer.flush_remaining();
    if !tail.is_empty() {
        batch_no += 1;
        flush(writer, tail, batch_no, policy, report).await?;
    }

    writer.finish().await
}

async fn flush(
    writer: &mut dyn RecordWriter,
    batch: Batch,
    batch_no: u64,
    policy: BatchErrorPolicy,
    report: &mut MigrationReport,
) -> Result<()> {
    let size = batch.len() as u64;
    match writer.write_batch(batch).await {
        Ok(()) => {
            report.records_migrated += size;
            report.batches_flushed += 1;
            info!(
                batch = batch_no,
                records = size,
                total = report.records_migrated,
                "Flushed batch"
            );
            Ok(())
        }
        Err(e) if policy == BatchErrorPolicy::Continue && !e.is_contract_violation() => {
            report.batches_failed += 1;
            warn!(batch = batch_no, records = size, error = %e, "Batch write failed, continuing");
            Ok(())
        }
        Err(e) => Err(MigrateError::batch_write(batch_no, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::record::{columns, Record, RecordValue};
    use async_trait::async_trait;

    type CloseLog = Arc<std::sync::Mutex<Vec<&'static str>>>;

    struct VecReader {
        columns: Columns,
        remaining: std::vec::IntoIter<i64>,
        closes: CloseLog,
    }

    impl VecReader {
        fn new(n: i64) -> Self {
            Self {
                columns: columns(["n"]),
                remaining: (0..n).collect::<Vec<_>>().into_iter(),
                closes: CloseLog::default(),
            }
        }
    }

    #[async_trait]
    impl RecordReader for VecReader {
        fn columns(&self) -> &Columns {
            &self.columns
        }

        async fn next_record(&mut self) -> Result<Option<Record>> {
            Ok(self
                .remaining
                .next()
                .and_then(|n| Record::new(self.columns.clone(), vec![RecordValue::Integer(n)])))
        }

        async fn close(&mut self) -> Result<()> {
            self.closes.lock().unwrap().push("reader");
            Ok(())
        }
    }

    /// Records batch sizes; fails the batches whose number is listed
    #[derive(Default)]
    struct RecordingWriter {
        sizes: Vec<usize>,
        fail_batches: Vec<usize>,
        finished: bool,
        closes: CloseLog,
    }

    #[async_trait]
    impl RecordWriter for RecordingWriter {
        async fn write_batch(&mut self, batch: Batch) -> Result<()> {
            self.sizes.push(batch.len());
            if self.fail_batches.contains(&self.sizes.len()) {
                return Err(MigrateError::query("constraint violated"));
            }
            Ok(())
        }

        async fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.closes.lock().unwrap().push("writer");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pump_batches_and_skips_empty_tail() {
        let mut reader = VecReader::new(6);
        let mut writer = RecordingWriter::default();
        let mut report = MigrationReport::default();

        pump(&mut reader, &mut writer, 3, BatchErrorPolicy::Fail, &mut report)
            .await
            .unwrap();

        assert_eq!(writer.sizes, [3, 3]);
        assert!(writer.finished);
        assert_eq!(report.records_migrated, 6);
        assert_eq!(report.batches_flushed, 2);
    }

    #[tokio::test]
    async fn test_pump_fail_policy_aborts() {
        let mut reader = VecReader::new(5);
        let mut writer = RecordingWriter {
            fail_batches: vec![1],
            ..Default::default()
        };
        let mut report = MigrationReport::default();

        let err = pump(&mut reader, &mut writer, 2, BatchErrorPolicy::Fail, &mut report)
            .await
            .unwrap_err();

        assert!(matches!(err, MigrateError::BatchWrite { batch: 1, .. }));
        assert_eq!(writer.sizes, [2]);
        assert!(!writer.finished);
    }

    #[tokio::test]
    async fn test_pump_continue_policy_counts_failures() {
        let mut reader = VecReader::new(5);
        let mut writer = RecordingWriter {
            fail_batches: vec![2],
            ..Default::default()
        };
        let mut report = MigrationReport::default();

        pump(&mut reader, &mut writer, 2, BatchErrorPolicy::Continue, &mut report)
            .await
            .unwrap();

        assert_eq!(writer.sizes, [2, 2, 1]);
        assert_eq!(report.batches_failed, 1);
        assert_eq!(report.batches_flushed, 2);
        assert_eq!(report.records_migrated, 3);
    }

    #[tokio::test]
    async fn test_release_after_failed_pump_closes_source_first() {
        let closes = CloseLog::default();
        let mut resources = Resources {
            reader: Some(Box::new(VecReader {
                closes: Arc::clone(&closes),
                ..VecReader::new(5)
            })),
            writer: Some(Box::new(RecordingWriter {
                fail_batches: vec![2],
                closes: Arc::clone(&closes),
                ..Default::default()
            })),
            ..Default::default()
        };
        let mut report = MigrationReport::default();

        let outcome = match (resources.reader.as_mut(), resources.writer.as_mut()) {
            (Some(reader), Some(writer)) => {
                pump(
                    reader.as_mut(),
                    writer.as_mut(),
                    2,
                    BatchErrorPolicy::Fail,
                    &mut report,
                )
                .await
            }
            _ => unreachable!(),
        };
        assert!(matches!(outcome, Err(MigrateError::BatchWrite { batch: 2, .. })));
        assert!(closes.lock().unwrap().is_empty());

        resources.release().await;
        assert_eq!(*closes.lock().unwrap(), ["reader", "writer"]);
        assert!(resources.reader.is_none());
        assert!(resources.writer.is_none());

        // A second release has nothing left to close
        resources.release().await;
        assert_eq!(closes.lock().unwrap().len(), 2);
    }
}
