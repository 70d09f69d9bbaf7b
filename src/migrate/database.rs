//! Database endpoints
//!
//! The reader drains a forward-only cursor one batch-sized fetch at a time;
//! the writer issues one multi-row INSERT per flushed batch.

use super::batch::Batch;
use super::coerce::coerce_row;
use super::record::{columns, Columns, Record};
use super::stream::{RecordReader, RecordWriter};
use crate::core::{
    ColumnDescriptor, CreateTableBuilder, Database, DatabaseType, DatabaseValue, InsertBuilder,
    MigrateError, Result, RowCursor,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

/// Streams records out of a database cursor
pub struct DatabaseReader {
    cursor: Box<dyn RowCursor>,
    columns: Columns,
    fetch_size: usize,
    pending: VecDeque<Vec<DatabaseValue>>,
    exhausted: bool,
    row: u64,
}

impl DatabaseReader {
    /// Wrap an open cursor whose columns must match `expected` exactly
    pub fn new(cursor: Box<dyn RowCursor>, expected: &[String], fetch_size: usize) -> Result<Self> {
        if cursor.columns() != expected {
            return Err(MigrateError::discovery(format!(
                "scan columns {:?} differ from probed columns {:?}",
                cursor.columns(),
                expected
            )));
        }

        Ok(Self {
            columns: columns(expected.iter().cloned()),
            cursor,
            fetch_size: fetch_size.max(1),
            pending: VecDeque::new(),
            exhausted: false,
            row: 0,
        })
    }
}

#[async_trait]
impl RecordReader for DatabaseReader {
    fn columns(&self) -> &Columns {
        &self.columns
    }

    async fn next_record(&mut self) -> Result<Option<Record>> {
        if self.pending.is_empty() && !self.exhausted {
            let rows = self.cursor.fetch(self.fetch_size).await?;
            debug!(rows = rows.len(), "Fetched rows from cursor");
            if rows.is_empty() {
                self.exhausted = true;
            }
            self.pending.extend(rows);
        }

        match self.pending.pop_front() {
            Some(values) => {
                self.row += 1;
                coerce_row(&self.columns, values, self.row).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.pending.clear();
        self.exhausted = true;
        self.cursor.close().await
    }
}

/// Writes batches into a database table
pub struct DatabaseWriter {
    db: Arc<dyn Database>,
    table: String,
    columns: Columns,
    dialect: DatabaseType,
}

impl DatabaseWriter {
    pub fn new(db: Arc<dyn Database>, table: impl Into<String>, columns: &Columns) -> Self {
        let dialect = db.database_type();
        Self {
            db,
            table: table.into(),
            columns: columns.clone(),
            dialect,
        }
    }
}

#[async_trait]
impl RecordWriter for DatabaseWriter {
    async fn write_batch(&mut self, batch: Batch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut insert =
            InsertBuilder::new(self.table.as_str(), self.dialect).columns(&self.columns[..]);
        for record in batch {
            insert = insert.row(record.into_values().into_iter().map(Into::into).collect());
        }

        let rows = insert.row_count();
        let sql = insert.build();
        debug!(table = %self.table, rows, bytes = sql.len(), "Executing batch insert");
        self.db.execute(&sql).await?;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Create `table` from `columns` unless it already exists.
///
/// Column types are the source's type names, verbatim. Returns whether the
/// table was created.
pub async fn ensure_table(
    db: &dyn Database,
    table: &str,
    columns: &[ColumnDescriptor],
) -> Result<bool> {
    if db.table_exists(table).await? {
        debug!(table, "Target table exists");
        return Ok(false);
    }

    let create = columns
        .iter()
        .fold(CreateTableBuilder::new(table), |builder, column| {
            builder.column(column.name.as_str(), column.type_name.as_str())
        })
        .build();
    debug!(sql = %create, "Creating target table");
    db.execute(&create).await?;
    info!(table, columns = columns.len(), "Created target table");
    Ok(true)
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::backends::SqliteDatabase;
    use crate::migrate::batch::BatchBuffer;
    use crate::migrate::record::RecordValue;

    async fn connected() -> Arc<dyn Database> {
        let db = SqliteDatabase::new();
        db.connect(":memory:").await.unwrap();
        Arc::new(db)
    }

    #[tokio::test]
    async fn test_reader_fetches_and_coerces() {
        let db = connected().await;
        db.execute("CREATE TABLE t (a INTEGER, b TEXT)").await.unwrap();
        db.execute("INSERT INTO t VALUES (1, 'x'), (2, NULL), (3, 'z')")
            .await
            .unwrap();

        let cursor = db.open_cursor(r#"SELECT "a", "b" FROM t"#).await.unwrap();
        let expected = vec!["a".to_string(), "b".to_string()];
        let mut reader = DatabaseReader::new(cursor, &expected, 2).unwrap();

        let mut records = Vec::new();
        while let Some(record) = reader.next_record().await.unwrap() {
            records.push(record);
        }
        reader.close().await.unwrap();
        reader.close().await.unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].get("a"), Some(&RecordValue::Integer(1)));
        assert_eq!(records[1].get("b"), Some(&RecordValue::Null));
    }

    #[tokio::test]
    async fn test_reader_rejects_column_drift() {
        let db = connected().await;
        db.execute("CREATE TABLE t (a INTEGER)").await.unwrap();

        let cursor = db.open_cursor("SELECT a FROM t").await.unwrap();
        let expected = vec!["b".to_string()];
        assert!(matches!(
            DatabaseReader::new(cursor, &expected, 10),
            Err(MigrateError::Discovery(_))
        ));
    }

    #[tokio::test]
    async fn test_ensure_table_creates_once() {
        let db = connected().await;
        let columns = vec![
            ColumnDescriptor::new("id", "INTEGER"),
            ColumnDescriptor::new("name", "TEXT"),
        ];

        assert!(ensure_table(db.as_ref(), "copy", &columns).await.unwrap());
        assert!(!ensure_table(db.as_ref(), "copy", &columns).await.unwrap());

        let described = db.describe("SELECT * FROM copy").await.unwrap();
        assert!(described.is_none());
        assert!(db.table_exists("copy").await.unwrap());
    }

    #[tokio::test]
    async fn test_writer_inserts_batch() {
        let db = connected().await;
        db.execute("CREATE TABLE t (id INTEGER, name TEXT)")
            .await
            .unwrap();

        let cols = columns(["id", "name"]);
        let mut writer = DatabaseWriter::new(db.clone(), "t", &cols);
        let mut buffer = BatchBuffer::new(10);
        let _ = buffer.add(Record::new(cols.clone(), vec!["1".into(), "o'brien".into()]).unwrap());
        let _ = buffer.add(Record::new(cols.clone(), vec![2i64.into(), RecordValue::Null]).unwrap());
        writer.write_batch(buffer.flush_remaining()).await.unwrap();
        writer.finish().await.unwrap();

        let mut cursor = db.open_cursor("SELECT id, name FROM t ORDER BY id").await.unwrap();
        let rows = cursor.fetch(10).await.unwrap();
        cursor.close().await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec![DatabaseValue::Long(1), "o'brien".into()]);
        assert_eq!(rows[1][1], DatabaseValue::Null);
    }
}
