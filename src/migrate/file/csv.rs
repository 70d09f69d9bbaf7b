//! Delimited text files
//!
//! The first line is the header. Fields that are valid UTF-8 become text,
//! anything else is carried as raw bytes. `Null` is written as an empty field.

use crate::core::{MigrateError, Result};
use crate::migrate::batch::Batch;
use crate::migrate::record::{columns, Columns, Record, RecordValue};
use crate::migrate::stream::{RecordReader, RecordWriter};
use async_trait::async_trait;
use std::fs::File;
use std::path::Path;
use tracing::debug;

fn decode_field(field: &[u8]) -> RecordValue {
    match std::str::from_utf8(field) {
        Ok(s) => RecordValue::Text(s.to_string()),
        Err(_) => RecordValue::Raw(field.to_vec()),
    }
}

/// Streams records from a delimited file
pub struct CsvRecordReader {
    reader: Option<csv::Reader<File>>,
    columns: Columns,
    /// Header position of each projected column
    positions: Vec<usize>,
    header_width: usize,
    record: csv::ByteRecord,
    row: u64,
}

impl CsvRecordReader {
    /// Open `path` and read its header.
    ///
    /// With a `projection`, only those columns are yielded, in the given
    /// order; each must appear in the header.
    pub fn open(path: &Path, delimiter: u8, projection: Option<&[String]>) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let header = reader.byte_headers()?.clone();
        if header.is_empty() {
            return Err(MigrateError::discovery(format!(
                "{} has no header line",
                path.display()
            )));
        }

        let names = header
            .iter()
            .map(|field| {
                std::str::from_utf8(field).map(str::to_string).map_err(|_| {
                    MigrateError::discovery(format!(
                        "{} has a header field that is not valid UTF-8",
                        path.display()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let (columns, positions) = match projection {
            Some(wanted) => {
                let positions = wanted
                    .iter()
                    .map(|name| {
                        names
                            .iter()
                            .position(|n| n == name)
                            .ok_or_else(|| MigrateError::ColumnNotFound(name.clone()))
                    })
                    .collect::<Result<Vec<_>>>()?;
                (columns(wanted.iter().cloned()), positions)
            }
            None => {
                let positions = (0..names.len()).collect();
                (columns(names.iter().cloned()), positions)
            }
        };

        debug!(path = %path.display(), columns = columns.len(), "Opened delimited reader");

        Ok(Self {
            reader: Some(reader),
            columns,
            positions,
            header_width: names.len(),
            record: csv::ByteRecord::new(),
            row: 0,
        })
    }
}

#[async_trait]
impl RecordReader for CsvRecordReader {
    fn columns(&self) -> &Columns {
        &self.columns
    }

    async fn next_record(&mut self) -> Result<Option<Record>> {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return Ok(None),
        };

        if !reader.read_byte_record(&mut self.record)? {
            return Ok(None);
        }
        self.row += 1;

        if self.record.len() != self.header_width {
            return Err(MigrateError::row(
                self.row,
                format!(
                    "expected {} fields, found {}",
                    self.header_width,
                    self.record.len()
                ),
            ));
        }

        let values = self
            .positions
            .iter()
            .map(|&idx| decode_field(&self.record[idx]))
            .collect();

        Record::new(self.columns.clone(), values)
            .map(Some)
            .ok_or_else(|| MigrateError::row(self.row, "projection width mismatch"))
    }

    async fn close(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}

/// Writes batches to a delimited file
pub struct CsvRecordWriter {
    writer: Option<csv::Writer<File>>,
}

impl CsvRecordWriter {
    /// Create (or truncate) `path` and write the header line
    pub fn create(path: &Path, delimiter: u8, columns: &Columns) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(path)?;
        writer.write_record(columns.iter())?;
        writer.flush()?;

        debug!(path = %path.display(), columns = columns.len(), "Opened delimited writer");

        Ok(Self {
            writer: Some(writer),
        })
    }

    fn writer(&mut self) -> Result<&mut csv::Writer<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| MigrateError::other("delimited writer is closed"))
    }
}

#[async_trait]
impl RecordWriter for CsvRecordWriter {
    async fn write_batch(&mut self, batch: Batch) -> Result<()> {
        let writer = self.writer()?;
        for record in batch {
            writer.write_record(record.values().iter().map(RecordValue::to_bytes))?;
        }
        writer.flush()?;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.writer()?.flush()?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::batch::BatchBuffer;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_reads_header_and_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.csv");
        std::fs::write(&path, "id;name\n1;a\n2;\n").unwrap();

        let mut reader = CsvRecordReader::open(&path, b';', None).unwrap();
        assert_eq!(reader.columns().as_ref(), ["id", "name"]);

        let first = reader.next_record().await.unwrap().unwrap();
        assert_eq!(first.get("name"), Some(&RecordValue::from("a")));
        let second = reader.next_record().await.unwrap().unwrap();
        assert_eq!(second.get("name"), Some(&RecordValue::from("")));
        assert!(reader.next_record().await.unwrap().is_none());
        reader.close().await.unwrap();
        reader.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_field_count_mismatch_is_row_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.csv");
        std::fs::write(&path, "a,b\n1,2\n3\n").unwrap();

        let mut reader = CsvRecordReader::open(&path, b',', None).unwrap();
        assert!(reader.next_record().await.unwrap().is_some());
        let err = reader.next_record().await.unwrap_err();
        assert!(matches!(err, MigrateError::Row { row: 2, .. }));
    }

    #[tokio::test]
    async fn test_projection() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.csv");
        std::fs::write(&path, "a,b,c\n1,2,3\n").unwrap();

        let projection = vec!["c".to_string(), "a".to_string()];
        let mut reader = CsvRecordReader::open(&path, b',', Some(&projection)).unwrap();
        let record = reader.next_record().await.unwrap().unwrap();
        let values: Vec<String> = record.values().iter().map(|v| v.to_string()).collect();
        assert_eq!(values, ["3", "1"]);

        let missing = vec!["z".to_string()];
        assert!(matches!(
            CsvRecordReader::open(&path, b',', Some(&missing)),
            Err(MigrateError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_empty_file_has_no_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "").unwrap();

        assert!(matches!(
            CsvRecordReader::open(&path, b',', None),
            Err(MigrateError::Discovery(_))
        ));
    }

    #[tokio::test]
    async fn test_writes_null_as_empty_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let cols = columns(["id", "name"]);

        let mut writer = CsvRecordWriter::create(&path, b',', &cols).unwrap();
        let mut buffer = BatchBuffer::new(10);
        let _ = buffer.add(Record::new(cols.clone(), vec![1i64.into(), RecordValue::Null]).unwrap());
        let _ = buffer.add(Record::new(cols.clone(), vec![2i64.into(), "b".into()]).unwrap());
        writer.write_batch(buffer.flush_remaining()).await.unwrap();
        writer.finish().await.unwrap();
        writer.close().await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "id,name\n1,\n2,b\n");
    }
}
