//! XML files
//!
//! Documents have one root element, one child element per record and one
//! sub-element per column:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <Root>
//!   <Record>
//!     <id>1</id>
//!     <name/>
//!   </Record>
//! </Root>
//! ```
//!
//! An empty element (`<name/>`) is `Null`. Column names must be usable as
//! element names; the writer refuses any that are not.

use crate::core::{MigrateError, Result};
use crate::migrate::batch::Batch;
use crate::migrate::record::{columns, Columns, Record, RecordValue};
use crate::migrate::stream::{RecordReader, RecordWriter};
use async_trait::async_trait;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

const ROOT_ELEMENT: &str = "Root";
const RECORD_ELEMENT: &str = "Record";

/// Fields of one record element in document order
type Fields = Vec<(String, RecordValue)>;

/// Streams records from an XML file
pub struct XmlRecordReader {
    reader: Option<Reader<BufReader<File>>>,
    buf: Vec<u8>,
    columns: Columns,
    /// Record read ahead while discovering columns
    pending: Option<Fields>,
    in_root: bool,
    row: u64,
}

impl XmlRecordReader {
    /// Open `path`.
    ///
    /// Without a `projection` the columns are the child element names of the
    /// first record, in document order, and the file must hold at least one
    /// record.
    pub fn open(path: &Path, projection: Option<&[String]>) -> Result<Self> {
        let reader = Reader::from_file(path)?;
        let mut this = Self {
            reader: Some(reader),
            buf: Vec::new(),
            columns: columns(Vec::<String>::new()),
            pending: None,
            in_root: false,
            row: 0,
        };

        match projection {
            Some(names) => this.columns = columns(names.iter().cloned()),
            None => {
                let first = this.read_fields()?.ok_or_else(|| {
                    MigrateError::discovery(format!("{} has no record elements", path.display()))
                })?;
                let mut names: Vec<String> = Vec::with_capacity(first.len());
                for (name, _) in &first {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
                if names.is_empty() {
                    return Err(MigrateError::discovery(format!(
                        "first record of {} has no fields",
                        path.display()
                    )));
                }
                this.columns = columns(names);
                this.pending = Some(first);
            }
        }

        debug!(path = %path.display(), columns = this.columns.len(), "Opened XML reader");
        Ok(this)
    }

    /// Read the next record element as raw fields
    fn read_fields(&mut self) -> Result<Option<Fields>> {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return Ok(None),
        };

        // 0: outside the root, 1: inside the root, 2: inside a record,
        // 3 and deeper: inside a field
        let mut depth: usize = if self.in_root { 1 } else { 0 };
        let mut fields: Fields = Vec::new();
        let mut field: Option<(String, String)> = None;

        loop {
            self.buf.clear();
            match reader.read_event_into(&mut self.buf)? {
                Event::Start(e) => {
                    if depth == 0 {
                        self.in_root = true;
                    } else if depth == 2 {
                        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                        field = Some((name, String::new()));
                    }
                    depth += 1;
                }
                Event::Empty(e) => match depth {
                    0 => return Ok(None),
                    // A record without fields
                    1 => return Ok(Some(fields)),
                    2 => {
                        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                        fields.push((name, RecordValue::Null));
                    }
                    _ => {}
                },
                Event::Text(e) => {
                    if let (3, Some((_, text))) = (depth, field.as_mut()) {
                        text.push_str(&e.unescape()?);
                    }
                }
                Event::CData(e) => {
                    if let (3, Some((_, text))) = (depth, field.as_mut()) {
                        text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    match depth {
                        2 => {
                            if let Some((name, text)) = field.take() {
                                fields.push((name, RecordValue::Text(text)));
                            }
                        }
                        1 => return Ok(Some(fields)),
                        0 => {
                            self.in_root = false;
                            return Ok(None);
                        }
                        _ => {}
                    }
                }
                Event::Eof => {
                    if depth > 1 {
                        return Err(MigrateError::row(
                            self.row + 1,
                            "document ended inside a record element",
                        ));
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }

    /// Project raw fields onto the column list. Missing fields are `Null`,
    /// unknown fields are ignored.
    fn project(&self, fields: Fields) -> Result<Record> {
        let mut values = vec![RecordValue::Null; self.columns.len()];
        for (name, value) in fields {
            if let Some(idx) = self.columns.iter().position(|c| *c == name) {
                values[idx] = value;
            }
        }
        Record::new(self.columns.clone(), values)
            .ok_or_else(|| MigrateError::row(self.row, "projection width mismatch"))
    }
}

#[async_trait]
impl RecordReader for XmlRecordReader {
    fn columns(&self) -> &Columns {
        &self.columns
    }

    async fn next_record(&mut self) -> Result<Option<Record>> {
        let fields = match self.pending.take() {
            Some(fields) => Some(fields),
            None => self.read_fields()?,
        };

        match fields {
            Some(fields) => {
                self.row += 1;
                self.project(fields).map(Some)
            }
            None => {
                self.reader = None;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.reader = None;
        self.pending = None;
        Ok(())
    }
}

/// Writes batches to an XML file
pub struct XmlRecordWriter {
    writer: Option<Writer<BufWriter<File>>>,
    columns: Columns,
    finished: bool,
}

/// Whether `name` is an XML element name without a namespace prefix
fn is_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

impl XmlRecordWriter {
    /// Create (or truncate) `path` and open the root element.
    ///
    /// Fails before touching `path` when a column name is not a valid element
    /// name.
    pub fn create(path: &Path, columns: &Columns) -> Result<Self> {
        if let Some(name) = columns.iter().find(|name| !is_element_name(name)) {
            return Err(MigrateError::config(format!(
                "column '{}' is not a valid XML element name",
                name
            )));
        }

        let file = File::create(path)?;
        let mut writer = Writer::new_with_indent(BufWriter::new(file), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new(ROOT_ELEMENT)))?;
        writer.get_mut().flush()?;

        debug!(path = %path.display(), columns = columns.len(), "Opened XML writer");

        Ok(Self {
            writer: Some(writer),
            columns: columns.clone(),
            finished: false,
        })
    }

    fn writer(&mut self) -> Result<&mut Writer<BufWriter<File>>> {
        self.writer
            .as_mut()
            .ok_or_else(|| MigrateError::other("XML writer is closed"))
    }
}

#[async_trait]
impl RecordWriter for XmlRecordWriter {
    async fn write_batch(&mut self, batch: Batch) -> Result<()> {
        let columns = self.columns.clone();
        let writer = self.writer()?;

        for record in batch {
            writer.write_event(Event::Start(BytesStart::new(RECORD_ELEMENT)))?;
            for (name, value) in columns.iter().zip(record.values()) {
                if value.is_null() {
                    writer.write_event(Event::Empty(BytesStart::new(name.as_str())))?;
                } else {
                    writer.write_event(Event::Start(BytesStart::new(name.as_str())))?;
                    writer.write_event(Event::Text(BytesText::new(&value.to_text())))?;
                    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
                }
            }
            writer.write_event(Event::End(BytesEnd::new(RECORD_ELEMENT)))?;
        }

        writer.get_mut().flush()?;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let writer = self.writer()?;
        writer.write_event(Event::End(BytesEnd::new(ROOT_ELEMENT)))?;
        writer.get_mut().write_all(b"\n")?;
        writer.get_mut().flush()?;
        self.finished = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.get_mut().flush()?;
        }
        Ok(())
    }
}
