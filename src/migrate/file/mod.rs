//! File endpoints
//!
//! Readers and writers for delimited text and XML, selected by the locator's
//! format.

pub mod csv;
pub mod xml;

pub use self::csv::{CsvRecordReader, CsvRecordWriter};
pub use self::xml::{XmlRecordReader, XmlRecordWriter};

use super::descriptor::{FileFormat, FileLocator};
use super::record::Columns;
use super::stream::{RecordReader, RecordWriter};
use crate::core::Result;

/// Open a reader for `locator`. The header (or first record) is read here.
pub fn open_reader(locator: &FileLocator) -> Result<Box<dyn RecordReader>> {
    let projection = locator.columns.as_deref();
    Ok(match locator.format {
        FileFormat::Csv => Box::new(CsvRecordReader::open(
            &locator.path,
            locator.delimiter,
            projection,
        )?),
        FileFormat::Xml => Box::new(XmlRecordReader::open(&locator.path, projection)?),
    })
}

/// Create a writer for `locator` that writes `columns` in order
pub fn create_writer(locator: &FileLocator, columns: &Columns) -> Result<Box<dyn RecordWriter>> {
    Ok(match locator.format {
        FileFormat::Csv => Box::new(CsvRecordWriter::create(
            &locator.path,
            locator.delimiter,
            columns,
        )?),
        FileFormat::Xml => Box::new(XmlRecordWriter::create(&locator.path, columns)?),
    })
}
