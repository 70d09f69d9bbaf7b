//! Migration descriptor
//!
//! The immutable description of one migration, resolved once from validated
//! configuration and handed to the engine by value.

use super::batch::DEFAULT_BATCH_SIZE;
use crate::core::{ConnectionBuilder, DatabaseType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Delimited text with a header line
    Csv,
    /// Element tree: one root, one child per record, one sub-element per column
    Xml,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Csv => f.write_str("csv"),
            FileFormat::Xml => f.write_str("xml"),
        }
    }
}

/// What to do when writing a batch to the target fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchErrorPolicy {
    /// Abort the migration on the first failed batch
    #[default]
    Fail,
    /// Log the failure, count it, and move on to the next batch
    Continue,
}

/// Location and format of a file endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocator {
    pub path: PathBuf,
    pub format: FileFormat,
    /// Field separator for delimited files
    pub delimiter: u8,
    /// Explicit column projection; when absent columns are discovered
    pub columns: Option<Vec<String>>,
}

impl FileLocator {
    /// Delimited file with the given separator
    pub fn csv(path: impl AsRef<Path>, delimiter: u8) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            format: FileFormat::Csv,
            delimiter,
            columns: None,
        }
    }

    /// XML file
    pub fn xml(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            format: FileFormat::Xml,
            delimiter: b',',
            columns: None,
        }
    }

    /// Restrict the file to an explicit column list
    #[must_use]
    pub fn with_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }
}

/// Connection details of a database endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseLocator {
    pub db_type: DatabaseType,
    pub connection_string: String,
    /// Database name (or file path for SQLite), for logs
    pub name: String,
}

impl DatabaseLocator {
    /// SQLite database file
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        let name = path.as_ref().display().to_string();
        Self {
            db_type: DatabaseType::Sqlite,
            connection_string: ConnectionBuilder::new(DatabaseType::Sqlite)
                .database(name.clone())
                .build_connection_string(),
            name,
        }
    }
}

// Connection strings carry passwords; keep them out of logs and panics
impl fmt::Debug for DatabaseLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseLocator")
            .field("db_type", &self.db_type)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for DatabaseLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} database '{}'", self.db_type, self.name)
    }
}

/// Which rows of a database source to migrate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every row of a table
    Table(String),
    /// The rows of a caller-supplied query
    Query(String),
}

/// Kind of an endpoint, used to pick the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    File,
    Database,
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::File => f.write_str("file"),
            EndpointKind::Database => f.write_str("database"),
        }
    }
}

/// Where records come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEndpoint {
    File(FileLocator),
    Database {
        database: DatabaseLocator,
        selection: Selection,
    },
}

impl SourceEndpoint {
    pub fn kind(&self) -> EndpointKind {
        match self {
            SourceEndpoint::File(_) => EndpointKind::File,
            SourceEndpoint::Database { .. } => EndpointKind::Database,
        }
    }
}

/// Where records go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetEndpoint {
    File(FileLocator),
    Database {
        database: DatabaseLocator,
        table: String,
    },
}

impl TargetEndpoint {
    pub fn kind(&self) -> EndpointKind {
        match self {
            TargetEndpoint::File(_) => EndpointKind::File,
            TargetEndpoint::Database { .. } => EndpointKind::Database,
        }
    }
}

/// Immutable description of one migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationDescriptor {
    pub source: SourceEndpoint,
    pub target: TargetEndpoint,
    pub batch_size: usize,
    pub on_batch_error: BatchErrorPolicy,
}

impl MigrationDescriptor {
    /// Describe a migration with the default batch size and fail-fast policy
    pub fn new(source: SourceEndpoint, target: TargetEndpoint) -> Self {
        Self {
            source,
            target,
            batch_size: DEFAULT_BATCH_SIZE,
            on_batch_error: BatchErrorPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_batch_error_policy(mut self, policy: BatchErrorPolicy) -> Self {
        self.on_batch_error = policy;
        self
    }

    /// (source kind, target kind)
    pub fn topology(&self) -> (EndpointKind, EndpointKind) {
        (self.source.kind(), self.target.kind())
    }
}
