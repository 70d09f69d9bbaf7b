//! Error types for the migration system
//!
//! This module defines all error types that can occur while configuring,
//! reading, coercing and writing data during a migration.

/// Result type alias for migration operations
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Error types for migration operations
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Connection error (generic)
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Connection timeout
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout { timeout_ms: u64 },

    /// Query execution error
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Query timeout
    #[error("Query timeout after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },

    /// Invalid or conflicting configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Column discovery produced no usable columns
    #[error("Column discovery failed: {0}")]
    Discovery(String),

    /// Table not found
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Column not found
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// A single source row could not be scanned or parsed
    #[error("Row {row}: {message}")]
    Row { row: u64, message: String },

    /// A flushed batch could not be written to the target
    #[error("Writing batch {batch} failed: {message}")]
    BatchWrite { batch: u64, message: String },

    /// A driver produced a value kind the coercer does not know about
    #[error("Unsupported value in column '{column}' (type {type_name})")]
    UnsupportedValue { column: String, type_name: String },

    /// Unsupported operation
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Delimited-text error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// XML error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// YAML configuration error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// PostgreSQL error
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    PostgresError(#[from] tokio_postgres::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl MigrateError {
    /// Create a new connection error (generic)
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        MigrateError::ConnectionError(msg.into())
    }

    /// Create a connection timeout error
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        MigrateError::ConnectionTimeout { timeout_ms }
    }

    /// Create a new query error
    pub fn query<S: Into<String>>(msg: S) -> Self {
        MigrateError::QueryError(msg.into())
    }

    /// Create a query timeout error
    pub fn query_timeout(timeout_ms: u64) -> Self {
        MigrateError::QueryTimeout { timeout_ms }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        MigrateError::Config(msg.into())
    }

    /// Create a discovery error
    pub fn discovery<S: Into<String>>(msg: S) -> Self {
        MigrateError::Discovery(msg.into())
    }

    /// Create a per-row error
    pub fn row<S: Into<String>>(row: u64, msg: S) -> Self {
        MigrateError::Row {
            row,
            message: msg.into(),
        }
    }

    /// Create a batch write error
    pub fn batch_write<S: Into<String>>(batch: u64, msg: S) -> Self {
        MigrateError::BatchWrite {
            batch,
            message: msg.into(),
        }
    }

    /// Create an unsupported value error
    pub fn unsupported_value(column: impl Into<String>, type_name: impl Into<String>) -> Self {
        MigrateError::UnsupportedValue {
            column: column.into(),
            type_name: type_name.into(),
        }
    }

    /// Create a new unsupported operation error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        MigrateError::UnsupportedOperation(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        MigrateError::Other(msg.into())
    }

    /// Whether this error is a programming-contract violation rather than a
    /// problem with the migrated data or the environment.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, MigrateError::UnsupportedValue { .. })
    }
}
