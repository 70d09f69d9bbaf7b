//! Database trait and connection management
//!
//! This module defines the driver-facing trait that every backend implements,
//! the forward-only cursor used for the main scan, and the connection-string
//! builder.

use super::database_types::DatabaseType;
use super::error::Result;
use super::value::DatabaseValue;
use async_trait::async_trait;

/// Name and driver-reported type of a result column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Column name as reported by the driver or file header
    pub name: String,
    /// Database-specific type name, `"text"` for file columns, or empty when
    /// the driver reports no declared type
    pub type_name: String,
}

impl ColumnDescriptor {
    /// Create a new column descriptor
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    /// Descriptor for a column read from a file, where values are always text
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, "text")
    }
}

/// Core database trait that all database backends must implement
///
/// The trait is object safe so endpoints chosen at runtime can be held as
/// `Box<dyn Database>`.
#[async_trait]
pub trait Database: Send + Sync {
    /// Get the database type
    fn database_type(&self) -> DatabaseType;

    /// Connect to the database with the given connection string
    async fn connect(&self, connection_string: &str) -> Result<()>;

    /// Check if connected to the database
    fn is_connected(&self) -> bool;

    /// Disconnect from the database. Disconnecting twice is not an error.
    async fn disconnect(&self) -> Result<()>;

    /// Execute a statement that doesn't return results (INSERT, CREATE, etc.)
    ///
    /// # Security Warning
    ///
    /// The statement is executed verbatim. Statements issued by the migration
    /// engine are produced by the query builder, which quotes identifiers and
    /// escapes literals.
    async fn execute(&self, query: &str) -> Result<u64>;

    /// Run `query` and report its result columns in select-list order.
    ///
    /// Returns `None` when the query produced no rows, in which case nothing
    /// can be inferred about the columns.
    async fn describe(&self, query: &str) -> Result<Option<Vec<ColumnDescriptor>>>;

    /// Check whether `table` exists using one catalog introspection query
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Open a forward-only cursor over the rows of `query`
    async fn open_cursor(&self, query: &str) -> Result<Box<dyn RowCursor>>;
}

/// Forward-only cursor over a query result
///
/// Rows are returned as one value slot per select-list column.
#[async_trait]
pub trait RowCursor: Send {
    /// Names of the result columns in select-list order
    fn columns(&self) -> &[String];

    /// Fetch up to `max_rows` rows. An empty vector means the cursor is
    /// exhausted.
    async fn fetch(&mut self, max_rows: usize) -> Result<Vec<Vec<DatabaseValue>>>;

    /// Release the cursor. Closing twice is not an error.
    async fn close(&mut self) -> Result<()>;
}

/// Database connection builder
#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    db_type: DatabaseType,
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
    options: Vec<(String, String)>,
}

impl ConnectionBuilder {
    /// Create a new connection builder for the specified database type
    pub fn new(db_type: DatabaseType) -> Self {
        Self {
            db_type,
            host: None,
            port: None,
            database: None,
            username: None,
            password: None,
            options: Vec::new(),
        }
    }

    /// Set the database host
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the database port
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the database name (a file path for SQLite)
    pub fn database<S: Into<String>>(mut self, database: S) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the username
    pub fn username<S: Into<String>>(mut self, username: S) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password
    pub fn password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Add a custom option
    pub fn option<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }

    /// Build the connection string
    pub fn build_connection_string(&self) -> String {
        match self.db_type {
            DatabaseType::Sqlite => self
                .database
                .clone()
                .unwrap_or_else(|| ":memory:".to_string()),
            DatabaseType::Postgres => {
                let mut parts = Vec::new();
                if let Some(host) = &self.host {
                    parts.push(format!("host={}", conninfo_value(host)));
                }
                if let Some(port) = self.port {
                    parts.push(format!("port={}", port));
                }
                if let Some(database) = &self.database {
                    parts.push(format!("dbname={}", conninfo_value(database)));
                }
                if let Some(username) = &self.username {
                    parts.push(format!("user={}", conninfo_value(username)));
                }
                if let Some(password) = &self.password {
                    parts.push(format!("password={}", conninfo_value(password)));
                }
                for (key, value) in &self.options {
                    parts.push(format!("{}={}", key, conninfo_value(value)));
                }
                parts.join(" ")
            }
        }
    }
}

/// Quote a libpq `key=value` value when it is empty or holds whitespace,
/// quotes or backslashes
fn conninfo_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
