//! SQLite database backend implementation
//!
//! This module provides a SQLite implementation of the Database trait. All
//! rusqlite calls run on Tokio's blocking pool; the row cursor is a dedicated
//! blocking worker that steps one prepared statement on request.

use crate::core::{
    database::{ColumnDescriptor, Database, RowCursor},
    database_types::DatabaseType,
    error::{MigrateError, Result},
    value::DatabaseValue,
};
use async_trait::async_trait;
use rusqlite::{types::ValueRef, Connection, OptionalExtension, Row};
use std::sync::{mpsc as std_mpsc, Arc};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

/// Default timeout for database operations (30 seconds)
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// SQLite database implementation
pub struct SqliteDatabase {
    connection: Arc<Mutex<Option<Connection>>>,
}

impl SqliteDatabase {
    /// Create a new SQLite database instance
    pub fn new() -> Self {
        Self {
            connection: Arc::new(Mutex::new(None)),
        }
    }

    /// Convert one column of a rusqlite row to a DatabaseValue
    fn column_value(row: &Row, idx: usize) -> rusqlite::Result<DatabaseValue> {
        Ok(match row.get_ref(idx)? {
            ValueRef::Null => DatabaseValue::Null,
            ValueRef::Integer(v) => DatabaseValue::Long(v),
            ValueRef::Real(v) => DatabaseValue::Double(v),
            ValueRef::Text(v) => match std::str::from_utf8(v) {
                Ok(s) => DatabaseValue::String(s.to_string()),
                Err(_) => DatabaseValue::Bytes(v.to_vec()),
            },
            ValueRef::Blob(v) => DatabaseValue::Bytes(v.to_vec()),
        })
    }

    /// Run `f` against the open connection on the blocking pool, with timeout
    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let connection_arc = Arc::clone(&self.connection);

        let mut task = tokio::task::spawn_blocking(move || -> Result<T> {
            let connection = connection_arc.blocking_lock();
            let conn = connection
                .as_ref()
                .ok_or_else(|| MigrateError::connection("Not connected to database"))?;
            f(conn)
        });

        // Use select! to abort task on timeout, preventing resource leaks
        tokio::select! {
            result = &mut task => {
                result.map_err(|e| MigrateError::other(format!("Task join error: {}", e)))?
            }
            _ = tokio::time::sleep(DEFAULT_OPERATION_TIMEOUT) => {
                task.abort();
                Err(MigrateError::query_timeout(DEFAULT_OPERATION_TIMEOUT.as_millis() as u64))
            }
        }
    }
}

/// Whether `connection_string` names a database file rather than a private
/// in-memory or temporary database
fn is_file_backed(connection_string: &str) -> bool {
    !connection_string.is_empty()
        && connection_string != ":memory:"
        && !connection_string.contains("mode=memory")
}

impl Default for SqliteDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    async fn connect(&self, connection_string: &str) -> Result<()> {
        // Clean up any existing connection first
        {
            let mut connection = self.connection.lock().await;
            *connection = None;
        }

        let connection_string = connection_string.to_string();
        let connection_arc = Arc::clone(&self.connection);

        let mut task = tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = Connection::open(&connection_string)?;
            conn.execute("PRAGMA foreign_keys = ON", [])?;
            if is_file_backed(&connection_string) {
                // Lets a scan on one connection coexist with inserts from another
                let mode: String = conn.pragma_update_and_check(
                    None,
                    "journal_mode",
                    "WAL",
                    |row| row.get(0),
                )?;
                debug!(journal_mode = %mode, "opened sqlite database");
            }

            let mut connection = connection_arc.blocking_lock();
            *connection = Some(conn);

            Ok(())
        });

        tokio::select! {
            result = &mut task => {
                result.map_err(|e| MigrateError::other(format!("Task join error: {}", e)))??
            }
            _ = tokio::time::sleep(DEFAULT_OPERATION_TIMEOUT) => {
                task.abort();
                return Err(MigrateError::connection_timeout(DEFAULT_OPERATION_TIMEOUT.as_millis() as u64));
            }
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection
            .try_lock()
            .map(|conn| conn.is_some())
            .unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<()> {
        let mut connection = self.connection.lock().await;
        *connection = None;
        Ok(())
    }

    async fn execute(&self, query: &str) -> Result<u64> {
        let query = query.to_string();
        self.with_connection(move |conn| {
            let affected = conn.execute(&query, [])?;
            Ok(affected as u64)
        })
        .await
    }

    async fn describe(&self, query: &str) -> Result<Option<Vec<ColumnDescriptor>>> {
        let query = query.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&query)?;
            let columns: Vec<ColumnDescriptor> = stmt
                .columns()
                .iter()
                .map(|c| ColumnDescriptor::new(c.name(), c.decl_type().unwrap_or("")))
                .collect();

            let mut rows = stmt.query([])?;
            if rows.next()?.is_none() {
                return Ok(None);
            }
            Ok(Some(columns))
        })
        .await
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let table = table.to_string();
        self.with_connection(move |conn| {
            let found: Option<Option<String>> = conn
                .query_row(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [&table],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.flatten().is_some())
        })
        .await
    }

    async fn open_cursor(&self, query: &str) -> Result<Box<dyn RowCursor>> {
        let cursor = SqliteCursor::open(Arc::clone(&self.connection), query.to_string()).await?;
        Ok(Box::new(cursor))
    }
}

/// Messages sent from the cursor worker back to the async side
enum CursorMessage {
    Opened(Vec<String>),
    Rows(Vec<Vec<DatabaseValue>>),
}

/// Forward-only cursor over a SQLite statement
///
/// The worker holds the connection lock for the cursor's lifetime and only
/// steps the statement when a fetch is requested.
pub struct SqliteCursor {
    columns: Vec<String>,
    requests: Option<std_mpsc::Sender<usize>>,
    responses: mpsc::Receiver<Result<CursorMessage>>,
    worker: Option<JoinHandle<()>>,
}

impl SqliteCursor {
    async fn open(connection: Arc<Mutex<Option<Connection>>>, query: String) -> Result<Self> {
        let (request_tx, request_rx) = std_mpsc::channel::<usize>();
        let (response_tx, response_rx) = mpsc::channel::<Result<CursorMessage>>(1);

        debug!(sql = %query, "opening sqlite cursor");
        let worker = tokio::task::spawn_blocking(move || {
            let connection = connection.blocking_lock();
            let result = match connection.as_ref() {
                Some(conn) => Self::stream_rows(conn, &query, &request_rx, &response_tx),
                None => Err(MigrateError::connection("Not connected to database")),
            };
            if let Err(e) = result {
                let _ = response_tx.blocking_send(Err(e));
            }
        });

        let mut cursor = Self {
            columns: Vec::new(),
            requests: Some(request_tx),
            responses: response_rx,
            worker: Some(worker),
        };

        match cursor.receive().await? {
            CursorMessage::Opened(columns) => {
                cursor.columns = columns;
                Ok(cursor)
            }
            CursorMessage::Rows(_) => Err(MigrateError::other(
                "SQLite cursor sent rows before opening",
            )),
        }
    }

    /// Worker loop: prepare, announce columns, then serve fetch requests
    /// until the request channel closes.
    fn stream_rows(
        conn: &Connection,
        query: &str,
        requests: &std_mpsc::Receiver<usize>,
        responses: &mpsc::Sender<Result<CursorMessage>>,
    ) -> Result<()> {
        let mut stmt = conn.prepare(query)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let column_count = columns.len();

        if responses
            .blocking_send(Ok(CursorMessage::Opened(columns)))
            .is_err()
        {
            return Ok(());
        }

        let mut rows = stmt.query([])?;
        while let Ok(max_rows) = requests.recv() {
            let mut batch = Vec::with_capacity(max_rows);
            while batch.len() < max_rows {
                match rows.next()? {
                    Some(row) => {
                        let mut values = Vec::with_capacity(column_count);
                        for idx in 0..column_count {
                            values.push(SqliteDatabase::column_value(row, idx)?);
                        }
                        batch.push(values);
                    }
                    None => break,
                }
            }
            if responses
                .blocking_send(Ok(CursorMessage::Rows(batch)))
                .is_err()
            {
                break;
            }
        }

        Ok(())
    }

    async fn receive(&mut self) -> Result<CursorMessage> {
        match tokio::time::timeout(DEFAULT_OPERATION_TIMEOUT, self.responses.recv()).await {
            Err(_) => Err(MigrateError::query_timeout(
                DEFAULT_OPERATION_TIMEOUT.as_millis() as u64,
            )),
            Ok(None) => Err(MigrateError::query("SQLite cursor worker stopped")),
            Ok(Some(message)) => message,
        }
    }
}

#[async_trait]
impl RowCursor for SqliteCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn fetch(&mut self, max_rows: usize) -> Result<Vec<Vec<DatabaseValue>>> {
        let Some(requests) = &self.requests else {
            return Ok(Vec::new());
        };

        // A failed send means the worker already exited; its error, if any,
        // is waiting in the response channel.
        if requests.send(max_rows).is_err() {
            return match self.receive().await {
                Ok(_) => Err(MigrateError::query("SQLite cursor worker stopped")),
                Err(e) => Err(e),
            };
        }

        match self.receive().await? {
            CursorMessage::Rows(rows) => Ok(rows),
            CursorMessage::Opened(_) => Err(MigrateError::other(
                "SQLite cursor reopened unexpectedly",
            )),
        }
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the sender ends the worker loop and releases the connection
        self.requests = None;
        self.responses.close();
        if let Some(worker) = self.worker.take() {
            worker
                .await
                .map_err(|e| MigrateError::other(format!("Task join error: {}", e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> Result<SqliteDatabase> {
        let db = SqliteDatabase::new();
        db.connect(":memory:").await?;
        db.execute("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT, score REAL)")
            .await?;
        db.execute("INSERT INTO test (name, score) VALUES ('Alice', 1.5), ('Bob', NULL)")
            .await?;
        Ok(db)
    }

    #[tokio::test]
    async fn test_sqlite_connect() {
        let db = SqliteDatabase::new();
        assert!(db.connect(":memory:").await.is_ok());
        assert!(db.is_connected());
        assert!(db.disconnect().await.is_ok());
        assert!(!db.is_connected());
    }

    #[tokio::test]
    async fn test_sqlite_values() -> Result<()> {
        let db = seeded().await?;
        db.execute("INSERT INTO test (name, score) VALUES (X'ff00', 2)").await?;

        let mut cursor = db.open_cursor("SELECT name, score FROM test ORDER BY id").await?;
        let rows = cursor.fetch(10).await?;
        cursor.close().await?;

        assert_eq!(rows[0], vec!["Alice".into(), DatabaseValue::Double(1.5)]);
        assert_eq!(rows[1], vec!["Bob".into(), DatabaseValue::Null]);
        assert_eq!(rows[2], vec![DatabaseValue::Bytes(vec![0xff, 0x00]), DatabaseValue::Double(2.0)]);
        Ok(())
    }

    #[test]
    fn test_file_backed_detection() {
        assert!(is_file_backed("data/app.db"));
        assert!(!is_file_backed(":memory:"));
        assert!(!is_file_backed(""));
        assert!(!is_file_backed("file:shared?mode=memory&cache=shared"));
    }

    #[tokio::test]
    async fn test_sqlite_file_insert_during_scan() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("shared.db").to_string_lossy().into_owned();

        let source = SqliteDatabase::new();
        source.connect(&path).await?;
        source.execute("CREATE TABLE src (n INTEGER)").await?;
        source.execute("INSERT INTO src VALUES (1), (2), (3)").await?;

        let target = SqliteDatabase::new();
        target.connect(&path).await?;
        target.execute("CREATE TABLE dst (n INTEGER)").await?;

        let mut cursor = source.open_cursor("SELECT n FROM src").await?;
        assert_eq!(cursor.fetch(1).await?.len(), 1);

        // Another connection writes to the same file while the scan is open
        assert_eq!(target.execute("INSERT INTO dst VALUES (1)").await?, 1);
        assert_eq!(cursor.fetch(10).await?.len(), 2);
        cursor.close().await?;

        assert!(target.table_exists("dst").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_describe_reports_declared_types() -> Result<()> {
        let db = seeded().await?;

        let columns = db
            .describe("SELECT * FROM test LIMIT 1")
            .await?
            .ok_or_else(|| MigrateError::discovery("no rows"))?;
        assert_eq!(
            columns,
            vec![
                ColumnDescriptor::new("id", "INTEGER"),
                ColumnDescriptor::new("name", "TEXT"),
                ColumnDescriptor::new("score", "REAL"),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_describe_empty_result() -> Result<()> {
        let db = seeded().await?;
        db.execute("CREATE TABLE empty_table (a TEXT)").await?;

        assert!(db.describe("SELECT * FROM empty_table LIMIT 1").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_table_exists() -> Result<()> {
        let db = seeded().await?;
        assert!(db.table_exists("test").await?);
        assert!(!db.table_exists("missing").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_cursor_fetches_in_chunks() -> Result<()> {
        let db = seeded().await?;
        db.execute("INSERT INTO test (name) VALUES ('Carol')").await?;

        let mut cursor = db.open_cursor("SELECT id, name FROM test ORDER BY id").await?;
        assert_eq!(cursor.columns(), ["id".to_string(), "name".to_string()]);

        let first = cursor.fetch(2).await?;
        assert_eq!(first.len(), 2);
        assert_eq!(first[0][1], DatabaseValue::String("Alice".to_string()));

        let second = cursor.fetch(2).await?;
        assert_eq!(second.len(), 1);
        assert!(cursor.fetch(2).await?.is_empty());

        cursor.close().await?;
        cursor.close().await?;

        // Connection is usable again once the cursor is closed
        assert!(db.table_exists("test").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_cursor_reports_bad_sql() -> Result<()> {
        let db = seeded().await?;
        let result = db.open_cursor("SELECT nope FROM test").await;
        assert!(result.is_err());
        Ok(())
    }
}
