//! PostgreSQL database backend implementation
//!
//! This module provides a PostgreSQL implementation of the Database trait using tokio-postgres.
//! The row cursor is a server-side `DECLARE ... NO SCROLL CURSOR` read with
//! `FETCH FORWARD`, so each fetch is one round trip of at most one batch.
//! Columns whose type has no native decoding here (`numeric`, `uuid`, `json`,
//! intervals, arrays, ...) are read in their text form through a `::text` cast.

use crate::core::{
    database::{ColumnDescriptor, Database, RowCursor},
    database_types::DatabaseType,
    error::{MigrateError, Result},
    query_builder::{SelectBuilder, SUBQUERY_ALIAS},
    value::DatabaseValue,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error};

/// Default timeout for database operations (30 seconds)
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Types [`PostgresDatabase::column_value`] decodes from the binary protocol
const DECODED_TYPES: &[&str] = &[
    "bool",
    "int2",
    "int4",
    "int8",
    "oid",
    "float4",
    "float8",
    "bytea",
    "timestamp",
    "timestamptz",
    "date",
    "text",
    "varchar",
    "bpchar",
    "name",
];

static CURSOR_SEQ: AtomicU64 = AtomicU64::new(0);

/// Render a driver error. Server errors display as a bare "db error", so the
/// severity, SQLSTATE, message and detail are pulled out of the `DbError`.
fn error_message(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => {
            let mut message = format!("{} {}: {}", db.severity(), db.code().code(), db.message());
            if let Some(detail) = db.detail() {
                message.push_str(&format!(" ({})", detail));
            }
            message
        }
        None => e.to_string(),
    }
}

/// PostgreSQL database implementation
pub struct PostgresDatabase {
    client: Arc<Mutex<Option<Client>>>,
}

impl PostgresDatabase {
    /// Create a new PostgreSQL database instance
    pub fn new() -> Self {
        Self {
            client: Arc::new(Mutex::new(None)),
        }
    }

    /// Convert one column of a tokio_postgres Row to a DatabaseValue
    fn column_value(row: &Row, idx: usize) -> Result<DatabaseValue> {
        let column = &row.columns()[idx];
        let type_name = column.type_().name();

        let value = match type_name {
            "bool" => row.try_get::<_, Option<bool>>(idx)?.map(DatabaseValue::Bool),
            "int2" => row
                .try_get::<_, Option<i16>>(idx)?
                .map(|v| DatabaseValue::Int(v as i32)),
            "int4" => row.try_get::<_, Option<i32>>(idx)?.map(DatabaseValue::Int),
            "int8" => row.try_get::<_, Option<i64>>(idx)?.map(DatabaseValue::Long),
            "oid" => row
                .try_get::<_, Option<u32>>(idx)?
                .map(|v| DatabaseValue::Long(v as i64)),
            "float4" => row.try_get::<_, Option<f32>>(idx)?.map(DatabaseValue::Float),
            "float8" => row.try_get::<_, Option<f64>>(idx)?.map(DatabaseValue::Double),
            "bytea" => row
                .try_get::<_, Option<Vec<u8>>>(idx)?
                .map(DatabaseValue::Bytes),
            "timestamp" => row
                .try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
                .map(|v| DatabaseValue::Timestamp(v.and_utc().timestamp_micros())),
            "timestamptz" => row
                .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
                .map(|v| DatabaseValue::Timestamp(v.timestamp_micros())),
            "date" => row
                .try_get::<_, Option<chrono::NaiveDate>>(idx)?
                .map(|v| DatabaseValue::String(v.to_string())),
            _ => match row.try_get::<_, Option<String>>(idx) {
                Ok(v) => v.map(DatabaseValue::String),
                Err(_) => return Err(MigrateError::unsupported_value(column.name(), type_name)),
            },
        };

        Ok(value.unwrap_or(DatabaseValue::Null))
    }

    fn row_to_values(row: &Row) -> Result<Vec<DatabaseValue>> {
        (0..row.len()).map(|idx| Self::column_value(row, idx)).collect()
    }

    async fn timed<T, F>(future: F) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<T, tokio_postgres::Error>>,
    {
        tokio::time::timeout(DEFAULT_OPERATION_TIMEOUT, future)
            .await
            .map_err(|_| MigrateError::query_timeout(DEFAULT_OPERATION_TIMEOUT.as_millis() as u64))?
            .map_err(|e| MigrateError::query(error_message(&e)))
    }
}

/// Wrap `query` so every column without native decoding is cast to text.
///
/// Returns `None` when all of `columns` (name, type name) decode natively.
fn text_cast_query(query: &str, columns: &[(String, String)]) -> Option<String> {
    if columns
        .iter()
        .all(|(_, type_name)| DECODED_TYPES.contains(&type_name.as_str()))
    {
        return None;
    }

    let projection: Vec<(&str, Option<&str>)> = columns
        .iter()
        .map(|(name, type_name)| {
            let cast = (!DECODED_TYPES.contains(&type_name.as_str())).then_some("text");
            (name.as_str(), cast)
        })
        .collect();

    Some(
        SelectBuilder::from_subquery(query, SUBQUERY_ALIAS)
            .columns_with_casts(&projection)
            .build(),
    )
}

impl Default for PostgresDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    async fn connect(&self, connection_string: &str) -> Result<()> {
        // Clean up any existing connection first
        {
            let mut client = self.client.lock().await;
            *client = None;
        }

        let connection_string = connection_string.to_string();
        let client_arc = Arc::clone(&self.client);

        let connect_future = async move {
            let (client, connection) = tokio_postgres::connect(&connection_string, NoTls)
                .await
                .map_err(|e| MigrateError::connection(error_message(&e)))?;

            // Spawn the connection handler in the background
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!(error = %error_message(&e), "PostgreSQL connection error");
                }
            });

            let mut client_guard = client_arc.lock().await;
            *client_guard = Some(client);

            Ok::<(), MigrateError>(())
        };

        tokio::time::timeout(DEFAULT_OPERATION_TIMEOUT, connect_future)
            .await
            .map_err(|_| {
                MigrateError::connection_timeout(DEFAULT_OPERATION_TIMEOUT.as_millis() as u64)
            })??;

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client
            .try_lock()
            .map(|client| client.as_ref().is_some_and(|c| !c.is_closed()))
            .unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<()> {
        let mut client = self.client.lock().await;
        *client = None;
        Ok(())
    }

    async fn execute(&self, query: &str) -> Result<u64> {
        let client = self.client.lock().await;
        let client = client
            .as_ref()
            .ok_or_else(|| MigrateError::connection("Not connected to database"))?;

        Self::timed(client.execute(query, &[])).await
    }

    async fn describe(&self, query: &str) -> Result<Option<Vec<ColumnDescriptor>>> {
        let client = self.client.lock().await;
        let client = client
            .as_ref()
            .ok_or_else(|| MigrateError::connection("Not connected to database"))?;

        let rows = Self::timed(client.query(query, &[])).await?;
        Ok(rows.first().map(|row| {
            row.columns()
                .iter()
                .map(|c| ColumnDescriptor::new(c.name(), c.type_().name()))
                .collect()
        }))
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let client = self.client.lock().await;
        let client = client
            .as_ref()
            .ok_or_else(|| MigrateError::connection("Not connected to database"))?;

        let row = Self::timed(client.query_one("SELECT to_regclass($1)::text", &[&table])).await?;
        let regclass: Option<String> = row.try_get(0)?;
        Ok(regclass.is_some())
    }

    async fn open_cursor(&self, query: &str) -> Result<Box<dyn RowCursor>> {
        let name = format!(
            "batch_migrate_cursor_{}",
            CURSOR_SEQ.fetch_add(1, Ordering::Relaxed)
        );

        let columns = {
            let client = self.client.lock().await;
            let client = client
                .as_ref()
                .ok_or_else(|| MigrateError::connection("Not connected to database"))?;

            let statement = Self::timed(client.prepare(query)).await?;
            let described: Vec<(String, String)> = statement
                .columns()
                .iter()
                .map(|c| (c.name().to_string(), c.type_().name().to_string()))
                .collect();
            let scan = text_cast_query(query, &described).unwrap_or_else(|| query.to_string());

            debug!(cursor = %name, sql = %scan, "declaring postgres cursor");
            Self::timed(client.batch_execute(&format!(
                "BEGIN; DECLARE {} NO SCROLL CURSOR FOR {}",
                name, scan
            )))
            .await?;
            described.into_iter().map(|(name, _)| name).collect()
        };

        Ok(Box::new(PostgresCursor {
            client: Arc::clone(&self.client),
            name,
            columns,
            open: true,
        }))
    }
}

/// Server-side cursor inside its own transaction
pub struct PostgresCursor {
    client: Arc<Mutex<Option<Client>>>,
    name: String,
    columns: Vec<String>,
    open: bool,
}

#[async_trait]
impl RowCursor for PostgresCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn fetch(&mut self, max_rows: usize) -> Result<Vec<Vec<DatabaseValue>>> {
        if !self.open {
            return Ok(Vec::new());
        }

        let client = self.client.lock().await;
        let client = client
            .as_ref()
            .ok_or_else(|| MigrateError::connection("Not connected to database"))?;

        let sql = format!("FETCH FORWARD {} FROM {}", max_rows, self.name);
        let rows = PostgresDatabase::timed(client.query(&sql, &[])).await?;
        rows.iter().map(PostgresDatabase::row_to_values).collect()
    }

    async fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        let client = self.client.lock().await;
        if let Some(client) = client.as_ref() {
            PostgresDatabase::timed(
                client.batch_execute(&format!("CLOSE {}; COMMIT", self.name)),
            )
            .await?;
        }
        Ok(())
    }
}
