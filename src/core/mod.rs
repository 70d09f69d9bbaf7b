//! Core database system types and traits
//!
//! This module provides the driver-level building blocks of the migrator:
//! error types, the database trait and cursor, driver values, and the SQL
//! statement builder.

pub mod database;
pub mod database_types;
pub mod error;
pub mod query_builder;
pub mod value;

// Re-export commonly used types
pub use database::{ColumnDescriptor, ConnectionBuilder, Database, RowCursor};
pub use database_types::DatabaseType;
pub use error::{MigrateError, Result};
pub use query_builder::{CreateTableBuilder, InsertBuilder, SelectBuilder};
pub use value::DatabaseValue;
