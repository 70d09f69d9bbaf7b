//! Database backend implementations
//!
//! This module contains concrete implementations of the Database trait
//! for the supported database systems, and the factory that picks one for a
//! migration endpoint.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

#[cfg(feature = "postgres")]
pub use postgres::PostgresDatabase;

use crate::core::{Database, DatabaseType, MigrateError, Result};

/// Create an unconnected backend for `db_type`.
///
/// Fails when the crate was built without the backend's feature.
pub fn create(db_type: DatabaseType) -> Result<Box<dyn Database>> {
    match db_type {
        #[cfg(feature = "sqlite")]
        DatabaseType::Sqlite => Ok(Box::new(SqliteDatabase::new())),
        #[cfg(feature = "postgres")]
        DatabaseType::Postgres => Ok(Box::new(PostgresDatabase::new())),
        #[allow(unreachable_patterns)]
        other => Err(MigrateError::unsupported(format!(
            "{} support is not compiled in (enable the '{}' feature)",
            other,
            other.to_str()
        ))),
    }
}
