//! # Rust Batch Migrator
//!
//! Copies tabular data between delimited text files, XML files and relational
//! tables, writing to the destination in bounded batches.
//!
//! ## Features
//!
//! - **Four topologies**: file to file, file to database, database to file and
//!   database to database
//! - **Column discovery**: one-row probe for tables and raw queries, header
//!   line for delimited files
//! - **Schema inference**: a missing destination table is created from the
//!   source's column types when copying between databases
//! - **Bounded memory**: records flow through a forward-only cursor and a
//!   fixed-size batch buffer
//! - **Async Support**: Async/await support with Tokio
//!
//! ## Supported Databases
//!
//! | Database | Feature | Notes |
//! |----------|---------|-------|
//! | SQLite | `sqlite` (default) | Bundled, blocking driver on the blocking pool |
//! | PostgreSQL | `postgres` | Server-side cursor via `DECLARE` / `FETCH` |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rust_batch_migrator::prelude::*;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<()> {
//!     let descriptor = MigrationDescriptor::new(
//!         SourceEndpoint::Database {
//!             database: DatabaseLocator::sqlite("app.db"),
//!             selection: Selection::Table("users".to_string()),
//!         },
//!         TargetEndpoint::File(FileLocator::csv("users.csv", b',')),
//!     )
//!     .with_batch_size(500);
//!
//!     let report = migrate(descriptor).await?;
//!     println!("migrated {} records", report.records_migrated);
//!     Ok(())
//! }
//! ```
//!
//! ### From a configuration file
//!
//! ```rust,no_run
//! use rust_batch_migrator::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let descriptor = Config::load("migration.yaml")?.into_descriptor()?;
//! migrate(descriptor).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Project Structure
//!
//! ```text
//! rust_batch_migrator/
//! ├── src/
//! │   ├── core/              # Driver-level types and traits
//! │   │   ├── database.rs    # Database and cursor traits
//! │   │   ├── error.rs       # Error types
//! │   │   ├── query_builder.rs  # SELECT / INSERT / CREATE TABLE text
//! │   │   └── value.rs       # Driver values
//! │   ├── backends/          # SQLite and PostgreSQL
//! │   ├── migrate/           # Records, batching, readers, writers, engine
//! │   ├── config/            # YAML configuration and validation
//! │   ├── lib.rs
//! │   └── main.rs            # batch-migrate binary
//! ├── tests/                 # Integration and property tests
//! └── benches/
//! ```

/// Core database system types and traits
pub mod core;

/// Database backend implementations
pub mod backends;

/// Migration pipeline
pub mod migrate;

/// Configuration loading and validation
pub mod config;

/// Prelude for convenient imports
///
/// ```rust
/// use rust_batch_migrator::prelude::*;
///
/// let descriptor = MigrationDescriptor::new(
///     SourceEndpoint::File(FileLocator::xml("in.xml")),
///     TargetEndpoint::File(FileLocator::csv("out.csv", b';')),
/// );
/// assert_eq!(descriptor.batch_size, 1000);
/// ```
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::core::{
        ColumnDescriptor, ConnectionBuilder, Database, DatabaseType, DatabaseValue, MigrateError,
        Result, RowCursor,
    };
    pub use crate::migrate::{
        run as migrate, BatchErrorPolicy, DatabaseLocator, FileFormat, FileLocator,
        MigrationDescriptor, MigrationReport, Record, RecordValue, Selection, SourceEndpoint,
        TargetEndpoint,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::backends::SqliteDatabase;
}

// Re-export at root level for convenience
pub use config::Config;
pub use core::{DatabaseType, MigrateError, Result};
pub use migrate::{run, MigrationDescriptor, MigrationReport};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        use prelude::*;

        let db_type: DatabaseType = "pgsql".parse().unwrap();
        assert_eq!(db_type.to_str(), "postgres");

        let value: RecordValue = 42i64.into();
        assert_eq!(DatabaseValue::from(value), DatabaseValue::Long(42));
    }
}
