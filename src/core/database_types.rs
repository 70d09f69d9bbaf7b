//! Database type definitions
//!
//! This module defines the relational databases a migration endpoint can use.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported database types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DatabaseType {
    /// PostgreSQL database
    Postgres,
    /// SQLite database
    Sqlite,
}

impl DatabaseType {
    /// Convert database type to string representation
    pub fn to_str(&self) -> &'static str {
        match self {
            DatabaseType::Postgres => "postgres",
            DatabaseType::Sqlite => "sqlite",
        }
    }

    /// Whether connecting requires host, port and credentials.
    ///
    /// SQLite only needs a database path.
    pub fn is_server(&self) -> bool {
        matches!(self, DatabaseType::Postgres)
    }

    /// Default port for server databases
    pub fn default_port(&self) -> Option<u16> {
        match self {
            DatabaseType::Postgres => Some(5432),
            DatabaseType::Sqlite => None,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pgsql" => Ok(DatabaseType::Postgres),
            "sqlite" | "sqlite3" => Ok(DatabaseType::Sqlite),
            _ => Err(format!("Invalid database type: '{}'", s)),
        }
    }
}

impl TryFrom<String> for DatabaseType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DatabaseType> for String {
    fn from(value: DatabaseType) -> Self {
        value.to_str().to_string()
    }
}
