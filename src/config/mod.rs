//! Migration configuration
//!
//! A YAML document with a `source`, a `target` and optional `migration`
//! settings:
//!
//! ```yaml
//! source:
//!   database:
//!     type: postgres
//!     host: localhost
//!     user: app
//!     password: ${APP_DB_PASSWORD}
//!     database: app
//!     sql: SELECT id, name FROM users WHERE active
//! target:
//!   file:
//!     path: users.csv
//!     format: csv
//!     delimiter: ","
//! migration:
//!   batch_size: 500
//!   on_batch_error: continue
//! ```
//!
//! `${VAR}` references are replaced from the environment before parsing.

mod validation;

use validation::present;

use crate::core::{ConnectionBuilder, DatabaseType, MigrateError, Result};
use crate::migrate::{
    BatchErrorPolicy, DatabaseLocator, FileFormat, FileLocator, MigrationDescriptor, Selection,
    SourceEndpoint, TargetEndpoint, DEFAULT_BATCH_SIZE,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Replace `${VAR}` with the value of environment variable `VAR`.
///
/// Every missing variable is reported in one error.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = Vec::new();
    let substituted = ENV_VAR_RE.replace_all(input, |caps: &regex::Captures<'_>| {
        match std::env::var(&caps[1]) {
            Ok(value) => value,
            Err(_) => {
                missing.push(caps[1].to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(MigrateError::config(format!(
            "missing environment variable(s): {}",
            missing.join(", ")
        )));
    }
    Ok(substituted.into_owned())
}

/// Top-level configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub source: EndpointConfig,
    pub target: EndpointConfig,
    #[serde(default)]
    pub migration: MigrationSettings,
}

/// One endpoint: exactly one of `file` or `database`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub file: Option<FileConfig>,
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub path: PathBuf,
    /// Inferred from the extension when absent
    pub format: Option<FileFormat>,
    /// Single character field separator, required for csv
    pub delimiter: Option<String>,
    /// Column projection
    pub columns: Option<Vec<String>>,
}

impl FileConfig {
    /// Declared format, or the one implied by the path extension
    pub fn resolved_format(&self) -> Option<FileFormat> {
        self.format.or_else(|| {
            match self
                .path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_ascii_lowercase)
                .as_deref()
            {
                Some("csv") => Some(FileFormat::Csv),
                Some("xml") => Some(FileFormat::Xml),
                _ => None,
            }
        })
    }
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(rename = "type")]
    pub db_type: Option<DatabaseType>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Database name, or the file path for SQLite
    pub database: Option<String>,
    pub table: Option<String>,
    /// Source query, instead of `table`
    pub sql: Option<String>,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("table", &self.table)
            .field("sql", &self.sql)
            .finish()
    }
}

impl DatabaseConfig {
    fn locator(&self) -> Result<DatabaseLocator> {
        let db_type = self
            .db_type
            .ok_or_else(|| MigrateError::config("database type is required"))?;
        let name = self.database.clone().unwrap_or_default();

        let mut builder = ConnectionBuilder::new(db_type).database(name.clone());
        if db_type.is_server() {
            if let Some(port) = self.port.or_else(|| db_type.default_port()) {
                builder = builder.port(port);
            }
            builder = builder
                .host(self.host.clone().unwrap_or_default())
                .username(self.user.clone().unwrap_or_default())
                .password(self.password.clone().unwrap_or_default())
                .option("sslmode", "disable");
        }

        Ok(DatabaseLocator {
            db_type,
            connection_string: builder.build_connection_string(),
            name,
        })
    }
}

/// Knobs of the migration itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub on_batch_error: BatchErrorPolicy,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            on_batch_error: BatchErrorPolicy::default(),
        }
    }
}

impl Config {
    /// Read and parse a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::config(format!(
                "failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a configuration document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let substituted = substitute_env_vars(yaml)?;
        Ok(serde_yaml::from_str(&substituted)?)
    }

    /// Validate and resolve into the descriptor of one migration
    pub fn into_descriptor(self) -> Result<MigrationDescriptor> {
        self.validate()?;

        let source = match (&self.source.file, &self.source.database) {
            (Some(file), None) => SourceEndpoint::File(file_locator(file)?),
            (None, Some(db)) => {
                let selection = match (present(&db.table), present(&db.sql)) {
                    (Some(table), None) => Selection::Table(table.to_string()),
                    (None, Some(sql)) => Selection::Query(sql.to_string()),
                    _ => return Err(MigrateError::config("source.database needs table or sql")),
                };
                SourceEndpoint::Database {
                    database: db.locator()?,
                    selection,
                }
            }
            _ => return Err(MigrateError::config("source needs file or database")),
        };

        let target = match (&self.target.file, &self.target.database) {
            (Some(file), None) => TargetEndpoint::File(file_locator(file)?),
            (None, Some(db)) => TargetEndpoint::Database {
                database: db.locator()?,
                table: present(&db.table).unwrap_or_default().to_string(),
            },
            _ => return Err(MigrateError::config("target needs file or database")),
        };

        Ok(MigrationDescriptor::new(source, target)
            .with_batch_size(self.migration.batch_size)
            .with_batch_error_policy(self.migration.on_batch_error))
    }
}

fn file_locator(file: &FileConfig) -> Result<FileLocator> {
    let format = file
        .resolved_format()
        .ok_or_else(|| MigrateError::config("file format is required"))?;
    let delimiter = match file.delimiter.as_deref() {
        Some(d) => validation::delimiter_byte(d)
            .ok_or_else(|| MigrateError::config("delimiter must be a single ASCII character"))?,
        None => b',',
    };

    Ok(FileLocator {
        path: file.path.clone(),
        format,
        delimiter,
        columns: file.columns.clone(),
    })
}
