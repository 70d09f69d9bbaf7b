//! Semantic validation of a parsed configuration.
//!
//! All violations are collected and reported in one error, each naming the
//! offending key.

use super::{Config, DatabaseConfig, EndpointConfig, FileConfig};
use crate::core::{MigrateError, Result};
use crate::migrate::FileFormat;
use std::fs::File;
use std::path::Path;
use tracing::info;

/// Trimmed value of an optional string, `None` when absent or blank
pub(super) fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// The byte of a one-character ASCII delimiter
pub(super) fn delimiter_byte(delimiter: &str) -> Option<u8> {
    match delimiter.as_bytes() {
        [byte] if byte.is_ascii() => Some(*byte),
        _ => None,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Source,
    Target,
}

impl Side {
    fn key(self) -> &'static str {
        match self {
            Side::Source => "source",
            Side::Target => "target",
        }
    }
}

impl Config {
    /// Validate the configuration.
    ///
    /// A target file that does not exist yet is created empty once
    /// everything else is valid.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        validate_endpoint(&self.source, Side::Source, &mut errors);
        validate_endpoint(&self.target, Side::Target, &mut errors);

        if self.migration.batch_size == 0 {
            errors.push("migration.batch_size must be at least 1".to_string());
        }

        if !errors.is_empty() {
            return Err(MigrateError::config(errors.join("; ")));
        }

        if let Some(file) = &self.target.file {
            create_missing_target(&file.path)?;
        }
        Ok(())
    }
}

fn validate_endpoint(endpoint: &EndpointConfig, side: Side, errors: &mut Vec<String>) {
    let key = side.key();
    match (&endpoint.file, &endpoint.database) {
        (Some(file), None) => validate_file(file, side, errors),
        (None, Some(db)) => validate_database(db, side, errors),
        _ => errors.push(format!("use either {key}.file or {key}.database")),
    }
}

fn validate_file(file: &FileConfig, side: Side, errors: &mut Vec<String>) {
    let key = side.key();

    match file.resolved_format() {
        Some(FileFormat::Csv) => match file.delimiter.as_deref() {
            None | Some("") => errors.push(format!(
                "{key}.file.delimiter is required for csv files (',' or ';')"
            )),
            Some(d) if delimiter_byte(d).is_none() => errors.push(format!(
                "{key}.file.delimiter must be a single ASCII character, got '{d}'"
            )),
            Some(_) => {}
        },
        Some(FileFormat::Xml) => {}
        None => errors.push(format!(
            "{key}.file.format is required (csv or xml) when the path has no such extension"
        )),
    }

    if let Some(columns) = &file.columns {
        if columns.is_empty() {
            errors.push(format!("{key}.file.columns must not be empty when given"));
        }
    }

    if file.path.as_os_str().is_empty() {
        errors.push(format!("{key}.file.path is required"));
        return;
    }

    match (side, std::fs::metadata(&file.path)) {
        (_, Ok(meta)) if meta.is_dir() => errors.push(format!(
            "{key}.file.path {} is a directory",
            file.path.display()
        )),
        (_, Ok(_)) => {}
        (Side::Source, Err(e)) => errors.push(format!(
            "{key}.file.path {} is not readable: {}",
            file.path.display(),
            e
        )),
        (Side::Target, Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
        (Side::Target, Err(e)) => errors.push(format!(
            "{key}.file.path {} is not usable: {}",
            file.path.display(),
            e
        )),
    }
}

fn validate_database(db: &DatabaseConfig, side: Side, errors: &mut Vec<String>) {
    let key = side.key();

    match db.db_type {
        None => errors.push(format!(
            "{key}.database.type is required (sqlite or postgres)"
        )),
        Some(db_type) if db_type.is_server() => {
            for (field, value) in [
                ("host", &db.host),
                ("user", &db.user),
                ("password", &db.password),
                ("database", &db.database),
            ] {
                if present(value).is_none() {
                    errors.push(format!("{key}.database.{field} is required for {db_type}"));
                }
            }
            if db.port == Some(0) {
                errors.push(format!("{key}.database.port must not be 0"));
            }
        }
        Some(_) => {
            if present(&db.database).is_none() {
                errors.push(format!(
                    "{key}.database.database (the database file path) is required"
                ));
            }
        }
    }

    match side {
        Side::Source => match (present(&db.table), present(&db.sql)) {
            (Some(_), None) | (None, Some(_)) => {}
            _ => errors.push(
                "source.database needs exactly one of table or sql".to_string(),
            ),
        },
        Side::Target => {
            if present(&db.table).is_none() {
                errors.push("target.database.table is required".to_string());
            }
            if db.sql.is_some() {
                errors.push("target.database.sql is only valid for a source".to_string());
            }
        }
    }
}

fn create_missing_target(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    File::create(path).map_err(|e| {
        MigrateError::config(format!(
            "target.file.path {} cannot be created: {}",
            path.display(),
            e
        ))
    })?;
    info!(path = %path.display(), "Created target file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MigrationSettings;
    use crate::core::DatabaseType;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn csv_file(path: PathBuf) -> FileConfig {
        FileConfig {
            path,
            format: Some(FileFormat::Csv),
            delimiter: Some(",".to_string()),
            columns: None,
        }
    }

    fn sqlite(table: Option<&str>, sql: Option<&str>) -> DatabaseConfig {
        DatabaseConfig {
            db_type: Some(DatabaseType::Sqlite),
            database: Some("app.db".to_string()),
            table: table.map(String::from),
            sql: sql.map(String::from),
            ..Default::default()
        }
    }

    fn message(config: &Config) -> String {
        config.validate().unwrap_err().to_string()
    }

    #[test]
    fn test_delimiter_byte() {
        assert_eq!(delimiter_byte(";"), Some(b';'));
        assert_eq!(delimiter_byte("\t"), Some(b'\t'));
        assert_eq!(delimiter_byte(",,"), None);
        assert_eq!(delimiter_byte("é"), None);
    }

    #[test]
    fn test_endpoint_needs_exactly_one_kind() {
        let dir = tempdir().unwrap();
        let config = Config {
            source: EndpointConfig {
                file: Some(csv_file(dir.path().join("in.csv"))),
                database: Some(sqlite(Some("t"), None)),
            },
            target: EndpointConfig::default(),
            migration: MigrationSettings::default(),
        };
        let msg = message(&config);
        assert!(msg.contains("use either source.file or source.database"));
        assert!(msg.contains("use either target.file or target.database"));
    }

    #[test]
    fn test_csv_requires_delimiter_and_existing_source() {
        let dir = tempdir().unwrap();
        let mut file = csv_file(dir.path().join("missing.csv"));
        file.delimiter = None;
        let config = Config {
            source: EndpointConfig {
                file: Some(file),
                database: None,
            },
            target: EndpointConfig {
                file: None,
                database: Some(sqlite(Some("t"), None)),
            },
            migration: MigrationSettings::default(),
        };
        let msg = message(&config);
        assert!(msg.contains("source.file.delimiter is required for csv files"));
        assert!(msg.contains("source.file.path"));
    }

    #[test]
    fn test_source_needs_table_or_sql() {
        let dir = tempdir().unwrap();
        let config = Config {
            source: EndpointConfig {
                file: None,
                database: Some(sqlite(Some("t"), Some("SELECT 1"))),
            },
            target: EndpointConfig {
                file: Some(csv_file(dir.path().join("out.csv"))),
                database: None,
            },
            migration: MigrationSettings::default(),
        };
        assert!(message(&config).contains("exactly one of table or sql"));
        assert!(!dir.path().join("out.csv").exists());
    }

    #[test]
    fn test_server_database_fields() {
        let dir = tempdir().unwrap();
        let config = Config {
            source: EndpointConfig {
                file: None,
                database: Some(DatabaseConfig {
                    db_type: Some(DatabaseType::Postgres),
                    host: Some("db".to_string()),
                    table: Some("t".to_string()),
                    ..Default::default()
                }),
            },
            target: EndpointConfig {
                file: Some(csv_file(dir.path().join("out.csv"))),
                database: None,
            },
            migration: MigrationSettings {
                batch_size: 0,
                ..Default::default()
            },
        };
        let msg = message(&config);
        assert!(msg.contains("source.database.user is required"));
        assert!(msg.contains("source.database.password is required"));
        assert!(msg.contains("source.database.database is required"));
        assert!(!msg.contains("source.database.host"));
        assert!(msg.contains("migration.batch_size"));
    }

    #[test]
    fn test_target_directory_and_table() {
        let dir = tempdir().unwrap();
        let config = Config {
            source: EndpointConfig {
                file: None,
                database: Some(sqlite(Some("t"), None)),
            },
            target: EndpointConfig {
                file: None,
                database: Some(sqlite(None, Some("SELECT 1"))),
            },
            migration: MigrationSettings::default(),
        };
        let msg = message(&config);
        assert!(msg.contains("target.database.table is required"));
        assert!(msg.contains("target.database.sql is only valid for a source"));

        let config = Config {
            source: EndpointConfig {
                file: None,
                database: Some(sqlite(Some("t"), None)),
            },
            target: EndpointConfig {
                file: Some(csv_file(dir.path().to_path_buf())),
                database: None,
            },
            migration: MigrationSettings::default(),
        };
        assert!(message(&config).contains("is a directory"));
    }

    #[test]
    fn test_valid_config_creates_target_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("out.csv");
        let config = Config {
            source: EndpointConfig {
                file: None,
                database: Some(sqlite(None, Some("SELECT * FROM t"))),
            },
            target: EndpointConfig {
                file: Some(csv_file(target.clone())),
                database: None,
            },
            migration: MigrationSettings::default(),
        };
        config.validate().unwrap();
        assert!(target.exists());
    }
}
