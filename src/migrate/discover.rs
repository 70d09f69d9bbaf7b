//! Column discovery
//!
//! Database sources are probed with a one-row query; the reported columns are
//! sorted by name and reused verbatim to build the main scan, so probe and
//! scan agree on column order.

use super::descriptor::Selection;
use crate::core::query_builder::{limit_raw_query, SUBQUERY_ALIAS};
use crate::core::{ColumnDescriptor, Database, MigrateError, Result, SelectBuilder};
use tracing::{debug, info};

/// Columns of a database source and the query that scans it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    /// Column names and source types, sorted by name
    pub columns: Vec<ColumnDescriptor>,
    /// SELECT projecting exactly `columns`, in order
    pub scan_query: String,
}

impl Discovered {
    /// Column names in order
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// One-row probe for `selection`
pub fn probe_query(selection: &Selection) -> String {
    match selection {
        Selection::Table(table) => SelectBuilder::new(table.as_str())
            .all_columns()
            .limit(1)
            .build(),
        Selection::Query(query) => limit_raw_query(query, 1),
    }
}

/// Main scan for `selection` projecting `columns` in the given order
pub fn scan_query<S: AsRef<str>>(selection: &Selection, columns: &[S]) -> String {
    match selection {
        Selection::Table(table) => SelectBuilder::new(table.as_str()).columns(columns).build(),
        Selection::Query(query) => SelectBuilder::from_subquery(query, SUBQUERY_ALIAS)
            .columns(columns)
            .build(),
    }
}

/// Discover the columns of a database source.
///
/// Fails when the probe returns no rows or reports no columns.
pub async fn discover(db: &dyn Database, selection: &Selection) -> Result<Discovered> {
    let probe = probe_query(selection);
    debug!(sql = %probe, "Probing source columns");

    let mut columns = db.describe(&probe).await?.ok_or_else(|| {
        MigrateError::discovery(format!(
            "probe query returned no rows, cannot infer columns: {}",
            probe
        ))
    })?;

    if columns.is_empty() {
        return Err(MigrateError::discovery(format!(
            "probe query reported no columns: {}",
            probe
        )));
    }

    columns.sort_by(|a, b| a.name.cmp(&b.name));
    if let Some(pair) = columns.windows(2).find(|pair| pair[0].name == pair[1].name) {
        return Err(MigrateError::discovery(format!(
            "source reports column '{}' more than once",
            pair[0].name
        )));
    }

    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let scan_query = scan_query(selection, &names);
    info!(columns = ?names, "Discovered source columns");

    Ok(Discovered {
        columns,
        scan_query,
    })
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::backends::SqliteDatabase;

    async fn seeded() -> SqliteDatabase {
        let db = SqliteDatabase::new();
        db.connect(":memory:").await.unwrap();
        db.execute("CREATE TABLE people (name TEXT, id INTEGER, age REAL)")
            .await
            .unwrap();
        db.execute("INSERT INTO people VALUES ('a', 1, 3.5)")
            .await
            .unwrap();
        db
    }

    #[test]
    fn test_probe_queries() {
        assert_eq!(
            probe_query(&Selection::Table("people".into())),
            "SELECT * FROM people LIMIT 1"
        );
        assert_eq!(
            probe_query(&Selection::Query("SELECT * FROM people;  ".into())),
            r#"SELECT * FROM (SELECT * FROM people) AS "src" LIMIT 1"#
        );
    }

    #[tokio::test]
    async fn test_discover_table_sorts_columns() {
        let db = seeded().await;
        let discovered = discover(&db, &Selection::Table("people".into()))
            .await
            .unwrap();

        assert_eq!(discovered.names(), ["age", "id", "name"]);
        assert_eq!(discovered.columns[1].type_name, "INTEGER");
        assert_eq!(
            discovered.scan_query,
            r#"SELECT "age", "id", "name" FROM people"#
        );
    }

    #[tokio::test]
    async fn test_discover_raw_query_wraps_scan() {
        let db = seeded().await;
        let selection = Selection::Query("SELECT name, id FROM people WHERE id > 0;".into());
        let discovered = discover(&db, &selection).await.unwrap();

        assert_eq!(discovered.names(), ["id", "name"]);
        assert_eq!(
            discovered.scan_query,
            r#"SELECT "id", "name" FROM (SELECT name, id FROM people WHERE id > 0) AS "src""#
        );
        let mut cursor = db.open_cursor(&discovered.scan_query).await.unwrap();
        assert_eq!(cursor.fetch(10).await.unwrap().len(), 1);
        cursor.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_discover_raw_query_with_own_limit() {
        let db = seeded().await;
        db.execute("INSERT INTO people VALUES ('b', 2, 1.0), ('c', 3, 2.0)")
            .await
            .unwrap();
        let selection = Selection::Query("SELECT id, name FROM people ORDER BY id LIMIT 2".into());

        let discovered = discover(&db, &selection).await.unwrap();
        assert_eq!(discovered.names(), ["id", "name"]);
        assert_eq!(discovered.columns[0].type_name, "INTEGER");

        let mut cursor = db.open_cursor(&discovered.scan_query).await.unwrap();
        assert_eq!(cursor.fetch(10).await.unwrap().len(), 2);
        cursor.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_probe_is_discovery_error() {
        let db = seeded().await;
        db.execute("DELETE FROM people").await.unwrap();

        let err = discover(&db, &Selection::Table("people".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Discovery(_)));
    }
}
