//! SQL statement builder
//!
//! Turns abstract SELECT / INSERT / CREATE TABLE descriptions into executable
//! SQL text. Column identifiers are always double-quoted; table names are
//! emitted as given so schema-qualified names keep working. INSERT values are
//! rendered as literals for the destination dialect so the destination can
//! coerce text (e.g. from delimited files) into its declared column types.

use super::database_types::DatabaseType;
use super::value::DatabaseValue;

/// Quote a column identifier, doubling any embedded double quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Alias of the derived table that wraps a caller-supplied query
pub const SUBQUERY_ALIAS: &str = "src";

/// Limit the rows of a caller-supplied query.
///
/// The query is wrapped as a derived table, so one that already carries its
/// own `LIMIT` or `FETCH FIRST` stays valid. Trailing whitespace and
/// semicolons are stripped first.
pub fn limit_raw_query(query: &str, limit: usize) -> String {
    SelectBuilder::from_subquery(query, SUBQUERY_ALIAS)
        .limit(limit)
        .build()
}

fn strip_terminator(query: &str) -> &str {
    query.trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

/// SELECT query builder
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    source: String,
    columns: Vec<String>,
    limit: Option<usize>,
}

impl SelectBuilder {
    /// Create a new SELECT query builder over a table
    ///
    /// # Example
    ///
    /// ```
    /// use rust_batch_migrator::core::query_builder::SelectBuilder;
    ///
    /// let query = SelectBuilder::new("users")
    ///     .columns(&["id", "name"])
    ///     .build();
    /// assert_eq!(query, r#"SELECT "id", "name" FROM users"#);
    /// ```
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            source: table.into(),
            columns: vec!["*".to_string()],
            limit: None,
        }
    }

    /// Select from a caller-supplied query wrapped as a derived table
    pub fn from_subquery(query: &str, alias: &str) -> Self {
        Self::new(format!(
            "({}) AS {}",
            strip_terminator(query),
            quote_identifier(alias)
        ))
    }

    /// Select specific columns, in the given order
    #[must_use]
    pub fn columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = columns
            .iter()
            .map(|c| quote_identifier(c.as_ref()))
            .collect();
        self
    }

    /// Select columns in order, casting those paired with a type name.
    ///
    /// Casts use PostgreSQL's `::` syntax and keep the column's name.
    #[must_use]
    pub fn columns_with_casts<S: AsRef<str>>(mut self, columns: &[(S, Option<&str>)]) -> Self {
        self.columns = columns
            .iter()
            .map(|(name, cast)| {
                let ident = quote_identifier(name.as_ref());
                match cast {
                    Some(ty) => format!("{}::{} AS {}", ident, ty, ident),
                    None => ident,
                }
            })
            .collect();
        self
    }

    /// Select all columns (*)
    #[must_use]
    pub fn all_columns(mut self) -> Self {
        self.columns = vec!["*".to_string()];
        self
    }

    /// Add LIMIT clause
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Build the SQL query string
    pub fn build(&self) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.columns.join(", "), self.source);

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        sql
    }
}

/// Multi-row INSERT query builder
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    table: String,
    dialect: DatabaseType,
    columns: Vec<String>,
    rows: Vec<Vec<DatabaseValue>>,
}

impl InsertBuilder {
    /// Create a new INSERT query builder
    pub fn new(table: impl Into<String>, dialect: DatabaseType) -> Self {
        Self {
            table: table.into(),
            dialect,
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Set the target columns
    #[must_use]
    pub fn columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    /// Append one row of values, in column order
    #[must_use]
    pub fn row(mut self, values: Vec<DatabaseValue>) -> Self {
        debug_assert_eq!(values.len(), self.columns.len());
        self.rows.push(values);
        self
    }

    /// Number of rows added so far
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Build the SQL statement
    pub fn build(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| quote_identifier(c)).collect();
        let rows: Vec<String> = self
            .rows
            .iter()
            .map(|row| {
                let literals: Vec<String> = row
                    .iter()
                    .map(|value| value.to_sql_literal(self.dialect))
                    .collect();
                format!("({})", literals.join(", "))
            })
            .collect();

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table,
            columns.join(", "),
            rows.join(", ")
        )
    }
}

/// CREATE TABLE query builder
#[derive(Debug, Clone)]
pub struct CreateTableBuilder {
    table: String,
    columns: Vec<(String, String)>,
}

impl CreateTableBuilder {
    /// Create a new CREATE TABLE builder
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    /// Add a column definition. An empty type name declares an untyped column.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.columns.push((name.into(), type_name.into()));
        self
    }

    /// Build the SQL statement
    pub fn build(&self) -> String {
        let definitions: Vec<String> = self
            .columns
            .iter()
            .map(|(name, type_name)| {
                if type_name.is_empty() {
                    quote_identifier(name)
                } else {
                    format!("{} {}", quote_identifier(name), type_name)
                }
            })
            .collect();

        format!("CREATE TABLE {} ({})", self.table, definitions.join(", "))
    }
}
