//! Schema introspection.
//!
//! The schema is read with an ordinary query through the executor and folded
//! into one entry per table.

use super::{Driver, QueryExecutor, QueryResult, Row};
use crate::error::{Result, RunnerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Schema whose tables are listed without a prefix.
pub const DEFAULT_SCHEMA: &str = "public";

/// Lists every column of every table outside the system schemas.
pub const SCHEMA_QUERY: &str = r#"
        SELECT
            table_schema::text AS table_schema,
            table_name::text AS table_name,
            column_name::text AS column_name
        FROM information_schema.columns
        WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
        ORDER BY table_schema, table_name, ordinal_position;
        "#;

/// A table and its columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntry {
    /// Table identifier: `table` in the default schema, `schema.table` elsewhere.
    pub name: String,

    /// Column names, in the order the server listed them.
    pub columns: Vec<String>,
}

impl SchemaEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }
}

/// Tables keyed by identifier.
pub type Schema = BTreeMap<String, SchemaEntry>;

/// Folds `(table_schema, table_name, column_name)` rows into a [`Schema`].
///
/// Rows missing any of the three fields are skipped.
pub fn fold_schema_rows(rows: &[Row]) -> Schema {
    let mut schema = Schema::new();

    for row in rows {
        let (Some(table_schema), Some(table_name), Some(column_name)) = (
            str_field(row, "table_schema"),
            str_field(row, "table_name"),
            str_field(row, "column_name"),
        ) else {
            warn!(?row, "Skipping malformed schema row");
            continue;
        };

        let identifier = if table_schema == DEFAULT_SCHEMA {
            table_name.to_string()
        } else {
            format!("{table_schema}.{table_name}")
        };

        schema
            .entry(identifier.clone())
            .or_insert_with(|| SchemaEntry::new(identifier))
            .columns
            .push(column_name.to_string());
    }

    schema
}

fn str_field<'a>(row: &'a Row, key: &str) -> Option<&'a str> {
    row.get(key).and_then(|value| value.as_str())
}

impl<D: Driver> QueryExecutor<D> {
    /// Reads the database schema.
    ///
    /// Any failure of the schema query is reported as
    /// [`RunnerError::SchemaFetch`]; the underlying message is only logged.
    pub async fn fetch_schema(&self) -> Result<Schema> {
        let outcome = self.execute(SCHEMA_QUERY).await?;

        let payload = match outcome.payload() {
            Some(payload) => payload,
            None => {
                warn!(error = outcome.error().unwrap_or_default(), "Schema query failed");
                return Err(RunnerError::SchemaFetch);
            }
        };

        let result = QueryResult::from_json(payload)?;
        Ok(fold_schema_rows(&result.rows))
    }
}
