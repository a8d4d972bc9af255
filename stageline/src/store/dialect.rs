//! SQL dialects used when the runtime assembles statement text.
//!
//! The runtime only ever builds a handful of statement shapes: paged
//! SELECTs, COUNT/MAX lookups, a parameterized INSERT, TRUNCATE and
//! CREATE TABLE ... LIKE. Everything vendor specific about those shapes
//! lives behind [`SqlDialect`].

use crate::error::Result;
use crate::security::SqlSecurity;
use crate::types::Value;
use std::fmt::Debug;

/// Vendor-specific pieces of SQL generation.
pub trait SqlDialect: Debug + Send + Sync {
    /// Dialect name.
    fn name(&self) -> &'static str;

    /// Namespace used when a caller does not name a schema.
    fn default_schema(&self) -> &'static str;

    /// Character used to quote identifiers.
    fn quote_char(&self) -> char {
        '"'
    }

    /// Validates and quotes a single identifier.
    fn quote_identifier(&self, name: &str) -> Result<String> {
        SqlSecurity::quote_identifier(name, self.quote_char())
    }

    /// Quoted `schema.table`, falling back to the default schema.
    fn qualified_table(&self, schema: Option<&str>, table: &str) -> Result<String> {
        let schema = schema.unwrap_or(self.default_schema());
        Ok(format!(
            "{}.{}",
            self.quote_identifier(schema)?,
            self.quote_identifier(table)?
        ))
    }

    /// Positional parameter placeholder; `index` is 1-based.
    fn placeholder(&self, index: usize) -> String;

    /// Pagination suffix appended to a SELECT.
    fn limit_offset_sql(&self, limit: usize, offset: Option<usize>) -> String {
        match offset {
            Some(offset) => format!("LIMIT {limit} OFFSET {offset}"),
            None => format!("LIMIT {limit}"),
        }
    }

    /// Statement that removes every row of a table.
    fn truncate_table_sql(&self, qualified_table: &str) -> String {
        format!("TRUNCATE TABLE {qualified_table}")
    }

    /// Statement that creates `target` with the structure of `source`.
    fn create_table_like_sql(&self, target: &str, source: &str) -> String;

    /// Query returning at least one row when the table exists.
    fn table_exists_sql(&self, schema: &str, table: &str) -> Result<(String, Vec<Value>)>;

    /// Trivial query used to check that a connection is alive.
    fn ping_sql(&self) -> &'static str {
        "SELECT 1"
    }

    /// Builds `INSERT INTO table (cols) VALUES (placeholders)`.
    fn insert_sql(&self, qualified_table: &str, columns: &[String]) -> Result<String> {
        let quoted = columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Result<Vec<_>>>()?;
        let placeholders = (1..=columns.len())
            .map(|i| self.placeholder(i))
            .collect::<Vec<_>>();
        Ok(format!(
            "INSERT INTO {qualified_table} ({}) VALUES ({})",
            quoted.join(", "),
            placeholders.join(", ")
        ))
    }
}

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn default_schema(&self) -> &'static str {
        "public"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn create_table_like_sql(&self, target: &str, source: &str) -> String {
        format!("CREATE TABLE IF NOT EXISTS {target} (LIKE {source} INCLUDING ALL)")
    }

    fn table_exists_sql(&self, schema: &str, table: &str) -> Result<(String, Vec<Value>)> {
        Ok((
            "SELECT 1 FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2"
                .to_string(),
            vec![Value::from(schema), Value::from(table)],
        ))
    }
}

/// MySQL dialect. Schemas map onto MySQL databases.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn default_schema(&self) -> &'static str {
        "staging"
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn create_table_like_sql(&self, target: &str, source: &str) -> String {
        format!("CREATE TABLE IF NOT EXISTS {target} LIKE {source}")
    }

    fn table_exists_sql(&self, schema: &str, table: &str) -> Result<(String, Vec<Value>)> {
        Ok((
            "SELECT 1 FROM information_schema.tables WHERE table_schema = ? AND table_name = ?"
                .to_string(),
            vec![Value::from(schema), Value::from(table)],
        ))
    }
}

/// SQLite dialect. Schemas are attached database names.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn default_schema(&self) -> &'static str {
        "main"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?{index}")
    }

    fn truncate_table_sql(&self, qualified_table: &str) -> String {
        // SQLite has no TRUNCATE; an unqualified DELETE uses the truncate optimization
        format!("DELETE FROM {qualified_table}")
    }

    fn create_table_like_sql(&self, target: &str, source: &str) -> String {
        format!("CREATE TABLE IF NOT EXISTS {target} AS SELECT * FROM {source} WHERE 0")
    }

    fn table_exists_sql(&self, schema: &str, table: &str) -> Result<(String, Vec<Value>)> {
        Ok((
            format!(
                "SELECT 1 FROM {}.sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
                self.quote_identifier(schema)?
            ),
            vec![Value::from(table)],
        ))
    }
}
