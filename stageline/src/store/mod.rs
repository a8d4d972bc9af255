//! Store connection collaborator.
//!
//! The pipeline contracts never open sockets themselves. They talk to a
//! [`StoreConnection`], which executes parameterized SQL text assembled by
//! the contracts through the connection's [`SqlDialect`]. A connection is
//! held exclusively by one run; it is not meant to be driven by two
//! contracts concurrently.

use crate::error::Result;
use crate::types::{Row, Value};
use async_trait::async_trait;
use std::sync::Arc;

mod deadline;
mod dialect;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use deadline::DeadlineStore;
pub use dialect::{MySqlDialect, PostgresDialect, SqlDialect, SqliteDialect};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Shared handle to a store connection.
pub type SharedStore = Arc<dyn StoreConnection>;

/// A connection to a source or target store.
///
/// Implementations provide raw statement execution and explicit
/// transaction control. The lookup methods have default implementations
/// built from the dialect.
#[async_trait]
pub trait StoreConnection: Send + Sync {
    /// The SQL dialect spoken by this store.
    fn dialect(&self) -> &dyn SqlDialect;

    /// Executes a query and returns its rows.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Executes a statement and returns the number of affected rows.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Executes one statement for many parameter tuples.
    ///
    /// The default runs the tuples one by one and stops at the first error.
    async fn execute_many(&self, sql: &str, param_sets: &[Vec<Value>]) -> Result<u64> {
        let mut affected = 0;
        for params in param_sets {
            affected += self.execute(sql, params).await?;
        }
        Ok(affected)
    }

    /// Opens a transaction.
    async fn begin(&self) -> Result<()>;

    /// Commits the open transaction.
    async fn commit(&self) -> Result<()>;

    /// Rolls back the open transaction.
    async fn rollback(&self) -> Result<()>;

    /// Returns true if the table exists in the schema.
    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        let (sql, params) = self.dialect().table_exists_sql(schema, table)?;
        Ok(!self.query(&sql, &params).await?.is_empty())
    }

    /// Counts the rows of a table.
    async fn row_count(&self, schema: &str, table: &str) -> Result<u64> {
        let qualified = self.dialect().qualified_table(Some(schema), table)?;
        let rows = self
            .query(&format!("SELECT COUNT(*) AS row_count FROM {qualified}"), &[])
            .await?;
        Ok(first_count(&rows))
    }

    /// Removes every row of a table.
    async fn truncate_table(&self, schema: &str, table: &str) -> Result<()> {
        let qualified = self.dialect().qualified_table(Some(schema), table)?;
        self.execute(&self.dialect().truncate_table_sql(&qualified), &[])
            .await?;
        Ok(())
    }

    /// Runs a trivial liveness query.
    async fn ping(&self) -> Result<()> {
        self.query(self.dialect().ping_sql(), &[]).await?;
        Ok(())
    }
}

/// Reads a COUNT(*) style result: the first column of the first row.
pub(crate) fn first_count(rows: &[Row]) -> u64 {
    rows.first()
        .and_then(|row| row.values().next())
        .and_then(Value::as_f64)
        .map(|n| n.max(0.0) as u64)
        .unwrap_or(0)
}
