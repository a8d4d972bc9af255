//! Load contract: writing batches of rows into a target relation.
//!
//! [`Loader::load`] is the staging reload primitive. It opens one
//! transaction, optionally truncates the target, writes the rows in
//! sub-batches and commits once. The first failing sub-batch rolls the
//! whole transaction back; nothing is retried.
//!
//! [`Loader::load_batch`] is the building block for callers that manage a
//! larger transaction themselves (see [`crate::pipeline`]): one write, no
//! truncate, no transaction boundary.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::stats::{RunStats, Stage, StatsSnapshot};
use crate::store::SharedStore;
use crate::types::{Row, Value};

/// Progress of the most recent [`Loader::load`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum LoadState {
    /// No load attempted yet
    #[default]
    Idle,
    /// Transaction open, target being truncated
    Truncating,
    /// Writing the given 1-based sub-batch
    Writing(usize),
    /// All sub-batches written and committed
    Committed,
    /// A failure was hit and the transaction rolled back
    RolledBack,
    /// The load ended in failure
    Failed,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadState::Idle => write!(f, "idle"),
            LoadState::Truncating => write!(f, "truncating"),
            LoadState::Writing(n) => write!(f, "writing sub-batch {n}"),
            LoadState::Committed => write!(f, "committed"),
            LoadState::RolledBack => write!(f, "rolled back"),
            LoadState::Failed => write!(f, "failed"),
        }
    }
}

/// Contract for writing rows into a target store.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Transactionally writes `rows`, returning the number of rows written.
    async fn load(&mut self, rows: &[Row], table: &str, schema: Option<&str>) -> Result<u64>;

    /// Writes `rows` in one statement call inside whatever transaction the
    /// caller holds.
    async fn load_batch(&mut self, rows: &[Row], table: &str, schema: Option<&str>)
        -> Result<u64>;

    /// Removes every row of the target.
    async fn truncate_table(&self, table: &str, schema: Option<&str>) -> Result<()>;

    /// Returns true if the target exists.
    async fn table_exists(&self, table: &str, schema: Option<&str>) -> Result<bool>;

    /// Counts the rows of the target.
    async fn table_row_count(&self, table: &str, schema: Option<&str>) -> Result<u64>;

    /// Opens a caller-managed transaction.
    async fn begin(&self) -> Result<()>;

    /// Commits the caller-managed transaction.
    async fn commit(&self) -> Result<()>;

    /// Rolls back the caller-managed transaction.
    async fn rollback(&self) -> Result<()>;

    /// Read access to the load statistics.
    fn stats(&self) -> &RunStats;

    /// Write access to the load statistics.
    fn stats_mut(&mut self) -> &mut RunStats;

    /// Marks the start of a load run.
    fn start_load(&mut self) {
        self.stats_mut().start();
    }

    /// Ends the load run and returns its statistics.
    fn end_load(&mut self) -> StatsSnapshot {
        let snapshot = self.stats_mut().finalize();
        info!(
            rows = snapshot.rows_processed,
            batches = snapshot.batches_processed,
            errors = snapshot.error_count(),
            duration_secs = snapshot.duration.as_secs_f64(),
            "load finished"
        );
        snapshot
    }
}

/// SQL-backed loader for staging tables.
pub struct StagingLoader {
    conn: SharedStore,
    batch_size: usize,
    truncate_before_load: bool,
    default_schema: Option<String>,
    state: LoadState,
    stats: RunStats,
}

impl StagingLoader {
    /// Creates a loader writing sub-batches of `batch_size` rows (clamped
    /// to at least one). Truncate-before-load is on.
    pub fn new(conn: SharedStore, batch_size: usize) -> Self {
        Self {
            conn,
            batch_size: batch_size.max(1),
            truncate_before_load: true,
            default_schema: None,
            state: LoadState::Idle,
            stats: RunStats::new(Stage::Load),
        }
    }

    /// Creates a loader from the runtime configuration: batch size,
    /// truncate-before-load and default schema.
    pub fn from_config(conn: SharedStore, config: &EtlConfig) -> Self {
        let loader = Self::new(conn, config.batch_size)
            .with_truncate_before_load(config.truncate_before_load);
        match &config.default_schema {
            Some(schema) => loader.with_default_schema(schema.clone()),
            None => loader,
        }
    }

    /// Sets whether [`Loader::load`] truncates the target first.
    pub fn with_truncate_before_load(mut self, enabled: bool) -> Self {
        self.truncate_before_load = enabled;
        self
    }

    /// Overrides the dialect's default schema.
    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    /// State of the most recent [`Loader::load`] call.
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Configured sub-batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Creates `target` with the structure of `source`, both in `schema`.
    #[instrument(skip(self))]
    pub async fn create_table_like(
        &self,
        target: &str,
        source: &str,
        schema: Option<&str>,
    ) -> Result<()> {
        let schema = self.resolve_schema(schema);
        let dialect = self.conn.dialect();
        let sql = dialect.create_table_like_sql(
            &dialect.qualified_table(Some(&schema), target)?,
            &dialect.qualified_table(Some(&schema), source)?,
        );
        self.conn.execute(&sql, &[]).await?;
        info!(target, source, schema = %schema, "table created");
        Ok(())
    }

    fn resolve_schema(&self, schema: Option<&str>) -> String {
        schema
            .or(self.default_schema.as_deref())
            .unwrap_or_else(|| self.conn.dialect().default_schema())
            .to_string()
    }

    fn insert_statement(&self, columns: &[String], table: &str, schema: &str) -> Result<(String, String)> {
        let dialect = self.conn.dialect();
        let qualified = dialect.qualified_table(Some(schema), table)?;
        let sql = dialect.insert_sql(&qualified, columns)?;
        Ok((qualified, sql))
    }

    async fn abort(&mut self, table: &str, sub_batch: usize, cause: EtlError) -> EtlError {
        error!(table, sub_batch, error = %cause, "sub-batch failed, rolling back load");
        self.stats.log_error(
            format!("Sub-batch {sub_batch} failed: {cause}"),
            [("table", table.to_string()), ("sub_batch", sub_batch.to_string())],
        );
        self.state = LoadState::RolledBack;
        if let Err(e) = self.conn.rollback().await {
            error!(table, error = %e, "rollback failed");
        }
        self.state = LoadState::Failed;
        EtlError::LoadFailed {
            table: table.to_string(),
            sub_batch,
            source: Box::new(cause),
        }
    }
}

/// Column set of the first row; every other row must carry the same set.
fn batch_columns(rows: &[Row]) -> Result<Vec<String>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    for (row_index, row) in rows.iter().enumerate().skip(1) {
        if !row.same_columns(first) {
            return Err(EtlError::RowShapeMismatch {
                row_index,
                expected: first.columns().collect::<Vec<_>>().join(", "),
                found: row.columns().collect::<Vec<_>>().join(", "),
            });
        }
    }
    Ok(first.columns().map(str::to_string).collect())
}

fn parameter_sets(rows: &[Row], columns: &[String]) -> Vec<Vec<Value>> {
    rows.iter().map(|row| row.values_for(columns)).collect()
}

#[async_trait]
impl Loader for StagingLoader {
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn load(&mut self, rows: &[Row], table: &str, schema: Option<&str>) -> Result<u64> {
        if rows.is_empty() {
            warn!(table, "no rows to load");
            return Ok(0);
        }
        let columns = batch_columns(rows)?;
        let schema = self.resolve_schema(schema);
        let (qualified, sql) = self.insert_statement(&columns, table, &schema)?;

        self.state = LoadState::Idle;
        self.conn.begin().await?;

        if self.truncate_before_load {
            self.state = LoadState::Truncating;
            if let Err(e) = self.conn.truncate_table(&schema, table).await {
                return Err(self.abort(&qualified, 0, e).await);
            }
        }

        let mut written = 0u64;
        let mut sub_batches = Vec::new();
        for (index, chunk) in rows.chunks(self.batch_size).enumerate() {
            let sub_batch = index + 1;
            self.state = LoadState::Writing(sub_batch);
            let params = parameter_sets(chunk, &columns);
            if let Err(e) = self.conn.execute_many(&sql, &params).await {
                return Err(self.abort(&qualified, sub_batch, e).await);
            }
            written += chunk.len() as u64;
            sub_batches.push(chunk.len());
        }

        if let Err(e) = self.conn.commit().await {
            let sub_batch = sub_batches.len();
            return Err(self.abort(&qualified, sub_batch, e).await);
        }
        self.state = LoadState::Committed;
        for rows in sub_batches {
            self.stats.record_batch(rows);
        }
        info!(table = %qualified, rows = written, "load committed");
        Ok(written)
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn load_batch(
        &mut self,
        rows: &[Row],
        table: &str,
        schema: Option<&str>,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let columns = batch_columns(rows)?;
        let schema = self.resolve_schema(schema);
        let (qualified, sql) = self.insert_statement(&columns, table, &schema)?;

        match self
            .conn
            .execute_many(&sql, &parameter_sets(rows, &columns))
            .await
        {
            Ok(_) => {
                self.stats.record_batch(rows.len());
                Ok(rows.len() as u64)
            }
            Err(e) => {
                error!(table = %qualified, error = %e, "batch write failed");
                self.stats
                    .log_error(format!("Batch write failed: {e}"), [("table", qualified)]);
                Err(e)
            }
        }
    }

    async fn truncate_table(&self, table: &str, schema: Option<&str>) -> Result<()> {
        let schema = self.resolve_schema(schema);
        self.conn.truncate_table(&schema, table).await
    }

    async fn table_exists(&self, table: &str, schema: Option<&str>) -> Result<bool> {
        let schema = self.resolve_schema(schema);
        self.conn.table_exists(&schema, table).await
    }

    async fn table_row_count(&self, table: &str, schema: Option<&str>) -> Result<u64> {
        let schema = self.resolve_schema(schema);
        self.conn.row_count(&schema, table).await
    }

    async fn begin(&self) -> Result<()> {
        self.conn.begin().await
    }

    async fn commit(&self) -> Result<()> {
        self.conn.commit().await
    }

    async fn rollback(&self) -> Result<()> {
        self.conn.rollback().await
    }

    fn stats(&self) -> &RunStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut RunStats {
        &mut self.stats
    }
}
