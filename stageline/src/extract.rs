//! Extraction contract: pulling batches of rows from a source relation.
//!
//! Extraction is lazy and fail-fast. [`Extractor::extract`] returns a
//! stream of batches; a query error ends the stream with that error and
//! nothing is retried.
//!
//! Requests that name a unique page key are read with keyset pagination:
//! each page resumes strictly after the key of the previous page's last
//! row, so ties in the incremental column never duplicate or drop rows.
//! Requests without a key are read with a single query and split into
//! batches.
//!
//! ```rust,no_run
//! use futures::TryStreamExt;
//! use stageline::extract::{ExtractRequest, Extractor, StoreExtractor};
//! use stageline::store::SqliteStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> stageline::error::Result<()> {
//! let store = Arc::new(SqliteStore::open("source.db")?);
//! let mut extractor = StoreExtractor::new(store, 5_000);
//!
//! let request = ExtractRequest::table("customers")
//!     .incremental("updated_at", "2024-01-01 00:00:00")
//!     .key(["customer_id"]);
//! let total = extractor.table_row_count("customers", None, None).await?;
//!
//! extractor.start_extraction();
//! let mut batches = extractor.extract(&request)?;
//! while let Some(batch) = batches.try_next().await? {
//!     extractor.log_batch_progress(batch.len(), Some(total));
//! }
//! let stats = extractor.end_extraction();
//! println!("extracted {} rows", stats.rows_processed);
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::{debug, info, instrument, warn};

use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::security::SqlSecurity;
use crate::stats::{RunStats, Stage, StatsSnapshot};
use crate::store::{first_count, SharedStore, SqlDialect};
use crate::types::{Batch, Row, Value};

/// Lazy, finite sequence of batches.
pub type BatchStream = BoxStream<'static, Result<Batch>>;

/// Watermark bound for delta pulls.
#[derive(Debug, Clone, PartialEq)]
pub struct IncrementalCursor {
    /// Column compared against the watermark
    pub column: String,
    /// Last seen value; a null watermark means "extract everything"
    pub value: Value,
}

/// Parameters of one extraction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractRequest {
    /// Source relation
    pub table: String,
    /// Source schema; the dialect default when absent
    pub schema: Option<String>,
    /// Projected columns; all columns when absent
    pub columns: Option<Vec<String>>,
    /// Opaque predicate passed through to the source query
    pub filter: Option<String>,
    /// Incremental watermark
    pub incremental: Option<IncrementalCursor>,
    /// Ordering of unpaged extraction; defaults to the incremental column
    pub order_by: Option<Vec<String>>,
    /// Unique, non-null key used for keyset pagination
    pub key: Option<Vec<String>>,
}

impl ExtractRequest {
    /// Starts a request for a table.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Sets the source schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Restricts the projected columns.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Adds an opaque filter condition.
    pub fn filter(mut self, condition: impl Into<String>) -> Self {
        self.filter = Some(condition.into());
        self
    }

    /// Restricts the extraction to rows whose `column` is strictly greater
    /// than `value`. A null value performs a full extract.
    pub fn incremental(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.incremental = Some(IncrementalCursor {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    /// Sets an explicit ordering.
    pub fn order_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Pages by a unique, non-null key (usually the primary key). Paged
    /// extraction is ordered by this key and ignores `order_by`.
    pub fn key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Key columns used for pagination; empty for unpaged extraction.
    pub fn page_key(&self) -> &[String] {
        self.key.as_deref().unwrap_or_default()
    }

    /// The active cursor: present and carrying a non-null watermark.
    pub fn active_cursor(&self) -> Option<&IncrementalCursor> {
        self.incremental.as_ref().filter(|c| !c.value.is_null())
    }

    /// Returns true when this request performs a delta pull.
    pub fn is_incremental(&self) -> bool {
        self.active_cursor().is_some()
    }
}

/// Contract for pulling batches of rows out of a source.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Produces a lazy sequence of batches, each no larger than the
    /// configured batch size.
    fn extract(&self, request: &ExtractRequest) -> Result<BatchStream>;

    /// Counts rows matching the same filter semantics as extraction.
    async fn table_row_count(
        &self,
        table: &str,
        schema: Option<&str>,
        filter: Option<&str>,
    ) -> Result<u64>;

    /// Maximum value of a column; None for an empty table.
    async fn max_value(&self, table: &str, column: &str, schema: Option<&str>)
        -> Result<Option<Value>>;

    /// Checks that the connection is alive; never errors.
    async fn validate_connection(&self) -> bool;

    /// Read access to the extraction statistics.
    fn stats(&self) -> &RunStats;

    /// Write access to the extraction statistics.
    fn stats_mut(&mut self) -> &mut RunStats;

    /// Marks the start of an extraction run.
    fn start_extraction(&mut self) {
        self.stats_mut().start();
    }

    /// Ends the extraction run and returns its statistics.
    fn end_extraction(&mut self) -> StatsSnapshot {
        let snapshot = self.stats_mut().finalize();
        info!(
            rows = snapshot.rows_processed,
            batches = snapshot.batches_processed,
            duration_secs = snapshot.duration.as_secs_f64(),
            "extraction finished"
        );
        snapshot
    }

    /// Credits a batch and logs progress: a percentage when the total is
    /// known, otherwise the running total.
    fn log_batch_progress(&mut self, batch_rows: usize, total: Option<u64>) {
        let stats = self.stats_mut();
        stats.record_batch(batch_rows);
        let done = stats.rows_processed();
        let batch = stats.batches_processed();
        match total {
            Some(total) if total > 0 => {
                let percent = (done as f64 / total as f64 * 100.0).min(100.0);
                info!(batch, rows = batch_rows, done, total, "extracted batch ({percent:.1}%)");
            }
            _ => info!(batch, rows = batch_rows, done, "extracted batch"),
        }
    }
}

/// SQL-backed extractor over a [`StoreConnection`](crate::store::StoreConnection).
pub struct StoreExtractor {
    conn: SharedStore,
    batch_size: usize,
    default_schema: Option<String>,
    stats: RunStats,
}

impl StoreExtractor {
    /// Creates an extractor; a zero batch size is clamped to one.
    pub fn new(conn: SharedStore, batch_size: usize) -> Self {
        Self {
            conn,
            batch_size: batch_size.max(1),
            default_schema: None,
            stats: RunStats::new(Stage::Extract),
        }
    }

    /// Creates an extractor from the runtime configuration: batch size and
    /// default schema.
    pub fn from_config(conn: SharedStore, config: &EtlConfig) -> Self {
        let extractor = Self::new(conn, config.batch_size);
        match &config.default_schema {
            Some(schema) => extractor.with_default_schema(schema.clone()),
            None => extractor,
        }
    }

    /// Schema used when a request names none, instead of the dialect's.
    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    /// Configured batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Builds the SELECT of one page and its parameters.
    ///
    /// With a page key the statement orders by the key, resumes after
    /// `after` (the key values of the previous page's last row) and is
    /// limited to the batch size. Without one it reads every matching row.
    pub fn build_select(
        &self,
        request: &ExtractRequest,
        after: Option<&[Value]>,
    ) -> Result<(String, Vec<Value>)> {
        select_sql(self.conn.dialect(), &self.scoped(request), after, self.batch_size)
    }

    fn scoped<'a>(&self, request: &'a ExtractRequest) -> Cow<'a, ExtractRequest> {
        match (&request.schema, &self.default_schema) {
            (None, Some(schema)) => Cow::Owned(request.clone().schema(schema.clone())),
            _ => Cow::Borrowed(request),
        }
    }

    fn resolve_schema<'a>(&'a self, schema: Option<&'a str>) -> Option<&'a str> {
        schema.or(self.default_schema.as_deref())
    }
}

fn select_sql(
    dialect: &dyn SqlDialect,
    request: &ExtractRequest,
    after: Option<&[Value]>,
    batch_size: usize,
) -> Result<(String, Vec<Value>)> {
    let source = dialect.qualified_table(request.schema.as_deref(), &request.table)?;
    let key = request.page_key();

    // the cursor and key columns always travel with the rows
    let projection = match &request.columns {
        Some(columns) if !columns.is_empty() => {
            let mut projected = columns.clone();
            let required = request
                .incremental
                .iter()
                .map(|cursor| &cursor.column)
                .chain(key);
            for column in required {
                if !projected.contains(column) {
                    projected.push(column.clone());
                }
            }
            projected
                .iter()
                .map(|c| dialect.quote_identifier(c))
                .collect::<Result<Vec<_>>>()?
                .join(", ")
        }
        _ => "*".to_string(),
    };

    let mut conditions = Vec::new();
    let mut params = Vec::new();
    if let Some(filter) = &request.filter {
        SqlSecurity::validate_filter_condition(filter)?;
        conditions.push(format!("({filter})"));
    }
    if let Some(cursor) = request.active_cursor() {
        params.push(cursor.value.clone());
        conditions.push(format!(
            "{} > {}",
            dialect.quote_identifier(&cursor.column)?,
            dialect.placeholder(params.len())
        ));
    }
    if let Some(after) = after.filter(|_| !key.is_empty()) {
        conditions.push(keyset_condition(dialect, key, after, &mut params)?);
    }

    let mut sql = format!("SELECT {projection} FROM {source}");
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    let ordering: &[String] = if !key.is_empty() {
        key
    } else {
        match (&request.order_by, &request.incremental) {
            (Some(columns), _) if !columns.is_empty() => columns.as_slice(),
            (_, Some(cursor)) => std::slice::from_ref(&cursor.column),
            _ => &[],
        }
    };
    if !ordering.is_empty() {
        let quoted = ordering
            .iter()
            .map(|c| dialect.quote_identifier(c))
            .collect::<Result<Vec<_>>>()?;
        sql.push_str(" ORDER BY ");
        sql.push_str(&quoted.join(", "));
    }
    if !key.is_empty() {
        sql.push(' ');
        sql.push_str(&dialect.limit_offset_sql(batch_size, None));
    }

    Ok((sql, params))
}

/// Lexicographic "key > after" spelled out as an OR chain, which every
/// dialect understands: `(k1 > ?) OR (k1 = ? AND k2 > ?) OR ...`.
fn keyset_condition(
    dialect: &dyn SqlDialect,
    key: &[String],
    after: &[Value],
    params: &mut Vec<Value>,
) -> Result<String> {
    if key.len() != after.len() {
        return Err(EtlError::Internal(format!(
            "page key has {} columns but {} resume values",
            key.len(),
            after.len()
        )));
    }
    let quoted = key
        .iter()
        .map(|c| dialect.quote_identifier(c))
        .collect::<Result<Vec<_>>>()?;
    let mut branches = Vec::with_capacity(key.len());
    for last in 0..key.len() {
        let mut terms = Vec::with_capacity(last + 1);
        for (i, column) in quoted.iter().enumerate().take(last + 1) {
            params.push(after[i].clone());
            let op = if i == last { ">" } else { "=" };
            terms.push(format!("{column} {op} {}", dialect.placeholder(params.len())));
        }
        branches.push(format!("({})", terms.join(" AND ")));
    }
    Ok(format!("({})", branches.join(" OR ")))
}

/// Key values of the last row of a page.
fn resume_key(table: &str, key: &[String], page: &[Row]) -> Result<Option<Vec<Value>>> {
    let Some(last) = page.last() else {
        return Ok(None);
    };
    key.iter()
        .map(|column| match last.get(column) {
            Some(value) if !value.is_null() => Ok(value.clone()),
            _ => Err(EtlError::Configuration(format!(
                "page key column '{column}' of '{table}' is null or missing"
            ))),
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn into_batches(rows: Vec<Row>, batch_size: usize) -> Vec<Batch> {
    let mut rows = rows.into_iter().peekable();
    let mut batches = Vec::new();
    while rows.peek().is_some() {
        batches.push(rows.by_ref().take(batch_size).collect());
    }
    batches
}

struct KeysetCursor {
    after: Option<Vec<Value>>,
    exhausted: bool,
}

#[async_trait]
impl Extractor for StoreExtractor {
    #[instrument(skip(self), fields(table = %request.table, incremental = request.is_incremental()))]
    fn extract(&self, request: &ExtractRequest) -> Result<BatchStream> {
        let conn = self.conn.clone();
        let batch_size = self.batch_size;

        if request.page_key().is_empty() {
            let (sql, params) = self.build_select(request, None)?;
            let table = request.table.clone();
            debug!(table = %table, "no page key, reading in a single query");
            let batches = stream::once(async move {
                conn.query(&sql, &params).await.map_err(|e| {
                    warn!(table = %table, error = %e, "extraction query failed");
                    e
                })
            })
            .map_ok(move |rows| stream::iter(into_batches(rows, batch_size).into_iter().map(Ok)))
            .try_flatten();
            return Ok(batches.boxed());
        }

        // surface a bad request before the first poll
        self.build_select(request, None)?;
        let request = self.scoped(request).into_owned();
        let pages = stream::try_unfold(
            KeysetCursor {
                after: None,
                exhausted: false,
            },
            move |mut cursor| {
                let conn = conn.clone();
                let request = request.clone();
                async move {
                    if cursor.exhausted {
                        return Ok(None);
                    }
                    let (sql, params) = select_sql(
                        conn.dialect(),
                        &request,
                        cursor.after.as_deref(),
                        batch_size,
                    )?;
                    let rows = conn.query(&sql, &params).await.map_err(|e| {
                        warn!(table = %request.table, error = %e, "extraction query failed");
                        e
                    })?;
                    if rows.is_empty() {
                        return Ok(None);
                    }
                    cursor.exhausted = rows.len() < batch_size;
                    cursor.after = resume_key(&request.table, request.page_key(), &rows)?;
                    Ok(Some((rows, cursor)))
                }
            },
        );
        Ok(pages.boxed())
    }

    #[instrument(skip(self))]
    async fn table_row_count(
        &self,
        table: &str,
        schema: Option<&str>,
        filter: Option<&str>,
    ) -> Result<u64> {
        let source = self
            .conn
            .dialect()
            .qualified_table(self.resolve_schema(schema), table)?;
        let mut sql = format!("SELECT COUNT(*) AS row_count FROM {source}");
        if let Some(filter) = filter {
            SqlSecurity::validate_filter_condition(filter)?;
            sql.push_str(&format!(" WHERE ({filter})"));
        }
        let rows = self.conn.query(&sql, &[]).await?;
        Ok(first_count(&rows))
    }

    #[instrument(skip(self))]
    async fn max_value(
        &self,
        table: &str,
        column: &str,
        schema: Option<&str>,
    ) -> Result<Option<Value>> {
        let dialect = self.conn.dialect();
        let source = dialect.qualified_table(self.resolve_schema(schema), table)?;
        let column = dialect.quote_identifier(column)?;
        let rows = self
            .conn
            .query(&format!("SELECT MAX({column}) AS max_value FROM {source}"), &[])
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .map(|(_, value)| value)
            .filter(|value| !value.is_null()))
    }

    async fn validate_connection(&self) -> bool {
        match self.conn.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "source connection check failed");
                false
            }
        }
    }

    fn stats(&self) -> &RunStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut RunStats {
        &mut self.stats
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use futures::TryStreamExt;
    use std::sync::Arc;

    fn seeded_store(rows: usize) -> Arc<SqliteStore> {
        let store = SqliteStore::in_memory().unwrap();
        store
            .execute_script(
                "CREATE TABLE events (id INTEGER PRIMARY KEY, kind TEXT, updated_at TEXT);",
            )
            .unwrap();
        let mut script = String::new();
        for i in 1..=rows {
            let kind = if i % 2 == 0 { "even" } else { "odd" };
            script.push_str(&format!(
                "INSERT INTO events VALUES ({i}, '{kind}', '2024-01-{:02} 00:00:00');",
                i
            ));
        }
        store.execute_script(&script).unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_build_select_full() {
        let extractor = StoreExtractor::new(seeded_store(0), 10);
        let (sql, params) = extractor
            .build_select(&ExtractRequest::table("events"), None)
            .unwrap();
        assert_eq!(sql, "SELECT * FROM \"main\".\"events\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_build_select_incremental_with_filter() {
        let extractor = StoreExtractor::new(seeded_store(0), 10);
        let request = ExtractRequest::table("events")
            .columns(["id", "updated_at"])
            .filter("kind = 'odd'")
            .incremental("updated_at", "2024-01-03 00:00:00");
        let (sql, params) = extractor.build_select(&request, None).unwrap();
        assert_eq!(
            sql,
            "SELECT \"id\", \"updated_at\" FROM \"main\".\"events\" WHERE (kind = 'odd') AND \"updated_at\" > ?1 ORDER BY \"updated_at\""
        );
        assert_eq!(params, vec![Value::from("2024-01-03 00:00:00")]);
    }

    #[test]
    fn test_projection_keeps_cursor_and_key_columns() {
        let extractor = StoreExtractor::new(seeded_store(0), 10);
        let request = ExtractRequest::table("events")
            .columns(["kind"])
            .incremental("updated_at", Value::Null)
            .key(["id"]);
        let (sql, _) = extractor.build_select(&request, None).unwrap();
        assert!(sql.starts_with("SELECT \"kind\", \"updated_at\", \"id\" FROM"));
    }

    #[test]
    fn test_build_select_keyset_page() {
        let extractor = StoreExtractor::new(seeded_store(0), 10);
        let request = ExtractRequest::table("events")
            .incremental("updated_at", "2024-01-03 00:00:00")
            .key(["kind", "id"]);

        let (first, params) = extractor.build_select(&request, None).unwrap();
        assert_eq!(
            first,
            "SELECT * FROM \"main\".\"events\" WHERE \"updated_at\" > ?1 ORDER BY \"kind\", \"id\" LIMIT 10"
        );
        assert_eq!(params.len(), 1);

        let after = [Value::from("odd"), Value::Int(7)];
        let (next, params) = extractor.build_select(&request, Some(&after)).unwrap();
        assert_eq!(
            next,
            "SELECT * FROM \"main\".\"events\" WHERE \"updated_at\" > ?1 AND ((\"kind\" > ?2) OR (\"kind\" = ?3 AND \"id\" > ?4)) ORDER BY \"kind\", \"id\" LIMIT 10"
        );
        assert!(!next.contains("OFFSET"));
        assert_eq!(
            params,
            vec![
                Value::from("2024-01-03 00:00:00"),
                Value::from("odd"),
                Value::from("odd"),
                Value::Int(7),
            ]
        );
    }

    #[test]
    fn test_default_schema_from_config() {
        let config = EtlConfig::default().with_default_schema("staging");
        let extractor = StoreExtractor::from_config(seeded_store(0), &config);
        let (sql, _) = extractor
            .build_select(&ExtractRequest::table("events"), None)
            .unwrap();
        assert_eq!(sql, "SELECT * FROM \"staging\".\"events\"");
        let (sql, _) = extractor
            .build_select(&ExtractRequest::table("events").schema("main"), None)
            .unwrap();
        assert_eq!(sql, "SELECT * FROM \"main\".\"events\"");
    }

    #[test]
    fn test_null_watermark_is_full_extract() {
        let extractor = StoreExtractor::new(seeded_store(0), 10);
        let request = ExtractRequest::table("events").incremental("updated_at", Value::Null);
        assert!(!request.is_incremental());
        let (sql, params) = extractor.build_select(&request, None).unwrap();
        assert!(!sql.contains("WHERE"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_build_select_rejects_injection() {
        let extractor = StoreExtractor::new(seeded_store(0), 10);
        assert!(extractor
            .build_select(&ExtractRequest::table("events; DROP TABLE events"), None)
            .is_err());
        assert!(extractor
            .build_select(
                &ExtractRequest::table("events").filter("1=1; DELETE FROM events"),
                None
            )
            .is_err());
        assert!(extractor
            .build_select(&ExtractRequest::table("events").key(["id; --"]), None)
            .is_err());
    }

    #[tokio::test]
    async fn test_extract_pages_respect_batch_size() {
        let extractor = StoreExtractor::new(seeded_store(7), 3);
        let batches: Vec<Batch> = extractor
            .extract(&ExtractRequest::table("events").key(["id"]))
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(batches[2][0].get("id"), Some(&Value::Int(7)));
    }

    #[tokio::test]
    async fn test_unpaged_extract_splits_single_query() {
        let extractor = StoreExtractor::new(seeded_store(7), 3);
        let batches: Vec<Batch> = extractor
            .extract(&ExtractRequest::table("events").order_by(["id"]))
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(batches[0][0].get("id"), Some(&Value::Int(1)));
    }

    #[tokio::test]
    async fn test_keyset_paging_with_cursor_ties_across_pages() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .execute_script(
                "CREATE TABLE events (id INTEGER PRIMARY KEY, kind TEXT, updated_at TEXT);
                 INSERT INTO events VALUES (1, 'a', '2024-01-01 00:00:00');
                 INSERT INTO events VALUES (2, 'a', '2024-01-02 00:00:00');
                 INSERT INTO events VALUES (3, 'a', '2024-01-02 00:00:00');
                 INSERT INTO events VALUES (4, 'a', '2024-01-02 00:00:00');
                 INSERT INTO events VALUES (5, 'a', '2024-01-02 00:00:00');
                 INSERT INTO events VALUES (6, 'a', '2024-01-03 00:00:00');",
            )
            .unwrap();
        let extractor = StoreExtractor::new(Arc::new(store), 2);
        // ids 2..=5 share one timestamp and straddle the page boundaries
        let request = ExtractRequest::table("events")
            .incremental("updated_at", "2024-01-01 00:00:00")
            .key(["id"]);
        let batches: Vec<Batch> = extractor
            .extract(&request)
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        let ids: Vec<Value> = batches
            .iter()
            .flatten()
            .filter_map(|row| row.get("id").cloned())
            .collect();
        assert_eq!(ids, (2..=6).map(Value::Int).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_exact_multiple_terminates() {
        let extractor = StoreExtractor::new(seeded_store(6), 3);
        let batches: Vec<Batch> = extractor
            .extract(&ExtractRequest::table("events").key(["id"]))
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(batches.len(), 2);
    }

    #[tokio::test]
    async fn test_null_page_key_is_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .execute_script(
                "CREATE TABLE events (id INTEGER, kind TEXT);
                 INSERT INTO events VALUES (NULL, 'a');",
            )
            .unwrap();
        let extractor = StoreExtractor::new(Arc::new(store), 1);
        let mut batches = extractor
            .extract(&ExtractRequest::table("events").key(["id"]))
            .unwrap();
        let err = batches.try_next().await.unwrap_err();
        assert!(matches!(err, EtlError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_extract_empty_table_yields_nothing() {
        let extractor = StoreExtractor::new(seeded_store(0), 3);
        let batches: Vec<Batch> = extractor
            .extract(&ExtractRequest::table("events"))
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(batches.is_empty());
    }

    #[tokio::test]
    async fn test_extract_missing_table_fails_fast() {
        let extractor = StoreExtractor::new(seeded_store(0), 3);
        let mut batches = extractor
            .extract(&ExtractRequest::table("missing"))
            .unwrap();
        assert!(batches.try_next().await.is_err());
        assert!(batches.next().await.is_none());
    }

    #[tokio::test]
    async fn test_row_count_and_max_value() {
        let extractor = StoreExtractor::new(seeded_store(5), 3);
        assert_eq!(
            extractor.table_row_count("events", None, None).await.unwrap(),
            5
        );
        assert_eq!(
            extractor
                .table_row_count("events", None, Some("kind = 'even'"))
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            extractor.max_value("events", "id", None).await.unwrap(),
            Some(Value::Int(5))
        );

        let empty = StoreExtractor::new(seeded_store(0), 3);
        assert_eq!(empty.max_value("events", "id", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_validate_connection() {
        let extractor = StoreExtractor::new(seeded_store(0), 3);
        assert!(extractor.validate_connection().await);
    }

    #[tokio::test]
    async fn test_progress_updates_stats() {
        let mut extractor = StoreExtractor::new(seeded_store(0), 3);
        extractor.start_extraction();
        extractor.log_batch_progress(3, Some(5));
        extractor.log_batch_progress(2, None);
        let snapshot = extractor.end_extraction();
        assert_eq!(snapshot.rows_processed, 5);
        assert_eq!(snapshot.batches_processed, 2);
    }
}
