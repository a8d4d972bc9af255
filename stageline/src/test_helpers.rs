//! Test helpers shared by the unit tests of this crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{EtlError, Result};
use crate::store::{SharedStore, SqlDialect, StoreConnection};
use crate::types::{Row, Value};

/// Store decorator that records every call and can fail `execute_many` on
/// a chosen (1-based) invocation.
pub(crate) struct RecordingStore {
    inner: SharedStore,
    calls: Mutex<Vec<String>>,
    execute_many_calls: AtomicUsize,
    fail_execute_many_at: Option<usize>,
}

impl RecordingStore {
    pub fn new(inner: SharedStore) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            execute_many_calls: AtomicUsize::new(0),
            fail_execute_many_at: None,
        }
    }

    pub fn failing_execute_many_at(mut self, invocation: usize) -> Self {
        self.fail_execute_many_at = Some(invocation);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|c| *c == operation).count()
    }

    fn record(&self, operation: &str) {
        self.calls.lock().unwrap().push(operation.to_string());
    }
}

#[async_trait]
impl StoreConnection for RecordingStore {
    fn dialect(&self) -> &dyn SqlDialect {
        self.inner.dialect()
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.record("query");
        self.inner.query(sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.record("execute");
        self.inner.execute(sql, params).await
    }

    async fn execute_many(&self, sql: &str, param_sets: &[Vec<Value>]) -> Result<u64> {
        self.record("execute_many");
        let invocation = self.execute_many_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_execute_many_at == Some(invocation) {
            return Err(EtlError::store("execute_many", "injected failure"));
        }
        self.inner.execute_many(sql, param_sets).await
    }

    async fn begin(&self) -> Result<()> {
        self.record("begin");
        self.inner.begin().await
    }

    async fn commit(&self) -> Result<()> {
        self.record("commit");
        self.inner.commit().await
    }

    async fn rollback(&self) -> Result<()> {
        self.record("rollback");
        self.inner.rollback().await
    }
}

/// In-memory SQLite store prepared with a DDL script.
#[cfg(feature = "sqlite")]
pub(crate) fn sqlite_with(script: &str) -> std::sync::Arc<crate::store::SqliteStore> {
    let store = crate::store::SqliteStore::in_memory().unwrap();
    store.execute_script(script).unwrap();
    std::sync::Arc::new(store)
}

/// DDL of the `customers` fixture table.
pub(crate) const CUSTOMERS_DDL: &str =
    "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL);";

/// `count` customer rows with ids starting at 1.
pub(crate) fn customer_rows(count: usize) -> Vec<Row> {
    (1..=count as i64)
        .map(|id| {
            Row::new()
                .with("id", id)
                .with("name", format!("customer-{id}"))
                .with("score", id as f64 / 2.0)
        })
        .collect()
}
