//! Per-call deadlines for store operations.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{SqlDialect, StoreConnection};
use crate::error::{EtlError, Result};
use crate::types::{Row, Value};

/// Decorator that bounds every store call by a deadline.
///
/// The contracts themselves have no cancellation; wrapping the connection
/// turns a hung query into an [`EtlError::Timeout`] that propagates like any
/// other store failure. Drivers that block the executor thread cannot be
/// interrupted mid-call, so the deadline is only as precise as the inner
/// connection's await points.
pub struct DeadlineStore {
    inner: Arc<dyn StoreConnection>,
    deadline: Duration,
}

impl DeadlineStore {
    /// Wraps a connection with a per-call deadline.
    pub fn new(inner: Arc<dyn StoreConnection>, deadline: Duration) -> Self {
        Self { inner, deadline }
    }

    /// The configured deadline.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    async fn bounded<T>(&self, operation: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.deadline, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, deadline = ?self.deadline, "store call exceeded its deadline");
                Err(EtlError::Timeout {
                    operation: operation.to_string(),
                    elapsed: self.deadline,
                })
            }
        }
    }
}

#[async_trait]
impl StoreConnection for DeadlineStore {
    fn dialect(&self) -> &dyn SqlDialect {
        self.inner.dialect()
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.bounded("query", self.inner.query(sql, params)).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.bounded("execute", self.inner.execute(sql, params)).await
    }

    async fn execute_many(&self, sql: &str, param_sets: &[Vec<Value>]) -> Result<u64> {
        self.bounded("execute_many", self.inner.execute_many(sql, param_sets))
            .await
    }

    async fn begin(&self) -> Result<()> {
        self.bounded("begin", self.inner.begin()).await
    }

    async fn commit(&self) -> Result<()> {
        self.bounded("commit", self.inner.commit()).await
    }

    async fn rollback(&self) -> Result<()> {
        self.bounded("rollback", self.inner.rollback()).await
    }

    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        self.bounded("table_exists", self.inner.table_exists(schema, table))
            .await
    }

    async fn row_count(&self, schema: &str, table: &str) -> Result<u64> {
        self.bounded("row_count", self.inner.row_count(schema, table))
            .await
    }

    async fn truncate_table(&self, schema: &str, table: &str) -> Result<()> {
        self.bounded("truncate_table", self.inner.truncate_table(schema, table))
            .await
    }

    async fn ping(&self) -> Result<()> {
        self.bounded("ping", self.inner.ping()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PostgresDialect;

    struct SlowStore {
        delay: Duration,
    }

    #[async_trait]
    impl StoreConnection for SlowStore {
        fn dialect(&self) -> &dyn SqlDialect {
            &PostgresDialect
        }

        async fn query(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
            tokio::time::sleep(self.delay).await;
            Ok(vec![Row::new().with("one", 1)])
        }

        async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<u64> {
            tokio::time::sleep(self.delay).await;
            Ok(1)
        }

        async fn begin(&self) -> Result<()> {
            Ok(())
        }

        async fn commit(&self) -> Result<()> {
            Ok(())
        }

        async fn rollback(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let store = DeadlineStore::new(
            Arc::new(SlowStore {
                delay: Duration::from_millis(200),
            }),
            Duration::from_millis(10),
        );
        let err = store.query("SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, EtlError::Timeout { ref operation, .. } if operation == "query"));
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_fast_call_passes_through() {
        let store = DeadlineStore::new(
            Arc::new(SlowStore {
                delay: Duration::from_millis(1),
            }),
            Duration::from_secs(5),
        );
        assert_eq!(store.query("SELECT 1", &[]).await.unwrap().len(), 1);
        assert_eq!(store.execute("UPDATE t SET x = 1", &[]).await.unwrap(), 1);
        assert_eq!(store.dialect().name(), "postgresql");
    }
}
