//! Embedded SQLite store connection.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use tracing::{debug, instrument};

use super::{SqlDialect, SqliteDialect, StoreConnection};
use crate::error::{EtlError, Result};
use crate::types::{Row, Value, DATETIME_FORMAT, DATE_FORMAT};

/// SQLite-backed [`StoreConnection`].
///
/// Statements run synchronously on the calling task while the connection
/// lock is held; the lock is never held across an await point.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    dialect: SqliteDialect,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (or creates) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            EtlError::store_with_source(
                "open",
                format!("Failed to open {}", path.as_ref().display()),
                Box::new(e),
            )
        })?;
        Ok(Self::from_connection(conn))
    }

    /// Opens a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            EtlError::store_with_source("open", "Failed to create in-memory database", Box::new(e))
        })?;
        Ok(Self::from_connection(conn))
    }

    /// Wraps an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            dialect: SqliteDialect,
        }
    }

    /// Runs a script of semicolon-separated statements (DDL, fixtures).
    pub fn execute_script(&self, sql: &str) -> Result<()> {
        self.with_conn("execute_script", |conn| Ok(conn.execute_batch(sql)?))
    }

    fn with_conn<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let conn = self.conn.lock().map_err(|e| {
            EtlError::store(operation, format!("Failed to acquire connection lock: {e}"))
        })?;
        f(&conn)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Int(n) => ToSqlOutput::from(*n),
            Value::Float(x) => ToSqlOutput::from(*x),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Bool(b) => ToSqlOutput::from(i64::from(*b)),
            Value::Date(d) => ToSqlOutput::from(d.format(DATE_FORMAT).to_string()),
            Value::DateTime(dt) => ToSqlOutput::from(dt.format(DATETIME_FORMAT).to_string()),
        })
    }
}

fn read_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int(n),
        ValueRef::Real(x) => Value::Float(x),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn query_rows(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(record) = rows.next()? {
        let mut row = Row::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            row.insert(column.clone(), read_value(record.get_ref(index)?));
        }
        out.push(row);
    }
    Ok(out)
}

#[async_trait]
impl StoreConnection for SqliteStore {
    fn dialect(&self) -> &dyn SqlDialect {
        &self.dialect
    }

    #[instrument(skip(self, params), fields(params = params.len()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.with_conn("query", |conn| query_rows(conn, sql, params))
    }

    #[instrument(skip(self, params), fields(params = params.len()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.with_conn("execute", |conn| {
            Ok(conn.execute(sql, params_from_iter(params.iter()))? as u64)
        })
    }

    #[instrument(skip(self, param_sets), fields(tuples = param_sets.len()))]
    async fn execute_many(&self, sql: &str, param_sets: &[Vec<Value>]) -> Result<u64> {
        self.with_conn("execute_many", |conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let mut affected = 0u64;
            for params in param_sets {
                affected += stmt.execute(params_from_iter(params.iter()))? as u64;
            }
            Ok(affected)
        })
    }

    async fn begin(&self) -> Result<()> {
        debug!("BEGIN");
        self.with_conn("begin", |conn| Ok(conn.execute_batch("BEGIN")?))
    }

    async fn commit(&self) -> Result<()> {
        debug!("COMMIT");
        self.with_conn("commit", |conn| Ok(conn.execute_batch("COMMIT")?))
    }

    async fn rollback(&self) -> Result<()> {
        debug!("ROLLBACK");
        self.with_conn("rollback", |conn| Ok(conn.execute_batch("ROLLBACK")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn store_with_table() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store
            .execute_script("CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT, born TEXT);")
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_execute_and_query_round_trip() {
        let store = store_with_table();
        let born = NaiveDate::from_ymd_opt(1990, 5, 17).unwrap();
        store
            .execute(
                "INSERT INTO customers (id, name, born) VALUES (?1, ?2, ?3)",
                &[Value::Int(1), Value::from("alice"), Value::Date(born)],
            )
            .await
            .unwrap();

        let rows = store
            .query("SELECT id, name, born FROM customers", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
        assert_eq!(rows[0].get("born"), Some(&Value::from("1990-05-17")));
    }

    #[tokio::test]
    async fn test_booleans_bind_as_integers() {
        let store = SqliteStore::in_memory().unwrap();
        store.execute_script("CREATE TABLE flags (f INTEGER);").unwrap();
        store
            .execute("INSERT INTO flags (f) VALUES (?1)", &[Value::Bool(true)])
            .await
            .unwrap();
        let rows = store.query("SELECT f FROM flags", &[]).await.unwrap();
        assert_eq!(rows[0].get("f"), Some(&Value::Int(1)));
    }

    #[tokio::test]
    async fn test_transaction_rollback_discards_writes() {
        let store = store_with_table();
        store.begin().await.unwrap();
        store
            .execute_many(
                "INSERT INTO customers (id, name) VALUES (?1, ?2)",
                &[
                    vec![Value::Int(1), Value::from("a")],
                    vec![Value::Int(2), Value::from("b")],
                ],
            )
            .await
            .unwrap();
        store.rollback().await.unwrap();
        assert_eq!(store.row_count("main", "customers").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_existence_and_count_queries() {
        let store = store_with_table();
        assert!(store.table_exists("main", "customers").await.unwrap());
        assert!(!store.table_exists("main", "orders").await.unwrap());
        store.ping().await.unwrap();

        store
            .execute("INSERT INTO customers (id) VALUES (1)", &[])
            .await
            .unwrap();
        assert_eq!(store.row_count("main", "customers").await.unwrap(), 1);
        store.truncate_table("main", "customers").await.unwrap();
        assert_eq!(store.row_count("main", "customers").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_error_surfaces() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store.query("SELECT * FROM missing", &[]).await.unwrap_err();
        assert!(err.is_connectivity());
    }
}
