//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use stageline::store::{SharedStore, SqliteStore};
use stageline::types::Row;
use tempfile::TempDir;

/// A file-backed SQLite store living in its own temporary directory.
pub struct FileStore {
    pub store: Arc<SqliteStore>,
    _dir: TempDir,
}

impl FileStore {
    pub fn with_script(script: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("store.db")).unwrap();
        store.execute_script(script).unwrap();
        Self {
            store: Arc::new(store),
            _dir: dir,
        }
    }

    pub fn shared(&self) -> SharedStore {
        self.store.clone()
    }
}

pub const EVENTS_DDL: &str =
    "CREATE TABLE events (id INTEGER PRIMARY KEY, kind TEXT NOT NULL, amount REAL);";

pub fn event_rows(count: usize) -> Vec<Row> {
    (1..=count as i64)
        .map(|id| {
            Row::new()
                .with("id", id)
                .with("kind", if id % 2 == 0 { "debit" } else { "credit" })
                .with("amount", id as f64 * 1.25)
        })
        .collect()
}

/// `INSERT` script for `count` events with ids starting at `first`.
pub fn events_insert_script(first: i64, count: i64) -> String {
    (first..first + count)
        .map(|id| format!("INSERT INTO events VALUES ({id}, 'credit', {id}.5);"))
        .collect::<Vec<_>>()
        .join("\n")
}
