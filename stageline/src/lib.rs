//! # stageline - Extract, transform, validate and load for layered stores
//!
//! stageline moves tabular records between layered data stores (a source
//! system, a staging layer, a canonical relational store and a dimensional
//! warehouse) through the same four steps for every table:
//!
//! 1. **Extract** batches of rows, optionally only those newer than a
//!    recorded watermark.
//! 2. **Transform** them: rename columns, apply defaults, cast values.
//! 3. **Validate** them against declarative data-quality rules from a
//!    catalog, rejecting or merely reporting failing rows.
//! 4. **Load** the admitted rows transactionally, in sub-batches, with
//!    truncate-or-append semantics.
//!
//! Every step is fail-fast: store errors propagate to the caller and
//! nothing is retried. Data problems (a value that will not cast, a rule
//! violation) are absorbed into statistics instead.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stageline::prelude::*;
//!
//! # async fn example() -> stageline::error::Result<()> {
//! let source: SharedStore = Arc::new(SqliteStore::open("source.db")?);
//! let target: SharedStore = Arc::new(SqliteStore::open("staging.db")?);
//!
//! let catalog = InMemoryRuleCatalog::new().with_rule(
//!     "stg_customers",
//!     RuleRecord::new("DQ_CUST_001", "NOT_NULL", "ERROR", serde_json::json!({"columns": ["id"]})),
//! );
//! let engine = ValidationEngine::new("stg_customers", &catalog, ActionMode::Reject).await?;
//!
//! let mut pipeline = TablePipeline::new(
//!     StoreExtractor::new(source, 10_000),
//!     ColumnMappingTransformer::passthrough(),
//!     StagingLoader::new(target, 10_000),
//! )
//! .with_validation(engine);
//!
//! let report = pipeline
//!     .run(&TableJob::new(ExtractRequest::table("customers"), "stg_customers"))
//!     .await?;
//! println!("{}", HumanFormatter::new().format_table(&report)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`types`**: [`Value`](types::Value), [`Row`](types::Row) and
//!   [`Batch`](types::Batch)
//! - **`store`**: the [`StoreConnection`](store::StoreConnection)
//!   collaborator, SQL dialects, the SQLite store and the deadline decorator
//! - **`extract`**, **`transform`**, **`validation`**, **`load`**: one
//!   contract per step, each embedding a [`RunStats`](stats::RunStats)
//! - **`pipeline`**: a sequential per-table runner wiring the contracts
//! - **`formatters`**: human-readable and JSON run reports
//! - **`config`**, **`logging`**, **`security`**: ambient concerns

pub mod config;
pub mod error;
pub mod extract;
pub mod formatters;
pub mod load;
pub mod logging;
pub mod pipeline;
pub mod prelude;
pub mod security;
pub mod stats;
pub mod store;
pub mod transform;
pub mod types;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use error::{EtlError, Result};
pub use types::{Batch, Row, Value};
