//! Data-quality validation.
//!
//! Rules live in a [`RuleCatalog`] keyed by mapping identifier. A
//! [`ValidationEngine`] is bound to one mapping: it fetches that mapping's
//! active rules once, decodes them into typed [`DataQualityRule`]s and
//! applies them to every batch it is handed.
//!
//! ```rust,no_run
//! use serde_json::json;
//! use stageline::types::Row;
//! use stageline::validation::{ActionMode, InMemoryRuleCatalog, RuleRecord, ValidationEngine};
//!
//! # async fn example() -> stageline::error::Result<()> {
//! let catalog = InMemoryRuleCatalog::new()
//!     .with_rule("stg_orders", RuleRecord::new("DQ_ORD_001", "NOT_NULL", "ERROR", json!({"columns": ["order_id"]})))
//!     .with_rule("stg_orders", RuleRecord::new("DQ_ORD_002", "RANGE", "WARNING", json!({"column": "amount", "min": 0})));
//!
//! let mut engine = ValidationEngine::new("stg_orders", &catalog, ActionMode::Reject).await?;
//! let outcome = engine
//!     .validate(&[Row::new().with("order_id", 1).with("amount", -5.0)])
//!     .await?;
//! assert_eq!(outcome.admitted.len(), 1); // warnings never block
//! # Ok(())
//! # }
//! ```

mod catalog;
mod engine;
mod rules;

pub use catalog::{InMemoryRuleCatalog, RuleCatalog, StoreRuleCatalog, DEFAULT_RULES_TABLE};
pub use engine::{
    ActionMode, ValidationEngine, ValidationOutcome, ValidationStats, REFERENCE_LOOKUP_CHUNK,
};
pub use rules::{
    DataQualityRule, DateBound, RuleRecord, RuleSpec, RuleStatus, RuleType, Severity,
    ValidationResult,
};
