//! Prelude for commonly used types and traits in stageline.

pub use crate::config::EtlConfig;
pub use crate::error::{EtlError, Result};
pub use crate::extract::{BatchStream, ExtractRequest, Extractor, StoreExtractor};
pub use crate::formatters::{FormatterConfig, HumanFormatter, JsonFormatter, ReportFormatter};
pub use crate::load::{LoadState, Loader, StagingLoader};
pub use crate::logging::LogConfig;
pub use crate::pipeline::{
    LoadMode, RunReport, TableFailure, TableJob, TablePipeline, TableReport,
};
pub use crate::stats::{RunStats, Stage, StatsSnapshot};
pub use crate::store::{DeadlineStore, SharedStore, SqlDialect, StoreConnection};
#[cfg(feature = "sqlite")]
pub use crate::store::SqliteStore;
pub use crate::transform::{ColumnMapping, ColumnMappingTransformer, TargetType, Transformer};
pub use crate::types::{Batch, Row, Value};
pub use crate::validation::{
    ActionMode, InMemoryRuleCatalog, RuleCatalog, RuleRecord, RuleStatus, Severity,
    ValidationEngine, ValidationOutcome, ValidationResult,
};
