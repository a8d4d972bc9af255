//! Sequential per-table pipeline runner.
//!
//! [`TablePipeline`] drives the four contracts the way the orchestration
//! layer does: one table at a time, one batch at a time, inside a single
//! target transaction per table.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::error::Result;
use crate::config::EtlConfig;
use crate::extract::{ExtractRequest, Extractor};
use crate::load::Loader;
use crate::logging::LogConfig;
use crate::stats::StatsSnapshot;
use crate::transform::Transformer;
use crate::types::Value;
use crate::validation::{ValidationEngine, ValidationStats};

/// How a table job treats rows already in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Truncate the target inside the load transaction, then write
    #[default]
    Replace,
    /// Write on top of the existing rows
    Append,
}

/// One table to move from source to target.
#[derive(Debug, Clone)]
pub struct TableJob {
    /// What to extract
    pub request: ExtractRequest,
    /// Target relation
    pub target_table: String,
    /// Target schema; the loader default when absent
    pub target_schema: Option<String>,
    /// Truncate-or-append policy
    pub mode: LoadMode,
    /// Rule mapping used for validation; defaults to the target table
    pub mapping_id: Option<String>,
}

impl TableJob {
    /// Creates a replace job.
    pub fn new(request: ExtractRequest, target_table: impl Into<String>) -> Self {
        Self {
            request,
            target_table: target_table.into(),
            target_schema: None,
            mode: LoadMode::Replace,
            mapping_id: None,
        }
    }

    /// Creates a job whose load mode follows the configuration's
    /// truncate-before-load setting.
    pub fn from_config(
        request: ExtractRequest,
        target_table: impl Into<String>,
        config: &EtlConfig,
    ) -> Self {
        let mode = if config.truncate_before_load {
            LoadMode::Replace
        } else {
            LoadMode::Append
        };
        Self::new(request, target_table).mode(mode)
    }

    /// Sets the target schema.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.target_schema = Some(schema.into());
        self
    }

    /// Sets the load mode.
    pub fn mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }

    /// Uses another rule mapping than the target table name.
    pub fn mapping_id(mut self, mapping_id: impl Into<String>) -> Self {
        self.mapping_id = Some(mapping_id.into());
        self
    }

    fn effective_mapping_id(&self) -> &str {
        self.mapping_id.as_deref().unwrap_or(&self.target_table)
    }
}

/// Outcome of one table job.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    /// Source relation
    pub source_table: String,
    /// Target relation
    pub target_table: String,
    /// Load mode used
    pub mode: LoadMode,
    /// Rows pulled from the source
    pub rows_extracted: u64,
    /// Rows that survived transformation
    pub rows_transformed: u64,
    /// Rows rejected by validation
    pub rows_rejected: u64,
    /// Rows written to the target
    pub rows_loaded: u64,
    /// Maximum incremental cursor value seen, or the previous watermark
    /// when no rows were extracted
    pub watermark: Option<Value>,
    /// Extraction statistics
    pub extract: StatsSnapshot,
    /// Transformation statistics
    pub transform: StatsSnapshot,
    /// Validation statistics, when the table has a validation engine
    pub validate: Option<StatsSnapshot>,
    /// Validation counters, when the table has a validation engine
    pub validation: Option<ValidationStats>,
    /// Load statistics
    pub load: StatsSnapshot,
}

/// A table job that failed.
#[derive(Debug, Clone, Serialize)]
pub struct TableFailure {
    /// Target relation
    pub target_table: String,
    /// Error rendered as text
    pub error: String,
}

/// Outcome of a multi-table run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Successful tables, in run order
    pub tables: Vec<TableReport>,
    /// Failed tables, in run order
    pub failures: Vec<TableFailure>,
    /// Start of the run
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in seconds
    pub duration_secs: f64,
}

impl RunReport {
    /// Returns true when no table failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Rows written across all tables.
    pub fn total_rows_loaded(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_loaded).sum()
    }

    /// Rows rejected across all tables.
    pub fn total_rows_rejected(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_rejected).sum()
    }
}

#[derive(Debug, Default)]
struct Progress {
    rows_extracted: u64,
    rows_transformed: u64,
    rows_rejected: u64,
    rows_loaded: u64,
    watermark: Option<Value>,
}

/// Runs table jobs through extract, transform, validate and load.
pub struct TablePipeline<E, T, L> {
    extractor: E,
    transformer: T,
    loader: L,
    validators: HashMap<String, ValidationEngine>,
    log_config: LogConfig,
}

impl<E, T, L> TablePipeline<E, T, L>
where
    E: Extractor,
    T: Transformer,
    L: Loader,
{
    /// Wires the contracts together. No validation until an engine is added.
    pub fn new(extractor: E, transformer: T, loader: L) -> Self {
        Self {
            extractor,
            transformer,
            loader,
            validators: HashMap::new(),
            log_config: LogConfig::default(),
        }
    }

    /// Validates jobs whose mapping matches the engine's mapping identifier.
    pub fn with_validation(mut self, engine: ValidationEngine) -> Self {
        self.validators
            .insert(engine.mapping_id().to_string(), engine);
        self
    }

    /// Sets the logging configuration.
    pub fn with_log_config(mut self, config: LogConfig) -> Self {
        self.log_config = config;
        self
    }

    /// The loader, for row counts and existence checks after a run.
    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Runs one table inside a single target transaction.
    ///
    /// Any error rolls the transaction back and is returned unchanged.
    #[instrument(skip(self, job), fields(source = %job.request.table, target = %job.target_table))]
    pub async fn run(&mut self, job: &TableJob) -> Result<TableReport> {
        let total = if job.request.is_incremental() {
            None
        } else {
            Some(
                self.extractor
                    .table_row_count(
                        &job.request.table,
                        job.request.schema.as_deref(),
                        job.request.filter.as_deref(),
                    )
                    .await?,
            )
        };

        self.extractor.stats_mut().reset();
        self.transformer.stats_mut().reset();
        self.loader.stats_mut().reset();
        self.extractor.start_extraction();
        self.transformer.start_transform();
        self.loader.start_load();
        let mapping_id = job.effective_mapping_id();
        if let Some(engine) = self.validators.get_mut(mapping_id) {
            engine.reset_stats();
            engine.start_validation();
        }

        self.loader.begin().await?;
        let progress = match self.stream_into_target(job, total).await {
            Ok(progress) => progress,
            Err(e) => {
                error!(target = %job.target_table, error = %e, "table run failed, rolling back");
                if let Err(rollback) = self.loader.rollback().await {
                    error!(error = %rollback, "rollback failed");
                }
                return Err(e);
            }
        };
        if let Err(e) = self.loader.commit().await {
            if let Err(rollback) = self.loader.rollback().await {
                error!(error = %rollback, "rollback after failed commit failed");
            }
            return Err(e);
        }

        let (validate, validation) = match self.validators.get_mut(mapping_id) {
            Some(engine) => (Some(engine.end_validation()), Some(engine.stats().clone())),
            None => (None, None),
        };
        let report = TableReport {
            source_table: job.request.table.clone(),
            target_table: job.target_table.clone(),
            mode: job.mode,
            rows_extracted: progress.rows_extracted,
            rows_transformed: progress.rows_transformed,
            rows_rejected: progress.rows_rejected,
            rows_loaded: progress.rows_loaded,
            watermark: progress.watermark,
            extract: self.extractor.end_extraction(),
            transform: self.transformer.end_transform(),
            validate,
            validation,
            load: self.loader.end_load(),
        };
        info!(
            target = %report.target_table,
            extracted = report.rows_extracted,
            loaded = report.rows_loaded,
            rejected = report.rows_rejected,
            "table run committed"
        );
        Ok(report)
    }

    async fn stream_into_target(&mut self, job: &TableJob, total: Option<u64>) -> Result<Progress> {
        let schema = job.target_schema.as_deref();
        let cursor = job.request.incremental.as_ref();
        let mut progress = Progress {
            watermark: job.request.active_cursor().map(|c| c.value.clone()),
            ..Progress::default()
        };

        if job.mode == LoadMode::Replace {
            self.loader.truncate_table(&job.target_table, schema).await?;
        }

        let mut batches = self.extractor.extract(&job.request)?;
        let mut validator = self.validators.get_mut(job.effective_mapping_id());
        while let Some(batch) = batches.try_next().await? {
            if self.log_config.log_batch_progress {
                self.extractor.log_batch_progress(batch.len(), total);
            } else {
                self.extractor.stats_mut().record_batch(batch.len());
            }
            progress.rows_extracted += batch.len() as u64;

            if let Some(cursor) = cursor {
                for value in batch.iter().filter_map(|row| row.get(&cursor.column)) {
                    advance_watermark(&mut progress.watermark, value);
                }
            }

            let transformed = self.transformer.transform(&batch);
            progress.rows_transformed += transformed.len() as u64;

            let admitted = match validator.as_mut() {
                Some(engine) => {
                    let outcome = engine.validate(&transformed).await?;
                    progress.rows_rejected += outcome.rejected.len() as u64;
                    outcome.admitted
                }
                None => transformed,
            };

            progress.rows_loaded += self
                .loader
                .load_batch(&admitted, &job.target_table, schema)
                .await?;
        }
        Ok(progress)
    }

    /// Runs jobs one after another. A failed table is recorded and the run
    /// moves on to the next one; every table has its own transaction.
    pub async fn run_all(&mut self, jobs: &[TableJob]) -> RunReport {
        let started_at = Utc::now();
        let started = Instant::now();
        let mut report = RunReport {
            tables: Vec::with_capacity(jobs.len()),
            failures: Vec::new(),
            started_at,
            duration_secs: 0.0,
        };
        for job in jobs {
            match self.run(job).await {
                Ok(table) => report.tables.push(table),
                Err(e) => {
                    warn!(target = %job.target_table, error = %e, "table skipped after failure");
                    report.failures.push(TableFailure {
                        target_table: job.target_table.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report.duration_secs = started.elapsed().as_secs_f64();
        info!(
            tables = report.tables.len(),
            failures = report.failures.len(),
            rows = report.total_rows_loaded(),
            "run finished"
        );
        report
    }
}

fn advance_watermark(watermark: &mut Option<Value>, candidate: &Value) {
    if candidate.is_null() {
        return;
    }
    let newer = match watermark {
        None => true,
        Some(current) => candidate.partial_cmp(current) == Some(std::cmp::Ordering::Greater),
    };
    if newer {
        *watermark = Some(candidate.clone());
    }
}
