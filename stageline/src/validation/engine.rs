//! The validation engine: applies a mapping's rules to batches of rows.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::catalog::RuleCatalog;
use super::rules::{DataQualityRule, RuleSpec, Severity, ValidationResult};
use crate::error::{EtlError, Result};
use crate::logging::{truncate_field, LogConfig};
use crate::stats::{RunStats, Stage, StatsSnapshot};
use crate::store::SharedStore;
use crate::types::{Row, Value};

/// Keys per referential lookup statement.
pub const REFERENCE_LOOKUP_CHUNK: usize = 500;

/// Policy for rows that fail a blocking rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionMode {
    /// Exclude rows with blocking failures
    #[default]
    Reject,
    /// Admit every row, log violations at info
    Log,
    /// Admit every row, log violations at warn
    Warn,
}

impl ActionMode {
    /// Returns the string representation of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionMode::Reject => "REJECT",
            ActionMode::Log => "LOG",
            ActionMode::Warn => "WARN",
        }
    }
}

impl fmt::Display for ActionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionMode {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "REJECT" => Ok(ActionMode::Reject),
            "LOG" => Ok(ActionMode::Log),
            "WARN" | "WARNING" => Ok(ActionMode::Warn),
            _ => Err(EtlError::Configuration(format!(
                "Unknown action mode '{s}', expected REJECT, LOG or WARN"
            ))),
        }
    }
}

/// Result of validating one batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationOutcome {
    /// Rows to hand to the loader, in input order
    pub admitted: Vec<Row>,
    /// Rows excluded in reject mode, in input order
    pub rejected: Vec<Row>,
    /// Every result of every rule for every row, row-major
    pub results: Vec<ValidationResult>,
}

impl ValidationOutcome {
    /// Failed results only.
    pub fn failures(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    /// Returns true if any row was rejected.
    pub fn has_rejections(&self) -> bool {
        !self.rejected.is_empty()
    }
}

/// Counters kept by a [`ValidationEngine`] across batches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationStats {
    /// Rows seen
    pub rows_validated: u64,
    /// Rows admitted
    pub rows_admitted: u64,
    /// Rows rejected
    pub rows_rejected: u64,
    /// Failed results per severity
    pub violations_by_severity: BTreeMap<Severity, u64>,
    /// Failed results per rule code
    pub violations_by_rule: BTreeMap<String, u64>,
}

impl ValidationStats {
    /// Total failed results.
    pub fn total_violations(&self) -> u64 {
        self.violations_by_severity.values().sum()
    }

    fn record_violation(&mut self, result: &ValidationResult) {
        *self.violations_by_severity.entry(result.severity).or_default() += 1;
        *self
            .violations_by_rule
            .entry(result.rule_code.clone())
            .or_default() += 1;
    }
}

/// Evaluates the data-quality rules of one mapping.
///
/// Rules are fetched and decoded once, at construction. Row-scope rules run
/// through [`validate_row`](Self::validate_row); [`validate`](Self::validate)
/// adds the batch-scope rules (UNIQUE across the batch, REFERENTIAL against
/// the attached reference store) and applies the action mode.
pub struct ValidationEngine {
    mapping_id: String,
    rules: Vec<DataQualityRule>,
    action_mode: ActionMode,
    reference_store: Option<SharedStore>,
    log_config: LogConfig,
    stats: ValidationStats,
    run_stats: RunStats,
}

impl fmt::Debug for ValidationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationEngine")
            .field("mapping_id", &self.mapping_id)
            .field("rules", &self.rules.len())
            .field("action_mode", &self.action_mode)
            .field("reference_store", &self.reference_store.is_some())
            .finish()
    }
}

impl ValidationEngine {
    /// Loads and decodes the active rules of `mapping_id`.
    #[instrument(skip(catalog))]
    pub async fn new(
        mapping_id: &str,
        catalog: &dyn RuleCatalog,
        action_mode: ActionMode,
    ) -> Result<Self> {
        let records = catalog.data_quality_rules(mapping_id, true).await?;
        let rules = records
            .iter()
            .filter(|record| record.is_active)
            .map(DataQualityRule::from_record)
            .collect::<Result<Vec<_>>>()?;
        info!(mapping_id, rules = rules.len(), mode = %action_mode, "validation rules loaded");
        Ok(Self::from_rules(mapping_id, rules, action_mode))
    }

    /// Builds an engine from already decoded rules.
    pub fn from_rules(
        mapping_id: impl Into<String>,
        rules: Vec<DataQualityRule>,
        action_mode: ActionMode,
    ) -> Self {
        Self {
            mapping_id: mapping_id.into(),
            rules,
            action_mode,
            reference_store: None,
            log_config: LogConfig::default(),
            stats: ValidationStats::default(),
            run_stats: RunStats::new(Stage::Validate),
        }
    }

    /// Attaches the store REFERENTIAL rules look keys up in.
    pub fn with_reference_store(mut self, store: SharedStore) -> Self {
        self.reference_store = Some(store);
        self
    }

    /// Sets the logging configuration.
    pub fn with_log_config(mut self, config: LogConfig) -> Self {
        self.log_config = config;
        self
    }

    /// Mapping this engine validates.
    pub fn mapping_id(&self) -> &str {
        &self.mapping_id
    }

    /// Decoded rules, ordered as the catalog returned them.
    pub fn rules(&self) -> &[DataQualityRule] {
        &self.rules
    }

    /// Configured action mode.
    pub fn action_mode(&self) -> ActionMode {
        self.action_mode
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> &ValidationStats {
        &self.stats
    }

    /// Clears counters between runs.
    pub fn reset_stats(&mut self) {
        self.stats = ValidationStats::default();
        self.run_stats.reset();
    }

    /// Marks the start of a validation run.
    pub fn start_validation(&mut self) {
        self.run_stats.start();
    }

    /// Ends the validation run and returns its statistics.
    pub fn end_validation(&mut self) -> StatsSnapshot {
        let snapshot = self.run_stats.finalize();
        info!(
            mapping_id = %self.mapping_id,
            rows = self.stats.rows_validated,
            admitted = self.stats.rows_admitted,
            rejected = self.stats.rows_rejected,
            violations = self.stats.total_violations(),
            "validation finished"
        );
        snapshot
    }

    /// Evaluates every row-scope rule against one row.
    ///
    /// UNIQUE and REFERENTIAL results are reported as skipped; use
    /// [`validate`](Self::validate) to evaluate them.
    pub fn validate_row(&self, row: &Row) -> Vec<ValidationResult> {
        let today = Local::now().date_naive();
        self.evaluate_row_scope(row, today)
    }

    fn evaluate_row_scope(&self, row: &Row, today: NaiveDate) -> Vec<ValidationResult> {
        self.rules
            .iter()
            .map(|rule| rule.evaluate_row(row, today))
            .collect()
    }

    /// Validates a batch and splits it according to the action mode.
    ///
    /// Errors only when a REFERENTIAL lookup fails against the store.
    #[instrument(skip(self, rows), fields(mapping_id = %self.mapping_id, rows = rows.len()))]
    pub async fn validate(&mut self, rows: &[Row]) -> Result<ValidationOutcome> {
        let today = Local::now().date_naive();
        let mut matrix: Vec<Vec<ValidationResult>> = rows
            .iter()
            .map(|row| self.evaluate_row_scope(row, today))
            .collect();

        for (rule_index, rule) in self.rules.iter().enumerate() {
            match &rule.spec {
                RuleSpec::Unique { columns } => {
                    let results = evaluate_unique(rule, columns, rows);
                    place(&mut matrix, rule_index, results);
                }
                RuleSpec::Referential { .. } => {
                    let results = self.evaluate_referential(rule, rows).await?;
                    place(&mut matrix, rule_index, results);
                }
                _ => {}
            }
        }

        let mut outcome = ValidationOutcome::default();
        for (row_index, (row, results)) in rows.iter().zip(matrix).enumerate() {
            let mut blocked = false;
            for result in results {
                let result = result.for_row(row_index, row);
                if result.is_failure() {
                    self.stats.record_violation(&result);
                    self.log_violation(&result);
                    blocked |= result.is_blocking();
                }
                outcome.results.push(result);
            }
            if blocked && self.action_mode == ActionMode::Reject {
                outcome.rejected.push(row.clone());
            } else {
                outcome.admitted.push(row.clone());
            }
        }

        self.stats.rows_validated += rows.len() as u64;
        self.stats.rows_admitted += outcome.admitted.len() as u64;
        self.stats.rows_rejected += outcome.rejected.len() as u64;
        self.run_stats.record_batch(rows.len());
        if !outcome.rejected.is_empty() {
            warn!(
                rejected = outcome.rejected.len(),
                admitted = outcome.admitted.len(),
                "rows rejected by data-quality rules"
            );
        }
        Ok(outcome)
    }

    fn log_violation(&self, result: &ValidationResult) {
        let value = result
            .value
            .as_ref()
            .map(|v| truncate_field(&v.to_string(), self.log_config.max_field_length))
            .unwrap_or_default();
        let message = result.message.as_deref().unwrap_or_default();
        let row_id = result.row_id.as_deref().unwrap_or_default();
        match self.action_mode {
            ActionMode::Log => crate::log_row_detail!(
                self.log_config,
                info,
                rule_code = %result.rule_code,
                severity = %result.severity,
                row_id,
                value = %value,
                "data-quality violation: {message}"
            ),
            ActionMode::Warn | ActionMode::Reject => crate::log_row_detail!(
                self.log_config,
                warn,
                rule_code = %result.rule_code,
                severity = %result.severity,
                row_id,
                value = %value,
                "data-quality violation: {message}"
            ),
        }
    }

    async fn evaluate_referential(
        &self,
        rule: &DataQualityRule,
        rows: &[Row],
    ) -> Result<Vec<ValidationResult>> {
        let RuleSpec::Referential {
            column,
            reference_schema,
            reference_table,
            reference_column,
        } = &rule.spec
        else {
            return Ok(Vec::new());
        };

        let Some(store) = &self.reference_store else {
            return Ok(rows
                .iter()
                .map(|_| rule.skipped("no reference store attached"))
                .collect());
        };
        let Some(column) = column.as_deref() else {
            return Ok(rows.iter().map(|_| rule.success()).collect());
        };

        let mut keys: Vec<&Value> = Vec::new();
        let mut seen = HashSet::new();
        for value in rows.iter().filter_map(|row| row.get(column)) {
            if !value.is_null() && seen.insert(value.key_repr()) {
                keys.push(value);
            }
        }

        let dialect = store.dialect();
        let table = dialect.qualified_table(reference_schema.as_deref(), reference_table)?;
        let quoted = dialect.quote_identifier(reference_column)?;
        let mut found = HashSet::new();
        for chunk in keys.chunks(REFERENCE_LOOKUP_CHUNK) {
            let placeholders = (1..=chunk.len())
                .map(|i| dialect.placeholder(i))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT DISTINCT {quoted} AS ref_key FROM {table} WHERE {quoted} IN ({placeholders})"
            );
            let params: Vec<Value> = chunk.iter().map(|v| (*v).clone()).collect();
            for row in store.query(&sql, &params).await? {
                if let Some(value) = row.values().next() {
                    found.insert(value.key_repr());
                }
            }
        }

        Ok(rows
            .iter()
            .map(|row| match row.get(column) {
                Some(value) if !value.is_null() && !found.contains(&value.key_repr()) => rule
                    .failure(format!(
                        "column '{column}' value not found in {reference_table}.{reference_column}"
                    ))
                    .at(column, value.clone()),
                _ => rule.success(),
            })
            .collect())
    }
}

fn place(matrix: &mut [Vec<ValidationResult>], rule_index: usize, results: Vec<ValidationResult>) {
    for (row_results, result) in matrix.iter_mut().zip(results) {
        row_results[rule_index] = result;
    }
}

/// First occurrence of a key passes; later duplicates fail. Rows with a
/// null key column are ignored.
fn evaluate_unique(
    rule: &DataQualityRule,
    columns: &[String],
    rows: &[Row],
) -> Vec<ValidationResult> {
    if columns.is_empty() {
        return rows.iter().map(|_| rule.success()).collect();
    }
    let mut first_seen: HashMap<Vec<(&'static str, String)>, usize> = HashMap::new();
    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            if columns.iter().any(|c| row.is_null(c)) {
                return rule.success();
            }
            let key = columns
                .iter()
                .map(|c| row.get(c).map(typed_key).unwrap_or_default())
                .collect::<Vec<_>>();
            match first_seen.get(&key) {
                Some(first) => {
                    let value = row.get(&columns[0]).cloned().unwrap_or_default();
                    rule.failure(format!(
                        "duplicate value for ({}) first seen at row {first}",
                        columns.join(", ")
                    ))
                    .at(columns[0].as_str(), value)
                }
                None => {
                    first_seen.insert(key, index);
                    rule.success()
                }
            }
        })
        .collect()
}

/// Value identity for UNIQUE: integral floats equal their integer, text
/// never equals a number.
fn typed_key(value: &Value) -> (&'static str, String) {
    let class = match value {
        Value::Int(_) | Value::Float(_) => "number",
        other => other.type_name(),
    };
    (class, value.key_repr())
}
