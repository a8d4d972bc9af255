//! Transformation contract: casting, defaulting and reshaping rows.
//!
//! Transformation never fails a batch. A row whose transform errors is
//! logged, counted in the statistics and left out of the output; the rest
//! of the batch carries on. Casting is more forgiving still: a value that
//! will not cast is kept as it was and a warning is logged.

use std::fmt;
use std::str::FromStr;

use tracing::{info, warn};

use crate::error::{EtlError, Result};
use crate::logging::{truncate_field, LogConfig};
use crate::stats::{RunStats, Stage, StatsSnapshot};
use crate::types::{Row, Value};

/// Target kinds understood by [`cast_to_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetType {
    /// Signed 64-bit integer
    Integer,
    /// Double precision float
    Float,
    /// Text
    String,
    /// Date or timestamp; values pass through unchanged
    DateLike,
    /// Boolean
    Boolean,
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetType::Integer => "integer",
            TargetType::Float => "float",
            TargetType::String => "string",
            TargetType::DateLike => "date",
            TargetType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

impl FromStr for TargetType {
    type Err = EtlError;

    /// Parses common SQL type names; length and precision suffixes such as
    /// `VARCHAR(50)` or `DECIMAL(10,2)` are ignored.
    fn from_str(s: &str) -> Result<Self> {
        let base = s
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_uppercase();
        match base.as_str() {
            "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" | "MEDIUMINT" | "SERIAL"
            | "BIGSERIAL" => Ok(TargetType::Integer),
            "FLOAT" | "DOUBLE" | "DOUBLE PRECISION" | "REAL" | "DECIMAL" | "NUMERIC" => {
                Ok(TargetType::Float)
            }
            "VARCHAR" | "CHAR" | "TEXT" | "STRING" | "NVARCHAR" | "NCHAR" | "CHARACTER VARYING" => {
                Ok(TargetType::String)
            }
            "DATE" | "DATETIME" | "TIMESTAMP" | "TIMESTAMPTZ" | "TIME" => Ok(TargetType::DateLike),
            "BOOL" | "BOOLEAN" | "BIT" => Ok(TargetType::Boolean),
            _ => Err(EtlError::Configuration(format!(
                "Unsupported target type '{s}'"
            ))),
        }
    }
}

/// Returns `default` when `value` is null, otherwise `value`.
pub fn apply_default_value(value: Value, default: Option<&Value>) -> Value {
    match (value, default) {
        (Value::Null, Some(default)) => default.clone(),
        (value, _) => value,
    }
}

/// Casts a value to the target kind.
///
/// Null stays null. A cast that fails logs a warning and returns the
/// original value unchanged.
pub fn cast_to_type(value: Value, target: TargetType) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    match try_cast(&value, target) {
        Some(cast) => cast,
        None => {
            warn!(
                value = %truncate_field(&value.to_string(), 128),
                from = value.type_name(),
                to = %target,
                "cast failed, keeping original value"
            );
            value
        }
    }
}

fn try_cast(value: &Value, target: TargetType) -> Option<Value> {
    match target {
        TargetType::Integer => match value {
            Value::Int(n) => Some(Value::Int(*n)),
            Value::Bool(b) => Some(Value::Int(i64::from(*b))),
            Value::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(truncate_float))
                    .map(Value::Int)
            }
            Value::Float(x) => truncate_float(*x).map(Value::Int),
            _ => None,
        },
        TargetType::Float => match value {
            Value::Date(_) | Value::DateTime(_) => None,
            other => other.as_f64().map(Value::Float),
        },
        TargetType::String => Some(Value::Text(value.to_string())),
        TargetType::DateLike => Some(value.clone()),
        TargetType::Boolean => {
            let text = value.to_string();
            let truthy = matches!(
                text.trim().to_ascii_uppercase().as_str(),
                "TRUE" | "1" | "Y" | "YES"
            );
            Some(Value::Bool(truthy))
        }
    }
}

fn truncate_float(x: f64) -> Option<i64> {
    if !x.is_finite() || x >= i64::MAX as f64 || x < i64::MIN as f64 {
        return None;
    }
    Some(x.trunc() as i64)
}

/// Contract for per-row transformation.
pub trait Transformer: Send {
    /// Transforms one row. `Ok(None)` drops the row on purpose.
    fn transform_row(&mut self, row: &Row) -> Result<Option<Row>>;

    /// Read access to the transformation statistics.
    fn stats(&self) -> &RunStats;

    /// Write access to the transformation statistics.
    fn stats_mut(&mut self) -> &mut RunStats;

    /// Transforms a batch. Rows that fail are logged and excluded; order
    /// of the surviving rows is preserved.
    fn transform(&mut self, rows: &[Row]) -> Vec<Row> {
        let mut out = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            match self.transform_row(row) {
                Ok(Some(transformed)) => out.push(transformed),
                Ok(None) => {}
                Err(e) => {
                    let index = index.to_string();
                    self.log_error(
                        &row.display_id(),
                        &e.to_string(),
                        &[("row_index", index.as_str())],
                    );
                }
            }
        }
        self.stats_mut().record_batch(rows.len());
        out
    }

    /// Records a per-row failure without interrupting the batch.
    fn log_error(&mut self, row_id: &str, message: &str, context: &[(&str, &str)]) {
        warn!(row_id, error = message, "row transform failed");
        let entries = std::iter::once(("row_id", row_id))
            .chain(context.iter().copied())
            .collect::<Vec<_>>();
        self.stats_mut().log_error(message, entries);
    }

    /// Marks the start of a transformation run.
    fn start_transform(&mut self) {
        self.stats_mut().start();
    }

    /// Ends the transformation run and returns its statistics.
    fn end_transform(&mut self) -> StatsSnapshot {
        let snapshot = self.stats_mut().finalize();
        info!(
            rows = snapshot.rows_processed,
            errors = snapshot.error_count(),
            duration_secs = snapshot.duration.as_secs_f64(),
            "transformation finished"
        );
        snapshot
    }
}

/// Maps one source column onto one target column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    /// Column read from the incoming row
    pub source: String,
    /// Column written to the outgoing row
    pub target: String,
    /// Cast applied after defaulting
    pub target_type: Option<TargetType>,
    /// Value used when the source is null or absent
    pub default: Option<Value>,
    /// Fails the row when the value is still null after defaulting
    pub required: bool,
}

impl ColumnMapping {
    /// Maps `source` onto `target`.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            target_type: None,
            default: None,
            required: false,
        }
    }

    /// Keeps the column name unchanged.
    pub fn same(column: impl Into<String>) -> Self {
        let column = column.into();
        Self::new(column.clone(), column)
    }

    /// Casts the value to `target_type`.
    pub fn cast(mut self, target_type: TargetType) -> Self {
        self.target_type = Some(target_type);
        self
    }

    /// Sets the default used for null values.
    pub fn default_value(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Marks the column as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Transformer driven by an ordered list of [`ColumnMapping`]s.
///
/// Output columns appear in mapping order, followed by unmapped source
/// columns when pass-through is enabled.
#[derive(Debug, Clone)]
pub struct ColumnMappingTransformer {
    mappings: Vec<ColumnMapping>,
    passthrough_unmapped: bool,
    log_config: LogConfig,
    stats: RunStats,
}

impl ColumnMappingTransformer {
    /// Creates a transformer that keeps only the mapped columns.
    pub fn new(mappings: Vec<ColumnMapping>) -> Self {
        Self {
            mappings,
            passthrough_unmapped: false,
            log_config: LogConfig::default(),
            stats: RunStats::new(Stage::Transform),
        }
    }

    /// Creates an identity transformer that copies every column.
    pub fn passthrough() -> Self {
        Self::new(Vec::new()).with_passthrough_unmapped(true)
    }

    /// Copies columns no mapping reads.
    pub fn with_passthrough_unmapped(mut self, enabled: bool) -> Self {
        self.passthrough_unmapped = enabled;
        self
    }

    /// Sets the logging configuration.
    pub fn with_log_config(mut self, config: LogConfig) -> Self {
        self.log_config = config;
        self
    }

    /// Configured mappings.
    pub fn mappings(&self) -> &[ColumnMapping] {
        &self.mappings
    }
}

impl Transformer for ColumnMappingTransformer {
    fn transform_row(&mut self, row: &Row) -> Result<Option<Row>> {
        let mut out = Row::with_capacity(row.len().max(self.mappings.len()));
        for mapping in &self.mappings {
            let value = row.get(&mapping.source).cloned().unwrap_or_default();
            let mut value = apply_default_value(value, mapping.default.as_ref());
            if value.is_null() {
                if mapping.required {
                    return Err(EtlError::transform(
                        row.display_id(),
                        format!("required column '{}' is null", mapping.source),
                    ));
                }
            } else if let Some(target_type) = mapping.target_type {
                value = cast_to_type(value, target_type);
            }
            out.insert(mapping.target.clone(), value);
        }

        if self.passthrough_unmapped {
            for (column, value) in row.iter() {
                let mapped = self.mappings.iter().any(|m| m.source == column);
                if !mapped && !out.contains(column) {
                    out.insert(column, value.clone());
                }
            }
        }

        crate::log_row_detail!(
            self.log_config,
            trace,
            row_id = %row.display_id(),
            columns = out.len(),
            "row transformed"
        );
        Ok(Some(out))
    }

    fn stats(&self) -> &RunStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut RunStats {
        &mut self.stats
    }
}
