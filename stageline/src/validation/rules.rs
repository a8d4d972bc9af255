//! Data-quality rule model and row-scope evaluation.
//!
//! A catalog hands out loosely typed [`RuleRecord`]s: a rule type string,
//! a severity string and a JSON parameter payload. Each record is decoded
//! exactly once into a [`DataQualityRule`] whose [`RuleSpec`] carries the
//! parameters the rule type needs, already parsed (numbers, dates, compiled
//! regexes). Evaluation never touches JSON again.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::{EtlError, Result};
use crate::security::SqlSecurity;
use crate::types::{Row, Value};

/// Severity of a data-quality rule. Ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Informational observation
    Info,
    /// Should be investigated, never blocks a row
    #[default]
    Warning,
    /// Blocks the row in reject mode
    Error,
    /// Blocks the row in reject mode
    Critical,
}

impl Severity {
    /// Returns the string representation of the severity.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Returns true for severities that make a failing row an error row.
    pub fn is_blocking(&self) -> bool {
        *self >= Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INFO" => Ok(Severity::Info),
            "WARNING" | "WARN" => Ok(Severity::Warning),
            "ERROR" => Ok(Severity::Error),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(EtlError::Configuration(format!("Unknown severity '{s}'"))),
        }
    }
}

/// Kind of a data-quality rule as named in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleType {
    NotNull,
    Range,
    Pattern,
    Length,
    DateRange,
    Unique,
    Referential,
    Custom,
    /// A type this runtime does not know; evaluated as skipped
    Other(String),
}

impl RuleType {
    /// Parses a catalog rule type. Unknown names are kept as [`RuleType::Other`].
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "NOT_NULL" => RuleType::NotNull,
            "RANGE" => RuleType::Range,
            "PATTERN" => RuleType::Pattern,
            "LENGTH" => RuleType::Length,
            "DATE_RANGE" => RuleType::DateRange,
            "UNIQUE" => RuleType::Unique,
            "REFERENTIAL" => RuleType::Referential,
            "CUSTOM" => RuleType::Custom,
            _ => RuleType::Other(name.trim().to_string()),
        }
    }

    /// Catalog name of the rule type.
    pub fn as_str(&self) -> &str {
        match self {
            RuleType::NotNull => "NOT_NULL",
            RuleType::Range => "RANGE",
            RuleType::Pattern => "PATTERN",
            RuleType::Length => "LENGTH",
            RuleType::DateRange => "DATE_RANGE",
            RuleType::Unique => "UNIQUE",
            RuleType::Referential => "REFERENTIAL",
            RuleType::Custom => "CUSTOM",
            RuleType::Other(name) => name,
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule as stored in a catalog, before decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    /// Stable rule code
    pub rule_code: String,
    /// Rule type name (`NOT_NULL`, `RANGE`, ...)
    pub rule_type: String,
    /// Severity name (`INFO`, `WARNING`, `ERROR`, `CRITICAL`)
    pub severity: String,
    /// Rule-type specific parameters
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// Inactive rules are ignored by the engine
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
}

fn default_active() -> bool {
    true
}

impl RuleRecord {
    /// Creates an active record.
    pub fn new(
        rule_code: impl Into<String>,
        rule_type: impl Into<String>,
        severity: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            rule_code: rule_code.into(),
            rule_type: rule_type.into(),
            severity: severity.into(),
            parameters,
            is_active: true,
            description: None,
        }
    }

    /// Marks the record inactive.
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A date bound that is either fixed or resolved at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBound {
    /// The local date on the day of evaluation
    CurrentDate,
    /// A fixed calendar date
    Fixed(NaiveDate),
}

impl DateBound {
    /// Parses a bound: `current date`, `current_date`, `today` or a date.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "current date" | "current_date" | "today" => Some(DateBound::CurrentDate),
            _ => Value::from(raw).as_date().map(DateBound::Fixed),
        }
    }

    /// Resolves the bound against the evaluation date.
    pub fn resolve(&self, today: NaiveDate) -> NaiveDate {
        match self {
            DateBound::CurrentDate => today,
            DateBound::Fixed(date) => *date,
        }
    }
}

/// Decoded, rule-type specific parameters.
#[derive(Debug, Clone)]
pub enum RuleSpec {
    NotNull {
        columns: Vec<String>,
    },
    Range {
        column: Option<String>,
        min: Option<f64>,
        max: Option<f64>,
    },
    Pattern {
        column: Option<String>,
        pattern: Option<Regex>,
    },
    Length {
        column: Option<String>,
        min: Option<usize>,
        max: Option<usize>,
    },
    DateRange {
        column: Option<String>,
        min: Option<DateBound>,
        max: Option<DateBound>,
    },
    Unique {
        columns: Vec<String>,
    },
    Referential {
        column: Option<String>,
        reference_schema: Option<String>,
        reference_table: String,
        reference_column: String,
    },
    Custom {
        expression: Option<String>,
    },
    Unsupported,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => s
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            OneOrMany::Many(v) => v,
        }
    }
}

/// Raw parameter payload shared by every rule type.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawParameters {
    column: Option<String>,
    columns: Option<OneOrMany>,
    #[serde(
        alias = "min_value",
        alias = "min_length",
        alias = "min_date",
        alias = "start_date",
        deserialize_with = "lenient_scalar"
    )]
    min: Option<String>,
    #[serde(
        alias = "max_value",
        alias = "max_length",
        alias = "max_date",
        alias = "end_date",
        deserialize_with = "lenient_scalar"
    )]
    max: Option<String>,
    #[serde(alias = "regex")]
    pattern: Option<String>,
    #[serde(alias = "ref_schema")]
    reference_schema: Option<String>,
    #[serde(alias = "ref_table")]
    reference_table: Option<String>,
    #[serde(alias = "ref_column")]
    reference_column: Option<String>,
    #[serde(alias = "sql", alias = "condition")]
    expression: Option<String>,
}

/// Accepts numbers, strings and nulls for bound parameters.
fn lenient_scalar<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => None,
        Some(serde_json::Value::String(s)) => Some(s.trim().to_string()),
        Some(other) => Some(other.to_string()),
    })
}

impl RawParameters {
    fn from_json(code: &str, parameters: &serde_json::Value) -> Result<Self> {
        let parameters = match parameters {
            serde_json::Value::Null => return Ok(Self::default()),
            // Catalogs that store parameters as text hand over a JSON string
            serde_json::Value::String(text) if text.trim().is_empty() => {
                return Ok(Self::default())
            }
            serde_json::Value::String(text) => serde_json::from_str(text).map_err(|e| {
                EtlError::invalid_rule(code, format!("parameters are not valid JSON: {e}"))
            })?,
            other => other.clone(),
        };
        if !parameters.is_object() {
            return Err(EtlError::invalid_rule(
                code,
                "parameters must be a JSON object",
            ));
        }
        serde_json::from_value(parameters)
            .map_err(|e| EtlError::invalid_rule(code, format!("invalid parameters: {e}")))
    }

    /// `columns` and `column` merged, in that order, without duplicates.
    fn all_columns(&mut self) -> Vec<String> {
        let mut columns = self
            .columns
            .take()
            .map(OneOrMany::into_vec)
            .unwrap_or_default();
        if let Some(column) = self.column.take() {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        columns
    }

    /// The single column a rule applies to: `column`, else the first of
    /// `columns`.
    fn single_column(&mut self) -> Option<String> {
        self.column
            .take()
            .or_else(|| self.all_columns().into_iter().next())
    }
}

fn parse_number(code: &str, name: &str, raw: Option<String>) -> Result<Option<f64>> {
    raw.map(|s| {
        s.parse::<f64>()
            .map_err(|_| EtlError::invalid_rule(code, format!("{name} bound '{s}' is not a number")))
    })
    .transpose()
}

fn parse_length(code: &str, name: &str, raw: Option<String>) -> Result<Option<usize>> {
    raw.map(|s| {
        s.parse::<f64>()
            .ok()
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| n as usize)
            .ok_or_else(|| {
                EtlError::invalid_rule(code, format!("{name} length '{s}' is not a count"))
            })
    })
    .transpose()
}

fn parse_date_bound(code: &str, name: &str, raw: Option<String>) -> Result<Option<DateBound>> {
    raw.map(|s| {
        DateBound::parse(&s).ok_or_else(|| {
            EtlError::invalid_rule(code, format!("{name} date '{s}' is not a date"))
        })
    })
    .transpose()
}

/// A decoded data-quality rule.
#[derive(Debug, Clone)]
pub struct DataQualityRule {
    /// Stable rule code
    pub code: String,
    /// Rule type
    pub rule_type: RuleType,
    /// Severity stamped onto failing results
    pub severity: Severity,
    /// Free-form description
    pub description: Option<String>,
    /// Decoded parameters
    pub spec: RuleSpec,
}

impl DataQualityRule {
    /// Decodes a catalog record.
    ///
    /// Unknown rule types decode to [`RuleSpec::Unsupported`] and are
    /// skipped at evaluation; malformed parameters of known types are
    /// errors.
    pub fn from_record(record: &RuleRecord) -> Result<Self> {
        let code = record.rule_code.as_str();
        let rule_type = RuleType::parse(&record.rule_type);
        let severity = record
            .severity
            .parse::<Severity>()
            .map_err(|e| EtlError::invalid_rule(code, e.to_string()))?;
        let mut raw = RawParameters::from_json(code, &record.parameters)?;

        let spec = match &rule_type {
            RuleType::NotNull => RuleSpec::NotNull {
                columns: raw.all_columns(),
            },
            RuleType::Range => RuleSpec::Range {
                column: raw.single_column(),
                min: parse_number(code, "min", raw.min.take())?,
                max: parse_number(code, "max", raw.max.take())?,
            },
            RuleType::Pattern => {
                let pattern = raw
                    .pattern
                    .take()
                    .filter(|p| !p.is_empty())
                    .map(|p| {
                        SqlSecurity::validate_regex_pattern(&p)
                            .map_err(|e| EtlError::invalid_rule(code, e.to_string()))
                    })
                    .transpose()?;
                RuleSpec::Pattern {
                    column: raw.single_column(),
                    pattern,
                }
            }
            RuleType::Length => RuleSpec::Length {
                column: raw.single_column(),
                min: parse_length(code, "min", raw.min.take())?,
                max: parse_length(code, "max", raw.max.take())?,
            },
            RuleType::DateRange => RuleSpec::DateRange {
                column: raw.single_column(),
                min: parse_date_bound(code, "min", raw.min.take())?,
                max: parse_date_bound(code, "max", raw.max.take())?,
            },
            RuleType::Unique => RuleSpec::Unique {
                columns: raw.all_columns(),
            },
            RuleType::Referential => {
                let reference_table = raw.reference_table.take().ok_or_else(|| {
                    EtlError::invalid_rule(code, "referential rule needs reference_table")
                })?;
                let reference_column = raw.reference_column.take().ok_or_else(|| {
                    EtlError::invalid_rule(code, "referential rule needs reference_column")
                })?;
                let reference_schema = raw.reference_schema.take();
                for identifier in [Some(&reference_table), Some(&reference_column)]
                    .into_iter()
                    .chain([reference_schema.as_ref()])
                    .flatten()
                {
                    SqlSecurity::validate_identifier(identifier)
                        .map_err(|e| EtlError::invalid_rule(code, e.to_string()))?;
                }
                RuleSpec::Referential {
                    column: raw.single_column(),
                    reference_schema,
                    reference_table,
                    reference_column,
                }
            }
            RuleType::Custom => {
                warn!(rule_code = code, "CUSTOM rules are not supported and will be skipped");
                RuleSpec::Custom {
                    expression: raw.expression.take(),
                }
            }
            RuleType::Other(name) => {
                warn!(rule_code = code, rule_type = %name, "unknown rule type will be skipped");
                RuleSpec::Unsupported
            }
        };

        Ok(Self {
            code: record.rule_code.clone(),
            rule_type,
            severity,
            description: record.description.clone(),
            spec,
        })
    }

    /// Returns true for rules that need more than one row to evaluate.
    pub fn is_batch_scope(&self) -> bool {
        matches!(
            self.spec,
            RuleSpec::Unique { .. } | RuleSpec::Referential { .. }
        )
    }

    /// Evaluates the rule against one row.
    ///
    /// `today` resolves `current date` bounds. Batch-scope rules report
    /// [`RuleStatus::Skipped`] here.
    pub fn evaluate_row(&self, row: &Row, today: NaiveDate) -> ValidationResult {
        match &self.spec {
            RuleSpec::NotNull { columns } => {
                match columns.iter().find(|column| row.is_null(column)) {
                    Some(column) => self
                        .failure(format!("column '{column}' is null"))
                        .at(column, Value::Null),
                    None => self.success(),
                }
            }

            RuleSpec::Range { column, min, max } => {
                let Some((column, value)) = self.non_null(row, column) else {
                    return self.success();
                };
                let Some(number) = value.as_f64() else {
                    return self
                        .failure(format!("column '{column}' is not numeric"))
                        .at(column, value.clone());
                };
                if min.is_some_and(|min| number < min) || max.is_some_and(|max| number > max) {
                    return self
                        .failure(format!(
                            "column '{column}' value {number} outside [{}, {}]",
                            bound_text(min),
                            bound_text(max)
                        ))
                        .at(column, value.clone());
                }
                self.success()
            }

            RuleSpec::Pattern { column, pattern } => {
                let Some(pattern) = pattern else {
                    return self.success();
                };
                let Some((column, value)) = self.non_null(row, column) else {
                    return self.success();
                };
                if pattern.is_match(&value.to_string()) {
                    self.success()
                } else {
                    self.failure(format!(
                        "column '{column}' does not match pattern '{}'",
                        pattern.as_str()
                    ))
                    .at(column, value.clone())
                }
            }

            RuleSpec::Length { column, min, max } => {
                let Some((column, value)) = self.non_null(row, column) else {
                    return self.success();
                };
                let length = value.to_string().chars().count();
                if min.is_some_and(|min| length < min) || max.is_some_and(|max| length > max) {
                    return self
                        .failure(format!(
                            "column '{column}' length {length} outside [{}, {}]",
                            bound_text(&min.map(|n| n as f64)),
                            bound_text(&max.map(|n| n as f64))
                        ))
                        .at(column, value.clone());
                }
                self.success()
            }

            RuleSpec::DateRange { column, min, max } => {
                let Some((column, value)) = self.non_null(row, column) else {
                    return self.success();
                };
                let Some(date) = value.as_date() else {
                    return self
                        .failure(format!("column '{column}' is not a date"))
                        .at(column, value.clone());
                };
                let min = min.map(|bound| bound.resolve(today));
                let max = max.map(|bound| bound.resolve(today));
                if min.is_some_and(|min| date < min) || max.is_some_and(|max| date > max) {
                    return self
                        .failure(format!(
                            "column '{column}' date {date} outside [{}, {}]",
                            min.map_or_else(|| "-".to_string(), |d| d.to_string()),
                            max.map_or_else(|| "-".to_string(), |d| d.to_string())
                        ))
                        .at(column, value.clone());
                }
                self.success()
            }

            RuleSpec::Unique { .. } | RuleSpec::Referential { .. } => {
                self.skipped("evaluated at batch scope")
            }

            RuleSpec::Custom { .. } => self.skipped("CUSTOM rules are not supported"),

            RuleSpec::Unsupported => {
                self.skipped(format!("unknown rule type '{}'", self.rule_type))
            }
        }
    }

    fn non_null<'r>(&self, row: &'r Row, column: &Option<String>) -> Option<(&'r str, &'r Value)> {
        let column = column.as_deref()?;
        row.iter()
            .find(|(name, value)| *name == column && !value.is_null())
    }

    pub(crate) fn success(&self) -> ValidationResult {
        ValidationResult::new(self, RuleStatus::Passed, None)
    }

    pub(crate) fn failure(&self, message: impl Into<String>) -> ValidationResult {
        ValidationResult::new(self, RuleStatus::Failed, Some(message.into()))
    }

    pub(crate) fn skipped(&self, message: impl Into<String>) -> ValidationResult {
        ValidationResult::new(self, RuleStatus::Skipped, Some(message.into()))
    }
}

fn bound_text(bound: &Option<f64>) -> String {
    bound.map_or_else(|| "-".to_string(), |b| b.to_string())
}

/// Outcome of evaluating one rule against one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    /// The rule held
    Passed,
    /// The rule was violated
    Failed,
    /// The rule could not be evaluated
    Skipped,
}

impl RuleStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Passed => "passed",
            RuleStatus::Failed => "failed",
            RuleStatus::Skipped => "skipped",
        }
    }
}

/// The result of evaluating one rule against one row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    /// Code of the evaluated rule
    pub rule_code: String,
    /// Type of the evaluated rule
    pub rule_type: String,
    /// Evaluation status
    pub status: RuleStatus,
    /// Severity of the rule
    pub severity: Severity,
    /// Failure or skip explanation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Offending column
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Offending value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Position of the row within its batch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_index: Option<usize>,
    /// Display identifier of the row
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_id: Option<String>,
}

impl ValidationResult {
    fn new(rule: &DataQualityRule, status: RuleStatus, message: Option<String>) -> Self {
        Self {
            rule_code: rule.code.clone(),
            rule_type: rule.rule_type.to_string(),
            status,
            severity: rule.severity,
            message,
            column: None,
            value: None,
            row_index: None,
            row_id: None,
        }
    }

    /// Attaches the offending column and value.
    pub fn at(mut self, column: impl Into<String>, value: Value) -> Self {
        self.column = Some(column.into());
        self.value = Some(value);
        self
    }

    /// Attaches the row position and identifier.
    pub fn for_row(mut self, row_index: usize, row: &Row) -> Self {
        self.row_index = Some(row_index);
        self.row_id = Some(row.display_id());
        self
    }

    /// True for passed and skipped results.
    pub fn passed(&self) -> bool {
        !self.is_failure()
    }

    /// True when the rule was violated.
    pub fn is_failure(&self) -> bool {
        self.status == RuleStatus::Failed
    }

    /// True when the rule was skipped.
    pub fn is_skipped(&self) -> bool {
        self.status == RuleStatus::Skipped
    }

    /// True when the failure blocks the row in reject mode.
    pub fn is_blocking(&self) -> bool {
        self.is_failure() && self.severity.is_blocking()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(rule_type: &str, severity: &str, parameters: serde_json::Value) -> DataQualityRule {
        DataQualityRule::from_record(&RuleRecord::new("DQ_T", rule_type, severity, parameters))
            .unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    #[test]
    fn test_severity_order_and_blocking() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
        assert!(!Severity::Warning.is_blocking());
        assert!(Severity::Error.is_blocking());
        assert!(Severity::Critical.is_blocking());
        assert_eq!("warn".parse::<Severity>().unwrap(), Severity::Warning);
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn test_not_null_carries_rule_severity() {
        let rule = rule("NOT_NULL", "CRITICAL", json!({"columns": ["id", "email"]}));
        let row = Row::new().with("id", 1).with("email", Value::Null);
        let result = rule.evaluate_row(&row, today());
        assert_eq!(result.status, RuleStatus::Failed);
        assert_eq!(result.severity, Severity::Critical);
        assert_eq!(result.rule_code, "DQ_T");
        assert_eq!(result.column.as_deref(), Some("email"));
        assert!(result.is_blocking());
    }

    #[test]
    fn test_not_null_absent_column_fails() {
        let rule = rule("NOT_NULL", "ERROR", json!({"column": "id"}));
        let result = rule.evaluate_row(&Row::new().with("name", "x"), today());
        assert!(result.is_failure());
    }

    #[test]
    fn test_range_inclusive_bounds() {
        let rule = rule("RANGE", "ERROR", json!({"column": "age", "min": 0, "max": "120"}));
        for (age, ok) in [(0, true), (120, true), (-1, false), (121, false)] {
            let result = rule.evaluate_row(&Row::new().with("age", age), today());
            assert_eq!(result.passed(), ok, "age {age}");
        }
    }

    #[test]
    fn test_range_null_and_non_numeric() {
        let rule = rule("RANGE", "ERROR", json!({"column": "age", "min_value": 0}));
        assert!(rule
            .evaluate_row(&Row::new().with("age", Value::Null), today())
            .passed());
        assert!(rule
            .evaluate_row(&Row::new().with("age", "old"), today())
            .is_failure());
        assert!(rule
            .evaluate_row(&Row::new().with("age", "42"), today())
            .passed());

        let no_column = self::rule("RANGE", "ERROR", json!({"min": 5}));
        assert_eq!(
            no_column
                .evaluate_row(&Row::new().with("x", 1), today())
                .status,
            RuleStatus::Passed
        );
    }

    #[test]
    fn test_pattern() {
        let rule = rule(
            "PATTERN",
            "WARNING",
            json!({"column": "email", "pattern": "^[^@]+@[^@]+$"}),
        );
        assert!(rule
            .evaluate_row(&Row::new().with("email", "a@b.c"), today())
            .passed());
        let failed = rule.evaluate_row(&Row::new().with("email", "nope"), today());
        assert!(failed.is_failure());
        assert!(!failed.is_blocking());

        let vacuous = self::rule("PATTERN", "ERROR", json!({"column": "email"}));
        assert!(vacuous
            .evaluate_row(&Row::new().with("email", "nope"), today())
            .passed());
    }

    #[test]
    fn test_pattern_rejects_bad_regex() {
        let err = DataQualityRule::from_record(&RuleRecord::new(
            "DQ_BAD",
            "PATTERN",
            "ERROR",
            json!({"column": "x", "pattern": "(unclosed"}),
        ))
        .unwrap_err();
        assert!(matches!(err, EtlError::InvalidRule { ref code, .. } if code == "DQ_BAD"));
    }

    #[test]
    fn test_length_counts_characters() {
        let rule = rule(
            "LENGTH",
            "ERROR",
            json!({"column": "code", "min_length": 2, "max_length": 3}),
        );
        assert!(rule
            .evaluate_row(&Row::new().with("code", "éé"), today())
            .passed());
        assert!(rule
            .evaluate_row(&Row::new().with("code", "a"), today())
            .is_failure());
        assert!(rule
            .evaluate_row(&Row::new().with("code", "abcd"), today())
            .is_failure());
    }

    #[test]
    fn test_date_range_with_current_date() {
        let rule = rule(
            "DATE_RANGE",
            "ERROR",
            json!({"column": "born", "min": "1900-01-01", "max": "current date"}),
        );
        let on_today = Row::new().with("born", today());
        let tomorrow = Row::new().with("born", today().succ_opt().unwrap());
        assert!(rule.evaluate_row(&on_today, today()).passed());
        assert!(rule.evaluate_row(&tomorrow, today()).is_failure());
        assert!(rule
            .evaluate_row(&Row::new().with("born", "not a date"), today())
            .is_failure());
        assert!(rule
            .evaluate_row(&Row::new().with("born", "1985-07-01 08:00:00"), today())
            .passed());
    }

    #[test]
    fn test_date_bound_tokens() {
        assert_eq!(DateBound::parse("CURRENT_DATE"), Some(DateBound::CurrentDate));
        assert_eq!(DateBound::parse(" today "), Some(DateBound::CurrentDate));
        assert_eq!(
            DateBound::parse("2020-02-01"),
            Some(DateBound::Fixed(NaiveDate::from_ymd_opt(2020, 2, 1).unwrap()))
        );
        assert_eq!(DateBound::parse("yesterday-ish"), None);
    }

    #[test]
    fn test_batch_scope_and_unsupported_rules_skip() {
        let unique = rule("UNIQUE", "ERROR", json!({"columns": "id, email"}));
        assert!(unique.is_batch_scope());
        assert!(matches!(&unique.spec, RuleSpec::Unique { columns } if columns.len() == 2));
        let row = Row::new().with("id", 1);
        assert_eq!(unique.evaluate_row(&row, today()).status, RuleStatus::Skipped);

        let custom = rule("CUSTOM", "CRITICAL", json!({"sql": "amount > 0"}));
        let result = custom.evaluate_row(&row, today());
        assert!(result.is_skipped());
        assert!(result.passed());
        assert!(result.message.unwrap().contains("not supported"));

        let unknown = rule("FRESHNESS", "ERROR", json!({}));
        assert_eq!(unknown.rule_type, RuleType::Other("FRESHNESS".to_string()));
        assert!(unknown.evaluate_row(&row, today()).is_skipped());
    }

    #[test]
    fn test_parameters_as_json_text() {
        let rule = rule("RANGE", "ERROR", json!("{\"column\": \"qty\", \"max\": 10}"));
        assert!(rule
            .evaluate_row(&Row::new().with("qty", 11), today())
            .is_failure());
    }

    #[test]
    fn test_invalid_records() {
        let bad_severity = RuleRecord::new("DQ_1", "NOT_NULL", "LOUD", json!({}));
        assert!(DataQualityRule::from_record(&bad_severity).is_err());

        let bad_bound = RuleRecord::new("DQ_2", "RANGE", "ERROR", json!({"min": "low"}));
        assert!(DataQualityRule::from_record(&bad_bound).is_err());

        let missing_reference = RuleRecord::new(
            "DQ_3",
            "REFERENTIAL",
            "ERROR",
            json!({"column": "country_id"}),
        );
        assert!(DataQualityRule::from_record(&missing_reference).is_err());

        let not_object = RuleRecord::new("DQ_4", "RANGE", "ERROR", json!([1, 2]));
        assert!(DataQualityRule::from_record(&not_object).is_err());
    }
}
