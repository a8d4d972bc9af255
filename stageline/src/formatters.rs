//! Rendering of pipeline reports.
//!
//! Two formatters ship with the crate: [`HumanFormatter`] for terminals and
//! logs, and [`JsonFormatter`] for machines.
//!
//! ```rust,no_run
//! use stageline::formatters::{FormatterConfig, HumanFormatter, ReportFormatter};
//! # fn show(report: &stageline::pipeline::RunReport) -> stageline::error::Result<()> {
//! let formatter = HumanFormatter::with_config(FormatterConfig::ci());
//! println!("{}", formatter.format_run(report)?);
//! # Ok(())
//! # }
//! ```

use std::fmt::{self, Write};

use crate::error::{EtlError, Result};
use crate::pipeline::{RunReport, TableReport};
use crate::stats::StatsSnapshot;

/// Options shared by the formatters.
#[derive(Debug, Clone)]
pub struct FormatterConfig {
    /// Include per-stage statistics
    pub include_stages: bool,
    /// Include recorded error entries
    pub include_errors: bool,
    /// Maximum number of error entries per stage; all when absent
    pub max_errors: Option<usize>,
    /// ANSI colors (human formatter only)
    pub use_colors: bool,
    /// Include start timestamps
    pub include_timestamps: bool,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            include_stages: true,
            include_errors: true,
            max_errors: None,
            use_colors: true,
            include_timestamps: true,
        }
    }
}

impl FormatterConfig {
    /// Totals only.
    pub fn minimal() -> Self {
        Self {
            include_stages: false,
            include_errors: false,
            max_errors: Some(0),
            use_colors: false,
            include_timestamps: false,
        }
    }

    /// Everything.
    pub fn detailed() -> Self {
        Self::default()
    }

    /// No colors and a bounded error listing.
    pub fn ci() -> Self {
        Self {
            include_stages: true,
            include_errors: true,
            max_errors: Some(20),
            use_colors: false,
            include_timestamps: true,
        }
    }

    /// Sets whether recorded errors are listed.
    pub fn with_errors(mut self, include: bool) -> Self {
        self.include_errors = include;
        self
    }

    /// Caps the number of listed errors per stage.
    pub fn with_max_errors(mut self, max: usize) -> Self {
        self.max_errors = Some(max);
        self
    }

    /// Sets whether to use colors.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }
}

/// Turns reports into text.
pub trait ReportFormatter {
    /// Formats a single table report.
    fn format_table(&self, report: &TableReport) -> Result<String>;

    /// Formats a multi-table run.
    fn format_run(&self, report: &RunReport) -> Result<String>;
}

/// Plain-text formatter.
#[derive(Debug, Clone, Default)]
pub struct HumanFormatter {
    config: FormatterConfig,
}

impl HumanFormatter {
    /// Creates a formatter with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a formatter with a custom configuration.
    pub fn with_config(config: FormatterConfig) -> Self {
        Self { config }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if self.config.use_colors {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn write_table(&self, out: &mut String, report: &TableReport) -> fmt::Result {
        let marker = if report.rows_rejected == 0 {
            self.paint("OK", "32")
        } else {
            self.paint("REJECTIONS", "33")
        };
        writeln!(
            out,
            "[{marker}] {} -> {} ({:?})",
            report.source_table, report.target_table, report.mode
        )?;
        writeln!(
            out,
            "  extracted {}, transformed {}, rejected {}, loaded {}",
            report.rows_extracted, report.rows_transformed, report.rows_rejected, report.rows_loaded
        )?;
        if let Some(watermark) = &report.watermark {
            writeln!(out, "  watermark: {watermark}")?;
        }
        if let Some(validation) = &report.validation {
            for (severity, count) in &validation.violations_by_severity {
                writeln!(out, "  {severity} violations: {count}")?;
            }
        }
        if self.config.include_stages {
            self.write_stage(out, &report.extract)?;
            self.write_stage(out, &report.transform)?;
            if let Some(validate) = &report.validate {
                self.write_stage(out, validate)?;
            }
            self.write_stage(out, &report.load)?;
        }
        Ok(())
    }

    fn write_stage(&self, out: &mut String, snapshot: &StatsSnapshot) -> fmt::Result {
        write!(
            out,
            "  {:<9} {} rows in {} batches, {:.2}s",
            snapshot.stage.as_str(),
            snapshot.rows_processed,
            snapshot.batches_processed,
            snapshot.duration.as_secs_f64()
        )?;
        if let Some(rate) = snapshot.rows_per_second {
            write!(out, " ({rate:.0} rows/s)")?;
        }
        if self.config.include_timestamps {
            if let Some(started) = snapshot.started_at {
                write!(out, " started {}", started.format("%Y-%m-%d %H:%M:%S"))?;
            }
        }
        writeln!(out)?;

        if !self.config.include_errors || snapshot.errors.is_empty() {
            return Ok(());
        }
        let limit = self.config.max_errors.unwrap_or(usize::MAX);
        for record in snapshot.errors.iter().take(limit) {
            writeln!(out, "    {} {}", self.paint("!", "31"), record.message)?;
        }
        if snapshot.errors.len() > limit {
            writeln!(out, "    ... and {} more", snapshot.errors.len() - limit)?;
        }
        Ok(())
    }

    fn write_run(&self, out: &mut String, report: &RunReport) -> fmt::Result {
        let status = if report.is_success() {
            self.paint("SUCCESS", "32")
        } else {
            self.paint("FAILED", "31")
        };
        writeln!(out, "Run {status}")?;
        if self.config.include_timestamps {
            writeln!(out, "Started: {}", report.started_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        }
        writeln!(
            out,
            "Tables: {} loaded, {} failed; {} rows loaded, {} rejected in {:.2}s",
            report.tables.len(),
            report.failures.len(),
            report.total_rows_loaded(),
            report.total_rows_rejected(),
            report.duration_secs
        )?;
        for table in &report.tables {
            writeln!(out)?;
            self.write_table(out, table)?;
        }
        if !report.failures.is_empty() {
            writeln!(out)?;
            writeln!(out, "Failures:")?;
            for failure in &report.failures {
                writeln!(out, "  {}: {}", failure.target_table, failure.error)?;
            }
        }
        Ok(())
    }
}

fn render(f: impl FnOnce(&mut String) -> fmt::Result) -> Result<String> {
    let mut out = String::new();
    f(&mut out).map_err(|e| EtlError::Internal(format!("report formatting failed: {e}")))?;
    Ok(out)
}

impl ReportFormatter for HumanFormatter {
    fn format_table(&self, report: &TableReport) -> Result<String> {
        render(|out| self.write_table(out, report))
    }

    fn format_run(&self, report: &RunReport) -> Result<String> {
        render(|out| self.write_run(out, report))
    }
}

/// JSON formatter built on the reports' `Serialize` impls.
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    pretty: bool,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl JsonFormatter {
    /// Pretty-printed output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-line output.
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    fn to_string<T: serde::Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json)
    }
}

impl ReportFormatter for JsonFormatter {
    fn format_table(&self, report: &TableReport) -> Result<String> {
        self.to_string(report)
    }

    fn format_run(&self, report: &RunReport) -> Result<String> {
        self.to_string(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{LoadMode, TableFailure};
    use crate::stats::{RunStats, Stage};
    use crate::types::Value;
    use chrono::Utc;

    fn snapshot(stage: Stage, rows: usize, errors: usize) -> StatsSnapshot {
        let mut stats = RunStats::new(stage);
        stats.start();
        stats.record_batch(rows);
        for i in 0..errors {
            stats.log_error(format!("problem {i}"), [("row_index", i.to_string())]);
        }
        stats.finalize()
    }

    fn table_report() -> TableReport {
        TableReport {
            source_table: "orders".into(),
            target_table: "stg_orders".into(),
            mode: LoadMode::Replace,
            rows_extracted: 10,
            rows_transformed: 9,
            rows_rejected: 2,
            rows_loaded: 7,
            watermark: Some(Value::Int(42)),
            extract: snapshot(Stage::Extract, 10, 0),
            transform: snapshot(Stage::Transform, 9, 3),
            validate: None,
            validation: None,
            load: snapshot(Stage::Load, 7, 0),
        }
    }

    #[test]
    fn test_human_table_without_colors() {
        let formatter = HumanFormatter::with_config(FormatterConfig::ci().with_max_errors(1));
        let text = formatter.format_table(&table_report()).unwrap();
        assert!(text.starts_with("[REJECTIONS] orders -> stg_orders (Replace)"));
        assert!(text.contains("extracted 10, transformed 9, rejected 2, loaded 7"));
        assert!(text.contains("watermark: 42"));
        assert!(text.contains("problem 0"));
        assert!(!text.contains("problem 1"));
        assert!(text.contains("... and 2 more"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn test_minimal_hides_stages() {
        let formatter = HumanFormatter::with_config(FormatterConfig::minimal());
        let text = formatter.format_table(&table_report()).unwrap();
        assert!(!text.contains("rows in"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_human_run_lists_failures() {
        let report = RunReport {
            tables: vec![table_report()],
            failures: vec![TableFailure {
                target_table: "stg_items".into(),
                error: "Store error (query): no such table".into(),
            }],
            started_at: Utc::now(),
            duration_secs: 1.5,
        };
        let text = HumanFormatter::with_config(FormatterConfig::minimal())
            .format_run(&report)
            .unwrap();
        assert!(text.starts_with("Run FAILED"));
        assert!(text.contains("1 loaded, 1 failed; 7 rows loaded, 2 rejected"));
        assert!(text.contains("stg_items: Store error (query): no such table"));
    }

    #[test]
    fn test_json_table() {
        let json = JsonFormatter::compact().format_table(&table_report()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["target_table"], "stg_orders");
        assert_eq!(parsed["mode"], "replace");
        assert_eq!(parsed["rows_loaded"], 7);
        assert_eq!(parsed["watermark"], 42);
        assert!(!json.contains('\n'));
    }
}
