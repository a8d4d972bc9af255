//! Run statistics shared by every pipeline contract.
//!
//! Each contract instance embeds one [`RunStats`] and is its only writer.
//! Counters may be read at any time; timing-derived figures are only
//! available from the immutable [`StatsSnapshot`] produced by
//! [`RunStats::finalize`], so a half-finished run never reports a duration.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// The pipeline stage a statistics record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Pulling rows from a source relation
    Extract,
    /// Casting and mapping rows
    Transform,
    /// Evaluating data-quality rules
    Validate,
    /// Writing rows to a target relation
    Load,
}

impl Stage {
    /// Returns the string representation of the stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Transform => "transform",
            Stage::Validate => "validate",
            Stage::Load => "load",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One error recorded during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    /// Human-readable error message
    pub message: String,
    /// Structured context (table, sub-batch, row id, ...)
    pub context: BTreeMap<String, String>,
    /// When the error was recorded
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    /// Returns a context entry by key.
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }
}

/// Mutable, process-lifetime statistics owned by one contract instance.
#[derive(Debug, Clone)]
pub struct RunStats {
    stage: Stage,
    rows_processed: u64,
    batches_processed: u64,
    started_at: Option<DateTime<Utc>>,
    started: Option<Instant>,
    ended_at: Option<DateTime<Utc>>,
    elapsed: Option<Duration>,
    errors: Vec<ErrorRecord>,
}

impl RunStats {
    /// Creates empty statistics for a stage.
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            rows_processed: 0,
            batches_processed: 0,
            started_at: None,
            started: None,
            ended_at: None,
            elapsed: None,
            errors: Vec::new(),
        }
    }

    /// The stage these statistics describe.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Marks the start of a run. Counters are left untouched; call
    /// [`reset`](Self::reset) between runs.
    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.started = Some(Instant::now());
        self.ended_at = None;
        self.elapsed = None;
    }

    /// Clears counters, errors and timestamps.
    pub fn reset(&mut self) {
        *self = Self::new(self.stage);
    }

    /// Credits one batch of `rows` rows.
    pub fn record_batch(&mut self, rows: usize) {
        self.rows_processed += rows as u64;
        self.batches_processed += 1;
    }

    /// Appends an error without interrupting the run.
    pub fn log_error<I, K, V>(&mut self, message: impl Into<String>, context: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.errors.push(ErrorRecord {
            message: message.into(),
            context: context
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
            timestamp: Utc::now(),
        });
    }

    /// Rows credited so far.
    pub fn rows_processed(&self) -> u64 {
        self.rows_processed
    }

    /// Batches credited so far.
    pub fn batches_processed(&self) -> u64 {
        self.batches_processed
    }

    /// Errors recorded so far.
    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    /// Returns true while a run is started but not finalized.
    pub fn is_running(&self) -> bool {
        self.started.is_some() && self.elapsed.is_none()
    }

    /// Ends the run and produces an immutable snapshot.
    ///
    /// Finalizing a run that was never started yields a zero duration.
    /// Finalizing twice keeps the first end time.
    pub fn finalize(&mut self) -> StatsSnapshot {
        if self.elapsed.is_none() {
            self.elapsed = Some(self.started.map(|s| s.elapsed()).unwrap_or_default());
            self.ended_at = Some(Utc::now());
        }
        self.snapshot_unchecked()
    }

    fn snapshot_unchecked(&self) -> StatsSnapshot {
        let duration = self.elapsed.unwrap_or_default();
        let seconds = duration.as_secs_f64();
        let rows_per_second = if seconds > 0.0 {
            Some(self.rows_processed as f64 / seconds)
        } else {
            None
        };
        StatsSnapshot {
            stage: self.stage,
            rows_processed: self.rows_processed,
            batches_processed: self.batches_processed,
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration,
            rows_per_second,
            errors: self.errors.clone(),
        }
    }
}

/// Immutable statistics for a completed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Stage the run belonged to
    pub stage: Stage,
    /// Rows processed
    pub rows_processed: u64,
    /// Batches processed
    pub batches_processed: u64,
    /// Start timestamp (None when the run was never started)
    pub started_at: Option<DateTime<Utc>>,
    /// End timestamp
    pub ended_at: Option<DateTime<Utc>>,
    /// Wall-clock duration
    #[serde(serialize_with = "serialize_duration_secs")]
    pub duration: Duration,
    /// Throughput, None for a zero-length run
    pub rows_per_second: Option<f64>,
    /// Errors recorded during the run
    pub errors: Vec<ErrorRecord>,
}

impl StatsSnapshot {
    /// Number of errors recorded during the run.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

fn serialize_duration_secs<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}
