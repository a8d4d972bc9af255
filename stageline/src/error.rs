//! Error types for the stageline runtime.
//!
//! All fallible operations return [`EtlError`]. Connectivity, query and load
//! failures always surface to the caller; cast and validation problems are
//! absorbed into statistics and never reach this type.

use std::time::Duration;
use thiserror::Error;

/// The main error type for stageline.
#[derive(Error, Debug)]
pub enum EtlError {
    /// A store connection failed to serve a query or statement.
    #[error("Store error ({operation}): {message}")]
    Store {
        /// The store operation that failed (e.g. "query", "commit")
        operation: String,
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Error from the embedded SQLite store.
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A store operation exceeded its deadline.
    #[error("Store operation '{operation}' timed out after {elapsed:?}")]
    Timeout {
        /// The store operation that was cancelled
        operation: String,
        /// The deadline that was exceeded
        elapsed: Duration,
    },

    /// A sub-batch write failed and the load transaction was rolled back.
    #[error("Load into '{table}' failed at sub-batch {sub_batch}: {source}")]
    LoadFailed {
        /// Qualified target table
        table: String,
        /// 1-based index of the failing sub-batch
        sub_batch: usize,
        /// The store error that caused the rollback
        #[source]
        source: Box<EtlError>,
    },

    /// Rows handed to a loader do not share the first row's column set.
    #[error("Row {row_index} does not match the batch shape: expected columns [{expected}], found [{found}]")]
    RowShapeMismatch {
        /// Position of the offending row within the batch
        row_index: usize,
        /// Comma-separated columns of the first row
        expected: String,
        /// Comma-separated columns of the offending row
        found: String,
    },

    /// A single row could not be transformed.
    #[error("Transform failed for row '{row_id}': {message}")]
    Transform {
        /// Display identifier of the row
        row_id: String,
        /// Detailed error message
        message: String,
    },

    /// A catalog record could not be decoded into a data-quality rule.
    #[error("Invalid data-quality rule '{code}': {message}")]
    InvalidRule {
        /// Stable rule code from the catalog
        code: String,
        /// Detailed error message
        message: String,
    },

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error related to configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Security-related error (identifier or expression rejected).
    #[error("Security error: {0}")]
    SecurityError(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, EtlError>`.
pub type Result<T> = std::result::Result<T, EtlError>;

impl EtlError {
    /// Creates a new store error.
    pub fn store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new store error with a source error.
    pub fn store_with_source(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a new transform error.
    pub fn transform(row_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transform {
            row_id: row_id.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid-rule error.
    pub fn invalid_rule(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRule {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns true for failures caused by the store rather than by the data.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Store { .. } | Self::Timeout { .. } => true,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => true,
            Self::LoadFailed { source, .. } => source.is_connectivity(),
            _ => false,
        }
    }
}
