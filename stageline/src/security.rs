//! Security utilities for statement assembly.
//!
//! Every table, schema and column name that ends up in SQL text passes
//! through [`SqlSecurity`] first. Filter conditions stay opaque, but are
//! screened for statement separators and comments before they are spliced
//! into a WHERE clause.

use crate::error::{EtlError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A secure string that automatically clears its contents when dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SecureString(String);

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecureString(***)")
    }
}

impl SecureString {
    /// Create a new secure string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the string value. Use carefully and avoid storing the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Convert to a regular string. The SecureString will be zeroized.
    pub fn into_string(mut self) -> String {
        let value = std::mem::take(&mut self.0);
        self.0.zeroize();
        value
    }
}

impl From<String> for SecureString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecureString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Longest identifier accepted in generated SQL.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
    // Compile-time constant pattern
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("Hard-coded regex pattern should be valid")
});

/// SQL identifier validation and escaping utilities.
pub struct SqlSecurity;

impl SqlSecurity {
    /// Validates a single (unqualified) SQL identifier.
    ///
    /// Identifiers must start with a letter or underscore and contain only
    /// letters, digits, underscores and `$`. Dotted names are rejected; pass
    /// schema and table separately.
    ///
    /// # Examples
    /// ```rust
    /// use stageline::security::SqlSecurity;
    ///
    /// assert!(SqlSecurity::validate_identifier("updated_at").is_ok());
    /// assert!(SqlSecurity::validate_identifier("id; DROP TABLE users--").is_err());
    /// assert!(SqlSecurity::validate_identifier(&"x".repeat(200)).is_err());
    /// ```
    pub fn validate_identifier(identifier: &str) -> Result<()> {
        if identifier.trim().is_empty() {
            return Err(EtlError::SecurityError(
                "SQL identifier cannot be empty or whitespace-only".to_string(),
            ));
        }

        if identifier.len() > MAX_IDENTIFIER_LENGTH {
            return Err(EtlError::SecurityError(format!(
                "SQL identifier too long (max {MAX_IDENTIFIER_LENGTH} characters)"
            )));
        }

        if identifier.contains('\0') {
            return Err(EtlError::SecurityError(
                "SQL identifier cannot contain null bytes".to_string(),
            ));
        }

        if !IDENTIFIER_REGEX.is_match(identifier) {
            return Err(EtlError::SecurityError(format!(
                "Invalid SQL identifier format: '{identifier}'. Identifiers must start with a letter or underscore and contain only letters, numbers, underscores and '$'"
            )));
        }

        Ok(())
    }

    /// Validates an identifier and wraps it in the given quote character.
    ///
    /// ```rust
    /// use stageline::security::SqlSecurity;
    ///
    /// assert_eq!(SqlSecurity::quote_identifier("customer_id", '"').unwrap(), "\"customer_id\"");
    /// assert_eq!(SqlSecurity::quote_identifier("customer_id", '`').unwrap(), "`customer_id`");
    /// ```
    pub fn quote_identifier(identifier: &str, quote: char) -> Result<String> {
        Self::validate_identifier(identifier)?;
        Ok(format!("{quote}{identifier}{quote}"))
    }

    /// Screens an opaque filter condition before it is embedded in a
    /// WHERE clause.
    ///
    /// The condition is not parsed. It is rejected when it could terminate
    /// the statement or hide trailing text: semicolons, comment markers and
    /// NUL bytes.
    pub fn validate_filter_condition(condition: &str) -> Result<()> {
        if condition.trim().is_empty() {
            return Err(EtlError::SecurityError(
                "Filter condition cannot be empty".to_string(),
            ));
        }

        if condition.len() > 5000 {
            return Err(EtlError::SecurityError(
                "Filter condition too long (max 5000 characters)".to_string(),
            ));
        }

        for marker in ["\0", ";", "--", "/*", "*/"] {
            if condition.contains(marker) {
                return Err(EtlError::SecurityError(format!(
                    "Filter condition contains forbidden sequence '{}'",
                    marker.escape_default()
                )));
            }
        }

        Ok(())
    }

    /// Validates a regex pattern used by a PATTERN rule.
    pub fn validate_regex_pattern(pattern: &str) -> Result<Regex> {
        if pattern.len() > 1000 {
            return Err(EtlError::SecurityError(
                "Regex pattern too long (max 1000 characters)".to_string(),
            ));
        }

        // Classic catastrophic-backtracking shapes only
        for dangerous in ["(.*)*", "(.*)+", "(.+)+", "(a+)+", "(a*)*"] {
            if pattern.contains(dangerous) {
                return Err(EtlError::SecurityError(
                    "Regex pattern might cause ReDoS attack".to_string(),
                ));
            }
        }

        Regex::new(pattern)
            .map_err(|e| EtlError::SecurityError(format!("Invalid regex pattern: {e}")))
    }
}
