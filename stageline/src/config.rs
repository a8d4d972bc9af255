//! Runtime configuration.
//!
//! Values come from `STAGELINE_*` environment variables, optionally seeded
//! from a `.env` file. Database locations are held as [`SecureString`] so
//! they are zeroized on drop and never printed by `Debug`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EtlError, Result};
use crate::security::SecureString;
use crate::store::{DeadlineStore, SharedStore};
use crate::validation::ActionMode;

/// Default number of rows per batch and per load sub-batch.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Prefix shared by every configuration variable.
pub const ENV_PREFIX: &str = "STAGELINE_";

/// Configuration shared by the pipeline contracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    /// Rows per extracted batch and per load sub-batch
    pub batch_size: usize,
    /// Whether `load` truncates the target before writing
    pub truncate_before_load: bool,
    /// Policy applied to rows failing blocking rules
    pub action_mode: ActionMode,
    /// Schema used when a caller names none; the dialect default otherwise
    pub default_schema: Option<String>,
    /// Per-statement deadline in seconds
    pub statement_timeout_secs: Option<u64>,
    /// Source database location
    #[serde(skip)]
    pub source_url: Option<SecureString>,
    /// Target database location
    #[serde(skip)]
    pub target_url: Option<SecureString>,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            truncate_before_load: true,
            action_mode: ActionMode::Reject,
            default_schema: None,
            statement_timeout_secs: None,
            source_url: None,
            target_url: None,
        }
    }
}

impl EtlConfig {
    /// Loads configuration from the process environment, reading a `.env`
    /// file first when one exists.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// Keys are the full variable names (`STAGELINE_BATCH_SIZE`, ...).
    /// Absent keys keep their defaults; malformed values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();
        if let Some(raw) = var("BATCH_SIZE") {
            config.batch_size = parse_var("BATCH_SIZE", &raw)?;
        }
        if let Some(raw) = var("TRUNCATE_BEFORE_LOAD") {
            config.truncate_before_load = parse_bool("TRUNCATE_BEFORE_LOAD", &raw)?;
        }
        if let Some(raw) = var("ACTION_MODE") {
            config.action_mode = raw.parse()?;
        }
        config.default_schema = var("DEFAULT_SCHEMA");
        if let Some(raw) = var("STATEMENT_TIMEOUT_SECS") {
            config.statement_timeout_secs = Some(parse_var("STATEMENT_TIMEOUT_SECS", &raw)?);
        }
        config.source_url = var("SOURCE_URL").map(SecureString::from);
        config.target_url = var("TARGET_URL").map(SecureString::from);

        config.validate()?;
        debug!(
            batch_size = config.batch_size,
            action_mode = %config.action_mode,
            truncate_before_load = config.truncate_before_load,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Checks the configuration for values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EtlError::Configuration(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if self.statement_timeout_secs == Some(0) {
            return Err(EtlError::Configuration(
                "statement_timeout_secs must be greater than zero when set".to_string(),
            ));
        }
        if let Some(schema) = &self.default_schema {
            crate::security::SqlSecurity::validate_identifier(schema)
                .map_err(|e| EtlError::Configuration(format!("default_schema: {e}")))?;
        }
        Ok(())
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the action mode.
    pub fn with_action_mode(mut self, mode: ActionMode) -> Self {
        self.action_mode = mode;
        self
    }

    /// Sets the schema used when callers name none.
    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    /// Sets whether `load` truncates first.
    pub fn with_truncate_before_load(mut self, enabled: bool) -> Self {
        self.truncate_before_load = enabled;
        self
    }

    /// Sets the per-statement deadline.
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    /// Per-statement deadline, if configured.
    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_secs.map(Duration::from_secs)
    }

    /// Wraps a connection in a [`DeadlineStore`] when a statement timeout
    /// is configured.
    pub fn bound(&self, store: SharedStore) -> SharedStore {
        match self.statement_timeout() {
            Some(deadline) => std::sync::Arc::new(DeadlineStore::new(store, deadline)),
            None => store,
        }
    }

    /// Opens the configured source as a SQLite store.
    #[cfg(feature = "sqlite")]
    pub fn open_source(&self) -> Result<SharedStore> {
        self.open_sqlite("source", self.source_url.as_ref())
    }

    /// Opens the configured target as a SQLite store.
    #[cfg(feature = "sqlite")]
    pub fn open_target(&self) -> Result<SharedStore> {
        self.open_sqlite("target", self.target_url.as_ref())
    }

    #[cfg(feature = "sqlite")]
    fn open_sqlite(&self, role: &str, url: Option<&SecureString>) -> Result<SharedStore> {
        use crate::store::SqliteStore;

        let url = url.ok_or_else(|| {
            EtlError::Configuration(format!(
                "{ENV_PREFIX}{}_URL is not set",
                role.to_uppercase()
            ))
        })?;
        let location = url.expose();
        let path = location.strip_prefix("sqlite://").unwrap_or(location);
        let store = if path == ":memory:" {
            SqliteStore::in_memory()?
        } else {
            SqliteStore::open(path)?
        };
        Ok(self.bound(std::sync::Arc::new(store)))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse().map_err(|_| {
        EtlError::Configuration(format!("{ENV_PREFIX}{name}: invalid value '{raw}'"))
    })
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(EtlError::Configuration(format!(
            "{ENV_PREFIX}{name}: expected a boolean, got '{raw}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EtlConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.truncate_before_load);
        assert_eq!(config.action_mode, ActionMode::Reject);
        assert!(config.statement_timeout().is_none());
        assert!(config.source_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = EtlConfig::from_lookup(lookup(&[
            ("STAGELINE_BATCH_SIZE", "500"),
            ("STAGELINE_TRUNCATE_BEFORE_LOAD", "no"),
            ("STAGELINE_ACTION_MODE", "warn"),
            ("STAGELINE_DEFAULT_SCHEMA", "staging"),
            ("STAGELINE_STATEMENT_TIMEOUT_SECS", "30"),
            ("STAGELINE_TARGET_URL", "sqlite://:memory:"),
        ]))
        .unwrap();
        assert_eq!(config.batch_size, 500);
        assert!(!config.truncate_before_load);
        assert_eq!(config.action_mode, ActionMode::Warn);
        assert_eq!(config.default_schema.as_deref(), Some("staging"));
        assert_eq!(config.statement_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(
            config.target_url.as_ref().map(SecureString::expose),
            Some("sqlite://:memory:")
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(EtlConfig::from_lookup(lookup(&[("STAGELINE_BATCH_SIZE", "0")])).is_err());
        assert!(EtlConfig::from_lookup(lookup(&[("STAGELINE_BATCH_SIZE", "many")])).is_err());
        assert!(
            EtlConfig::from_lookup(lookup(&[("STAGELINE_STATEMENT_TIMEOUT_SECS", "0")])).is_err()
        );
        assert!(EtlConfig::from_lookup(lookup(&[("STAGELINE_ACTION_MODE", "drop")])).is_err());
        assert!(
            EtlConfig::from_lookup(lookup(&[("STAGELINE_DEFAULT_SCHEMA", "a;b")])).is_err()
        );
    }

    #[test]
    fn test_debug_hides_urls() {
        let config = EtlConfig::from_lookup(lookup(&[(
            "STAGELINE_SOURCE_URL",
            "postgres://etl:hunter2@db/source",
        )]))
        .unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_serde_skips_urls() {
        let config = EtlConfig {
            source_url: Some(SecureString::from("secret")),
            ..EtlConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        let parsed: EtlConfig = serde_json::from_str(r#"{"batch_size": 25}"#).unwrap();
        assert_eq!(parsed.batch_size, 25);
        assert!(parsed.truncate_before_load);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_open_target_in_memory_with_deadline() {
        let config = EtlConfig::from_lookup(lookup(&[
            ("STAGELINE_TARGET_URL", ":memory:"),
            ("STAGELINE_STATEMENT_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        let store = config.open_target().unwrap();
        store.ping().await.unwrap();
        assert!(config.open_source().is_err());
    }
}
