//! Rule catalogs: where data-quality rules come from.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::rules::RuleRecord;
use crate::error::{EtlError, Result};
use crate::store::SharedStore;
use crate::types::{Row, Value};

/// Default catalog table read by [`StoreRuleCatalog`].
pub const DEFAULT_RULES_TABLE: &str = "etl_data_quality_rules";

/// Source of data-quality rules keyed by mapping identifier.
#[async_trait]
pub trait RuleCatalog: Send + Sync {
    /// Returns the rules attached to a mapping, ordered by rule code.
    async fn data_quality_rules(&self, mapping_id: &str, active_only: bool)
        -> Result<Vec<RuleRecord>>;
}

/// Catalog held in memory, mostly for tests and embedded use.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRuleCatalog {
    rules: HashMap<String, Vec<RuleRecord>>,
}

impl InMemoryRuleCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`add_rule`](Self::add_rule).
    pub fn with_rule(mut self, mapping_id: impl Into<String>, record: RuleRecord) -> Self {
        self.add_rule(mapping_id, record);
        self
    }

    /// Attaches a rule to a mapping.
    pub fn add_rule(&mut self, mapping_id: impl Into<String>, record: RuleRecord) {
        self.rules.entry(mapping_id.into()).or_default().push(record);
    }

    /// Number of rules across all mappings.
    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// Returns true if the catalog holds no rules.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RuleCatalog for InMemoryRuleCatalog {
    async fn data_quality_rules(
        &self,
        mapping_id: &str,
        active_only: bool,
    ) -> Result<Vec<RuleRecord>> {
        let mut records: Vec<RuleRecord> = self
            .rules
            .get(mapping_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| !active_only || r.is_active)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by(|a, b| a.rule_code.cmp(&b.rule_code));
        Ok(records)
    }
}

/// Catalog read from a relational table.
///
/// Expected columns: `mapping_id`, `rule_code`, `rule_type`, `severity`,
/// `parameters` (JSON text), `is_active` and `description`.
pub struct StoreRuleCatalog {
    conn: SharedStore,
    schema: Option<String>,
    table: String,
}

impl StoreRuleCatalog {
    /// Reads rules from [`DEFAULT_RULES_TABLE`] in the dialect's default schema.
    pub fn new(conn: SharedStore) -> Self {
        Self {
            conn,
            schema: None,
            table: DEFAULT_RULES_TABLE.to_string(),
        }
    }

    /// Reads rules from another table.
    pub fn with_table(mut self, schema: Option<&str>, table: impl Into<String>) -> Self {
        self.schema = schema.map(str::to_string);
        self.table = table.into();
        self
    }

    fn decode(row: &Row) -> Result<RuleRecord> {
        let text = |column: &str| -> Result<String> {
            match row.get(column) {
                Some(Value::Null) | None => Err(EtlError::Internal(format!(
                    "rule catalog row is missing '{column}'"
                ))),
                Some(value) => Ok(value.to_string()),
            }
        };
        let rule_code = text("rule_code")?;
        let parameters = match row.get("parameters") {
            Some(Value::Text(json)) if !json.trim().is_empty() => serde_json::from_str(json)
                .map_err(|e| {
                    EtlError::invalid_rule(&rule_code, format!("parameters are not valid JSON: {e}"))
                })?,
            _ => serde_json::Value::Object(Default::default()),
        };
        let is_active = match row.get("is_active") {
            Some(Value::Null) | None => true,
            Some(value) => value.as_f64().map_or(true, |flag| flag != 0.0),
        };
        Ok(RuleRecord {
            rule_type: text("rule_type")?,
            severity: text("severity")?,
            rule_code,
            parameters,
            is_active,
            description: row
                .get("description")
                .filter(|v| !v.is_null())
                .map(ToString::to_string),
        })
    }
}

#[async_trait]
impl RuleCatalog for StoreRuleCatalog {
    #[instrument(skip(self))]
    async fn data_quality_rules(
        &self,
        mapping_id: &str,
        active_only: bool,
    ) -> Result<Vec<RuleRecord>> {
        let dialect = self.conn.dialect();
        let table = dialect.qualified_table(self.schema.as_deref(), &self.table)?;
        let mut params = vec![Value::from(mapping_id)];
        let mut sql = format!(
            "SELECT rule_code, rule_type, severity, parameters, is_active, description \
             FROM {table} WHERE mapping_id = {}",
            dialect.placeholder(1)
        );
        if active_only {
            params.push(Value::Bool(true));
            sql.push_str(&format!(" AND is_active = {}", dialect.placeholder(2)));
        }
        sql.push_str(" ORDER BY rule_code");

        let rows = self.conn.query(&sql, &params).await?;
        debug!(mapping_id, rules = rows.len(), "rule catalog read");
        rows.iter().map(Self::decode).collect()
    }
}
