//! Validation engines built from a store-backed rule catalog.

#![cfg(feature = "sqlite")]

mod common;

use chrono::{Duration, Local};
use common::FileStore;
use serde_json::json;
use stageline::types::{Row, Value};
use stageline::validation::{
    ActionMode, InMemoryRuleCatalog, RuleRecord, Severity, StoreRuleCatalog, ValidationEngine,
    REFERENCE_LOOKUP_CHUNK,
};

const RULES_DDL: &str = r#"
CREATE TABLE etl_data_quality_rules (
    mapping_id TEXT, rule_code TEXT, rule_type TEXT, severity TEXT,
    parameters TEXT, is_active INTEGER, description TEXT
);
INSERT INTO etl_data_quality_rules VALUES
    ('stg_orders', 'DQ_ORD_001', 'NOT_NULL', 'CRITICAL', '{"columns": "order_id, customer_id"}', 1, NULL),
    ('stg_orders', 'DQ_ORD_002', 'RANGE', 'ERROR', '{"column": "amount", "min_value": "0", "max_value": 100}', 1, 'amount bounds'),
    ('stg_orders', 'DQ_ORD_003', 'DATE_RANGE', 'ERROR', '{"column": "order_date", "max_date": "CURRENT_DATE"}', 1, NULL),
    ('stg_orders', 'DQ_ORD_004', 'PATTERN', 'WARNING', '{"column": "status", "regex": "^[A-Z]+$"}', 1, NULL),
    ('stg_orders', 'DQ_ORD_005', 'CUSTOM', 'ERROR', '{"sql": "amount > 0"}', 1, NULL),
    ('stg_orders', 'DQ_ORD_006', 'LENGTH', 'ERROR', '{"column": "status", "max_length": 1}', 0, NULL);
"#;

fn order(id: i64, amount: f64, days_from_today: i64, status: &str) -> Row {
    let date = Local::now().date_naive() + Duration::days(days_from_today);
    Row::new()
        .with("order_id", id)
        .with("customer_id", 1)
        .with("amount", amount)
        .with("order_date", date)
        .with("status", status)
}

#[tokio::test]
async fn test_store_catalog_drives_reject_mode() {
    let rules = FileStore::with_script(RULES_DDL);
    let catalog = StoreRuleCatalog::new(rules.shared());
    let mut engine = ValidationEngine::new("stg_orders", &catalog, ActionMode::Reject)
        .await
        .unwrap();
    // the inactive LENGTH rule is not loaded
    assert_eq!(engine.rules().len(), 5);

    let rows = vec![
        order(1, 0.0, 0, "NEW"),       // inclusive lower bound, today
        order(2, 100.0, -30, "new"),   // inclusive upper bound, warning only
        order(3, 100.01, 0, "NEW"),    // above range
        order(4, 10.0, 1, "NEW"),      // tomorrow
        order(5, 10.0, 0, "NEW").with("customer_id", Value::Null),
    ];
    let outcome = engine.validate(&rows).await.unwrap();

    let admitted: Vec<_> = outcome
        .admitted
        .iter()
        .map(|r| r.get("order_id").cloned().unwrap())
        .collect();
    assert_eq!(admitted, vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(outcome.rejected.len(), 3);

    // every rule yields a result for every row
    assert_eq!(outcome.results.len(), rows.len() * 5);
    assert_eq!(
        outcome
            .results
            .iter()
            .filter(|r| r.rule_code == "DQ_ORD_005")
            .filter(|r| r.is_skipped())
            .count(),
        rows.len()
    );

    let stats = engine.stats();
    assert_eq!(stats.rows_rejected, 3);
    assert_eq!(stats.violations_by_severity.get(&Severity::Warning), Some(&1));
    assert_eq!(stats.violations_by_severity.get(&Severity::Critical), Some(&1));
    assert_eq!(stats.violations_by_rule.get("DQ_ORD_002"), Some(&1));
}

#[tokio::test]
async fn test_warn_and_log_modes_admit_everything() {
    let rules = FileStore::with_script(RULES_DDL);
    let catalog = StoreRuleCatalog::new(rules.shared());
    let rows = vec![order(1, -5.0, 3, "bad"), order(2, 50.0, 0, "OK")];

    for mode in [ActionMode::Warn, ActionMode::Log] {
        let mut engine = ValidationEngine::new("stg_orders", &catalog, mode)
            .await
            .unwrap();
        let outcome = engine.validate(&rows).await.unwrap();
        assert_eq!(outcome.admitted.len(), 2, "{mode}");
        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.failures().count(), 3);
    }
}

#[tokio::test]
async fn test_referential_lookup_spans_chunks() {
    let reference = FileStore::with_script(
        "CREATE TABLE customers (id INTEGER PRIMARY KEY);
         INSERT INTO customers (id)
             WITH RECURSIVE seq(n) AS (SELECT 2 UNION ALL SELECT n + 2 FROM seq WHERE n < 1200)
             SELECT n FROM seq;",
    );
    let catalog = InMemoryRuleCatalog::new().with_rule(
        "stg_orders",
        RuleRecord::new(
            "DQ_ORD_FK",
            "REFERENTIAL",
            "ERROR",
            json!({"column": "customer_id", "ref_table": "customers", "ref_column": "id"}),
        ),
    );
    let mut engine = ValidationEngine::new("stg_orders", &catalog, ActionMode::Reject)
        .await
        .unwrap()
        .with_reference_store(reference.shared());

    let total = 1200usize;
    assert!(total > 2 * REFERENCE_LOOKUP_CHUNK);
    let mut rows: Vec<Row> = (1..=total as i64)
        .map(|id| Row::new().with("order_id", id).with("customer_id", id))
        .collect();
    rows.push(Row::new().with("order_id", 0).with("customer_id", Value::Null));

    let outcome = engine.validate(&rows).await.unwrap();
    assert_eq!(outcome.rejected.len(), total / 2);
    assert_eq!(outcome.admitted.len(), total / 2 + 1);
    assert!(outcome
        .rejected
        .iter()
        .all(|row| matches!(row.get("customer_id"), Some(Value::Int(n)) if n % 2 == 1)));
}

#[tokio::test]
async fn test_referential_without_store_is_skipped() {
    let catalog = InMemoryRuleCatalog::new().with_rule(
        "stg_orders",
        RuleRecord::new(
            "DQ_ORD_FK",
            "REFERENTIAL",
            "ERROR",
            json!({"column": "customer_id", "reference_table": "customers", "reference_column": "id"}),
        ),
    );
    let mut engine = ValidationEngine::new("stg_orders", &catalog, ActionMode::Reject)
        .await
        .unwrap();
    let outcome = engine
        .validate(&[Row::new().with("customer_id", 42)])
        .await
        .unwrap();
    assert_eq!(outcome.admitted.len(), 1);
    assert!(outcome.results[0].is_skipped());
}
