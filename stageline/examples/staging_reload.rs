//! Reloads a staging table from a source database and prints the report.
//!
//! ```text
//! STAGELINE_SOURCE_URL=sqlite://source.db \
//! STAGELINE_TARGET_URL=sqlite://staging.db \
//! cargo run --example staging_reload -- customers stg_customers
//! ```
//!
//! Without URLs both sides are in-memory databases seeded with a few rows.
//! `STAGELINE_TRUNCATE_BEFORE_LOAD=false` appends instead of replacing and
//! `STAGELINE_DEFAULT_SCHEMA` names the schema on both sides.

use serde_json::json;
use stageline::logging::setup::{init_logging, LoggingConfig};
use stageline::prelude::*;

const DEMO_SOURCE: &str = "
CREATE TABLE customers (id INTEGER, name TEXT, email TEXT, updated_at TEXT);
INSERT INTO customers VALUES
    (1, 'Ada Lovelace', 'ada@example.com', '2024-01-01 10:00:00'),
    (2, 'Alan Turing', 'not-an-email', '2024-01-02 10:00:00'),
    (3, NULL, 'anon@example.com', '2024-01-03 10:00:00');";

const DEMO_TARGET: &str =
    "CREATE TABLE stg_customers (id INTEGER, name TEXT, email TEXT, updated_at TEXT);";

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingConfig::development())?;

    let mut args = std::env::args().skip(1);
    let source_table = args.next().unwrap_or_else(|| "customers".to_string());
    let target_table = args.next().unwrap_or_else(|| "stg_customers".to_string());

    let config = EtlConfig::from_env()?;
    let (source, target) = match (config.source_url.is_some(), config.target_url.is_some()) {
        (true, true) => (config.open_source()?, config.open_target()?),
        _ => {
            let source = SqliteStore::in_memory()?;
            source.execute_script(DEMO_SOURCE)?;
            let target = SqliteStore::in_memory()?;
            target.execute_script(DEMO_TARGET)?;
            let source: SharedStore = std::sync::Arc::new(source);
            let target: SharedStore = std::sync::Arc::new(target);
            (config.bound(source), config.bound(target))
        }
    };

    let catalog = InMemoryRuleCatalog::new()
        .with_rule(
            target_table.as_str(),
            RuleRecord::new("DQ_001", "NOT_NULL", "ERROR", json!({"columns": ["id", "name"]})),
        )
        .with_rule(
            target_table.as_str(),
            RuleRecord::new("DQ_002", "PATTERN", "WARNING", json!({"column": "email", "pattern": "^[^@]+@[^@]+$"})),
        );
    let engine = ValidationEngine::new(&target_table, &catalog, config.action_mode).await?;

    let mut pipeline = TablePipeline::new(
        StoreExtractor::from_config(source, &config),
        ColumnMappingTransformer::passthrough(),
        StagingLoader::from_config(target, &config),
    )
    .with_validation(engine);

    let report = pipeline
        .run_all(&[TableJob::from_config(
            ExtractRequest::table(source_table),
            target_table,
            &config,
        )])
        .await;
    println!("{}", HumanFormatter::new().format_run(&report)?);
    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
