//! Benchmarks for batch transformation and validation.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use stageline::transform::{ColumnMapping, ColumnMappingTransformer, TargetType, Transformer};
use stageline::types::Row;
use stageline::validation::{ActionMode, InMemoryRuleCatalog, RuleRecord, ValidationEngine};
use tokio::runtime::Runtime;

fn order_rows(count: usize) -> Vec<Row> {
    (0..count as i64)
        .map(|id| {
            Row::new()
                .with("order_id", id)
                .with("customer_id", id % 97)
                .with("amount", format!("{}.{:02}", id % 500, id % 100))
                .with("status", if id % 13 == 0 { "unknown" } else { "SHIPPED" })
                .with("order_date", "2024-05-17")
        })
        .collect()
}

fn catalog() -> InMemoryRuleCatalog {
    InMemoryRuleCatalog::new()
        .with_rule(
            "stg_orders",
            RuleRecord::new("NN", "NOT_NULL", "ERROR", json!({"columns": ["order_id", "customer_id"]})),
        )
        .with_rule(
            "stg_orders",
            RuleRecord::new("RNG", "RANGE", "ERROR", json!({"column": "amount", "min": 0, "max": 450})),
        )
        .with_rule(
            "stg_orders",
            RuleRecord::new("PAT", "PATTERN", "WARNING", json!({"column": "status", "pattern": "^[A-Z]+$"})),
        )
        .with_rule(
            "stg_orders",
            RuleRecord::new("DT", "DATE_RANGE", "ERROR", json!({"column": "order_date", "min": "2020-01-01", "max": "current_date"})),
        )
        .with_rule(
            "stg_orders",
            RuleRecord::new("UQ", "UNIQUE", "ERROR", json!({"column": "order_id"})),
        )
}

fn bench_validate(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let catalog = catalog();

    let mut group = c.benchmark_group("validate_batch");
    for size in [1_000usize, 10_000] {
        let rows = order_rows(size);
        group.throughput(Throughput::Elements(size as u64));
        for mode in [ActionMode::Reject, ActionMode::Warn] {
            let mut engine = rt
                .block_on(ValidationEngine::new("stg_orders", &catalog, mode))
                .unwrap();
            group.bench_with_input(BenchmarkId::new(mode.as_str(), size), &rows, |b, rows| {
                b.iter(|| rt.block_on(engine.validate(black_box(rows))).unwrap());
            });
        }
    }
    group.finish();
}

fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform_batch");
    let rows = order_rows(10_000);
    group.throughput(Throughput::Elements(rows.len() as u64));

    let mut casting = ColumnMappingTransformer::new(vec![
        ColumnMapping::same("order_id"),
        ColumnMapping::same("customer_id"),
        ColumnMapping::same("amount").cast(TargetType::Float),
        ColumnMapping::new("status", "order_status").default_value("UNKNOWN"),
        ColumnMapping::same("order_date").cast(TargetType::DateLike),
    ]);
    group.bench_function("mapped_with_casts", |b| {
        b.iter(|| casting.transform(black_box(&rows)))
    });

    let mut passthrough = ColumnMappingTransformer::passthrough();
    group.bench_function("passthrough", |b| {
        b.iter(|| passthrough.transform(black_box(&rows)))
    });
    group.finish();
}

criterion_group!(benches, bench_validate, bench_transform);
criterion_main!(benches);
