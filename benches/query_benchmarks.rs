//! Filter Query Benchmarks
//!
//! Measures query parsing and evaluation over populated collections:
//! - Parse only (filter + orderby + top)
//! - Static-field filters vs typed extension filters
//! - ORDER BY + TOP over the whole collection
//!
//! Run with: cargo bench --bench query_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use datastore_core::entity::{EntityKind, NewEntity, Outcome};
use datastore_core::query::{QueryEngine, QueryExecutor};
use datastore_core::schema::{ExtensionSchema, FieldRule};
use datastore_core::value::PrimitiveType;
use datastore_core::DataStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SMALL_SIZE: usize = 1_000; // 1K entities
const MEDIUM_SIZE: usize = 10_000; // 10K entities
const LARGE_SIZE: usize = 100_000; // 100K entities

const OUTCOMES: [Outcome; 3] = [Outcome::Passed, Outcome::Failed, Outcome::Indeterminate];

/// Create a store with `count` test results carrying random extensions
fn create_benchmark_store(count: usize) -> DataStore {
    let store = DataStore::builder().build().unwrap();
    store
        .register_schema(
            ExtensionSchema::new("bench")
                .field("test_result.temperature", FieldRule::optional().typed(PrimitiveType::Float))
                .field("test_result.station", FieldRule::optional().typed(PrimitiveType::String)),
        )
        .unwrap();

    let mut rng = StdRng::seed_from_u64(42);
    for i in 0..count {
        store
            .create(
                NewEntity::new(EntityKind::TestResult)
                    .schema_id("bench")
                    .property("name", format!("run-{i}"))
                    .outcome(OUTCOMES[rng.gen_range(0..OUTCOMES.len())])
                    .extension("temperature", rng.gen_range(15.0_f64..85.0))
                    .extension("station", format!("line-{}", rng.gen_range(0..8))),
            )
            .unwrap();
    }
    store
}

/// Benchmark parsing alone
fn bench_parse(c: &mut Criterion) {
    let engine = QueryEngine::new();

    c.bench_function("parse_filter_orderby_top", |b| {
        b.iter(|| {
            black_box(
                engine
                    .parse(black_box(
                        "$filter=outcome eq 'FAILED' and (extensions.temperature gt 60 or contains(name, '7'))&$orderby=started_at desc&$top=25",
                    ))
                    .unwrap(),
            );
        });
    });
}

/// Benchmark static vs extension field filters
fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");

    for size in [SMALL_SIZE, MEDIUM_SIZE, LARGE_SIZE] {
        let store = create_benchmark_store(size);
        let engine = QueryEngine::new();
        let executor = QueryExecutor::new();

        let outcome_plan = engine.parse("outcome eq 'FAILED'").unwrap();
        group.bench_with_input(BenchmarkId::new("outcome_eq", size), &size, |b, _| {
            b.iter(|| {
                black_box(
                    executor
                        .execute(&outcome_plan, EntityKind::TestResult, store.entities())
                        .unwrap(),
                );
            });
        });

        let extension_plan = engine
            .parse("extensions.temperature gt 60 and extensions.station eq 'line-3'")
            .unwrap();
        group.bench_with_input(BenchmarkId::new("typed_extension", size), &size, |b, _| {
            b.iter(|| {
                black_box(
                    executor
                        .execute(&extension_plan, EntityKind::TestResult, store.entities())
                        .unwrap(),
                );
            });
        });
    }

    group.finish();
}

/// Benchmark ORDER BY + TOP
fn bench_order_top(c: &mut Criterion) {
    let mut group = c.benchmark_group("orderby_top");

    for size in [SMALL_SIZE, MEDIUM_SIZE, LARGE_SIZE] {
        let store = create_benchmark_store(size);

        group.bench_with_input(BenchmarkId::new("top_10", size), &size, |b, _| {
            b.iter(|| {
                black_box(
                    store
                        .query(
                            EntityKind::TestResult,
                            "$orderby=extensions.temperature desc&$top=10",
                        )
                        .unwrap(),
                );
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_filter, bench_order_top);
criterion_main!(benches);
