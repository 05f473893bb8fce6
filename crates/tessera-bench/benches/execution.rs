//! Execution kernel benchmarks for Tessera.
//!
//! Benchmarks for:
//! - Building columns that widen as values arrive
//! - CASE evaluation over a batch
//! - Hash join build and probe

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tessera_bench::utils::{generate_customers, orders_batch, widening_values};
use tessera_sql::data::{schema_of, ColumnDataType, RecordBatch};
use tessera_sql::execution::JoinMap;
use tessera_sql::logical::LogicalExpr;
use tessera_sql::physical::create_physical_expr;

/// Benchmark pushing values that force Byte -> Short -> Integer -> Long.
fn bench_upcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("execution/upcast");
    let schema = schema_of(&[("n", ColumnDataType::Byte)]);

    for count in [1_000, 10_000, 100_000] {
        let values = widening_values(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &values, |b, values| {
            b.iter(|| {
                let mut batch = RecordBatch::empty(schema.clone());
                for value in values {
                    batch
                        .push_row(std::slice::from_ref(value))
                        .expect("push failed");
                }
                black_box(batch)
            });
        });
    }

    group.finish();
}

/// Benchmark a three-branch searched CASE.
fn bench_case(c: &mut Criterion) {
    let mut group = c.benchmark_group("execution/case");

    let batch = orders_batch(8_192, 1_000);
    let case = LogicalExpr::Case {
        operand: None,
        when_then: vec![
            (
                LogicalExpr::col("amount").gt(LogicalExpr::lit(400.0)),
                LogicalExpr::lit("large"),
            ),
            (
                LogicalExpr::col("amount").gt(LogicalExpr::lit(100.0)),
                LogicalExpr::lit("medium"),
            ),
        ],
        else_result: Some(Box::new(LogicalExpr::lit("small"))),
    };
    let expr = create_physical_expr(&case, batch.schema()).expect("invalid CASE");

    group.throughput(Throughput::Elements(batch.num_rows() as u64));
    group.bench_function("searched_with_else", |b| {
        b.iter(|| black_box(expr.evaluate(black_box(&batch)).expect("evaluation failed")));
    });

    group.finish();
}

/// Benchmark building a join map over customers and probing it with orders.
fn bench_hash_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("execution/hash_join");

    for customers in [100, 10_000] {
        let build = RecordBatch::from_rows(
            schema_of(&[("id", ColumnDataType::Long), ("name", ColumnDataType::Utf8)]),
            generate_customers(customers),
        )
        .expect("invalid customers");
        let probe = orders_batch(50_000, customers);
        let build_keys = &build.columns()[..1];
        let probe_keys = &probe.columns()[1..2];

        group.bench_with_input(BenchmarkId::new("build", customers), &build, |b, build| {
            b.iter(|| black_box(JoinMap::build(build_keys, build.num_rows())));
        });

        let map = JoinMap::build(build_keys, build.num_rows());
        group.throughput(Throughput::Elements(probe.num_rows() as u64));
        group.bench_with_input(BenchmarkId::new("probe", customers), &probe, |b, probe| {
            b.iter(|| black_box(map.probe(probe_keys, probe.num_rows())));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_upcast, bench_case, bench_hash_join);
criterion_main!(benches);
