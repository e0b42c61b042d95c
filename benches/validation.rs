//! Statement Policy Benchmarks
//!
//! Measures `validate_statement` for accepted reads, refused writes and
//! commented CTEs under the default read-only policy.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use askdb::{validate_statement, DatabaseType, ExecutionPolicy};

fn bench_validate_select(c: &mut Criterion) {
    let policy = ExecutionPolicy::default();
    let sql =
        "SELECT InvoiceId, Total FROM Invoice WHERE BillingCountry = 'France' ORDER BY Total DESC";

    c.bench_function("validate_select", |b| {
        b.iter(|| validate_statement(black_box(sql), black_box(&policy), DatabaseType::MySQL))
    });
}

fn bench_validate_refused_write(c: &mut Criterion) {
    let policy = ExecutionPolicy::default();
    let sql = "UPDATE Customer SET Country = 'FR' WHERE Country = 'France'";

    c.bench_function("validate_refused_write", |b| {
        b.iter(|| validate_statement(black_box(sql), black_box(&policy), DatabaseType::MySQL))
    });
}

fn bench_validate_commented_cte(c: &mut Criterion) {
    let policy = ExecutionPolicy::default();
    let sql = "-- top customers\nWITH totals AS (\n  /* per customer */\n  SELECT CustomerId, SUM(Total) AS spent FROM Invoice GROUP BY CustomerId\n)\nSELECT * FROM totals ORDER BY spent DESC LIMIT 5;";

    c.bench_function("validate_commented_cte", |b| {
        b.iter(|| validate_statement(black_box(sql), black_box(&policy), DatabaseType::SQLite))
    });
}

criterion_group!(
    benches,
    bench_validate_select,
    bench_validate_refused_write,
    bench_validate_commented_cte
);
criterion_main!(benches);
