//! SQL Extraction Benchmarks
//!
//! Measures fenced-block extraction on typical model outputs:
//! - A bare statement
//! - A fenced statement surrounded by prose
//! - A long completion with several fenced blocks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use askdb::extract_sql;

fn bench_extract_plain(c: &mut Criterion) {
    let raw = "  SELECT COUNT(*) FROM Customer WHERE Country = 'France'  \n";
    c.bench_function("extract_plain", |b| b.iter(|| extract_sql(black_box(raw))));
}

fn bench_extract_fenced(c: &mut Criterion) {
    let raw = "Here is the query you asked for:\n\n```sql\nSELECT c.Country, COUNT(*) AS customers\nFROM Customer c\nGROUP BY c.Country\nORDER BY customers DESC;\n```\n\nIt groups customers by country.";
    c.bench_function("extract_fenced", |b| b.iter(|| extract_sql(black_box(raw))));
}

fn bench_extract_long_completion(c: &mut Criterion) {
    let mut raw = String::new();
    for i in 0..50 {
        raw.push_str(&format!("Step {i}: reasoning about the schema and the join order.\n"));
    }
    raw.push_str("```sql\nSELECT * FROM Invoice WHERE Total > 5\n```\n```sql\nSELECT 1\n```");

    c.bench_function("extract_long_completion", |b| b.iter(|| extract_sql(black_box(&raw))));
}

criterion_group!(benches, bench_extract_plain, bench_extract_fenced, bench_extract_long_completion);
criterion_main!(benches);
