use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use relq::prelude::*;
use std::sync::Arc;

fn schema() -> Arc<Schema> {
    Schema::builder()
        .model(
            ModelDescriptor::new("author")
                .field(FieldDescriptor::new("id", FieldType::Serial).primary_key())
                .field(FieldDescriptor::new("name", FieldType::Text).unique())
                .field(FieldDescriptor::new("age", FieldType::Integer).nullable()),
        )
        .model(
            ModelDescriptor::new("book")
                .field(FieldDescriptor::new("id", FieldType::Serial).primary_key())
                .field(FieldDescriptor::new("title", FieldType::Text))
                .field(FieldDescriptor::new("author", FieldType::Integer).references("author"))
                .field(FieldDescriptor::new("pages", FieldType::Integer).default(0)),
        )
        .build()
        .expect("bench schema")
}

/// SELECT with `n` lookups, half of them through the author join.
fn build_select(schema: &Arc<Schema>, n: usize) -> QueryBuilder {
    let mut cond = Condition::all(std::iter::empty::<(String, Value)>());
    for i in 0..n {
        let key = if i % 2 == 0 {
            "author__age__gte"
        } else {
            "pages__lt"
        };
        cond = cond & Condition::lookup(key, i as i64);
    }
    QueryBuilder::new(schema.clone(), "book")
        .filter(cond)
        .order_by(&["-author__name", "title"])
        .limit(50)
}

fn rows(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| record! { "name" => format!("author-{i}"), "age" => i as i64 })
        .collect()
}

fn bench_select(c: &mut Criterion) {
    let schema = schema();
    let mut group = c.benchmark_group("statement/select");

    for n in [1, 5, 20, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| black_box(build_select(&schema, n).statement()));
        });
    }

    group.finish();
}

fn bench_render_only(c: &mut Criterion) {
    let schema = schema();
    let mut group = c.benchmark_group("statement/render");

    for n in [1, 20, 100] {
        let q = build_select(&schema, n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &q, |b, q| {
            b.iter(|| black_box(q.statement()));
        });
    }

    group.finish();
}

fn bench_upsert(c: &mut Criterion) {
    let schema = schema();
    let mut group = c.benchmark_group("statement/upsert");

    for n in [10, 100, 1000] {
        let input = rows(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &input, |b, input| {
            b.iter(|| {
                let q = QueryBuilder::new(schema.clone(), "author")
                    .upsert(input.clone(), BulkOptions::new());
                black_box(q.statement())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_select, bench_render_only, bench_upsert);
criterion_main!(benches);
