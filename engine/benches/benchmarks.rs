//! Performance benchmarks for strand-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use strand_engine::{
    apply_operation, invert_operation, patch, query, ApplyOptions, ComparisonOperator,
    FilterSpecifier, MemorySource, PageSpecifier, QueryExpression, Record, RecordIdentity,
    RecordOperation, SortSpecifier,
};

fn populated_source(count: usize) -> MemorySource {
    let mut source = MemorySource::new();
    let options = ApplyOptions::default();
    for i in 0..count {
        let record = Record::new("user", format!("user_{i}"))
            .with_attribute("name", json!(format!("User {i}")))
            .with_attribute("age", json!(i % 90))
            .with_to_many("groups", [RecordIdentity::new("group", format!("g{}", i % 10))]);
        let _ = apply_operation(&mut source, &RecordOperation::add_record(record), &options);
    }
    source
}

fn bench_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("operations");
    let options = ApplyOptions::default();

    group.bench_function("add_record", |b| {
        let mut source = MemorySource::new();
        let mut id = 0u64;

        b.iter(|| {
            id += 1;
            let op = RecordOperation::add_record(
                Record::new("user", format!("user_{id}")).with_attribute("name", json!("Test")),
            );
            apply_operation(&mut source, black_box(&op), &options)
        })
    });

    group.bench_function("replace_attribute", |b| {
        let mut source = populated_source(1000);
        let target = RecordIdentity::new("user", "user_500");
        let mut n = 0u64;

        b.iter(|| {
            n += 1;
            let op = RecordOperation::replace_attribute(target.clone(), "age", json!(n));
            apply_operation(&mut source, black_box(&op), &options)
        })
    });

    group.bench_function("invert_update_record", |b| {
        let source = populated_source(1000);
        let op = RecordOperation::update_record(
            Record::new("user", "user_500")
                .with_attribute("name", json!("Renamed"))
                .with_to_many("groups", [RecordIdentity::new("group", "g1")]),
        );

        b.iter(|| invert_operation(&source, black_box(&op), &options))
    });

    for size in [10usize, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::new("patch_and_undo", size), size, |b, &size| {
            let operations: Vec<_> = (0..size)
                .map(|i| {
                    RecordOperation::add_to_related_records(
                        RecordIdentity::new("user", format!("user_{}", i % 100)),
                        "groups",
                        RecordIdentity::new("group", format!("extra_{i}")),
                    )
                })
                .collect();

            b.iter(|| {
                let mut source = populated_source(100);
                let result = patch(&mut source, black_box(&operations), &options)?;
                patch(&mut source, &result.inverse, &options)
            })
        });
    }

    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");
    let options = ApplyOptions::default();

    for size in [100usize, 1000, 10_000].iter() {
        let source = populated_source(*size);

        group.bench_with_input(BenchmarkId::new("find_records", size), &source, |b, source| {
            let expression = QueryExpression::find_records("user");
            b.iter(|| query(source, black_box(&expression), &options))
        });

        group.bench_with_input(
            BenchmarkId::new("filter_sort_page", size),
            &source,
            |b, source| {
                let expression = QueryExpression::find_records("user")
                    .filter(FilterSpecifier::attribute(
                        "age",
                        ComparisonOperator::Gte,
                        json!(30),
                    ))
                    .sort(SortSpecifier::descending("age"))
                    .sort(SortSpecifier::ascending("name"))
                    .page(PageSpecifier::new(10, 20));
                b.iter(|| query(source, black_box(&expression), &options))
            },
        );
    }

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    group.bench_function("operation_to_json", |b| {
        let op = RecordOperation::add_record(
            Record::new("user", "user_1")
                .with_attribute("name", json!("Test User"))
                .with_to_one("group", Some(RecordIdentity::new("group", "g1"))),
        );

        b.iter(|| serde_json::to_string(black_box(&op)))
    });

    group.bench_function("operation_from_json", |b| {
        let json = r#"{"op":"replaceAttribute","record":{"type":"user","id":"user_1"},"attribute":"name","value":"Test User"}"#;

        b.iter(|| serde_json::from_str::<RecordOperation>(black_box(json)))
    });

    group.bench_function("snapshot_to_json", |b| {
        let snapshot = populated_source(1000).export_snapshot();
        b.iter(|| black_box(&snapshot).to_json())
    });

    group.finish();
}

criterion_group!(benches, bench_operations, bench_queries, bench_serialization);
criterion_main!(benches);
