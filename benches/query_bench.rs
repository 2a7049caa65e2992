//! Benchmarks for filtered-count queries over the mutable index and a
//! persisted segment
//!
//! Run with: cargo bench --bench query_bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use segmill::aggregation::{AggregatorDef, AggregatorKind};
use segmill::datagen::{benchmark_filter, RowGenerator, SchemaInfo, DEFAULT_SEED};
use segmill::index::{IncrementalIndex, IndexSchema, IndexType};
use segmill::query::{parse_filter, QueryRunner, TimeseriesQuery, VectorizeMode};
use segmill::storage::*;
use std::sync::Arc;
use tempfile::tempdir;

const ROWS: usize = 50_000;

fn load_index(rows: usize) -> IncrementalIndex {
    let info = SchemaInfo::basic();
    let interval = info.data_interval;
    let schema = Arc::new(IndexSchema::new(info.dimensions(), info.aggregators.clone()));
    let mut index = IncrementalIndex::new(schema, IndexType::OnHeap, rows).unwrap();
    for row in RowGenerator::spread(info, DEFAULT_SEED, interval, rows).take(rows) {
        index.append(&row).unwrap();
    }
    index
}

fn filtered_count_query(vectorize: VectorizeMode) -> TimeseriesQuery {
    TimeseriesQuery::builder(SchemaInfo::basic().data_interval)
        .aggregator(AggregatorDef::filtered(
            "filteredCount",
            benchmark_filter(),
            AggregatorKind::Count,
        ))
        .vectorize(vectorize)
        .build()
        .unwrap()
}

fn bench_filtered_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("filtered_count");
    group.throughput(Throughput::Elements(ROWS as u64));

    let index = load_index(ROWS);
    let dir = tempdir().unwrap();
    let segment = IndexIo.persist(&index, dir.path(), &IndexSpec::default()).unwrap();
    let runner = QueryRunner::new();

    let scalar = filtered_count_query(VectorizeMode::False);
    let vector = filtered_count_query(VectorizeMode::Force);

    group.bench_function("incremental_index", |b| {
        b.iter(|| runner.run(black_box(&scalar), &index).unwrap())
    });
    group.bench_function("segment_scalar", |b| {
        b.iter(|| runner.run(black_box(&scalar), &segment).unwrap())
    });
    group.bench_function("segment_vectorized", |b| {
        b.iter(|| runner.run(black_box(&vector), &segment).unwrap())
    });

    group.finish();
}

fn bench_hourly(c: &mut Criterion) {
    let mut group = c.benchmark_group("hourly");
    group.throughput(Throughput::Elements(ROWS as u64));

    let index = load_index(ROWS);
    let dir = tempdir().unwrap();
    let segment = IndexIo.persist(&index, dir.path(), &IndexSpec::default()).unwrap();
    let runner = QueryRunner::new();

    let query = TimeseriesQuery::builder(SchemaInfo::basic().data_interval)
        .granularity(Granularity::Hour)
        .aggregator(AggregatorDef::count("facts"))
        .aggregator(AggregatorDef::long_sum("rows", "rows"))
        .filter(parse_filter("dimEnumerated IN ('Hello', 'World') AND dimZipf < 10").unwrap())
        .vectorize(VectorizeMode::True)
        .build()
        .unwrap();

    group.bench_function("incremental_index", |b| {
        b.iter(|| runner.run(black_box(&query), &index).unwrap())
    });
    group.bench_function("segment", |b| {
        b.iter(|| runner.run(black_box(&query), &segment).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_filtered_count, bench_hourly);
criterion_main!(benches);
