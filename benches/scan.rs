// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use criterion::{criterion_group, criterion_main, Criterion};
use smol_index::{ColumnSpec, Config, Index, IntegerComparator, Row, Schema, ScanBounds, Slice};
use std::sync::Arc;
use tempfile::tempdir;

fn i32_schema() -> Schema {
    Schema::new(vec![ColumnSpec::fixed(4)], vec![], Arc::new(IntegerComparator::new(4))).unwrap()
}

fn row_i32(v: i32) -> Row {
    Row::new(vec![Slice::from(v.to_be_bytes().as_slice())], vec![])
}

fn build_index(item_count: i32) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bench.smol");
    let rows: Vec<Row> = (0..item_count).map(row_i32).collect();
    Index::build(&path, i32_schema(), Config::new(), rows).unwrap();
    (dir, path)
}

fn full_forward_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("full forward scan");

    for item_count in [10_000, 100_000, 1_000_000] {
        let (_dir, path) = build_index(item_count);
        group.bench_function(format!("{item_count} items"), |b| {
            let index = Index::open(&path, i32_schema()).unwrap();
            b.iter(|| {
                let count = index.scan(ScanBounds::unbounded()).unwrap().count();
                assert_eq!(count, item_count as usize);
            });
        });
    }
}

fn full_backward_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("full backward scan");

    for item_count in [10_000, 100_000, 1_000_000] {
        let (_dir, path) = build_index(item_count);
        group.bench_function(format!("{item_count} items"), |b| {
            let index = Index::open(&path, i32_schema()).unwrap();
            b.iter(|| {
                let count = index.scan_backward(ScanBounds::unbounded()).unwrap().count();
                assert_eq!(count, item_count as usize);
            });
        });
    }
}

fn parallel_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel scan");

    for item_count in [100_000, 1_000_000] {
        let (_dir, path) = build_index(item_count);
        for workers in [2, 4, 8] {
            group.bench_function(format!("{item_count} items, {workers} workers"), |b| {
                let index = Index::open(&path, i32_schema()).unwrap();
                b.iter(|| {
                    let total: usize = index
                        .parallel_scan(workers, ScanBounds::unbounded())
                        .unwrap()
                        .into_iter()
                        .map(|w| w.count())
                        .sum();
                    assert_eq!(total, item_count as usize);
                });
            });
        }
    }
}

criterion_group!(benches, full_forward_scan, full_backward_scan, parallel_scan);
criterion_main!(benches);
