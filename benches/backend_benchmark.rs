//! Backend throughput benchmarks across the four storage engines.
//!
//! Run with: cargo bench
//! View results: open target/criterion/report/index.html

use beano::backend::{Backend, BTreeBucketBackend, InMemoryBackend, LsmBackend, LsmValueLogBackend};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

fn engines(dir: &tempfile::TempDir) -> Vec<(&'static str, Box<dyn Backend>)> {
    vec![
        (
            "btree",
            Box::new(
                BTreeBucketBackend::open(dir.path().join("btree").to_str().unwrap(), 100_000, 0.01)
                    .unwrap(),
            ),
        ),
        (
            "lsm",
            Box::new(LsmBackend::open(dir.path().join("lsm").to_str().unwrap()).unwrap()),
        ),
        (
            "lsm_valuelog",
            Box::new(
                LsmValueLogBackend::open(dir.path().join("valuelog").to_str().unwrap()).unwrap(),
            ),
        ),
        ("inmem", Box::new(InMemoryBackend::new(1_000_000, "bench"))),
    ]
}

fn set_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("backend_set");
    for size in [100, 1_000, 10_000].iter() {
        for label in ["btree", "lsm", "lsm_valuelog", "inmem"] {
            let dir = tempfile::tempdir().unwrap();
            let backend = engines(&dir)
                .into_iter()
                .find(|(name, _)| *name == label)
                .unwrap()
                .1;
            let value = vec![1u8; *size];

            group
                .throughput(Throughput::Bytes(*size as u64))
                .bench_with_input(BenchmarkId::new(label, size), size, |b, _| {
                    let mut counter = 0u64;
                    b.iter(|| {
                        counter += 1;
                        let key = format!("key-{counter}");
                        backend
                            .set(black_box(key.as_bytes()), black_box(&value))
                            .expect("set failed")
                    });
                });
        }
    }
    group.finish();
}

fn get_hit_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("backend_get_hit");
    for label in ["btree", "lsm", "lsm_valuelog", "inmem"] {
        let dir = tempfile::tempdir().unwrap();
        let backend = engines(&dir)
            .into_iter()
            .find(|(name, _)| *name == label)
            .unwrap()
            .1;
        backend.set(b"bench-key", &vec![1u8; 1000]).unwrap();

        group.bench_function(label, |b| {
            b.iter(|| backend.get(black_box(b"bench-key")).unwrap())
        });
    }
    group.finish();
}

fn get_miss_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("backend_get_miss");
    for label in ["btree", "lsm", "lsm_valuelog", "inmem"] {
        let dir = tempfile::tempdir().unwrap();
        let backend = engines(&dir)
            .into_iter()
            .find(|(name, _)| *name == label)
            .unwrap()
            .1;

        group.bench_function(label, |b| {
            b.iter(|| backend.get(black_box(b"never-set")).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    set_benchmarks,
    get_hit_benchmarks,
    get_miss_benchmarks
);
criterion_main!(benches);
