//! Buffer pool benchmarks: hot fetches served from resident frames, and
//! allocation under eviction pressure.

use std::sync::Arc;

use chronodb::storage::{BufferPool, DiskManager};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tempfile::tempdir;

fn bench_fetch_hot(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_fetch_hot");
    group.throughput(Throughput::Elements(1));

    group.bench_function("resident_page", |b| {
        let dir = tempdir().unwrap();
        let disk = Arc::new(DiskManager::open(dir.path().join("bench.db")).unwrap());
        let pool = BufferPool::new(16, disk);
        let id = {
            let page = pool.new_page().unwrap().unwrap();
            page.page_id()
        };

        b.iter(|| {
            let page = pool.fetch_page(black_box(id)).unwrap().unwrap();
            black_box(page.payload()[0]);
        });
    });

    group.finish();
}

fn bench_allocate_under_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_allocate");
    group.throughput(Throughput::Elements(1));

    group.bench_function("eviction_pressure", |b| {
        let dir = tempdir().unwrap();
        let disk = Arc::new(DiskManager::open(dir.path().join("bench.db")).unwrap());
        let pool = BufferPool::new(8, disk);

        b.iter(|| {
            let mut page = pool.new_page().unwrap().unwrap();
            page.payload_mut()[0] = 1;
            black_box(page.page_id());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_fetch_hot, bench_allocate_under_eviction);
criterion_main!(benches);
