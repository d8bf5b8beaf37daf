use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lcgraph::concurrency::pool::{self, ThreadPool};
use lcgraph::concurrency::SpinLock;
use lcgraph::do_all;
use std::sync::atomic::{AtomicUsize, Ordering};

fn bench_barrier(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_barrier");
    let max = std::thread::available_parallelism().map_or(1, usize::from);
    let mut sizes: Vec<usize> = [1, 2, 4, max].into_iter().filter(|&t| t <= max).collect();
    sizes.dedup();
    for threads in sizes {
        let mut pool = ThreadPool::new(threads);
        let counter = AtomicUsize::new(0);
        group.bench_with_input(BenchmarkId::new("empty_run", threads), &threads, |b, _| {
            b.iter(|| {
                pool.run(&|_: usize, _: usize| {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            });
        });
    }
    group.finish();
}

fn bench_do_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_do_all");
    let n = 1_000_000u32;
    group.throughput(Throughput::Elements(u64::from(n)));
    group.bench_function(BenchmarkId::new("sum", pool::active_threads()), |b| {
        b.iter(|| {
            let sum = AtomicUsize::new(0);
            do_all(0..n, |i| {
                if i % 1024 == 0 {
                    sum.fetch_add(i as usize, Ordering::Relaxed);
                }
            });
            black_box(sum.load(Ordering::Relaxed))
        });
    });
    group.finish();
}

fn bench_spin_lock(c: &mut Criterion) {
    let lock = SpinLock::new();
    c.bench_function("spin_lock_uncontended", |b| {
        b.iter(|| {
            lock.lock(black_box(1));
            lock.unlock();
        });
    });
}

criterion_group!(benches, bench_barrier, bench_do_all, bench_spin_lock);
criterion_main!(benches);
