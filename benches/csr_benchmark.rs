use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lcgraph::{CsrGraph, GraphConfig, GraphNode, MethodFlag};

fn ring_with_chords(nodes: u32, degree: u32) -> Vec<Vec<GraphNode>> {
    (0..nodes)
        .map(|i| (1..=degree).map(|j| (i + j * j * 7) % nodes).collect())
        .collect()
}

fn bench_construct(c: &mut Criterion) {
    let mut group = c.benchmark_group("csr_construct");
    for &nodes in &[10_000u32, 100_000] {
        let adjacency = ring_with_chords(nodes, 16);
        let edges = u64::from(nodes) * 16;
        group.throughput(Throughput::Elements(edges));
        for (label, config) in [
            ("interleaved", GraphConfig::default()),
            (
                "blocked",
                GraphConfig {
                    numa_alloc: true,
                    out_of_line_locks: false,
                },
            ),
        ] {
            group.bench_with_input(BenchmarkId::new(label, nodes), &adjacency, |b, adj| {
                b.iter(|| {
                    let g: CsrGraph<u64> = CsrGraph::from_adjacency(config, adj);
                    black_box(g.size_edges())
                });
            });
        }
    }
    group.finish();
}

fn bench_transpose(c: &mut Criterion) {
    let mut group = c.benchmark_group("csr_transpose");
    let adjacency = ring_with_chords(100_000, 16);
    group.throughput(Throughput::Elements(100_000 * 16));
    for reallocate in [false, true] {
        let mut g: CsrGraph<u64> = CsrGraph::from_adjacency(GraphConfig::default(), &adjacency);
        group.bench_function(BenchmarkId::new("reallocate", reallocate), |b| {
            b.iter(|| g.transpose(reallocate));
        });
    }
    group.finish();
}

fn bench_push_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("csr_push");
    let adjacency = ring_with_chords(50_000, 8);
    group.throughput(Throughput::Elements(50_000 * 8));

    let locked: CsrGraph<u64> = CsrGraph::from_adjacency(GraphConfig::default(), &adjacency);
    group.bench_function("spin_lock", |b| {
        b.iter(|| {
            locked.par_for_each_node(|src| {
                for e in locked.edges(src, MethodFlag::Write) {
                    let dst = locked.edge_dst(e);
                    // SAFETY: `dst` is locked for the rest of this step.
                    unsafe { *locked.get_data(dst, MethodFlag::Write) += 1 };
                }
            });
        });
    });

    let plain: CsrGraph<u64> = CsrGraph::from_adjacency(GraphConfig::default(), &adjacency);
    group.bench_function("pull_unprotected", |b| {
        b.iter(|| {
            plain.par_for_each_node(|n| {
                let sum: u64 = plain.neighbors(n).iter().map(|&d| u64::from(d)).sum();
                black_box(sum);
            });
        });
    });
    group.finish();
}

fn bench_sort(c: &mut Criterion) {
    let adjacency = ring_with_chords(50_000, 32);
    c.bench_function("csr_sort_all_edges_by_dst", |b| {
        b.iter_batched(
            || CsrGraph::<u32>::from_adjacency(GraphConfig::default(), &adjacency),
            |mut g| {
                g.sort_all_edges_by_dst();
                g
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_construct, bench_transpose, bench_push_updates, bench_sort);
criterion_main!(benches);
