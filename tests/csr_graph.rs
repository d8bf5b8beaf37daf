use lcgraph::concurrency::lock_context;
use lcgraph::graph::partition::ThreadRanges;
use lcgraph::{CsrGraph, GraphConfig, GraphNode, MethodFlag, NoLock};
use petgraph::graph::{DiGraph, NodeIndex};
use proptest::prelude::*;

fn edge_list<E, L>(g: &CsrGraph<u32, E, L>) -> Vec<(GraphNode, GraphNode)>
where
    E: Default + Send + Sync,
    L: lcgraph::NodeLock,
{
    g.nodes()
        .flat_map(|n| g.neighbors(n).iter().map(move |&d| (n, d)))
        .collect()
}

#[test]
fn test_diamond_partition_and_transpose() {
    // 0 -> 1, 2 ; 1 -> 2 ; 2 -> 3
    let adj = vec![vec![1, 2], vec![2], vec![3], vec![]];
    let mut g: CsrGraph<u32> = CsrGraph::from_adjacency(GraphConfig::default(), &adj);
    assert!(g.is_well_formed());

    let ranges = ThreadRanges::by_node(g.edge_prefix_sum(), 2);
    assert_eq!(ranges.node_range(0), 0..2);
    assert_eq!(ranges.node_range(1), 2..4);

    g.transpose(true);
    assert!(g.is_well_formed());
    assert_eq!(g.neighbors(3), &[2]);
    assert_eq!(g.neighbors(2), &[0, 1]);
    assert_eq!(g.neighbors(1), &[0]);
    assert!(g.neighbors(0).is_empty());
}

#[test]
fn test_out_of_line_numa_graph_counts_in_degrees() {
    let n = 200u32;
    let adj: Vec<Vec<GraphNode>> = (0..n)
        .map(|i| (1..=3).map(|k| (i * k + 7) % n).collect())
        .collect();
    let config = GraphConfig {
        numa_alloc: true,
        out_of_line_locks: true,
    };
    let g: CsrGraph<u32> = CsrGraph::from_adjacency(config, &adj);

    g.par_for_each_node(|src| {
        for e in g.edges(src, MethodFlag::Write) {
            let dst = g.edge_dst(e);
            // SAFETY: `dst` stays locked for this step; no other reference is live.
            unsafe { *g.get_data(dst, MethodFlag::Write) += 1 };
        }
    });

    let mut expected = vec![0u32; n as usize];
    for dsts in &adj {
        for &d in dsts {
            expected[d as usize] += 1;
        }
    }
    let got: Vec<u32> = g.nodes().map(|v| *g.data(v)).collect();
    assert_eq!(got, expected);
    assert_eq!(lock_context::held_count(), 0);
}

#[test]
fn test_lock_free_graph_matches_locked_graph() {
    let adj = vec![vec![1, 2, 3], vec![0], vec![0, 1], vec![]];
    let locked: CsrGraph<u32> = CsrGraph::from_adjacency(GraphConfig::default(), &adj);
    let mut unlocked: CsrGraph<u32, (), NoLock> = CsrGraph::from_adjacency(GraphConfig::default(), &adj);
    assert_eq!(edge_list(&locked), edge_list(&unlocked));
    unlocked.transpose(false);
    let mut reversed: Vec<_> = edge_list(&unlocked).into_iter().map(|(a, b)| (b, a)).collect();
    reversed.sort_unstable();
    let mut original = edge_list(&locked);
    original.sort_unstable();
    assert_eq!(reversed, original);
}

fn adjacency() -> impl Strategy<Value = Vec<Vec<GraphNode>>> {
    (1u32..48).prop_flat_map(|n| {
        prop::collection::vec(prop::collection::vec(0..n, 0..6), n as usize)
    })
}

proptest! {
    #[test]
    fn test_transpose_matches_petgraph_reverse(adj in adjacency(), reallocate in any::<bool>()) {
        let mut g: CsrGraph<u32, u64> = CsrGraph::from_fns(
            GraphConfig::default(),
            adj.len(),
            adj.iter().map(Vec::len).sum(),
            |n| adj[n as usize].len(),
            |n, k| adj[n as usize][k],
            |n, k| (u64::from(n) << 32) | k as u64,
        );

        let mut reference: DiGraph<(), u64> = DiGraph::new();
        let ids: Vec<NodeIndex> = (0..adj.len()).map(|_| reference.add_node(())).collect();
        for (src, dsts) in adj.iter().enumerate() {
            for (k, &d) in dsts.iter().enumerate() {
                reference.add_edge(ids[src], ids[d as usize], ((src as u64) << 32) | k as u64);
            }
        }
        reference.reverse();

        g.transpose(reallocate);
        prop_assert!(g.is_well_formed());

        let mut ours: Vec<(usize, usize, u64)> = Vec::new();
        for n in g.nodes() {
            for e in g.edges(n, MethodFlag::Unprotected) {
                ours.push((n as usize, g.edge_dst(e) as usize, *g.edge_data(e)));
            }
        }
        let mut theirs: Vec<(usize, usize, u64)> = reference
            .raw_edges()
            .iter()
            .map(|e| (e.source().index(), e.target().index(), e.weight))
            .collect();
        ours.sort_unstable();
        theirs.sort_unstable();
        prop_assert_eq!(ours, theirs);
    }

    #[test]
    fn test_transpose_is_an_involution(adj in adjacency()) {
        let mut g: CsrGraph<u32> = CsrGraph::from_adjacency(GraphConfig::default(), &adj);
        let mut before = edge_list(&g);
        g.transpose(false);
        g.transpose(true);
        let mut after = edge_list(&g);
        before.sort_unstable();
        after.sort_unstable();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn test_transpose_is_stable_per_source(adj in adjacency()) {
        let mut g: CsrGraph<u32> = CsrGraph::from_adjacency(GraphConfig::default(), &adj);
        g.transpose(false);
        for n in g.nodes() {
            let srcs = g.neighbors(n);
            prop_assert!(srcs.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn test_sort_all_edges_by_dst_sorts_every_slice(adj in adjacency()) {
        let mut g: CsrGraph<u32> = CsrGraph::from_adjacency(GraphConfig::default(), &adj);
        g.sort_all_edges_by_dst();
        for n in g.nodes() {
            let dsts = g.neighbors(n);
            prop_assert!(dsts.windows(2).all(|w| w[0] <= w[1]));
            if let Some(&d) = dsts.first() {
                prop_assert!(g.find_edge_sorted_by_dst(n, d).is_some());
            }
        }
    }
}
