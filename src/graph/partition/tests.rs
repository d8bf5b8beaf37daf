//! Tests for the partitioner.

use super::*;

// 0 -> 1, 2 ; 1 -> 2 ; 2 -> 3 ; 3 -> (none)
fn diamond_prefix() -> Vec<usize> {
    vec![2, 3, 4, 4]
}

#[test]
fn test_two_threads_split_four_nodes_evenly() {
    let prefix = diamond_prefix();
    let ranges = ThreadRanges::by_node(&prefix, 2);
    assert_eq!(ranges.node_bounds(), &[0, 2, 4]);
    assert_eq!(ranges.edge_bounds(), &[0, 3, 4]);
    assert_eq!(ranges.node_range(0), 0..2);
    assert_eq!(ranges.edge_range(1), 3..4);

    let equal = determine_thread_ranges(&prefix, 0..4, 2, 1);
    assert_eq!(equal, vec![0, 2, 4]);
}

#[test]
fn test_single_division_gets_everything() {
    let prefix = diamond_prefix();
    let r = divide(Weights::EDGES_ONLY, 0, 1, 0..4, 0..4, &prefix);
    assert_eq!(r.nodes, 0..4);
    assert_eq!(r.edges, 0..4);
}

#[test]
fn test_more_divisions_than_nodes() {
    let prefix = vec![1, 1, 3];
    let parts: Vec<_> = (0..5)
        .map(|id| divide(Weights::EDGES_ONLY, id, 5, 0..3, 0..3, &prefix))
        .collect();
    assert_eq!(parts[0].nodes, 0..1);
    assert_eq!(parts[1].nodes, 1..2);
    assert_eq!(parts[2].nodes, 2..3);
    assert_eq!(parts[2].edges, 1..3);
    assert_eq!(parts[3].nodes, 3..3);
    assert_eq!(parts[4].nodes, 3..3);
    assert_eq!(parts[4].edges, 3..3);

    assert_eq!(determine_thread_ranges(&prefix, 0..3, 5, 0), vec![0, 1, 2, 3, 3, 3]);
}

#[test]
fn test_empty_range_gives_empty_divisions() {
    let prefix: Vec<usize> = Vec::new();
    let ranges = ThreadRanges::by_node(&prefix, 3);
    assert_eq!(ranges.node_bounds(), &[0, 0, 0, 0]);
    assert_eq!(ranges.edge_bounds(), &[0, 0, 0, 0]);

    let prefix = diamond_prefix();
    assert_eq!(determine_thread_ranges(&prefix, 2..2, 3, 0), vec![2, 2, 2, 2]);
}

#[test]
fn test_heavy_node_takes_whole_share() {
    // Node 0 owns 100 edges, the other seven own one each.
    let mut prefix = Vec::new();
    let mut acc = 0;
    for n in 0..8 {
        acc += if n == 0 { 100 } else { 1 };
        prefix.push(acc);
    }
    let ranges = ThreadRanges::by_node(&prefix, 2);
    assert_eq!(ranges.node_range(0), 0..1);
    assert_eq!(ranges.node_range(1), 1..8);
    assert_eq!(ranges.edge_range(0), 0..100);
    assert_eq!(ranges.edge_range(1), 100..107);
}

#[test]
fn test_sub_range_with_offsets() {
    // 6 nodes with 2 edges each.
    let prefix: Vec<usize> = (1..=6).map(|n| n * 2).collect();
    let bounds = determine_thread_ranges(&prefix, 2..6, 2, 0);
    assert_eq!(bounds, vec![2, 4, 6]);

    let r = divide(Weights::EDGES_ONLY, 1, 2, 2..6, 4..12, &prefix);
    assert_eq!(r.nodes, 4..6);
    assert_eq!(r.edges, 8..12);
}

#[test]
fn test_node_alpha_shifts_boundaries() {
    // Node 0 owns all 6 edges; the rest own none.
    let prefix = vec![6, 6, 6, 6, 6, 6];
    let by_edges = determine_thread_ranges(&prefix, 0..6, 2, 0);
    assert_eq!(by_edges, vec![0, 1, 6]);
    let by_nodes = determine_thread_ranges(&NoEdges::new(6), 0..6, 2, 1);
    assert_eq!(by_nodes, vec![0, 3, 6]);
}

#[test]
fn test_find_index_prefix_sum_takes_first_match() {
    let prefix = vec![1, 1, 1, 4];
    // edges_before: [0, 1, 1, 1] for local indices 0..4
    assert_eq!(find_index_prefix_sum(Weights::EDGES_ONLY, 1, 0, 4, &prefix, 0, 0), 1);
    assert_eq!(find_index_prefix_sum(Weights::EDGES_ONLY, 2, 0, 4, &prefix, 0, 0), 4);
    assert_eq!(find_index_prefix_sum(Weights::EDGES_ONLY, 0, 0, 4, &prefix, 0, 0), 0);
}

#[test]
#[should_panic(expected = "out of range")]
fn test_divide_rejects_bad_id() {
    divide(Weights::EDGES_ONLY, 2, 2, 0..4, 0..4, &diamond_prefix());
}
