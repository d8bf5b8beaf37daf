//! Functional and staged construction.

use crate::alloc::{AllocPolicy, NumaArray};
use crate::concurrency::sync::NodeLock;
use crate::graph::partition::{self, ThreadRanges};
use crate::graph::GraphNode;

use super::{CsrGraph, GraphConfig, NodeStorage};

impl<N, E, L> CsrGraph<N, E, L>
where
    N: Default + Send + Sync,
    E: Default + Send + Sync,
    L: NodeLock,
{
    /// Builds a graph from per-node edge counts and per-edge destination/payload functions.
    ///
    /// `edge_count(n)` is scanned once to build the prefix sum; `edge_dst(n, k)` and
    /// `edge_data(n, k)` then fill the `k`-th edge of `n` on the system pool.
    ///
    /// # Panics
    /// If the counts do not total `num_edges`, a destination is out of range, or
    /// `num_nodes` exceeds the node index type.
    pub fn from_fns<C, D, W>(
        config: GraphConfig,
        num_nodes: usize,
        num_edges: usize,
        edge_count: C,
        edge_dst: D,
        edge_data: W,
    ) -> Self
    where
        C: Fn(GraphNode) -> usize,
        D: Fn(GraphNode, usize) -> GraphNode + Sync,
        W: Fn(GraphNode, usize) -> E + Sync,
    {
        check_node_count(num_nodes);
        let mut prefix = Vec::with_capacity(num_nodes);
        let mut total = 0usize;
        for n in 0..num_nodes {
            total += edge_count(n as GraphNode);
            prefix.push(total);
        }
        assert_eq!(
            total, num_edges,
            "edge count function totals {total} edges, expected {num_edges}"
        );

        let mut graph = Self::new(config);
        graph.allocate_from(num_nodes, num_edges);
        graph.edge_index.copy_from_slice(&prefix);
        graph.determine_thread_ranges_by_node();

        let g = &graph;
        g.par_for_each_node(|n| {
            let i = n as usize;
            for (k, e) in (g.raw_begin(i)..g.raw_end(i)).enumerate() {
                let dst = edge_dst(n, k);
                assert!(
                    (dst as usize) < num_nodes,
                    "edge {n}->{dst} out of range for graph of {num_nodes} nodes"
                );
                // SAFETY: each edge slot belongs to exactly one node and each node to one
                // worker; nothing else references the arrays yet.
                unsafe {
                    *g.edge_dst.slot_ptr(e) = dst;
                    *g.edge_data.slot_ptr(e) = edge_data(n, k);
                }
            }
        });
        debug_assert!(graph.is_well_formed());
        tracing::debug!(nodes = num_nodes, edges = num_edges, "graph constructed");
        graph
    }

    /// Builds a payload-default graph from adjacency lists.
    ///
    /// # Panics
    /// If any destination is out of range.
    pub fn from_adjacency(config: GraphConfig, adjacency: &[Vec<GraphNode>]) -> Self {
        let num_edges = adjacency.iter().map(Vec::len).sum();
        Self::from_fns(
            config,
            adjacency.len(),
            num_edges,
            |n| adjacency[n as usize].len(),
            |n, k| adjacency[n as usize][k],
            |_, _| E::default(),
        )
    }

    /// Sizes storage for `num_nodes` nodes and `num_edges` edges with the configured
    /// placement policy. Payloads start at their default, the prefix sum at zero.
    ///
    /// Any previous contents and stored thread ranges are discarded.
    pub fn allocate_from(&mut self, num_nodes: usize, num_edges: usize) {
        check_node_count(num_nodes);
        let policy = self.config.policy();
        self.nodes.quiesce();
        self.nodes = NodeStorage::allocate(num_nodes, self.config.out_of_line_locks, policy);
        self.edge_index = NumaArray::new(num_nodes, policy);
        self.edge_dst = NumaArray::new(num_edges, policy);
        self.edge_data = NumaArray::new(num_edges, policy);
        self.num_nodes = num_nodes;
        self.num_edges = num_edges;
        self.thread_ranges = None;
    }

    /// Sizes storage like [`allocate_from`](Self::allocate_from), placing each worker's
    /// node and edge slices by a balanced split of `prefix`. The split is kept as the
    /// graph's thread ranges.
    ///
    /// # Panics
    /// If `prefix` does not have `num_nodes` entries ending at `num_edges`.
    pub fn allocate_from_by_node(&mut self, num_nodes: usize, num_edges: usize, prefix: &[usize]) {
        check_node_count(num_nodes);
        assert_eq!(
            prefix.len(),
            num_nodes,
            "prefix sum has {} entries for {num_nodes} nodes",
            prefix.len()
        );
        assert_eq!(
            partition::edges_before(prefix, num_nodes),
            num_edges,
            "prefix sum does not end at {num_edges} edges"
        );

        let threads = crate::concurrency::pool::active_threads().max(1);
        let ranges = ThreadRanges::by_node(prefix, threads);
        let node_policy = AllocPolicy::Specific(ranges.node_bounds());
        let edge_policy = AllocPolicy::Specific(ranges.edge_bounds());

        self.nodes.quiesce();
        self.nodes = NodeStorage::allocate(num_nodes, self.config.out_of_line_locks, node_policy);
        self.edge_index = NumaArray::new(num_nodes, node_policy);
        self.edge_dst = NumaArray::new(num_edges, edge_policy);
        self.edge_data = NumaArray::new(num_edges, edge_policy);
        self.num_nodes = num_nodes;
        self.num_edges = num_edges;
        self.thread_ranges = Some(ranges);
    }

    /// Resets every node payload to its default, on the system pool when `parallel`.
    pub fn construct_nodes(&mut self, parallel: bool) {
        if parallel {
            let g = &*self;
            g.par_for_each_node(|n| {
                // SAFETY: one worker per node and `&mut self` excludes other references.
                unsafe { *g.nodes.cell(n as usize).get() = N::default() };
            });
        } else {
            for n in self.nodes() {
                *self.data_mut(n) = N::default();
            }
        }
    }

    /// Closes node `n`'s edge slice at `end`. Nodes are fixed in increasing order.
    ///
    /// # Panics
    /// If `end` exceeds `size_edges()` or precedes the end of node `n - 1`.
    pub fn fix_end_edge(&mut self, n: GraphNode, end: usize) {
        let i = self.check_node(n);
        assert!(
            end <= self.num_edges,
            "edge end {end} of node {n} exceeds {} edges",
            self.num_edges
        );
        let begin = self.raw_begin(i);
        assert!(end >= begin, "edge end {end} of node {n} precedes its begin {begin}");
        self.edge_index[i] = end;
    }

    /// Sets the destination of edge `e`.
    ///
    /// # Panics
    /// If `e` or `dst` is out of range.
    pub fn construct_edge(&mut self, e: usize, dst: GraphNode) {
        self.check_edge(e);
        assert!(
            (dst as usize) < self.num_nodes,
            "destination {dst} out of range for graph of {} nodes",
            self.num_nodes
        );
        self.edge_dst[e] = dst;
    }

    /// Sets the destination and payload of edge `e`.
    pub fn construct_edge_with_data(&mut self, e: usize, dst: GraphNode, data: E) {
        self.construct_edge(e, dst);
        self.edge_data[e] = data;
    }
}

fn check_node_count(num_nodes: usize) {
    assert!(
        num_nodes <= GraphNode::MAX as usize,
        "{num_nodes} nodes exceed the node index range"
    );
}
