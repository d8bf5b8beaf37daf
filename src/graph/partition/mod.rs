//! Weighted division of node ranges among workers.
//!
//! A node range is split by treating the edge prefix sum as a monotone weight function
//!
//! ```text
//! w(n) = node_weight * n + edge_weight * edges_before(n)
//! ```
//!
//! and cutting it into `total` equal shares with a binary search per boundary. The same
//! split drives both NUMA placement of the graph arrays and the per-worker iteration
//! ranges, so a worker's pages and its loop slice coincide.
//!
//! ### Complexity
//! | Operation | Cost |
//! |-----------|------|
//! | [`find_index_prefix_sum`] | \(O(\log n)\) |
//! | [`divide`] | \(O(\log n)\) |
//! | [`determine_thread_ranges`], [`ThreadRanges::by_node`] | \(O(t \log n)\) |

use core::ops::Range;

/// Read-only view of an edge prefix sum: entry `i` is the edge-end index of node `i`.
pub trait EdgePrefixSum {
    /// Number of entries (nodes).
    fn prefix_len(&self) -> usize;

    /// Edge-end index of node `i`, i.e. edges owned by nodes `0..=i`.
    fn prefix_at(&self, i: usize) -> usize;
}

impl EdgePrefixSum for [usize] {
    #[inline]
    fn prefix_len(&self) -> usize {
        self.len()
    }

    #[inline]
    fn prefix_at(&self, i: usize) -> usize {
        self[i]
    }
}

impl EdgePrefixSum for Vec<usize> {
    #[inline]
    fn prefix_len(&self) -> usize {
        self.len()
    }

    #[inline]
    fn prefix_at(&self, i: usize) -> usize {
        self[i]
    }
}

impl<P: EdgePrefixSum + ?Sized> EdgePrefixSum for &P {
    #[inline]
    fn prefix_len(&self) -> usize {
        (**self).prefix_len()
    }

    #[inline]
    fn prefix_at(&self, i: usize) -> usize {
        (**self).prefix_at(i)
    }
}

/// Prefix sum of `len` nodes without edges; used to split plain index ranges.
#[derive(Debug, Clone, Copy)]
pub struct NoEdges {
    len: usize,
}

impl NoEdges {
    /// A zero prefix sum over `len` nodes.
    pub const fn new(len: usize) -> Self {
        Self { len }
    }
}

impl EdgePrefixSum for NoEdges {
    #[inline]
    fn prefix_len(&self) -> usize {
        self.len
    }

    #[inline]
    fn prefix_at(&self, _i: usize) -> usize {
        0
    }
}

/// Relative cost of a node and of an edge when balancing divisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Weights {
    /// Weight of one node.
    pub node: usize,
    /// Weight of one edge.
    pub edge: usize,
}

impl Weights {
    /// Balance node counts only.
    pub const NODES_ONLY: Self = Self { node: 1, edge: 0 };
    /// Balance edge counts only.
    pub const EDGES_ONLY: Self = Self { node: 0, edge: 1 };
    /// Nodes and edges weigh the same (the allocation split).
    pub const BALANCED: Self = Self { node: 1, edge: 1 };

    /// Creates a weighting.
    pub const fn new(node: usize, edge: usize) -> Self {
        Self { node, edge }
    }

    #[inline]
    fn of(self, nodes: usize, edges: usize) -> u128 {
        self.node as u128 * nodes as u128 + self.edge as u128 * edges as u128
    }
}

/// Node and edge slices assigned to one division.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphRange {
    /// Absolute node indices.
    pub nodes: Range<usize>,
    /// Absolute edge indices owned by `nodes`.
    pub edges: Range<usize>,
}

/// Edges owned by nodes `0..n`.
#[inline]
pub fn edges_before<P: EdgePrefixSum + ?Sized>(prefix: &P, n: usize) -> usize {
    if n == 0 {
        0
    } else {
        prefix.prefix_at(n - 1)
    }
}

/// First local index in `lb..ub` whose cumulative weight reaches `target`, or `ub`.
///
/// Indices are relative to `node_offset`; edge counts are relative to `edge_offset`.
pub fn find_index_prefix_sum<P: EdgePrefixSum + ?Sized>(
    weights: Weights,
    target: u128,
    mut lb: usize,
    mut ub: usize,
    prefix: &P,
    node_offset: usize,
    edge_offset: usize,
) -> usize {
    debug_assert!(weights.node != 0 || weights.edge != 0);
    while lb < ub {
        let mid = lb + (ub - lb) / 2;
        let edges = edges_before(prefix, mid + node_offset) - edge_offset;
        if weights.of(mid, edges) < target {
            lb = mid + 1;
        } else {
            ub = mid;
        }
    }
    lb
}

/// Node/edge subranges of division `id` out of `total` over `nodes`.
///
/// `edges` must be the edge slice owned by `nodes` (`edges_before(nodes.start)..edges_before(nodes.end)`).
/// Divisions are contiguous, non-overlapping and together cover `nodes` exactly. When
/// there are more divisions than nodes, the first ones get one node each and the rest an
/// empty range at `nodes.end`.
///
/// # Panics
/// If `total == 0`, `id >= total`, both weights are zero, or `prefix` is shorter than `nodes.end`.
pub fn divide<P: EdgePrefixSum + ?Sized>(
    weights: Weights,
    id: usize,
    total: usize,
    nodes: Range<usize>,
    edges: Range<usize>,
    prefix: &P,
) -> GraphRange {
    assert!(total >= 1, "cannot divide among zero divisions");
    assert!(id < total, "division {id} out of range for {total} divisions");
    assert!(
        weights.node != 0 || weights.edge != 0,
        "node and edge weight cannot both be zero"
    );
    assert!(
        nodes.start <= nodes.end && nodes.end <= prefix.prefix_len(),
        "node range {nodes:?} exceeds prefix sum of length {}",
        prefix.prefix_len()
    );

    let count = nodes.end - nodes.start;
    let span = |lo: usize, hi: usize| GraphRange {
        nodes: lo..hi,
        edges: edges_before(prefix, lo)..edges_before(prefix, hi),
    };

    if count == 0 {
        return GraphRange {
            nodes: nodes.start..nodes.start,
            edges: edges.start..edges.start,
        };
    }
    if total == 1 {
        return span(nodes.start, nodes.end);
    }
    if total > count {
        return if id < count {
            span(nodes.start + id, nodes.start + id + 1)
        } else {
            span(nodes.end, nodes.end)
        };
    }

    let num_edges = edges.end - edges.start;
    let (weights, weight) = match weights.of(count, num_edges) {
        // Edge-only weighting of an edgeless range: balance node counts instead.
        0 => (Weights::NODES_ONLY, count as u128),
        w => (weights, w),
    };
    let block = weight.div_ceil(total as u128);

    let lower = if id == 0 {
        0
    } else {
        find_index_prefix_sum(weights, block * id as u128, 0, count, prefix, nodes.start, edges.start)
    };
    // Trailing zero-weight nodes would otherwise be left to nobody.
    let upper = if id + 1 == total {
        count
    } else {
        find_index_prefix_sum(
            weights,
            block * (id as u128 + 1),
            lower,
            count,
            prefix,
            nodes.start,
            edges.start,
        )
    };
    span(nodes.start + lower, nodes.start + upper)
}

/// Splits `nodes` among `num_threads` workers and returns the `num_threads + 1` boundaries.
///
/// `node_alpha` is the weight of a node relative to an edge (edges weigh 1).
///
/// # Panics
/// If `num_threads == 0`.
pub fn determine_thread_ranges<P: EdgePrefixSum + ?Sized>(
    prefix: &P,
    nodes: Range<usize>,
    num_threads: usize,
    node_alpha: usize,
) -> Vec<usize> {
    assert!(num_threads >= 1, "need at least one thread");
    let edges = edges_before(prefix, nodes.start)..edges_before(prefix, nodes.end);
    let weights = Weights::new(node_alpha, 1);

    let mut ranges = Vec::with_capacity(num_threads + 1);
    ranges.push(nodes.start);
    for tid in 0..num_threads {
        let r = divide(weights, tid, num_threads, nodes.clone(), edges.clone(), prefix);
        debug_assert!(r.nodes.is_empty() || r.nodes.start == ranges[tid]);
        let end = if r.nodes.is_empty() { ranges[tid] } else { r.nodes.end };
        ranges.push(end);
        tracing::trace!(tid, begin = ranges[tid], end, "thread range");
    }

    assert_eq!(ranges[0], nodes.start, "thread ranges do not start at range begin");
    assert_eq!(ranges[num_threads], nodes.end, "thread ranges do not end at range end");
    debug_assert!(ranges.windows(2).all(|w| w[0] <= w[1]));
    ranges
}

/// Per-worker node boundaries plus the aligned edge boundaries.
///
/// Worker `i` owns nodes `nodes[i]..nodes[i + 1]` and exactly the edges of those nodes,
/// `edges[i]..edges[i + 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRanges {
    nodes: Vec<usize>,
    edges: Vec<usize>,
}

impl ThreadRanges {
    /// [`Weights::BALANCED`] split of the whole prefix sum among `num_threads` workers.
    ///
    /// # Panics
    /// If `num_threads == 0`.
    pub fn by_node<P: EdgePrefixSum + ?Sized>(prefix: &P, num_threads: usize) -> Self {
        assert!(num_threads >= 1, "need at least one thread");
        let num_nodes = prefix.prefix_len();
        let num_edges = edges_before(prefix, num_nodes);

        let mut nodes = Vec::with_capacity(num_threads + 1);
        let mut edges = Vec::with_capacity(num_threads + 1);
        nodes.push(0);
        edges.push(0);
        for tid in 0..num_threads {
            let r = divide(Weights::BALANCED, tid, num_threads, 0..num_nodes, 0..num_edges, prefix);
            if r.nodes.is_empty() {
                nodes.push(nodes[tid]);
                edges.push(edges[tid]);
            } else {
                debug_assert_eq!(nodes[tid], r.nodes.start);
                debug_assert_eq!(edges[tid], r.edges.start);
                nodes.push(r.nodes.end);
                edges.push(r.edges.end);
            }
            tracing::debug!(
                tid,
                nodes = ?(nodes[tid]..nodes[tid + 1]),
                edges = ?(edges[tid]..edges[tid + 1]),
                "thread range by node"
            );
        }
        Self { nodes, edges }
    }

    /// Wraps node boundaries (as returned by [`determine_thread_ranges`]) and derives the
    /// aligned edge boundaries from `prefix`.
    ///
    /// # Panics
    /// If fewer than two boundaries are given or they decrease.
    pub fn from_node_bounds<P: EdgePrefixSum + ?Sized>(prefix: &P, nodes: Vec<usize>) -> Self {
        assert!(nodes.len() >= 2, "thread ranges need at least two boundaries");
        assert!(
            nodes.windows(2).all(|w| w[0] <= w[1]),
            "thread range boundaries must be non-decreasing"
        );
        let edges = nodes.iter().map(|&n| edges_before(prefix, n)).collect();
        Self { nodes, edges }
    }

    /// Number of workers the ranges were computed for.
    pub fn num_threads(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Nodes owned by worker `tid`.
    pub fn node_range(&self, tid: usize) -> Range<usize> {
        self.nodes[tid]..self.nodes[tid + 1]
    }

    /// Edges owned by worker `tid`.
    pub fn edge_range(&self, tid: usize) -> Range<usize> {
        self.edges[tid]..self.edges[tid + 1]
    }

    /// Node boundaries, `num_threads + 1` entries.
    pub fn node_bounds(&self) -> &[usize] {
        &self.nodes
    }

    /// Edge boundaries, `num_threads + 1` entries.
    pub fn edge_bounds(&self) -> &[usize] {
        &self.edges
    }

    /// All nodes covered.
    pub fn span(&self) -> Range<usize> {
        self.nodes[0]..self.nodes[self.num_threads()]
    }
}

#[cfg(test)]
mod tests;
