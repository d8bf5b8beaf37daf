//! Local-computation CSR graph with per-node locks.
//!
//! Storage is four parallel arrays plus the lock table:
//! - `edge_index`: inclusive prefix sum, entry `n` is the end of node `n`'s edges
//! - `edge_dst`: destination of every edge
//! - `edge_data`: payload of every edge (zero-sized for `E = ()`)
//! - node payloads, with their locks either inline or in a separate array
//!
//! Every array is a [`NumaArray`], so construction places its pages with the same
//! partition the parallel loops later iterate with.
//!
//! ### Locking
//! Accessors taking a [`MethodFlag`] acquire node locks and never release them; the
//! surrounding step (one item of a parallel loop, or [`lock_context::step`]) does. A
//! thread that already holds a node's lock re-enters it for free. Dropping or
//! reallocating the graph while another thread still holds one of its locks aborts.
//!
//! ### Performance Characteristics
//! | Operation | Complexity |
//! |-----------|------------|
//! | `edge_begin` / `edge_end` / `edge_dst` | \(O(1)\), plus \(O(d \log d)\) neighbour locking |
//! | `find_edge` | \(O(d)\) |
//! | `find_edge_sorted_by_dst` | \(O(\log d)\) |
//! | `sort_all_edges_by_dst` | \(O(m \log d_{max} / t)\) |
//! | `transpose` | \(O(n + m)\) |

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::Range;

use serde::{Deserialize, Serialize};

use crate::alloc::{AllocPolicy, NumaArray};
use crate::concurrency::lock_context;
use crate::concurrency::sync::{NodeLock, SpinLock};
use crate::concurrency::{do_all, pool};
use crate::graph::partition::{self, GraphRange, ThreadRanges, Weights};
use crate::graph::GraphNode;

mod construct;
mod sort;
mod transpose;


/// Layout switches fixed at graph construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Place arrays [`Blocked`](AllocPolicy::Blocked) instead of
    /// [`Interleaved`](AllocPolicy::Interleaved).
    pub numa_alloc: bool,
    /// Keep node locks in their own array instead of next to each payload.
    pub out_of_line_locks: bool,
}

impl GraphConfig {
    pub(crate) fn policy(self) -> AllocPolicy<'static> {
        if self.numa_alloc {
            AllocPolicy::Blocked
        } else {
            AllocPolicy::Interleaved
        }
    }
}

/// Lock intent of an accessor.
///
/// The node lock is binary, so `Read` and `Write` acquire the same way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MethodFlag {
    /// No acquisition.
    Unprotected,
    /// Acquire for reading.
    Read,
    /// Acquire for writing.
    #[default]
    Write,
}

impl MethodFlag {
    /// Whether this flag acquires locks.
    #[inline]
    pub const fn locks(self) -> bool {
        !matches!(self, Self::Unprotected)
    }
}

#[repr(transparent)]
#[derive(Default)]
pub(crate) struct NodeCell<N>(UnsafeCell<N>);

// SAFETY: shared mutation goes through `CsrGraph::get_data`, whose contract forbids
// aliasing; node locks serialise concurrent writers.
unsafe impl<N: Send + Sync> Sync for NodeCell<N> {}

impl<N> NodeCell<N> {
    #[inline]
    pub(crate) fn get(&self) -> *mut N {
        self.0.get()
    }
}

#[derive(Default)]
pub(crate) struct NodeSlot<N, L> {
    lock: L,
    data: NodeCell<N>,
}

pub(crate) enum NodeStorage<N, L> {
    Inline(NumaArray<NodeSlot<N, L>>),
    OutOfLine {
        data: NumaArray<NodeCell<N>>,
        locks: NumaArray<L>,
    },
}

impl<N, L: NodeLock> NodeStorage<N, L> {
    fn empty(out_of_line: bool) -> Self {
        if out_of_line {
            Self::OutOfLine {
                data: NumaArray::empty(),
                locks: NumaArray::empty(),
            }
        } else {
            Self::Inline(NumaArray::empty())
        }
    }

    #[inline]
    fn lock(&self, n: usize) -> &L {
        match self {
            Self::Inline(slots) => &slots[n].lock,
            Self::OutOfLine { locks, .. } => &locks[n],
        }
    }

    #[inline]
    fn cell(&self, n: usize) -> &NodeCell<N> {
        match self {
            Self::Inline(slots) => &slots[n].data,
            Self::OutOfLine { data, .. } => &data[n],
        }
    }

    /// Releases the calling thread's locks in this storage; aborts if another thread holds one.
    fn quiesce(&self) {
        if !L::IS_LOCKING {
            return;
        }
        let (bytes, held) = match self {
            Self::Inline(slots) => (
                slots.byte_range(),
                slots.iter().position(|s| s.lock.value() != 0),
            ),
            Self::OutOfLine { locks, .. } => (
                locks.byte_range(),
                locks.iter().position(|l| l.value() != 0),
            ),
        };
        if held.is_none() {
            return;
        }
        lock_context::release_held_in(bytes.start, bytes.end);
        let still_held = match self {
            Self::Inline(slots) => slots.iter().position(|s| s.lock.value() != 0),
            Self::OutOfLine { locks, .. } => locks.iter().position(|l| l.value() != 0),
        };
        if let Some(node) = still_held {
            tracing::error!(node, "graph storage released while another thread holds a node lock");
            std::process::abort();
        }
    }
}

impl<N: Default + Send, L: NodeLock> NodeStorage<N, L> {
    fn allocate(len: usize, out_of_line: bool, policy: AllocPolicy<'_>) -> Self {
        if out_of_line {
            Self::OutOfLine {
                data: NumaArray::new(len, policy),
                locks: NumaArray::new(len, policy),
            }
        } else {
            Self::Inline(NumaArray::new(len, policy))
        }
    }

    fn relocate(self, policy: AllocPolicy<'_>) -> Self {
        match self {
            Self::Inline(slots) => Self::Inline(slots.relocate(policy)),
            Self::OutOfLine { data, locks } => Self::OutOfLine {
                data: data.relocate(policy),
                locks: locks.relocate(policy),
            },
        }
    }
}

/// A compressed-sparse-row graph with node payloads `N`, edge payloads `E` and node
/// locks `L` ([`SpinLock`], or [`NoLock`](crate::concurrency::NoLock) for a lock-free build).
pub struct CsrGraph<N, E = (), L: NodeLock = SpinLock> {
    config: GraphConfig,
    nodes: NodeStorage<N, L>,
    edge_index: NumaArray<usize>,
    edge_dst: NumaArray<GraphNode>,
    edge_data: NumaArray<E>,
    num_nodes: usize,
    num_edges: usize,
    thread_ranges: Option<ThreadRanges>,
}

impl<N, E, L> CsrGraph<N, E, L>
where
    N: Default + Send + Sync,
    E: Default + Send + Sync,
    L: NodeLock,
{
    /// An empty graph; size it with [`allocate_from`](Self::allocate_from) or
    /// [`allocate_from_by_node`](Self::allocate_from_by_node).
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config,
            nodes: NodeStorage::empty(config.out_of_line_locks),
            edge_index: NumaArray::empty(),
            edge_dst: NumaArray::empty(),
            edge_data: NumaArray::empty(),
            num_nodes: 0,
            num_edges: 0,
            thread_ranges: None,
        }
    }

    /// Layout switches this graph was built with.
    pub fn config(&self) -> GraphConfig {
        self.config
    }

    /// Number of nodes.
    #[inline]
    pub fn size(&self) -> usize {
        self.num_nodes
    }

    /// Number of edges.
    #[inline]
    pub fn size_edges(&self) -> usize {
        self.num_edges
    }

    /// `true` if the graph has no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_nodes == 0
    }

    /// All node indices, `0..size()`.
    #[inline]
    pub fn nodes(&self) -> Range<GraphNode> {
        0..self.num_nodes as GraphNode
    }

    #[inline]
    fn check_node(&self, n: GraphNode) -> usize {
        let i = n as usize;
        assert!(
            i < self.num_nodes,
            "node {n} out of range for graph of {} nodes",
            self.num_nodes
        );
        i
    }

    #[inline]
    fn check_edge(&self, e: usize) {
        assert!(
            e < self.num_edges,
            "edge {e} out of range for graph of {} edges",
            self.num_edges
        );
    }

    #[inline]
    fn raw_begin(&self, i: usize) -> usize {
        if i == 0 {
            0
        } else {
            self.edge_index[i - 1]
        }
    }

    #[inline]
    fn raw_end(&self, i: usize) -> usize {
        self.edge_index[i]
    }

    /// Edge-end index of node `n`: the number of edges owned by nodes `0..=n`.
    #[inline]
    pub fn prefix_sum_at(&self, n: GraphNode) -> usize {
        self.edge_index[self.check_node(n)]
    }

    /// The edge index prefix sum, one entry per node.
    pub fn edge_prefix_sum(&self) -> &[usize] {
        self.edge_index.as_slice()
    }

    /// Acquires node `n`'s lock for the rest of the current step if `flag` locks.
    #[inline]
    pub fn acquire_node(&self, n: GraphNode, flag: MethodFlag) {
        let i = self.check_node(n);
        if flag.locks() {
            // SAFETY: lock storage is only moved or freed through `&mut self` or drop,
            // both of which first run `NodeStorage::quiesce`.
            unsafe { lock_context::acquire(self.nodes.lock(i)) };
        }
    }

    /// Mutable access to node `n`'s payload after acquiring its lock per `flag`.
    ///
    /// The lock stays held until the current step ends.
    ///
    /// # Safety
    /// While the returned reference lives, no other reference to the same payload may
    /// exist: not from another `get_data` on this thread, nor from [`data`](Self::data),
    /// nor from another thread accessing it with [`MethodFlag::Unprotected`].
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub unsafe fn get_data(&self, n: GraphNode, flag: MethodFlag) -> &mut N {
        self.acquire_node(n, flag);
        &mut *self.nodes.cell(n as usize).get()
    }

    /// Shared access to node `n`'s payload, without locking.
    #[inline]
    pub fn data(&self, n: GraphNode) -> &N {
        let i = self.check_node(n);
        // SAFETY: writers go through `get_data`, whose contract excludes this reference.
        unsafe { &*self.nodes.cell(i).get() }
    }

    /// Exclusive access to node `n`'s payload.
    #[inline]
    pub fn data_mut(&mut self, n: GraphNode) -> &mut N {
        let i = self.check_node(n);
        // SAFETY: `&mut self` is exclusive.
        unsafe { &mut *self.nodes.cell(i).get() }
    }

    /// First edge of node `n`.
    ///
    /// With a locking `flag` this acquires `n` and every destination of `n`, in ascending
    /// node order.
    pub fn edge_begin(&self, n: GraphNode, flag: MethodFlag) -> usize {
        let i = self.check_node(n);
        let begin = self.raw_begin(i);
        if flag.locks() && L::IS_LOCKING {
            let mut order: Vec<GraphNode> = Vec::with_capacity(1 + self.raw_end(i) - begin);
            order.push(n);
            order.extend_from_slice(&self.edge_dst[begin..self.raw_end(i)]);
            order.sort_unstable();
            order.dedup();
            for m in order {
                // SAFETY: as in `acquire_node`.
                unsafe { lock_context::acquire(self.nodes.lock(m as usize)) };
            }
        }
        begin
    }

    /// One past the last edge of node `n`; acquires `n` per `flag`.
    pub fn edge_end(&self, n: GraphNode, flag: MethodFlag) -> usize {
        self.acquire_node(n, flag);
        self.raw_end(n as usize)
    }

    /// `edge_begin(n, flag)..edge_end(n, flag)`.
    pub fn edges(&self, n: GraphNode, flag: MethodFlag) -> Range<usize> {
        let begin = self.edge_begin(n, flag);
        begin..self.raw_end(n as usize)
    }

    /// Out-degree of `n`.
    #[inline]
    pub fn degree(&self, n: GraphNode) -> usize {
        let i = self.check_node(n);
        self.raw_end(i) - self.raw_begin(i)
    }

    /// Destinations of `n`'s edges, unlocked.
    #[inline]
    pub fn neighbors(&self, n: GraphNode) -> &[GraphNode] {
        let i = self.check_node(n);
        &self.edge_dst[self.raw_begin(i)..self.raw_end(i)]
    }

    /// Destination of edge `e`.
    #[inline]
    pub fn edge_dst(&self, e: usize) -> GraphNode {
        self.check_edge(e);
        self.edge_dst[e]
    }

    /// Payload of edge `e`.
    #[inline]
    pub fn edge_data(&self, e: usize) -> &E {
        self.check_edge(e);
        &self.edge_data[e]
    }

    /// Mutable payload of edge `e`.
    #[inline]
    pub fn edge_data_mut(&mut self, e: usize) -> &mut E {
        self.check_edge(e);
        &mut self.edge_data[e]
    }

    /// First edge of `src` whose destination is `dst`, by linear scan.
    pub fn find_edge(&self, src: GraphNode, dst: GraphNode) -> Option<usize> {
        let i = self.check_node(src);
        let begin = self.raw_begin(i);
        self.neighbors(src)
            .iter()
            .position(|&d| d == dst)
            .map(|k| begin + k)
    }

    /// Like [`find_edge`](Self::find_edge), by binary search; `src`'s edges must be sorted by destination.
    pub fn find_edge_sorted_by_dst(&self, src: GraphNode, dst: GraphNode) -> Option<usize> {
        let i = self.check_node(src);
        let begin = self.raw_begin(i);
        let dsts = self.neighbors(src);
        let k = dsts.partition_point(|&d| d < dst);
        (k < dsts.len() && dsts[k] == dst).then_some(begin + k)
    }

    /// Reorders `n`'s edges so those whose destination satisfies `pred` come first, and
    /// returns how many do. Payloads move with their destinations.
    pub fn partition_neighbors<F>(&mut self, n: GraphNode, mut pred: F) -> usize
    where
        F: FnMut(GraphNode) -> bool,
    {
        let i = self.check_node(n);
        let begin = self.raw_begin(i);
        let end = self.raw_end(i);
        let mut split = begin;
        for e in begin..end {
            if pred(self.edge_dst[e]) {
                self.edge_dst.swap(split, e);
                self.edge_data.swap(split, e);
                split += 1;
            }
        }
        split - begin
    }

    /// The stored per-worker ranges, if any.
    pub fn thread_ranges(&self) -> Option<&ThreadRanges> {
        self.thread_ranges.as_ref()
    }

    /// Drops the stored per-worker ranges.
    pub fn clear_ranges(&mut self) {
        self.thread_ranges = None;
    }

    /// Splits `begin..end` among the active workers, weighting a node `node_alpha` times an
    /// edge, and stores the result.
    ///
    /// # Panics
    /// If `begin > end` or `end > size()`.
    pub fn determine_thread_ranges(
        &mut self,
        begin: GraphNode,
        end: GraphNode,
        node_alpha: usize,
    ) -> &ThreadRanges {
        let range = begin as usize..end as usize;
        assert!(
            range.start <= range.end && range.end <= self.num_nodes,
            "node range {range:?} exceeds graph of {} nodes",
            self.num_nodes
        );
        let threads = pool::active_threads().max(1);
        let bounds =
            partition::determine_thread_ranges(self.edge_index.as_slice(), range, threads, node_alpha);
        self.thread_ranges
            .insert(ThreadRanges::from_node_bounds(self.edge_index.as_slice(), bounds))
    }

    /// Balanced node+edge split of the whole graph among the active workers; stores the result.
    pub fn determine_thread_ranges_by_node(&mut self) -> &ThreadRanges {
        let threads = pool::active_threads().max(1);
        let ranges = ThreadRanges::by_node(self.edge_index.as_slice(), threads);
        self.thread_ranges.insert(ranges)
    }

    /// Division `id` of `total` over the whole graph.
    pub fn divide_by_node(&self, weights: Weights, id: usize, total: usize) -> GraphRange {
        partition::divide(
            weights,
            id,
            total,
            0..self.num_nodes,
            0..self.num_edges,
            self.edge_index.as_slice(),
        )
    }

    /// Division `id` of `total` over `nodes`.
    pub fn divide_range_by_node(
        &self,
        weights: Weights,
        id: usize,
        total: usize,
        nodes: Range<GraphNode>,
    ) -> GraphRange {
        let nodes = nodes.start as usize..nodes.end as usize;
        let prefix = self.edge_index.as_slice();
        let edges = partition::edges_before(prefix, nodes.start)..partition::edges_before(prefix, nodes.end);
        partition::divide(weights, id, total, nodes, edges, prefix)
    }

    /// Nodes owned by the calling pool worker under the stored ranges.
    ///
    /// Outside a worker, or before any ranges exist, this is the whole graph.
    pub fn local_nodes(&self) -> Range<GraphNode> {
        match (pool::current_worker(), &self.thread_ranges) {
            (Some(tid), Some(ranges)) if tid < ranges.num_threads() => {
                let r = ranges.node_range(tid);
                r.start as GraphNode..r.end as GraphNode
            }
            (Some(_), Some(ranges)) => {
                let end = ranges.span().end as GraphNode;
                end..end
            }
            _ => self.nodes(),
        }
    }

    /// Runs `body(n)` for every node on the system pool, one step per node, using the
    /// stored ranges when present.
    pub fn par_for_each_node<F>(&self, body: F)
    where
        F: Fn(GraphNode) + Sync,
    {
        match &self.thread_ranges {
            Some(ranges) => do_all::do_all_ranges(ranges, body),
            None => do_all::do_all(self.nodes(), body),
        }
    }

    /// Checks the CSR invariants: non-decreasing prefix sum ending at `size_edges()` and
    /// every destination in range.
    pub fn is_well_formed(&self) -> bool {
        let prefix = self.edge_index.as_slice();
        let monotone = prefix.windows(2).all(|w| w[0] <= w[1]);
        let total = partition::edges_before(prefix, self.num_nodes) == self.num_edges;
        let dsts = self.edge_dst.iter().all(|&d| (d as usize) < self.num_nodes);
        monotone && total && dsts
    }
}

impl<N, E, L> Default for CsrGraph<N, E, L>
where
    N: Default + Send + Sync,
    E: Default + Send + Sync,
    L: NodeLock,
{
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}

impl<N, E, L: NodeLock> Drop for CsrGraph<N, E, L> {
    fn drop(&mut self) {
        self.nodes.quiesce();
    }
}

impl<N, E, L: NodeLock> fmt::Debug for CsrGraph<N, E, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrGraph")
            .field("nodes", &self.num_nodes)
            .field("edges", &self.num_edges)
            .field("config", &self.config)
            .field("thread_ranges", &self.thread_ranges)
            .finish()
    }
}
