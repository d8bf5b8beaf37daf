//! Parallel-for over node ranges.
//!
//! The iteration domain is split with the partitioner (one contiguous slice per worker of
//! the process-wide pool) and executed through a single [`ThreadPool::run`](super::pool::ThreadPool::run).
//! Every item is its own lock step: node locks taken by the body are released as soon as
//! the body returns for that item.

use core::ops::Range;

use crate::concurrency::{lock_context, pool};
use crate::graph::partition::{self, NoEdges, ThreadRanges, Weights};
use crate::graph::GraphNode;

/// Runs `body(n)` for every `n` in `range`, splitting it evenly across the system pool.
pub fn do_all<F>(range: Range<GraphNode>, body: F)
where
    F: Fn(GraphNode) + Sync,
{
    let begin = range.start as usize;
    let end = (range.end as usize).max(begin);
    let prefix = NoEdges::new(end);
    pool::on_each(|tid, threads| {
        let mine = partition::divide(
            Weights::NODES_ONLY,
            tid,
            threads,
            begin..end,
            0..0,
            &prefix,
        )
        .nodes;
        run_slice(mine, &body);
    });
}

/// Runs `body(n)` over pre-computed per-thread ranges, worker `i` taking `ranges.node_range(i)`.
///
/// Falls back to an even split if `ranges` was computed for a different worker count.
pub fn do_all_ranges<F>(ranges: &ThreadRanges, body: F)
where
    F: Fn(GraphNode) + Sync,
{
    let full = ranges.span();
    pool::on_each(|tid, threads| {
        if threads == ranges.num_threads() {
            run_slice(ranges.node_range(tid), &body);
        } else {
            let prefix = NoEdges::new(full.end);
            let mine =
                partition::divide(Weights::NODES_ONLY, tid, threads, full.clone(), 0..0, &prefix).nodes;
            run_slice(mine, &body);
        }
    });
}

#[inline]
fn run_slice<F>(nodes: Range<usize>, body: &F)
where
    F: Fn(GraphNode) + Sync,
{
    for n in nodes {
        // Node counts are bounded by `GraphNode::MAX` at construction.
        lock_context::step(|| body(n as GraphNode));
    }
}
