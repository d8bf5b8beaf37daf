//! In-place edge reversal by stable counting sort on destination.

use core::mem;
use std::time::Instant;

use crate::alloc::{AllocPolicy, NumaArray};
use crate::concurrency::pool;
use crate::concurrency::sync::NodeLock;
use crate::graph::partition::ThreadRanges;
use crate::graph::GraphNode;

use super::{CsrGraph, NodeStorage};

impl<N, E, L> CsrGraph<N, E, L>
where
    N: Default + Send + Sync,
    E: Default + Send + Sync,
    L: NodeLock,
{
    /// Reverses every edge. Node payloads stay with their nodes; edge payloads follow
    /// their edges.
    ///
    /// Edges of each new source keep the order of their old sources. Thread ranges are
    /// recomputed from the new prefix sum; with `reallocate` every array is also moved
    /// to storage placed by those ranges.
    pub fn transpose(&mut self, reallocate: bool) {
        let started = Instant::now();
        let num_nodes = self.num_nodes;
        let num_edges = self.num_edges;

        let old_index = self.edge_index.to_vec();
        let old_dst = self.edge_dst.to_vec();
        let mut old_data = mem::take(&mut self.edge_data);

        let mut new_index = vec![0usize; num_nodes];
        for &d in &old_dst {
            new_index[d as usize] += 1;
        }
        let mut cursor = Vec::with_capacity(num_nodes);
        let mut acc = 0usize;
        for count in &mut new_index {
            cursor.push(acc);
            acc += *count;
            *count = acc;
        }
        debug_assert_eq!(acc, num_edges);

        let ranges = ThreadRanges::by_node(&new_index, pool::active_threads().max(1));
        if reallocate {
            let node_policy = AllocPolicy::Specific(ranges.node_bounds());
            let edge_policy = AllocPolicy::Specific(ranges.edge_bounds());
            self.nodes.quiesce();
            let nodes = mem::replace(&mut self.nodes, NodeStorage::empty(self.config.out_of_line_locks));
            self.nodes = nodes.relocate(node_policy);
            self.edge_index = NumaArray::from_slice(&new_index, node_policy);
            self.edge_dst = NumaArray::new(num_edges, edge_policy);
            self.edge_data = NumaArray::new(num_edges, edge_policy);
        } else {
            self.edge_index.copy_from_slice(&new_index);
            self.edge_data = NumaArray::new(num_edges, self.config.policy());
        }

        let mut src = 0usize;
        for (e, &d) in old_dst.iter().enumerate() {
            while old_index[src] <= e {
                src += 1;
            }
            let slot = &mut cursor[d as usize];
            self.edge_dst[*slot] = src as GraphNode;
            self.edge_data[*slot] = mem::take(&mut old_data[e]);
            *slot += 1;
        }
        drop(old_data);

        self.thread_ranges = Some(ranges);
        debug_assert!(self.is_well_formed());
        tracing::debug!(
            nodes = num_nodes,
            edges = num_edges,
            reallocate,
            elapsed_us = started.elapsed().as_micros() as u64,
            "graph transposed"
        );
    }
}
