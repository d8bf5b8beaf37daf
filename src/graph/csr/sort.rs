//! Per-node edge sorting.

use core::cmp::Ordering;
use core::mem;
use core::slice;

use crate::concurrency::sync::NodeLock;
use crate::graph::GraphNode;

use super::{CsrGraph, MethodFlag};

impl<N, E, L> CsrGraph<N, E, L>
where
    N: Default + Send + Sync,
    E: Default + Send + Sync,
    L: NodeLock,
{
    /// Sorts `n`'s edges by destination; payloads move with their destinations.
    pub fn sort_edges_by_dst(&mut self, n: GraphNode) {
        let i = self.check_node(n);
        // SAFETY: `&mut self` is exclusive.
        unsafe { self.sort_node_edges(i, by_dst::<E>) };
    }

    /// Stable sort of `n`'s edges by `cmp` over `(destination, payload)` pairs.
    pub fn sort_edges<F>(&mut self, n: GraphNode, cmp: F)
    where
        F: FnMut((GraphNode, &E), (GraphNode, &E)) -> Ordering,
    {
        let i = self.check_node(n);
        // SAFETY: `&mut self` is exclusive.
        unsafe { self.sort_node_edges(i, cmp) };
    }

    /// Stable sort of `n`'s edges by payload.
    pub fn sort_edges_by_edge_data<F>(&mut self, n: GraphNode, mut cmp: F)
    where
        F: FnMut(&E, &E) -> Ordering,
    {
        self.sort_edges(n, |a, b| cmp(a.1, b.1));
    }

    /// Sorts every node's edges by destination on the system pool, one partition per worker.
    pub fn sort_all_edges_by_dst(&mut self) {
        let g = &*self;
        g.par_for_each_node(|n| {
            g.acquire_node(n, MethodFlag::Write);
            // SAFETY: node `n`'s edge slice is touched by this worker only, and
            // `&mut self` keeps every other reference out.
            unsafe { g.sort_node_edges(n as usize, by_dst::<E>) };
        });
        tracing::debug!(nodes = self.num_nodes, "sorted all edges by destination");
    }

    /// # Safety
    /// No other reference to node `i`'s edge slices may exist for the duration.
    unsafe fn sort_node_edges<F>(&self, i: usize, mut cmp: F)
    where
        F: FnMut((GraphNode, &E), (GraphNode, &E)) -> Ordering,
    {
        let begin = self.raw_begin(i);
        let len = self.raw_end(i) - begin;
        if len < 2 {
            return;
        }
        let dst = slice::from_raw_parts_mut(self.edge_dst.slot_ptr(begin), len);
        if mem::size_of::<E>() == 0 {
            let unit = E::default();
            dst.sort_by(|&a, &b| cmp((a, &unit), (b, &unit)));
            return;
        }
        let data = slice::from_raw_parts_mut(self.edge_data.slot_ptr(begin), len);
        let mut pairs: Vec<(GraphNode, E)> = dst
            .iter()
            .copied()
            .zip(data.iter_mut().map(mem::take))
            .collect();
        pairs.sort_by(|a, b| cmp((a.0, &a.1), (b.0, &b.1)));
        for (k, (d, w)) in pairs.into_iter().enumerate() {
            dst[k] = d;
            data[k] = w;
        }
    }
}

#[inline]
fn by_dst<E>(a: (GraphNode, &E), b: (GraphNode, &E)) -> Ordering {
    a.0.cmp(&b.0)
}
