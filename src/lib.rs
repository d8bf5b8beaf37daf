//! # `lcgraph` - NUMA-aware CSR graphs on a fork/join pool
//!
//! The storage and execution substrate for shared-memory parallel graph analytics:
//! a compressed-sparse-row graph laid out page by page across worker threads,
//! guarded by per-node spin locks, and driven by a barrier thread pool.
//!
//! ## Architecture
//!
//! 1. **Partitioner** (`graph::partition`):
//!    - Splits a node range into near-equal node+edge weight shares by binary search
//!      over the edge prefix sum
//!    - The same split decides page placement and per-worker loop slices
//!
//! 2. **Placed arrays** (`alloc::NumaArray`):
//!    - Page-granular storage initialised by the worker that should own each page
//!    - Five placement policies: local, floating, blocked, interleaved, specific
//!
//! 3. **CSR graph** (`graph::CsrGraph<N, E, L>`):
//!    - Node payloads with inline or out-of-line locks, edge destinations and payloads
//!    - Functional and staged construction, per-node sorting, in-place transpose
//!    - `L = NoLock` compiles every lock operation away
//!
//! 4. **Execution** (`concurrency`):
//!    - `ThreadPool::run` hands one work item to every worker and waits for all
//!    - `do_all` / `CsrGraph::par_for_each_node` release node locks after every item
//!
//! ## Locking discipline
//!
//! Accessors acquire and never release. A lock taken inside a parallel loop body is
//! held until that body returns for the current node; outside the pool, wrap work in
//! [`concurrency::lock_context::step`]. Locks are binary: read and write intent block
//! each other.
//!
//! ## Example
//!
//! ```rust
//! use lcgraph::{CsrGraph, GraphConfig, MethodFlag};
//!
//! // 0 -> 1, 2 ; 1 -> 2 ; 2 -> 3
//! let adjacency = vec![vec![1, 2], vec![2], vec![3], vec![]];
//! let mut graph: CsrGraph<u64> = CsrGraph::from_adjacency(GraphConfig::default(), &adjacency);
//!
//! graph.par_for_each_node(|n| {
//!     for e in graph.edges(n, MethodFlag::Write) {
//!         let dst = graph.edge_dst(e);
//!         // SAFETY: `dst` is locked for the rest of this step and nothing else borrows it.
//!         unsafe { *graph.get_data(dst, MethodFlag::Write) += 1 };
//!     }
//! });
//! assert_eq!(*graph.data(2), 2);
//!
//! graph.transpose(false);
//! assert_eq!(graph.neighbors(2), &[0, 1]);
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]

pub mod alloc;
pub mod concurrency;
pub mod config;
pub mod graph;

pub use alloc::{AllocPolicy, NumaArray};
pub use concurrency::{do_all, NoLock, NodeLock, SpinLock, ThreadPool};
pub use config::{init, RuntimeConfig};
pub use graph::{CsrGraph, GraphConfig, GraphNode, MethodFlag, ThreadRanges};
