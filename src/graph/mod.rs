//! CSR graph storage and the partitioner that lays it out across workers.
//!
//! - `partition`: weighted splitting of node ranges by edge prefix sum
//! - `csr`: the [`CsrGraph`] container

pub mod csr;
pub mod partition;

pub use csr::{CsrGraph, GraphConfig, MethodFlag};
pub use partition::{GraphRange, ThreadRanges, Weights};

/// Dense zero-based node index.
pub type GraphNode = u32;
