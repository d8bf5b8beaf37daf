//! Threads, barriers and node locks.
//!
//! - `sync`: futex-backed semaphore and the node lock types
//! - `lock_context`: per-thread record of node locks taken during one step
//! - `pool`: the fork/join [`ThreadPool`] and the process-wide instance
//! - `do_all`: parallel-for over node ranges on top of the pool

pub mod do_all;
pub mod lock_context;
pub mod pool;
pub mod sync;

pub use do_all::{do_all, do_all_ranges};
pub use pool::{active_threads, current_worker, set_active_threads, Executable, ThreadPool};
pub use sync::{NoLock, NodeLock, Semaphore, SpinLock};
