//! Page-granular backing storage for graph arrays.
//!
//! - `syscall`: map/unmap anonymous regions straight from the OS.
//! - [`NumaArray`]: a fixed-length array whose pages are first touched according to an
//!   [`AllocPolicy`], so each page lands on the socket of the worker that will use it.

pub mod numa_array;
pub mod page;
pub(crate) mod syscall;

pub use numa_array::{AllocPolicy, NumaArray};
pub use page::{align_up, PAGE_SIZE};
