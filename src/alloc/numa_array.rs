//! Fixed-length arrays placed page by page across the worker threads.
//!
//! Memory comes straight from [`allocate_region`](super::syscall::allocate_region), so no
//! page is backed until written. Initialisation is the first touch: each element is
//! written by the thread the [`AllocPolicy`] designates, and the OS binds the page to
//! that thread's socket.
//!
//! | Policy | Who initialises |
//! |---|---|
//! | `Local` | the calling thread, every page |
//! | `Floating` | whichever worker claims the page first from a shared cursor |
//! | `Blocked` | worker `i` of `n`, the `i`-th even run of pages |
//! | `Interleaved` | worker `p % n` for page `p` |
//! | `Specific(bounds)` | worker `i`, elements `bounds[i]..bounds[i + 1]` |

use core::alloc::Layout;
use core::fmt;
use core::mem;
use core::ops::{Deref, DerefMut, Range};
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::alloc::page::{elems_per_page, PAGE_SIZE};
use crate::alloc::syscall::{allocate_region, free_region};
use crate::concurrency::pool;

/// Page placement policy for a [`NumaArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocPolicy<'a> {
    /// Every page bound to the calling thread's socket.
    Local,
    /// No fixed owner; the first worker to touch a page binds it.
    Floating,
    /// One contiguous, evenly sized run of pages per worker.
    Blocked,
    /// Pages dealt round-robin across workers.
    Interleaved,
    /// Caller-supplied element boundaries, one slice per worker (`workers + 1` entries).
    Specific(&'a [usize]),
}

impl AllocPolicy<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Floating => "floating",
            Self::Blocked => "blocked",
            Self::Interleaved => "interleaved",
            Self::Specific(_) => "specific",
        }
    }
}

struct SendPtr<T>(*mut T);

impl<T> Clone for SendPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SendPtr<T> {}

// SAFETY: used only to hand disjoint element ranges to pool workers.
unsafe impl<T: Send> Send for SendPtr<T> {}
unsafe impl<T: Send> Sync for SendPtr<T> {}

impl<T> SendPtr<T> {
    #[inline]
    fn at(self, i: usize) -> *mut T {
        // SAFETY: callers stay within the allocation.
        unsafe { self.0.add(i) }
    }
}

/// A fixed-length, page-placed array.
pub struct NumaArray<T> {
    ptr: NonNull<T>,
    len: usize,
}

// SAFETY: `NumaArray` owns its elements like `Vec<T>`.
unsafe impl<T: Send> Send for NumaArray<T> {}
unsafe impl<T: Sync> Sync for NumaArray<T> {}

impl<T> NumaArray<T> {
    /// An array of length zero; allocates nothing.
    pub const fn empty() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
        }
    }

    /// Allocates `len` elements, writing `init(i)` into slot `i` from the thread `policy` picks.
    ///
    /// # Panics
    /// If a `Specific` boundary list does not end at `len`.
    pub fn from_fn<F>(len: usize, policy: AllocPolicy<'_>, init: F) -> Self
    where
        T: Send,
        F: Fn(usize) -> T + Sync,
    {
        let base = Self::map(len);
        let out = SendPtr(base.as_ptr());
        touch::<T, _>(len, policy, |range| {
            for i in range {
                // SAFETY: `touch` hands out disjoint in-bounds ranges, each slot written once.
                unsafe { out.at(i).write(init(i)) };
            }
        });
        tracing::debug!(
            policy = policy.name(),
            len,
            bytes = len * mem::size_of::<T>(),
            "numa array allocated"
        );
        Self { ptr: base, len }
    }

    /// Allocates `len` default elements.
    pub fn new(len: usize, policy: AllocPolicy<'_>) -> Self
    where
        T: Default + Send,
    {
        Self::from_fn(len, policy, |_| T::default())
    }

    /// Allocates a copy of `src`.
    pub fn from_slice(src: &[T], policy: AllocPolicy<'_>) -> Self
    where
        T: Clone + Send + Sync,
    {
        Self::from_fn(src.len(), policy, |i| src[i].clone())
    }

    /// Moves every element into a fresh allocation placed by `policy`.
    pub fn relocate(self, policy: AllocPolicy<'_>) -> Self
    where
        T: Send,
    {
        let len = self.len;
        let base = Self::map(len);
        let src = SendPtr(self.ptr.as_ptr());
        let dst = SendPtr(base.as_ptr());
        touch::<T, _>(len, policy, |range| {
            for i in range {
                // SAFETY: each source slot is read exactly once; the old storage is
                // released below without dropping its elements.
                unsafe { dst.at(i).write(ptr::read(src.at(i))) };
            }
        });
        let mut old = mem::ManuallyDrop::new(self);
        // SAFETY: elements were moved out above.
        unsafe { old.release_storage() };
        tracing::debug!(policy = policy.name(), len, "numa array relocated");
        Self { ptr: base, len }
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if the array has no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shared view of all elements.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: `len` initialised elements live at `ptr`.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Exclusive view of all elements.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as above, and `&mut self` is exclusive.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Raw pointer to element `i`, for writers coordinated by external locking.
    ///
    /// # Panics
    /// If `i >= len`.
    #[inline]
    pub(crate) fn slot_ptr(&self, i: usize) -> *mut T {
        assert!(i < self.len, "index {i} out of bounds for length {}", self.len);
        // SAFETY: bounds checked above.
        unsafe { self.ptr.as_ptr().add(i) }
    }

    /// Address range of the storage, for lock bookkeeping.
    pub(crate) fn byte_range(&self) -> Range<*const u8> {
        let start = self.ptr.as_ptr() as *const u8;
        // SAFETY: one past the end of the allocation.
        let end = unsafe { start.add(self.len * mem::size_of::<T>()) };
        start..end
    }

    fn map(len: usize) -> NonNull<T> {
        assert!(
            mem::align_of::<T>() <= PAGE_SIZE,
            "element alignment exceeds the page size"
        );
        let bytes = len.checked_mul(mem::size_of::<T>()).unwrap_or_else(|| {
            tracing::error!(len, "numa array size overflows usize");
            std::process::abort()
        });
        if bytes == 0 {
            return NonNull::dangling();
        }
        // SAFETY: non-zero size; the region is released in `release_storage`.
        match unsafe { allocate_region(bytes) }.and_then(|p| NonNull::new(p as *mut T)) {
            Some(p) => p,
            None => {
                tracing::error!(bytes, "failed to map numa array region");
                match Layout::from_size_align(bytes, PAGE_SIZE) {
                    Ok(layout) => std::alloc::handle_alloc_error(layout),
                    Err(_) => std::process::abort(),
                }
            }
        }
    }

    /// Unmaps the storage without dropping elements.
    unsafe fn release_storage(&mut self) {
        let bytes = self.len * mem::size_of::<T>();
        if bytes != 0 {
            free_region(self.ptr.as_ptr() as *mut u8, bytes);
        }
        self.ptr = NonNull::dangling();
        self.len = 0;
    }
}

impl<T> Drop for NumaArray<T> {
    fn drop(&mut self) {
        // SAFETY: all `len` elements are initialised; storage is released afterwards.
        unsafe {
            ptr::drop_in_place(self.as_mut_slice());
            self.release_storage();
        }
    }
}

impl<T> Default for NumaArray<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Deref for NumaArray<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> DerefMut for NumaArray<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: fmt::Debug> fmt::Debug for NumaArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// Calls `f` on disjoint element ranges covering `0..len`, each from the thread `policy` designates.
fn touch<T, F>(len: usize, policy: AllocPolicy<'_>, f: F)
where
    F: Fn(Range<usize>) + Sync,
{
    if len == 0 {
        return;
    }
    let per_page = elems_per_page::<T>();
    let pages = len.div_ceil(per_page);
    let page = |p: usize| (p * per_page)..((p + 1) * per_page).min(len);

    match policy {
        AllocPolicy::Local => f(0..len),
        AllocPolicy::Floating => {
            let cursor = AtomicUsize::new(0);
            pool::on_each(|_, _| loop {
                let p = cursor.fetch_add(1, Ordering::Relaxed);
                if p >= pages {
                    break;
                }
                f(page(p));
            });
        }
        AllocPolicy::Blocked => pool::on_each(|tid, threads| {
            let run = pages.div_ceil(threads);
            let first = (tid * run).min(pages);
            let last = ((tid + 1) * run).min(pages);
            if first < last {
                f(page(first).start..page(last - 1).end);
            }
        }),
        AllocPolicy::Interleaved => pool::on_each(|tid, threads| {
            for p in (tid..pages).step_by(threads) {
                f(page(p));
            }
        }),
        AllocPolicy::Specific(bounds) => {
            assert!(
                bounds.len() >= 2 && bounds[0] == 0 && bounds[bounds.len() - 1] == len,
                "specific placement bounds must span 0..{len}"
            );
            debug_assert!(bounds.windows(2).all(|w| w[0] <= w[1]));
            let slices = bounds.len() - 1;
            pool::on_each(|tid, threads| {
                // A pool resized since the bounds were computed deals the slices round-robin.
                for s in (tid..slices).step_by(threads) {
                    f(bounds[s]..bounds[s + 1]);
                }
            });
        }
    }
}
