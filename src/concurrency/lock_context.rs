//! Per-thread bookkeeping for node locks.
//!
//! Graph accessors acquire node locks but never release them. Every lock a thread takes
//! is pushed onto that thread's held list; the list is drained when the current
//! iteration step ends ([`step`], or automatically after each item of a parallel loop).
//!
//! Each OS thread gets a unique non-zero tag on first use. A lock whose word already
//! equals the caller's tag is treated as held and not re-acquired, so a body may touch
//! the same node several times within one step.

use core::cell::{Cell, RefCell};
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::concurrency::sync::{NodeLock, SpinLock};

static NEXT_TAG: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static TAG: Cell<usize> = const { Cell::new(0) };
    static HELD: RefCell<Vec<NonNull<SpinLock>>> = const { RefCell::new(Vec::new()) };
}

/// The calling thread's lock tag.
pub fn thread_tag() -> usize {
    TAG.with(|tag| {
        let cur = tag.get();
        if cur != 0 {
            return cur;
        }
        let fresh = NEXT_TAG.fetch_add(1, Ordering::Relaxed);
        tag.set(fresh);
        fresh
    })
}

/// Acquires `lock` for the rest of the current step, spinning while another thread holds it.
///
/// # Safety
/// The lock must stay at the same address and must not be freed until the calling thread
/// has released its held locks (end of step, [`release_held_locks`] or [`release_held_in`]).
#[inline]
pub unsafe fn acquire<L: NodeLock>(lock: &L) {
    if !L::IS_LOCKING {
        return;
    }
    let Some(spin) = lock.as_spin_lock() else {
        return;
    };
    let tag = thread_tag();
    if spin.value() == tag {
        return;
    }
    spin.lock(tag);
    HELD.with(|held| held.borrow_mut().push(NonNull::from(spin)));
}

/// Number of locks the calling thread currently holds through this context.
pub fn held_count() -> usize {
    HELD.with(|held| held.borrow().len())
}

/// Releases every lock acquired by the calling thread since the last release.
pub fn release_held_locks() {
    HELD.with(|held| {
        let mut held = held.borrow_mut();
        for lock in held.drain(..).rev() {
            // SAFETY: `acquire`'s contract keeps the lock alive until this release.
            unsafe { lock.as_ref().unlock() };
        }
    });
}

/// Releases the calling thread's held locks that live in `[start, end)` and keeps the rest.
///
/// Used by storage that is about to be moved or freed.
pub fn release_held_in(start: *const u8, end: *const u8) {
    HELD.with(|held| {
        held.borrow_mut().retain(|lock| {
            let addr = lock.as_ptr() as *const u8;
            if addr < start || addr >= end {
                return true;
            }
            // SAFETY: still listed, so still alive and held by this thread.
            unsafe { lock.as_ref().unlock() };
            false
        });
    });
}

/// Releases the calling thread's locks acquired after the first `mark` entries of its
/// held list, keeping the older ones.
fn release_held_since(mark: usize) {
    HELD.with(|held| {
        let mut held = held.borrow_mut();
        let mark = mark.min(held.len());
        for lock in held.drain(mark..).rev() {
            // SAFETY: `acquire`'s contract keeps the lock alive until this release.
            unsafe { lock.as_ref().unlock() };
        }
    });
}

/// Runs `f` as one iteration step: every lock acquired inside is released on return,
/// including on unwind.
///
/// Steps nest. An inner step releases only what it acquired itself; locks the enclosing
/// step already holds stay held until that step ends.
pub fn step<R>(f: impl FnOnce() -> R) -> R {
    struct ReleaseOnDrop(usize);
    impl Drop for ReleaseOnDrop {
        fn drop(&mut self) {
            release_held_since(self.0);
        }
    }
    let _release = ReleaseOnDrop(held_count());
    f()
}
