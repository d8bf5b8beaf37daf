//! Word-sized compare-and-swap spin lock and its no-op twin.
//!
//! Both implement [`NodeLock`], which the graph is generic over; choosing [`NoLock`]
//! compiles every acquire/release down to nothing.

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::SpinLock {}
    impl Sealed for super::NoLock {}
}

/// Capability shared by the per-node lock implementations.
///
/// Sealed: the lock-context bookkeeping only knows how to release [`SpinLock`]s.
pub trait NodeLock: sealed::Sealed + Default + Send + Sync + 'static {
    /// `false` for the no-op variant; lets callers skip bookkeeping at compile time.
    const IS_LOCKING: bool;

    /// Sets the lock word to `tag` if it is currently zero.
    fn try_lock(&self, tag: usize) -> bool;

    /// Spins until [`NodeLock::try_lock`] succeeds.
    fn lock(&self, tag: usize);

    /// Releases the lock.
    ///
    /// # Panics
    /// If the lock is not held.
    fn unlock(&self);

    /// Raw lock word. Not a synchronization point.
    fn value(&self) -> usize;

    #[doc(hidden)]
    fn as_spin_lock(&self) -> Option<&SpinLock>;
}

/// A mutual-exclusion lock stored in a single word.
///
/// Zero means unlocked; any other value is the holder's tag. Acquisition is one
/// hardware CAS, retried in a busy loop by [`SpinLock::lock`].
#[derive(Default)]
#[repr(transparent)]
pub struct SpinLock {
    word: AtomicUsize,
}

impl SpinLock {
    /// Tag written by [`SpinLock::lock_default`].
    pub const DEFAULT_TAG: usize = 1;

    /// Creates an unlocked lock.
    pub const fn new() -> Self {
        Self {
            word: AtomicUsize::new(0),
        }
    }

    /// Attempts to acquire the lock, writing `tag` into the word on success.
    ///
    /// # Panics
    /// If `tag` is zero (zero is the unlocked state).
    #[inline]
    pub fn try_lock(&self, tag: usize) -> bool {
        assert!(tag != 0, "spin lock tag must be non-zero");
        self.word
            .compare_exchange(0, tag, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Spins until the lock is acquired with `tag`.
    #[inline]
    pub fn lock(&self, tag: usize) {
        while !self.try_lock(tag) {
            // Test before retrying the CAS so waiters spin on a shared cache line.
            while self.word.load(Ordering::Relaxed) != 0 {
                core::hint::spin_loop();
            }
        }
    }

    /// [`SpinLock::lock`] with [`SpinLock::DEFAULT_TAG`].
    #[inline]
    pub fn lock_default(&self) {
        self.lock(Self::DEFAULT_TAG);
    }

    /// Releases the lock.
    ///
    /// # Panics
    /// If the lock is not currently held.
    #[inline]
    pub fn unlock(&self) {
        assert!(
            self.word.load(Ordering::Relaxed) != 0,
            "unlock of a spin lock that is not held"
        );
        self.word.store(0, Ordering::Release);
    }

    /// Raw lock word, for debugging.
    #[inline]
    pub fn value(&self) -> usize {
        self.word.load(Ordering::Relaxed)
    }

    /// `true` if the word is non-zero.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.value() != 0
    }
}

impl NodeLock for SpinLock {
    const IS_LOCKING: bool = true;

    #[inline]
    fn try_lock(&self, tag: usize) -> bool {
        SpinLock::try_lock(self, tag)
    }

    #[inline]
    fn lock(&self, tag: usize) {
        SpinLock::lock(self, tag);
    }

    #[inline]
    fn unlock(&self) {
        SpinLock::unlock(self);
    }

    #[inline]
    fn value(&self) -> usize {
        SpinLock::value(self)
    }

    #[inline]
    fn as_spin_lock(&self) -> Option<&SpinLock> {
        Some(self)
    }
}

impl fmt::Debug for SpinLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock").field("value", &self.value()).finish()
    }
}

/// Zero-sized lock for graphs that never need node locking.
///
/// `try_lock` always succeeds and `lock`/`unlock` do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLock;

impl NodeLock for NoLock {
    const IS_LOCKING: bool = false;

    #[inline(always)]
    fn try_lock(&self, _tag: usize) -> bool {
        true
    }

    #[inline(always)]
    fn lock(&self, _tag: usize) {}

    #[inline(always)]
    fn unlock(&self) {}

    #[inline(always)]
    fn value(&self) -> usize {
        0
    }

    #[inline(always)]
    fn as_spin_lock(&self) -> Option<&SpinLock> {
        None
    }
}

const _: () = {
    assert!(core::mem::size_of::<NoLock>() == 0);
    assert!(core::mem::size_of::<SpinLock>() == core::mem::size_of::<usize>());
};
