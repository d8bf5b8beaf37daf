//! Counting semaphore parked on a futex word.

use core::sync::atomic::{AtomicU32, Ordering};

use super::{wait_on_u32, wake_n_u32};

/// A counting semaphore.
///
/// `release(n)` adds `n` permits and wakes up to `n` sleepers; `acquire(n)` takes `n`
/// permits one at a time, sleeping on the permit word whenever it reads zero.
pub struct Semaphore {
    permits: AtomicU32,
}

impl Semaphore {
    /// Creates a semaphore holding `permits` permits.
    pub const fn new(permits: u32) -> Self {
        Self {
            permits: AtomicU32::new(permits),
        }
    }

    /// Adds `n` permits.
    pub fn release(&self, n: u32) {
        if n == 0 {
            return;
        }
        let prev = self.permits.fetch_add(n, Ordering::Release);
        assert!(prev.checked_add(n).is_some(), "semaphore permit overflow");
        wake_n_u32(&self.permits, n);
    }

    /// Takes `n` permits, blocking until each is available.
    pub fn acquire(&self, n: u32) {
        for _ in 0..n {
            self.acquire_one();
        }
    }

    /// Takes one permit if available without blocking.
    pub fn try_acquire(&self) -> bool {
        let mut cur = self.permits.load(Ordering::Relaxed);
        while cur != 0 {
            match self
                .permits
                .compare_exchange_weak(cur, cur - 1, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
        false
    }

    fn acquire_one(&self) {
        loop {
            if self.try_acquire() {
                return;
            }
            wait_on_u32(&self.permits, 0);
        }
    }

    /// Current number of available permits. Introspection only.
    pub fn available(&self) -> u32 {
        self.permits.load(Ordering::Relaxed)
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}
