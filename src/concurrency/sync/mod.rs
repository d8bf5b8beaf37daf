//! Low-level synchronization primitives.
//!
//! - [`SpinLock`] / [`NoLock`]: the per-node lock and its zero-cost twin, both behind [`NodeLock`].
//! - [`Semaphore`]: counting semaphore used by the thread pool start/finish handshake.
//! - `wait_on_u32` / `wake_*_u32`: address-based parking (futex on Linux, `WaitOnAddress`
//!   on Windows, a yield loop elsewhere).

pub mod semaphore;
pub mod spin_lock;

pub use semaphore::Semaphore;
pub use spin_lock::{NoLock, NodeLock, SpinLock};

use core::sync::atomic::AtomicU32;
#[cfg(not(target_os = "linux"))]
use core::sync::atomic::Ordering;

#[cfg(windows)]
use windows_sys::Win32::System::Threading::{WaitOnAddress, WakeByAddressAll, WakeByAddressSingle};

#[cfg(target_os = "linux")]
use libc::{SYS_futex, FUTEX_PRIVATE_FLAG, FUTEX_WAIT, FUTEX_WAKE};

#[cfg(target_os = "linux")]
#[inline]
fn futex_wait(addr: *const u32, expected: u32) {
    // Spurious returns (EINTR, EAGAIN) are fine: every caller re-checks its predicate.
    unsafe {
        libc::syscall(
            SYS_futex,
            addr,
            FUTEX_WAIT | FUTEX_PRIVATE_FLAG,
            expected,
            core::ptr::null::<libc::timespec>(),
        );
    }
}

#[cfg(target_os = "linux")]
#[inline]
fn futex_wake(addr: *const u32, count: i32) {
    unsafe {
        libc::syscall(SYS_futex, addr, FUTEX_WAKE | FUTEX_PRIVATE_FLAG, count);
    }
}

/// Wakes all threads waiting on the given address.
#[inline]
pub fn wake_all_u32(addr: &AtomicU32) {
    #[cfg(windows)]
    unsafe {
        WakeByAddressAll(addr as *const _ as *const _);
    }
    #[cfg(target_os = "linux")]
    {
        futex_wake(addr.as_ptr(), i32::MAX);
    }
    #[cfg(not(any(windows, target_os = "linux")))]
    let _ = addr;
}

/// Wakes up to `count` threads waiting on the given address.
#[inline]
pub fn wake_n_u32(addr: &AtomicU32, count: u32) {
    #[cfg(windows)]
    unsafe {
        for _ in 0..count {
            WakeByAddressSingle(addr as *const _ as *const _);
        }
    }
    #[cfg(target_os = "linux")]
    {
        futex_wake(addr.as_ptr(), i32::try_from(count).unwrap_or(i32::MAX));
    }
    #[cfg(not(any(windows, target_os = "linux")))]
    let _ = (addr, count);
}

/// Blocks while the value at `addr` equals `expected`.
///
/// May return spuriously; callers loop on their own condition.
#[inline]
pub fn wait_on_u32(addr: &AtomicU32, expected: u32) {
    #[cfg(windows)]
    unsafe {
        let expected_ptr = &expected as *const u32 as *const _;
        let addr_ptr = addr as *const _ as *const _;
        WaitOnAddress(addr_ptr, expected_ptr, core::mem::size_of::<u32>(), u32::MAX);
    }
    #[cfg(target_os = "linux")]
    {
        futex_wait(addr.as_ptr(), expected);
    }
    #[cfg(not(any(windows, target_os = "linux")))]
    while addr.load(Ordering::Acquire) == expected {
        std::thread::yield_now();
    }
}

#[cfg(test)]
mod tests;
