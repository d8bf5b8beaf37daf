//! Anonymous page regions straight from the OS.
//!
//! Regions are mapped but never touched here. The kernel backs a page on its first
//! write, on the socket of the writing thread, so whoever initialises a page decides
//! where it lives. [`NumaArray`](super::NumaArray) relies on this for placement.

use core::ptr;

use crate::alloc::page::{align_up, PAGE_SIZE};

#[cfg(target_os = "linux")]
const MAP_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;
#[cfg(all(unix, not(target_os = "linux")))]
const MAP_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANON;

/// Bytes actually mapped for a request of `size` bytes.
#[inline]
pub fn region_len(size: usize) -> usize {
    align_up(size, PAGE_SIZE)
}

/// Maps at least `size` bytes of zero-filled memory, or `None` for an empty request or
/// when the OS refuses.
///
/// # Safety
/// The region must be released with [`free_region`] and the same `size`.
#[cfg(unix)]
pub unsafe fn allocate_region(size: usize) -> Option<*mut u8> {
    if size == 0 {
        return None;
    }
    let len = region_len(size);
    let base = libc::mmap(ptr::null_mut(), len, libc::PROT_READ | libc::PROT_WRITE, MAP_FLAGS, -1, 0);
    if base == libc::MAP_FAILED {
        tracing::warn!(len, errno = %std::io::Error::last_os_error(), "mmap failed");
        return None;
    }
    Some(base.cast())
}

/// Returns a region from [`allocate_region`] to the OS.
///
/// # Safety
/// `base` and `size` must come from one `allocate_region` call, and nothing may use the
/// region afterwards.
#[cfg(unix)]
pub unsafe fn free_region(base: *mut u8, size: usize) {
    if base.is_null() || size == 0 {
        return;
    }
    if libc::munmap(base.cast(), region_len(size)) != 0 {
        tracing::warn!(len = region_len(size), "munmap failed; region leaked");
    }
}

/// Reserves and commits at least `size` bytes. Committed pages are still only backed by
/// physical memory on first touch.
///
/// # Safety
/// As for the unix version.
#[cfg(windows)]
pub unsafe fn allocate_region(size: usize) -> Option<*mut u8> {
    use windows_sys::Win32::System::Memory::{VirtualAlloc, MEM_COMMIT, MEM_RESERVE, PAGE_READWRITE};
    if size == 0 {
        return None;
    }
    let len = region_len(size);
    let base = VirtualAlloc(ptr::null(), len, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE);
    if base.is_null() {
        tracing::warn!(len, "VirtualAlloc failed");
        return None;
    }
    Some(base.cast())
}

/// Releases a whole region from [`allocate_region`].
///
/// # Safety
/// As for the unix version.
#[cfg(windows)]
pub unsafe fn free_region(base: *mut u8, _size: usize) {
    use windows_sys::Win32::System::Memory::{VirtualFree, MEM_RELEASE};
    if base.is_null() {
        return;
    }
    if VirtualFree(base.cast(), 0, MEM_RELEASE) == 0 {
        tracing::warn!("VirtualFree failed; region leaked");
    }
}
