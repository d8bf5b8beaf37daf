//! Page size helpers.

/// Granularity used for placement decisions.
pub const PAGE_SIZE: usize = 4096;

/// Rounds `value` up to a multiple of `align` (a power of two, or zero for no rounding).
pub const fn align_up(value: usize, align: usize) -> usize {
    if align == 0 {
        value
    } else {
        (value + (align - 1)) & !(align - 1)
    }
}

/// Number of `T` that fit in one page (at least one).
pub const fn elems_per_page<T>() -> usize {
    let size = core::mem::size_of::<T>();
    if size == 0 || size >= PAGE_SIZE {
        1
    } else {
        PAGE_SIZE / size
    }
}
