//! Zeroed Table Allocation
//!
//! Every table starts out all-zero. Allocating through `alloc_zeroed` lets the
//! allocator hand out fresh pages that the OS zeroes on first touch, so
//! creating a large store does not write its whole footprint up front.

use std::alloc::{alloc_zeroed, handle_alloc_error, Layout};
use std::ptr;
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64};

/// Types whose all-zero bit pattern is a valid, initialized value
///
/// # Safety
/// Implementors must be valid when every byte is zero and must not need
/// `Drop` to release resources.
pub(crate) unsafe trait Zeroable: Sized {}

// SAFETY: atomics of integers are plain integers in memory; zero is valid
unsafe impl Zeroable for AtomicU16 {}
// SAFETY: as above
unsafe impl Zeroable for AtomicU32 {}
// SAFETY: as above
unsafe impl Zeroable for AtomicU64 {}
// SAFETY: arrays of zeroable values are zeroable element-wise
unsafe impl<T: Zeroable, const N: usize> Zeroable for [T; N] {}

/// Allocate `len` zero-initialized values of `T`
///
/// # Panics
/// When `len` values of `T` overflow the address space, like `Vec` does.
pub(crate) fn zeroed_slice<T: Zeroable>(len: usize) -> Box<[T]> {
    if len == 0 || std::mem::size_of::<T>() == 0 {
        return (0..len).map(|_| zero()).collect();
    }
    let layout = match Layout::array::<T>(len) {
        Ok(layout) => layout,
        Err(_) => panic!("table of {} entries overflows the address space", len),
    };
    // SAFETY: the layout has non-zero size
    let raw = unsafe { alloc_zeroed(layout) } as *mut T;
    if raw.is_null() {
        handle_alloc_error(layout);
    }
    // SAFETY: `raw` holds `len` zeroed `T`s, which are valid by `Zeroable`,
    // and was allocated by the global allocator with the layout of `[T; len]`
    unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(raw, len)) }
}

fn zero<T: Zeroable>() -> T {
    // SAFETY: valid by `Zeroable`
    unsafe { std::mem::zeroed() }
}
