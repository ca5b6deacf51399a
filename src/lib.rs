//! Bitmap Buddy Allocator
//!
//! This crate manages one fixed, caller-supplied memory region with the buddy
//! scheme, featuring:
//! - Power-of-two blocks tracked by one FREE/USED bitmap per order
//! - Top-down splitting on allocation, eager buddy coalescing on free
//! - Statically sized metadata, so it works before any heap exists
//! - Optional statistics and failure reports (`tracking` feature)
//!
//! The allocator is single-threaded: callers that share an instance between
//! execution contexts must provide their own mutual exclusion.

#![no_std]

use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;

// Logging support - conditionally import log crate
#[cfg(feature = "log")]
extern crate log;

// Stub macros when log is disabled - these become no-ops
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! error {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! warn {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! info {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! debug {
    ($($arg:tt)*) => {};
}
#[cfg(not(feature = "log"))]
#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

/// The error type used for allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Invalid argument (zero-sized request, null heap start, unsupported alignment).
    InvalidParam,
    /// Heap size is not a power of two or smaller than two minimum blocks.
    InvalidHeapSize,
    /// `log2(heap_size)` exceeds the configured `MAX_ORDER`.
    HeapTooLarge,
    /// The requested size rounds to an order above the heap's `max_order`.
    SizeTooLarge,
    /// No free block of a sufficient order is left.
    OutOfMemory,
    /// Address is not aligned to the block size of the given order.
    UnalignedAddress,
    /// Address or block index lies outside the managed region.
    OutOfRange,
    /// Freeing memory that is not the start of a live allocation.
    InvalidFree,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AllocError::InvalidParam => "invalid parameter",
            AllocError::InvalidHeapSize => "heap size must be a power of two of at least two minimum blocks",
            AllocError::HeapTooLarge => "heap exceeds the maximum supported order",
            AllocError::SizeTooLarge => "requested size exceeds the heap's largest block",
            AllocError::OutOfMemory => "no free block large enough",
            AllocError::UnalignedAddress => "address is not aligned to its block size",
            AllocError::OutOfRange => "address is outside the managed region",
            AllocError::InvalidFree => "address is not a live allocation",
        };
        f.write_str(msg)
    }
}

/// A [`Result`] type with [`AllocError`] as the error type.
pub type AllocResult<T = ()> = Result<T, AllocError>;

/// Byte-granularity allocator.
pub trait ByteAllocator {
    /// Allocate memory with the given size (in bytes) and alignment.
    fn alloc(&mut self, layout: Layout) -> AllocResult<NonNull<u8>>;

    /// Deallocate memory at the given position, size, and alignment.
    fn dealloc(&mut self, pos: NonNull<u8>, layout: Layout);

    /// Returns total memory size in bytes.
    fn total_bytes(&self) -> usize;

    /// Returns allocated memory size in bytes.
    fn used_bytes(&self) -> usize;

    /// Returns available memory size in bytes.
    fn available_bytes(&self) -> usize;
}

/// Checks whether the address has the demanded alignment.
///
/// Equivalent to `addr % align == 0`, but the alignment must be a power of two.
#[inline]
const fn is_aligned(base_addr: usize, align: usize) -> bool {
    base_addr & (align - 1) == 0
}

pub mod config;
pub use config::{MAX_ORDER, MIN_BLOCK_SIZE, MIN_ORDER};

pub mod buddy;
#[cfg(feature = "tracking")]
pub use buddy::BuddyStats;
pub use buddy::{AddressIndexMapper, BlockId, BlockState, BuddyAllocator, OrderBitmapSet};
