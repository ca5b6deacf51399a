//! Address and index translation
//!
//! All conversions between addresses, block indices and orders live here, so
//! the rest of the allocator never does raw pointer arithmetic on the heap.

use crate::{config::MIN_ORDER, is_aligned, AllocError, AllocResult};

use super::block::BlockId;

/// Pure arithmetic over a heap of `2^max_order` bytes starting at `heap_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressIndexMapper {
    heap_start: usize,
    heap_size: usize,
    max_order: usize,
}

impl AddressIndexMapper {
    /// Create a mapper. `heap_size` must be a power of two, validated by the caller.
    pub const fn new(heap_start: usize, heap_size: usize) -> Self {
        Self {
            heap_start,
            heap_size,
            max_order: heap_size.trailing_zeros() as usize,
        }
    }

    pub const fn heap_start(&self) -> usize {
        self.heap_start
    }

    pub const fn heap_size(&self) -> usize {
        self.heap_size
    }

    pub const fn max_order(&self) -> usize {
        self.max_order
    }

    /// Smallest order whose block holds `size` bytes, never below `MIN_ORDER`.
    pub fn order_for_size(&self, size: usize) -> AllocResult<usize> {
        if size > self.heap_size {
            return Err(AllocError::SizeTooLarge);
        }
        let order = match size.checked_next_power_of_two() {
            Some(rounded) => (rounded.trailing_zeros() as usize).max(MIN_ORDER),
            None => return Err(AllocError::SizeTooLarge),
        };
        if order > self.max_order {
            return Err(AllocError::SizeTooLarge);
        }
        Ok(order)
    }

    /// Number of blocks at `order`.
    pub const fn block_count(&self, order: usize) -> usize {
        self.heap_size >> order
    }

    /// Index of the `order` block starting at `addr`.
    pub fn index_for_address(&self, addr: usize, order: usize) -> AllocResult<BlockId> {
        if order > self.max_order || addr < self.heap_start {
            return Err(AllocError::OutOfRange);
        }
        let offset = addr - self.heap_start;
        if !is_aligned(offset, 1 << order) {
            return Err(AllocError::UnalignedAddress);
        }
        let index = offset >> order;
        if index >= self.block_count(order) {
            return Err(AllocError::OutOfRange);
        }
        Ok(BlockId::new(order, index))
    }

    /// Start address of `block`.
    pub const fn address_for_index(&self, block: BlockId) -> usize {
        self.heap_start + (block.index << block.order)
    }

    /// Whether `addr` lies inside `[heap_start, heap_start + heap_size)`.
    pub const fn contains(&self, addr: usize) -> bool {
        addr >= self.heap_start && addr - self.heap_start < self.heap_size
    }
}
