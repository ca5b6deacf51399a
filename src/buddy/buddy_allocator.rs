//! Bitmap buddy allocator over a single memory region
//!
//! Every block of every order owns one bit in `bitmaps`: USED when the block
//! is a live allocation or has been split to serve one, FREE otherwise. A FREE
//! bit only names an allocatable block when its parent is split (or it is the
//! top-level block); below an unsplit block the bits are stale.
//!
//! `heads` is the side channel that records where each live allocation starts
//! and at which order, so `free` needs nothing but the address.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::config::{BITS_PER_WORD, MAX_ORDER, MIN_BLOCK_SIZE, MIN_ORDER};
use crate::{is_aligned, AllocError, AllocResult, ByteAllocator};

#[cfg(feature = "log")]
use log::{debug, error, info, trace, warn};

#[cfg(feature = "tracking")]
use super::stats::{BuddyStats, MemoryStatsReporter};

use super::{
    block::BlockId,
    index_mapper::AddressIndexMapper,
    order_bitmap::{BlockState, OrderBitmapSet},
};

/// Buddy allocator managing `[heap_start, heap_start + heap_size)`.
///
/// The allocator never reads or writes the managed memory; all metadata is
/// held inline in this structure.
#[derive(Debug, Clone)]
pub struct BuddyAllocator {
    mapper: AddressIndexMapper,
    /// FREE/USED state of every block.
    bitmaps: OrderBitmapSet,
    /// Set at the block each live allocation was handed out as.
    heads: OrderBitmapSet,
    used_bytes: usize,
}

impl BuddyAllocator {
    /// Create an allocator over `heap_size` bytes starting at `heap_start`.
    ///
    /// `heap_size` must be a power of two of at least `2 * MIN_BLOCK_SIZE` and
    /// at most `2^MAX_ORDER` bytes. The whole region starts out as one free block.
    pub fn new(heap_start: usize, heap_size: usize) -> AllocResult<Self> {
        if !heap_size.is_power_of_two() || heap_size < 2 * MIN_BLOCK_SIZE {
            error!(
                "buddy allocator: invalid heap size {:#x}, need a power of two >= {:#x}",
                heap_size,
                2 * MIN_BLOCK_SIZE
            );
            return Err(AllocError::InvalidHeapSize);
        }

        let max_order = heap_size.trailing_zeros() as usize;
        if max_order > MAX_ORDER {
            error!(
                "buddy allocator: heap order {} exceeds maximum order {}",
                max_order, MAX_ORDER
            );
            return Err(AllocError::HeapTooLarge);
        }

        if heap_start == 0 || heap_start.checked_add(heap_size).is_none() {
            error!(
                "buddy allocator: invalid heap region [{:#x}, +{:#x})",
                heap_start, heap_size
            );
            return Err(AllocError::InvalidParam);
        }

        info!(
            "buddy allocator: managing [{:#x}, {:#x}), orders {}..={}",
            heap_start,
            heap_start + heap_size,
            MIN_ORDER,
            max_order
        );

        Ok(Self {
            mapper: AddressIndexMapper::new(heap_start, heap_size),
            bitmaps: OrderBitmapSet::new(max_order),
            heads: OrderBitmapSet::new(max_order),
            used_bytes: 0,
        })
    }

    /// Create an allocator that owns `region` for the rest of the program.
    pub fn from_region(region: &'static mut [u8]) -> AllocResult<Self> {
        Self::new(region.as_mut_ptr() as usize, region.len())
    }

    pub const fn heap_start(&self) -> usize {
        self.mapper.heap_start()
    }

    pub const fn heap_size(&self) -> usize {
        self.mapper.heap_size()
    }

    pub const fn max_order(&self) -> usize {
        self.mapper.max_order()
    }

    /// Address translation used by this allocator.
    pub const fn mapper(&self) -> &AddressIndexMapper {
        &self.mapper
    }

    /// Raw FREE/USED bitmaps of every order.
    pub const fn bitmaps(&self) -> &OrderBitmapSet {
        &self.bitmaps
    }

    /// FREE/USED bit of the `index`-th block at `order`.
    ///
    /// Orders below `MIN_ORDER` keep no bitmap, since no block is ever that
    /// small, and report [`AllocError::OutOfRange`] like any index past the heap.
    pub fn block_state(&self, order: usize, index: usize) -> AllocResult<BlockState> {
        self.bitmaps.get(BlockId::new(order, index))
    }

    /// Allocate a block of at least `size` bytes and return its address.
    ///
    /// The block is the lowest-addressed free block of the smallest order that
    /// fits; larger blocks are split only when no such block exists. A
    /// zero-sized request fails with [`AllocError::InvalidParam`]. A failed
    /// call leaves the allocator untouched.
    pub fn allocate(&mut self, size: usize) -> AllocResult<usize> {
        if size == 0 {
            warn!("buddy allocator: zero-sized allocation request");
            return Err(AllocError::InvalidParam);
        }

        let order = self.mapper.order_for_size(size).inspect_err(|_| {
            warn!(
                "buddy allocator: request of {:#x} bytes exceeds heap size {:#x}",
                size,
                self.heap_size()
            );
        })?;

        let Some(block) = self.find_free_block(order) else {
            debug!(
                "buddy allocator: Allocation failure: {} Byte (order {})",
                size, order
            );
            #[cfg(feature = "tracking")]
            self.print_alloc_failure_stats(size, order);
            return Err(AllocError::OutOfMemory);
        };

        let block = self.split_down(block, order)?;
        self.heads.set(block, BlockState::Used)?;
        self.used_bytes += block.size();

        let addr = self.mapper.address_for_index(block);
        trace!(
            "buddy allocator: allocated {:#x} ({} bytes, order {})",
            addr,
            block.size(),
            order
        );
        Ok(addr)
    }

    /// Release the allocation starting at `addr`, merging freed buddies upward.
    ///
    /// `addr == 0` is the null pointer and is ignored. Anything that is not
    /// the start of a live allocation is rejected with
    /// [`AllocError::InvalidFree`] and leaves the allocator untouched.
    pub fn free(&mut self, addr: usize) -> AllocResult {
        if addr == 0 {
            return Ok(());
        }

        let Some(block) = self.allocation_at(addr) else {
            warn!(
                "buddy allocator: free of {:#x}: not a live allocation in [{:#x}, {:#x})",
                addr,
                self.heap_start(),
                self.heap_start() + self.heap_size()
            );
            return Err(AllocError::InvalidFree);
        };

        self.heads.set(block, BlockState::Free)?;
        self.bitmaps.set(block, BlockState::Free)?;
        self.used_bytes -= block.size();
        trace!(
            "buddy allocator: freed {:#x} ({} bytes, order {})",
            addr,
            block.size(),
            block.order
        );

        self.coalesce(block)
    }

    /// Whether `addr` is the start of a live allocation.
    pub fn is_allocated(&self, addr: usize) -> bool {
        self.allocation_at(addr).is_some()
    }

    /// Size of the block backing the live allocation at `addr`.
    pub fn allocation_size(&self, addr: usize) -> Option<usize> {
        self.allocation_at(addr).map(|block| block.size())
    }

    /// Number of independently allocatable blocks at `order`.
    pub fn free_block_count(&self, order: usize) -> usize {
        let mut count = 0;
        let mut from = 0;
        while let Some(index) = self.find_free_from(order, from) {
            count += 1;
            from = index + 1;
        }
        count
    }

    /// Find the live allocation that starts at `addr`.
    ///
    /// A head bit is set at exactly one order per live allocation, and live
    /// allocations never share a start address.
    fn allocation_at(&self, addr: usize) -> Option<BlockId> {
        if !self.mapper.contains(addr) {
            return None;
        }
        (MIN_ORDER..=self.max_order()).find_map(|order| {
            self.mapper
                .index_for_address(addr, order)
                .ok()
                .filter(|block| self.heads.is_used(*block))
        })
    }

    /// A FREE block is allocatable when nothing above it claims its range:
    /// it is the top-level block, or its parent was split.
    fn is_splittable_parent(&self, block: BlockId) -> bool {
        self.bitmaps.is_used(block) && !self.heads.is_used(block)
    }

    /// Lowest allocatable block at `order` with index `>= from`.
    fn find_free_from(&self, order: usize, mut from: usize) -> Option<usize> {
        while let Some(index) = self.bitmaps.find_free_from(order, from) {
            let block = BlockId::new(order, index);
            if order == self.max_order() || self.is_splittable_parent(block.parent()) {
                return Some(index);
            }
            // Both halves share the unsplit parent, skip the pair.
            from = (index | 1) + 1;
        }
        None
    }

    /// Smallest order `>= order` holding an allocatable block, lowest address first.
    fn find_free_block(&self, order: usize) -> Option<BlockId> {
        (order..=self.max_order()).find_map(|level| {
            self.find_free_from(level, 0)
                .map(|index| BlockId::new(level, index))
        })
    }

    /// Mark `block` used and split it until its lower descendant reaches `order`.
    ///
    /// Every block on the split path stays USED so no later allocation can
    /// claim part of it; each upper half becomes a free block of its own.
    fn split_down(&mut self, block: BlockId, order: usize) -> AllocResult<BlockId> {
        self.bitmaps.set(block, BlockState::Used)?;

        let mut current = block;
        while current.order > order {
            let lower = current.lower_child().ok_or(AllocError::OutOfRange)?;
            self.bitmaps.set(lower, BlockState::Used)?;
            self.bitmaps.set(lower.buddy(), BlockState::Free)?;
            trace!(
                "buddy allocator: split order {} block {} -> buddy {} free",
                current.order,
                current.index,
                lower.buddy().index
            );
            current = lower;
        }
        Ok(current)
    }

    /// Merge `block` with its buddy as long as the buddy is free.
    fn coalesce(&mut self, mut block: BlockId) -> AllocResult {
        while block.order < self.max_order() {
            if self.bitmaps.is_used(block.buddy()) {
                break;
            }
            let parent = block.parent();
            self.bitmaps.set(parent, BlockState::Free)?;
            trace!(
                "buddy allocator: merged order {} blocks {} and {}",
                block.order,
                block.index,
                block.buddy().index
            );
            block = parent;
        }
        Ok(())
    }

    /// Get statistics for this allocator
    #[cfg(feature = "tracking")]
    pub fn get_stats(&self) -> BuddyStats {
        let mut stats = BuddyStats::new();
        stats.total_bytes = self.heap_size();
        stats.used_bytes = self.used_bytes;
        stats.free_bytes = self.heap_size() - self.used_bytes;
        for order in MIN_ORDER..=self.max_order() {
            stats.free_blocks_by_order[order] = self.free_block_count(order);
        }
        stats
    }

    /// Print detailed allocation failure statistics
    #[cfg(feature = "tracking")]
    pub fn print_alloc_failure_stats(&self, size: usize, order: usize) {
        MemoryStatsReporter::print_alloc_failure_stats(
            self.heap_start(),
            &self.get_stats(),
            size,
            order,
        );
    }

    #[cfg(not(feature = "tracking"))]
    pub fn print_alloc_failure_stats(&self, _size: usize, _order: usize) {
        // No-op when tracking is disabled
    }

    /// Print every order's bitmap, bit 0 rightmost in each word.
    #[allow(unused_variables)]
    pub fn print_bitmaps(&self) {
        info!("========== Buddy Allocator Bitmaps ==========");
        info!(
            "Heap: [{:#x}, {:#x}), used {} of {} bytes",
            self.heap_start(),
            self.heap_start() + self.heap_size(),
            self.used_bytes,
            self.heap_size()
        );
        info!("Order  Block size  Blocks  Used  Free");

        for order in (MIN_ORDER..=self.max_order()).rev() {
            let bits = self.bitmaps.bit_count(order);
            info!(
                "{:>5}  {:>10}  {:>6}  {:>4}  {:>4}",
                order,
                1usize << order,
                bits,
                self.bitmaps.count_used(order),
                self.free_block_count(order)
            );
            for (i, word) in self.bitmaps.order_words(order).iter().enumerate() {
                let width = (bits - i * BITS_PER_WORD).min(BITS_PER_WORD);
                info!(
                    "       [{:>5}] {:0width$b}",
                    i * BITS_PER_WORD,
                    word,
                    width = width
                );
            }
        }
        info!("==============================================");
    }
}

impl ByteAllocator for BuddyAllocator {
    fn alloc(&mut self, layout: Layout) -> AllocResult<NonNull<u8>> {
        if layout.size() == 0 {
            return Err(AllocError::InvalidParam);
        }
        // Blocks are aligned to their size relative to the heap start only.
        if !is_aligned(self.heap_start(), layout.align()) {
            warn!(
                "buddy allocator: heap start {:#x} cannot honour alignment {:#x}",
                self.heap_start(),
                layout.align()
            );
            return Err(AllocError::InvalidParam);
        }

        let addr = self.allocate(layout.size().max(layout.align()))?;
        NonNull::new(addr as *mut u8).ok_or(AllocError::InvalidParam)
    }

    #[allow(unused_variables)]
    fn dealloc(&mut self, pos: NonNull<u8>, layout: Layout) {
        if let Err(e) = self.free(pos.as_ptr() as usize) {
            error!(
                "buddy allocator: dealloc {:p} (size {}, align {}) failed: {}",
                pos,
                layout.size(),
                layout.align(),
                e
            );
        }
    }

    fn total_bytes(&self) -> usize {
        self.heap_size()
    }

    fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    fn available_bytes(&self) -> usize {
        self.heap_size() - self.used_bytes
    }
}
