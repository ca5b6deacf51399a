//! Integration tests for the allocator crate
//!
//! Drives the allocator over a real heap region, writing through every
//! returned pointer to catch overlapping allocations.

#![no_std]

extern crate alloc;
extern crate bitmap_buddy_allocator;

use alloc::vec::Vec;
use bitmap_buddy_allocator::{
    AllocError, BlockState, BuddyAllocator, ByteAllocator, MAX_ORDER, MIN_BLOCK_SIZE, MIN_ORDER,
};
use core::alloc::Layout;
use core::ptr::NonNull;

const TEST_HEAP_SIZE: usize = 4096;

/// Allocate test memory using system allocator, aligned to its size
fn alloc_test_heap(size: usize) -> (*mut u8, Layout) {
    let layout = Layout::from_size_align(size, size).unwrap();
    let ptr = unsafe { alloc::alloc::alloc(layout) };
    assert!(!ptr.is_null(), "Failed to allocate test heap");
    (ptr, layout)
}

/// Deallocate test memory
fn dealloc_test_heap(ptr: *mut u8, layout: Layout) {
    unsafe { alloc::alloc::dealloc(ptr, layout) };
}

/// Deterministic pseudo-random sequence for reproducible workloads.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, bound: usize) -> usize {
        (self.next() % bound as u64) as usize
    }
}

/// Fill a block with a byte pattern derived from its tag.
fn fill(addr: usize, size: usize, tag: u8) {
    unsafe { core::ptr::write_bytes(addr as *mut u8, tag, size) };
}

/// Check the block still holds its pattern, i.e. nobody else wrote over it.
fn check(addr: usize, size: usize, tag: u8) {
    let bytes = unsafe { core::slice::from_raw_parts(addr as *const u8, size) };
    assert!(
        bytes.iter().all(|&b| b == tag),
        "block at {:#x} ({} bytes) was overwritten",
        addr,
        size
    );
}

fn overlaps(a: (usize, usize), b: (usize, usize)) -> bool {
    a.0 < b.0 + b.1 && b.0 < a.0 + a.1
}

#[test]
fn test_real_heap_basic() {
    let (heap_ptr, heap_layout) = alloc_test_heap(TEST_HEAP_SIZE);
    let heap_addr = heap_ptr as usize;

    let mut allocator = BuddyAllocator::new(heap_addr, TEST_HEAP_SIZE).unwrap();
    assert_eq!(allocator.max_order(), 12);

    let a = allocator.allocate(100).unwrap();
    let b = allocator.allocate(1000).unwrap();
    assert!(a >= heap_addr && a + 128 <= heap_addr + TEST_HEAP_SIZE);
    assert!(b >= heap_addr && b + 1024 <= heap_addr + TEST_HEAP_SIZE);
    assert_eq!(allocator.allocation_size(a), Some(128));
    assert_eq!(allocator.allocation_size(b), Some(1024));

    fill(a, 128, 0xaa);
    fill(b, 1024, 0xbb);
    check(a, 128, 0xaa);
    check(b, 1024, 0xbb);

    allocator.free(a).unwrap();
    allocator.free(b).unwrap();
    assert!(allocator.bitmaps().is_clear());
    assert_eq!(allocator.used_bytes(), 0);

    dealloc_test_heap(heap_ptr, heap_layout);
}

#[test]
fn test_init_range_of_heap_sizes() {
    for order in MIN_ORDER + 1..=MAX_ORDER {
        let size = 1usize << order;
        let allocator = BuddyAllocator::new(0x4000_0000, size).unwrap();
        assert_eq!(allocator.max_order(), order);
        assert_eq!(allocator.available_bytes(), size);
    }
    assert_eq!(
        BuddyAllocator::new(0x4000_0000, 1 << (MAX_ORDER + 1)).unwrap_err(),
        AllocError::HeapTooLarge
    );
}

#[test]
fn test_exhaustion_and_coalescing() {
    let (heap_ptr, heap_layout) = alloc_test_heap(16);
    let heap_addr = heap_ptr as usize;

    let mut allocator = BuddyAllocator::new(heap_addr, 16).unwrap();
    let fresh = allocator.clone();
    assert_eq!(allocator.max_order(), 4);

    assert_eq!(allocator.allocate(MIN_BLOCK_SIZE), Ok(heap_addr));
    assert_eq!(allocator.allocate(MIN_BLOCK_SIZE), Ok(heap_addr + 8));
    assert_eq!(allocator.allocate(MIN_BLOCK_SIZE), Err(AllocError::OutOfMemory));

    allocator.free(heap_addr).unwrap();
    allocator.free(heap_addr + 8).unwrap();
    assert_eq!(allocator.bitmaps(), fresh.bitmaps());
    assert_eq!(allocator.block_state(4, 0), Ok(BlockState::Free));
    assert_eq!(allocator.free_block_count(4), 1);
    assert_eq!(allocator.free_block_count(3), 0);

    // The whole heap is usable again.
    assert_eq!(allocator.allocate(16), Ok(heap_addr));

    dealloc_test_heap(heap_ptr, heap_layout);
}

#[test]
fn test_fill_heap_with_min_blocks() {
    let (heap_ptr, heap_layout) = alloc_test_heap(TEST_HEAP_SIZE);
    let heap_addr = heap_ptr as usize;

    let mut allocator = BuddyAllocator::new(heap_addr, TEST_HEAP_SIZE).unwrap();
    let count = TEST_HEAP_SIZE / MIN_BLOCK_SIZE;

    let mut addrs = Vec::new();
    for i in 0..count {
        let addr = allocator.allocate(MIN_BLOCK_SIZE).unwrap();
        // Lowest address first: the heap fills up in order.
        assert_eq!(addr, heap_addr + i * MIN_BLOCK_SIZE);
        addrs.push(addr);
    }
    assert_eq!(allocator.allocate(1), Err(AllocError::OutOfMemory));
    assert_eq!(allocator.available_bytes(), 0);

    // Free in reverse; each merge cascade must leave a consistent state.
    for addr in addrs.into_iter().rev() {
        allocator.free(addr).unwrap();
    }
    assert!(allocator.bitmaps().is_clear());
    assert_eq!(allocator.allocate(TEST_HEAP_SIZE), Ok(heap_addr));

    dealloc_test_heap(heap_ptr, heap_layout);
}

#[test]
fn test_random_sequences_never_overlap() {
    let (heap_ptr, heap_layout) = alloc_test_heap(TEST_HEAP_SIZE);
    let heap_addr = heap_ptr as usize;

    for seed in 1..=8u64 {
        let mut allocator = BuddyAllocator::new(heap_addr, TEST_HEAP_SIZE).unwrap();
        let mut rng = Lcg(seed);
        // (addr, block size, tag)
        let mut live: Vec<(usize, usize, u8)> = Vec::new();

        for step in 0..2000 {
            if live.is_empty() || rng.below(3) != 0 {
                let size = 1 + rng.below(300);
                match allocator.allocate(size) {
                    Ok(addr) => {
                        let block = allocator.allocation_size(addr).unwrap();
                        assert!(block >= size && block.is_power_of_two());
                        assert_eq!((addr - heap_addr) % block, 0);
                        assert!(addr + block <= heap_addr + TEST_HEAP_SIZE);
                        for &(other, other_size, _) in &live {
                            assert!(
                                !overlaps((addr, block), (other, other_size)),
                                "seed {} step {}: {:#x}+{} overlaps {:#x}+{}",
                                seed,
                                step,
                                addr,
                                block,
                                other,
                                other_size
                            );
                        }
                        let tag = (step % 251) as u8;
                        fill(addr, block, tag);
                        live.push((addr, block, tag));
                    }
                    Err(err) => {
                        assert_eq!(err, AllocError::OutOfMemory);
                        let order = allocator.mapper().order_for_size(size).unwrap();
                        for level in order..=allocator.max_order() {
                            assert_eq!(
                                allocator.free_block_count(level),
                                0,
                                "seed {} step {}: {} bytes failed with a free order {} block",
                                seed,
                                step,
                                size,
                                level
                            );
                        }
                    }
                }
            } else {
                let (addr, size, tag) = live.swap_remove(rng.below(live.len()));
                check(addr, size, tag);
                allocator.free(addr).unwrap();
            }

            let used: usize = live.iter().map(|&(_, size, _)| size).sum();
            assert_eq!(allocator.used_bytes(), used);
        }

        for (addr, size, tag) in live.drain(..) {
            check(addr, size, tag);
            allocator.free(addr).unwrap();
        }
        assert!(allocator.bitmaps().is_clear());
        assert_eq!(allocator.free_block_count(allocator.max_order()), 1);
    }

    dealloc_test_heap(heap_ptr, heap_layout);
}

#[test]
fn test_alloc_free_round_trip_under_load() {
    let mut allocator = BuddyAllocator::new(0x4000_0000, TEST_HEAP_SIZE).unwrap();
    let mut rng = Lcg(42);

    // Build a fragmented background state.
    let mut background = Vec::new();
    for _ in 0..40 {
        if let Ok(addr) = allocator.allocate(1 + rng.below(64)) {
            background.push(addr);
        }
    }
    for i in (0..background.len()).step_by(3) {
        allocator.free(background[i]).unwrap();
    }

    for _ in 0..200 {
        let before = allocator.clone();
        let size = 1 + rng.below(512);
        match allocator.allocate(size) {
            Ok(addr) => {
                allocator.free(addr).unwrap();
                assert_eq!(allocator.bitmaps(), before.bitmaps());
                assert_eq!(allocator.used_bytes(), before.used_bytes());
            }
            Err(err) => {
                assert_eq!(err, AllocError::OutOfMemory);
                assert_eq!(allocator.bitmaps(), before.bitmaps());
            }
        }
    }
}

#[test]
fn test_double_free_detected() {
    let mut allocator = BuddyAllocator::new(0x4000_0000, 256).unwrap();
    let a = allocator.allocate(32).unwrap();
    let b = allocator.allocate(32).unwrap();
    allocator.free(a).unwrap();

    let before = allocator.clone();
    assert_eq!(allocator.free(a), Err(AllocError::InvalidFree));
    assert_eq!(allocator.free(b + 8), Err(AllocError::InvalidFree));
    assert_eq!(allocator.bitmaps(), before.bitmaps());
    assert!(allocator.is_allocated(b));
}

#[test]
fn test_byte_allocator_trait() {
    let (heap_ptr, heap_layout) = alloc_test_heap(TEST_HEAP_SIZE);
    let heap_addr = heap_ptr as usize;

    let mut allocator = BuddyAllocator::new(heap_addr, TEST_HEAP_SIZE).unwrap();
    assert_eq!(allocator.total_bytes(), TEST_HEAP_SIZE);

    let layouts = [
        Layout::new::<u64>(),
        Layout::new::<[u32; 20]>(),
        Layout::from_size_align(24, 64).unwrap(),
        Layout::from_size_align(1, 256).unwrap(),
    ];
    let mut ptrs: Vec<(NonNull<u8>, Layout)> = Vec::new();
    for layout in layouts {
        let ptr = allocator.alloc(layout).unwrap();
        assert_eq!(ptr.as_ptr() as usize % layout.align(), 0);
        unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0x5a, layout.size()) };
        ptrs.push((ptr, layout));
    }
    assert_eq!(
        allocator.used_bytes() + allocator.available_bytes(),
        TEST_HEAP_SIZE
    );

    for (ptr, layout) in ptrs {
        allocator.dealloc(ptr, layout);
    }
    assert_eq!(allocator.used_bytes(), 0);
    assert!(allocator.bitmaps().is_clear());

    dealloc_test_heap(heap_ptr, heap_layout);
}

#[test]
fn test_free_null_pointer() {
    let mut allocator = BuddyAllocator::new(0x4000_0000, 64).unwrap();
    assert_eq!(allocator.free(core::ptr::null_mut::<u8>() as usize), Ok(()));
    assert!(allocator.bitmaps().is_clear());
}

#[test]
fn test_from_region() {
    let (heap_ptr, _heap_layout) = alloc_test_heap(TEST_HEAP_SIZE);
    // Leaked on purpose: the allocator owns the region for the rest of the test binary.
    let region: &'static mut [u8] =
        unsafe { core::slice::from_raw_parts_mut(heap_ptr, TEST_HEAP_SIZE) };
    let mut allocator = BuddyAllocator::from_region(region).unwrap();
    assert_eq!(allocator.heap_start(), heap_ptr as usize);
    assert_eq!(allocator.heap_size(), TEST_HEAP_SIZE);

    let addr = allocator.allocate(64).unwrap();
    assert_eq!(addr, heap_ptr as usize);
    fill(addr, 64, 0x11);
    allocator.free(addr).unwrap();

    let (odd_ptr, _odd_layout) = alloc_test_heap(64);
    let odd: &'static mut [u8] = unsafe { core::slice::from_raw_parts_mut(odd_ptr, 48) };
    assert_eq!(
        BuddyAllocator::from_region(odd).unwrap_err(),
        AllocError::InvalidHeapSize
    );
}
