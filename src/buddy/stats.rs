//! Statistics and debugging for buddy allocator
//!
//! Provides per-order statistics and failure reporting.

use crate::config::MAX_ORDER;

/// Buddy system statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuddyStats {
    pub total_bytes: usize,
    pub used_bytes: usize,
    pub free_bytes: usize,
    /// Independently allocatable blocks at each order.
    pub free_blocks_by_order: [usize; MAX_ORDER + 1],
}

impl Default for BuddyStats {
    fn default() -> Self {
        Self::new()
    }
}

impl BuddyStats {
    pub const fn new() -> Self {
        Self {
            total_bytes: 0,
            used_bytes: 0,
            free_bytes: 0,
            free_blocks_by_order: [0; MAX_ORDER + 1],
        }
    }

    /// Largest order with at least one free block.
    pub fn largest_free_order(&self) -> Option<usize> {
        (0..=MAX_ORDER)
            .rev()
            .find(|&order| self.free_blocks_by_order[order] > 0)
    }
}

/// Detailed memory statistics reporter
pub struct MemoryStatsReporter;

impl MemoryStatsReporter {
    /// Print detailed allocation failure statistics
    #[allow(unused_variables)]
    pub fn print_alloc_failure_stats(
        heap_start: usize,
        stats: &BuddyStats,
        request_size: usize,
        request_order: usize,
    ) {
        #[cfg(feature = "log")]
        use log::error;
        error!("========================================");
        error!(
            "Request: {} bytes (order {}, block {} bytes)",
            request_size,
            request_order,
            1usize << request_order
        );
        error!(
            "Heap: [{:#x}, {:#x})",
            heap_start,
            heap_start + stats.total_bytes
        );
        error!("  Total bytes: {}", stats.total_bytes);
        error!("  Used bytes: {}", stats.used_bytes);
        error!("  Free bytes: {}", stats.free_bytes);
        error!("  Free blocks by order:");

        for order in (0..=MAX_ORDER).rev() {
            let count = stats.free_blocks_by_order[order];
            if count > 0 {
                error!(
                    "    Order {}: {} blocks ({} bytes each, {} bytes total)",
                    order,
                    count,
                    1usize << order,
                    count << order
                );
            }
        }
        error!("========================================");
    }
}
