//! Bitmap buddy allocator module
//!
//! This module provides the buddy system over a single region:
//! - Address/index translation between blocks and heap addresses
//! - Per-order FREE/USED bitmaps with lowest-address scanning
//! - The allocator core with split-on-alloc and merge-on-free
//! - Statistics and failure reports (`tracking` feature)

pub mod block;
pub mod buddy_allocator;
pub mod index_mapper;
pub mod order_bitmap;
#[cfg(feature = "tracking")]
pub mod stats;

pub use block::BlockId;
pub use buddy_allocator::BuddyAllocator;
pub use index_mapper::AddressIndexMapper;
pub use order_bitmap::{BlockState, OrderBitmapSet};
#[cfg(feature = "tracking")]
pub use stats::{BuddyStats, MemoryStatsReporter};
