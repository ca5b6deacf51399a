//! Compile-time configuration of the buddy allocator.
//!
//! These values bound the size of the statically allocated bitmap storage, so
//! changing them changes the memory footprint of every allocator instance.

/// Largest supported order (inclusive). A heap may be at most `2^MAX_ORDER` bytes.
pub const MAX_ORDER: usize = 16;

/// Smallest block handed out, in bytes. Must be a power of two.
pub const MIN_BLOCK_SIZE: usize = 8;

/// Order of [`MIN_BLOCK_SIZE`].
pub const MIN_ORDER: usize = MIN_BLOCK_SIZE.trailing_zeros() as usize;

/// Number of orders that carry a bitmap: `MIN_ORDER..=MAX_ORDER`.
pub const ORDER_COUNT: usize = MAX_ORDER - MIN_ORDER + 1;

/// Bits held by one bitmap word.
pub const BITS_PER_WORD: usize = u64::BITS as usize;

/// Total `u64` words needed to hold the bitmaps of every order of the largest heap.
pub const BITMAP_WORDS: usize = bitmap_words(MAX_ORDER, MIN_ORDER);

const _: () = {
    assert!(MIN_BLOCK_SIZE.is_power_of_two(), "MIN_BLOCK_SIZE must be a power of two");
    assert!(MIN_ORDER < MAX_ORDER, "MAX_ORDER must leave room for two minimum blocks");
    assert!(MAX_ORDER < usize::BITS as usize, "MAX_ORDER must fit in a usize");
};

/// Words needed by an order holding `bits` blocks.
pub const fn words_for_bits(bits: usize) -> usize {
    (bits + BITS_PER_WORD - 1) / BITS_PER_WORD
}

/// Sum of the per-order word counts for a heap of `2^max_order` bytes.
pub const fn bitmap_words(max_order: usize, min_order: usize) -> usize {
    let mut total = 0;
    let mut order = min_order;
    while order <= max_order {
        total += words_for_bits(1 << (max_order - order));
        order += 1;
    }
    total
}
