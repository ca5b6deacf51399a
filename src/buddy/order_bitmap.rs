//! Per-order block bitmaps
//!
//! One bit per block per order, packed into a single statically sized word
//! array. Order `MIN_ORDER` starts at word 0, each following order directly
//! after the previous one.

use crate::config::{words_for_bits, BITMAP_WORDS, BITS_PER_WORD, MAX_ORDER, MIN_ORDER, ORDER_COUNT};
use crate::{AllocError, AllocResult};

use super::block::BlockId;

/// State of one block at one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Free,
    Used,
}

impl BlockState {
    const fn from_bit(bit: bool) -> Self {
        if bit {
            BlockState::Used
        } else {
            BlockState::Free
        }
    }
}

/// FREE(0)/USED(1) bit arrays for orders `MIN_ORDER..=max_order` of one heap.
#[derive(Clone, PartialEq, Eq)]
pub struct OrderBitmapSet {
    words: [u64; BITMAP_WORDS],
    /// First word of each order's bitmap, indexed by `order - MIN_ORDER`.
    offsets: [usize; ORDER_COUNT],
    max_order: usize,
}

impl OrderBitmapSet {
    /// Create bitmaps for a heap of `2^max_order` bytes with every bit FREE.
    ///
    /// `max_order` is validated by `BuddyAllocator::new` before this runs.
    pub(crate) const fn new(max_order: usize) -> Self {
        assert!(max_order >= MIN_ORDER && max_order <= MAX_ORDER);
        let mut offsets = [0; ORDER_COUNT];
        let mut next = 0;
        let mut order = MIN_ORDER;
        while order <= max_order {
            offsets[order - MIN_ORDER] = next;
            next += words_for_bits(1 << (max_order - order));
            order += 1;
        }
        Self {
            words: [0; BITMAP_WORDS],
            offsets,
            max_order,
        }
    }

    pub const fn max_order(&self) -> usize {
        self.max_order
    }

    /// Number of bits held at `order`, zero for orders without a bitmap.
    pub const fn bit_count(&self, order: usize) -> usize {
        if order < MIN_ORDER || order > self.max_order {
            return 0;
        }
        1 << (self.max_order - order)
    }

    /// Word slice backing `order`, empty for orders without a bitmap.
    pub fn order_words(&self, order: usize) -> &[u64] {
        if order < MIN_ORDER || order > self.max_order {
            return &[];
        }
        let start = self.offsets[order - MIN_ORDER];
        &self.words[start..start + words_for_bits(self.bit_count(order))]
    }

    fn locate(&self, block: BlockId) -> AllocResult<(usize, u64)> {
        if block.order < MIN_ORDER
            || block.order > self.max_order
            || block.index >= self.bit_count(block.order)
        {
            return Err(AllocError::OutOfRange);
        }
        let word = self.offsets[block.order - MIN_ORDER] + block.index / BITS_PER_WORD;
        let mask = 1u64 << (block.index % BITS_PER_WORD);
        Ok((word, mask))
    }

    pub fn get(&self, block: BlockId) -> AllocResult<BlockState> {
        let (word, mask) = self.locate(block)?;
        Ok(BlockState::from_bit(self.words[word] & mask != 0))
    }

    pub fn set(&mut self, block: BlockId, state: BlockState) -> AllocResult {
        let (word, mask) = self.locate(block)?;
        match state {
            BlockState::Free => self.words[word] &= !mask,
            BlockState::Used => self.words[word] |= mask,
        }
        Ok(())
    }

    pub fn is_used(&self, block: BlockId) -> bool {
        matches!(self.get(block), Ok(BlockState::Used))
    }

    /// Lowest FREE index at `order` that is `>= from`, scanning in ascending order.
    ///
    /// Whole USED words are skipped at once; the bits past the end of a
    /// partially used last word are never reported.
    pub fn find_free_from(&self, order: usize, from: usize) -> Option<usize> {
        if order < MIN_ORDER || order > self.max_order {
            return None;
        }
        let bits = self.bit_count(order);
        let words = self.order_words(order);
        let mut index = from;
        while index < bits {
            let word_idx = index / BITS_PER_WORD;
            // Mark the bits below `index` in this word as used so they are skipped.
            let below = (1u64 << (index % BITS_PER_WORD)) - 1;
            let free = !(words[word_idx] | below);
            if free != 0 {
                let found = word_idx * BITS_PER_WORD + free.trailing_zeros() as usize;
                return if found < bits { Some(found) } else { None };
            }
            index = (word_idx + 1) * BITS_PER_WORD;
        }
        None
    }

    /// Lowest FREE index at `order`.
    pub fn find_lowest_free(&self, order: usize) -> Option<usize> {
        self.find_free_from(order, 0)
    }

    /// Number of USED bits at `order`.
    pub fn count_used(&self, order: usize) -> usize {
        if order < MIN_ORDER || order > self.max_order {
            return 0;
        }
        self.order_words(order)
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum()
    }

    /// Whether every bit of every order is FREE.
    pub fn is_clear(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }
}

impl core::fmt::Debug for OrderBitmapSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut list = f.debug_map();
        for order in MIN_ORDER..=self.max_order {
            list.entry(&order, &self.order_words(order));
        }
        list.finish()
    }
}
