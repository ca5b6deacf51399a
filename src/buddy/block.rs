//! Buddy block handle
//!
//! Identifies a block of the buddy tree by its order and its index within that order.

/// A block at `order`, the `index`-th `2^order`-byte block from the heap start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId {
    pub order: usize,
    pub index: usize,
}

impl BlockId {
    /// Create a new block handle
    pub const fn new(order: usize, index: usize) -> Self {
        Self { order, index }
    }

    /// The sibling created when this block's parent was split.
    ///
    /// Indices of buddies differ only in the lowest bit.
    pub const fn buddy(&self) -> Self {
        Self::new(self.order, self.index ^ 1)
    }

    /// The block one order up that contains this one.
    pub const fn parent(&self) -> Self {
        Self::new(self.order + 1, self.index >> 1)
    }

    /// The lower half of this block after a split, `None` for an order-0 block.
    pub const fn lower_child(&self) -> Option<Self> {
        match self.order.checked_sub(1) {
            Some(order) => Some(Self::new(order, self.index << 1)),
            None => None,
        }
    }

    /// Whether this is the lower half of its parent.
    pub const fn is_lower_half(&self) -> bool {
        self.index & 1 == 0
    }

    /// Block size in bytes.
    pub const fn size(&self) -> usize {
        1 << self.order
    }
}
