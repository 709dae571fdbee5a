//! Owns the blocks of one in-flight parity group.
//!
//! Grounded on the teacher's `erasure_code::stripe::Stripe::zero`/`clear`
//! pattern and the `memset` resets `original_source` performs at every
//! group-boundary crossing in `RaidDpFile::AddDataBlock`.

use crate::erasure_code::Block;

/// Fixed-size collection of `B` blocks backing one accumulating group.
///
/// Cleared (re-zeroed) at the start of every group so that data cells never
/// written in a partial group act as zero in the parity computation, the way
/// a short final group does in both coding schemes.
pub struct StripeBuffer {
    blocks: Vec<Block>,
    block_size: usize,
}

impl StripeBuffer {
    /// Allocate `count` zeroed blocks of `block_size` bytes each.
    pub fn new(count: usize, block_size: usize) -> Self {
        Self {
            blocks: Block::zero_n(count, block_size),
            block_size,
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block(&self, i: usize) -> &Block {
        &self.blocks[i]
    }

    pub fn block_mut(&mut self, i: usize) -> &mut Block {
        &mut self.blocks[i]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }

    /// Re-zero every block in place, ready to accumulate a new group.
    pub fn clear(&mut self) {
        for block in self.blocks.iter_mut() {
            block.as_mut().fill(0);
        }
    }
}
