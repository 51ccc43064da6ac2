//! In-memory free-block bitmap.
//!
//! One bit per device block. The bitmap is rebuilt from the on-disk metadata
//! at mount time by walking every valid inode, and discarded at unmount; it
//! is authoritative only while the filesystem is mounted.

use core::ops::Range;

use alloc::vec;
use vob::Vob;

use crate::fs::block::BlockAddr;

/// Allocation status of every block on the device.
///
/// The backing [`Vob`] uses byte-aligned storage, so its length is rounded
/// up to the next multiple of 8; the trailing bits are never addressed, as
/// every scan is bounded by the device geometry.
pub(crate) struct BlockBitmap(Vob);

impl BlockBitmap {
    /// Fresh bitmap of `nblocks` blocks, all marked free.
    pub(crate) fn new(nblocks: usize) -> Self {
        Self(Vob::from_bytes(&vec![0u8; nblocks.div_ceil(8)]))
    }

    /// Checks if a given block is marked in-use in this `BlockBitmap`.
    pub(crate) fn blk_in_use(&self, blk: BlockAddr) -> bool {
        self.0.get(blk.into()).unwrap_or(false)
    }

    /// Marks a given block as in-use in this `BlockBitmap`.
    pub(crate) fn set_blk_in_use(&mut self, blk: BlockAddr) {
        self.0.set(blk.into(), true);
    }

    /// Frees a given block in this `BlockBitmap`.
    pub(crate) fn free_blk(&mut self, blk: BlockAddr) {
        self.0.set(blk.into(), false);
    }

    /// Returns the lowest free block in the given range, if any.
    pub(crate) fn first_available_blk_in_range(&self, range: Range<usize>) -> Option<BlockAddr> {
        self.0.iter_unset_bits(range).next().map(BlockAddr::from)
    }
}
