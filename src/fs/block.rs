//! Typed views over a raw device block.
//!
//! On disk, a block is one of four things: the superblock, a slice of the
//! inode table, a table of block pointers, or plain file data. [`Block`]
//! holds the raw bytes and hands out each interpretation through checked
//! [`bytemuck`] casts over a single aligned buffer, so every view
//! round-trips bit-for-bit.

use core::mem::size_of;

use bytemuck::{cast_mut, cast_ref, from_bytes, from_bytes_mut, Pod, Zeroable};

use crate::dev::BLOCK_SIZE;
use crate::fs::inode::{Inode, INODES_PER_BLOCK};
use crate::fs::sb::Superblock;

/// Number of block pointers held by one pointer block.
pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / size_of::<BlockAddr>();

/// A block number on the underlying device.
///
/// Address 0 always names the superblock, so on-disk pointer fields use it
/// as the null address ("no block here").
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct BlockAddr(u32);

impl BlockAddr {
    /// The null address.
    pub const NULL: Self = Self(0);

    /// Checks whether this address is the null address.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl core::fmt::Display for BlockAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{}", self.0))
    }
}

impl From<BlockAddr> for usize {
    fn from(value: BlockAddr) -> Self {
        value.0 as usize
    }
}

impl From<BlockAddr> for u32 {
    fn from(value: BlockAddr) -> Self {
        value.0
    }
}

impl From<usize> for BlockAddr {
    fn from(value: usize) -> Self {
        Self(value.try_into().expect("block number does not fit in 32 bits"))
    }
}

/// Raw block buffer, reinterpretable as any of the on-disk structures.
///
/// The alignment requirement covers every view, so the casts below never
/// fail at runtime.
#[derive(Clone, Copy)]
#[repr(C, align(8))]
pub(crate) struct Block {
    bytes: [u8; BLOCK_SIZE],
}

// A plain byte array with a raised alignment requirement: no padding, every
// bit pattern valid.
unsafe impl Zeroable for Block {}
unsafe impl Pod for Block {}

impl Block {
    /// Superblock view of the buffer. Trailing bytes are ignored.
    pub(crate) fn superblock(&self) -> &Superblock {
        from_bytes(&self.bytes[..size_of::<Superblock>()])
    }

    pub(crate) fn superblock_mut(&mut self) -> &mut Superblock {
        from_bytes_mut(&mut self.bytes[..size_of::<Superblock>()])
    }

    /// Inode-table view of the buffer.
    pub(crate) fn inodes(&self) -> &[Inode; INODES_PER_BLOCK] {
        cast_ref(self)
    }

    pub(crate) fn inodes_mut(&mut self) -> &mut [Inode; INODES_PER_BLOCK] {
        cast_mut(self)
    }

    /// Pointer-table view of the buffer.
    pub(crate) fn pointers(&self) -> &[BlockAddr; POINTERS_PER_BLOCK] {
        cast_ref(self)
    }

    pub(crate) fn pointers_mut(&mut self) -> &mut [BlockAddr; POINTERS_PER_BLOCK] {
        cast_mut(self)
    }

    /// Raw byte view of the buffer.
    pub(crate) fn bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.bytes
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8; BLOCK_SIZE] {
        &mut self.bytes
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytemuck::Zeroable;

    #[test]
    fn layout0() {
        assert_eq!(size_of::<Block>(), BLOCK_SIZE);
        assert_eq!(size_of::<Superblock>(), 16);
        assert_eq!(size_of::<Inode>(), 32);
        assert_eq!(INODES_PER_BLOCK * size_of::<Inode>(), BLOCK_SIZE);
        assert_eq!(POINTERS_PER_BLOCK, 1024);
    }

    #[test]
    fn superblock_view_roundtrip() {
        let mut block = Block::zeroed();
        *block.superblock_mut() = Superblock::for_device(100);

        // fields land at offsets 0/4/8/12 in native endianness
        let bytes = block.bytes();
        assert_eq!(bytes[..4], 0xF0F0_3410u32.to_ne_bytes());
        assert_eq!(bytes[4..8], 100u32.to_ne_bytes());
        assert_eq!(bytes[8..12], 10u32.to_ne_bytes());
        assert_eq!(bytes[12..16], 1280u32.to_ne_bytes());

        assert_eq!(*block.superblock(), Superblock::for_device(100));
    }

    #[test]
    fn pointer_view_roundtrip() {
        let mut block = Block::zeroed();
        block.pointers_mut()[1] = BlockAddr::from(7usize);
        block.pointers_mut()[1023] = BlockAddr::from(42usize);

        assert_eq!(block.bytes()[4..8], 7u32.to_ne_bytes());
        assert_eq!(block.bytes()[4092..4096], 42u32.to_ne_bytes());
        assert_eq!(usize::from(block.pointers()[1]), 7);
        assert!(block.pointers()[0].is_null());
    }
}
