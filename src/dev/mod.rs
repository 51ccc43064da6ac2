//! Block device abstraction and emulators.
//!
//! The filesystem consumes storage through the [`BlockDevice`] trait: a flat
//! array of [`BLOCK_SIZE`]-byte blocks with synchronous per-block reads and
//! writes, a reference-counted mount state, and read/write counters.
//!
//! Out-of-range block numbers are a caller bug, not an I/O condition, so the
//! access methods panic instead of returning an error. Devices hand out
//! their storage behind `&self` so they can be shared through an
//! [`alloc::sync::Arc`] between the filesystem and its caller.

use core::sync::atomic::{AtomicUsize, Ordering::Relaxed};

use alloc::vec;
use alloc::vec::Vec;
use log::debug;
use spin::Mutex;

#[cfg(feature = "std")]
mod file;

#[cfg(feature = "std")]
pub use file::FileDisk;

/// Number of bytes per block.
pub const BLOCK_SIZE: usize = 4096;

/// Standard methods through which one should interact with a block device,
/// regardless of its backing storage.
pub trait BlockDevice: Send + Sync {
    /// Returns the size of the device, in blocks.
    fn size(&self) -> usize;

    /// Returns whether the device is currently mounted (mount count > 0).
    fn mounted(&self) -> bool;

    /// Increments the mount count.
    fn mount(&self);

    /// Decrements the mount count, saturating at zero.
    fn unmount(&self);

    /// Reads block `blocknum` into `data`.
    ///
    /// # Panics
    ///
    /// Panics if `blocknum` is out of range for this device.
    fn read(&self, blocknum: usize, data: &mut [u8; BLOCK_SIZE]);

    /// Writes `data` to block `blocknum`.
    ///
    /// # Panics
    ///
    /// Panics if `blocknum` is out of range for this device.
    fn write(&self, blocknum: usize, data: &[u8; BLOCK_SIZE]);

    /// Number of block reads performed so far.
    fn reads(&self) -> usize;

    /// Number of block writes performed so far.
    fn writes(&self) -> usize;
}

/// In-memory block device emulator.
///
/// Backs the block array with a heap buffer. Primarily useful for tests and
/// for exercising the filesystem without touching persistent storage.
pub struct MemDisk {
    blocks: Mutex<Vec<u8>>,
    nblocks: usize,
    reads: AtomicUsize,
    writes: AtomicUsize,
    mounts: AtomicUsize,
}

impl MemDisk {
    /// Opens a fresh zero-filled device of `nblocks` blocks.
    pub fn open(nblocks: usize) -> Self {
        Self {
            blocks: Mutex::new(vec![0u8; nblocks * BLOCK_SIZE]),
            nblocks,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            mounts: AtomicUsize::new(0),
        }
    }

    fn sanity_check(&self, blocknum: usize) {
        assert!(
            blocknum < self.nblocks,
            "block number {blocknum} out of range (device has {} blocks)",
            self.nblocks
        );
    }
}

impl BlockDevice for MemDisk {
    fn size(&self) -> usize {
        self.nblocks
    }

    fn mounted(&self) -> bool {
        self.mounts.load(Relaxed) > 0
    }

    fn mount(&self) {
        self.mounts.fetch_add(1, Relaxed);
    }

    fn unmount(&self) {
        let _ = self.mounts.fetch_update(Relaxed, Relaxed, |m| m.checked_sub(1));
    }

    fn read(&self, blocknum: usize, data: &mut [u8; BLOCK_SIZE]) {
        self.sanity_check(blocknum);

        let blocks = self.blocks.lock();
        let start = blocknum * BLOCK_SIZE;
        data.copy_from_slice(&blocks[start..start + BLOCK_SIZE]);

        self.reads.fetch_add(1, Relaxed);
    }

    fn write(&self, blocknum: usize, data: &[u8; BLOCK_SIZE]) {
        self.sanity_check(blocknum);

        let mut blocks = self.blocks.lock();
        let start = blocknum * BLOCK_SIZE;
        blocks[start..start + BLOCK_SIZE].copy_from_slice(data);

        self.writes.fetch_add(1, Relaxed);
    }

    fn reads(&self) -> usize {
        self.reads.load(Relaxed)
    }

    fn writes(&self) -> usize {
        self.writes.load(Relaxed)
    }
}

impl Drop for MemDisk {
    fn drop(&mut self) {
        debug!(
            target: "disk",
            "{} disk block reads, {} disk block writes",
            self.reads(),
            self.writes()
        );
    }
}
