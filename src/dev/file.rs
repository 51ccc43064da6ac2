//! Disk-image backed block device.
//!
//! Mirrors the in-memory emulator but persists the block array in a regular
//! file, one [`BLOCK_SIZE`]-byte record per block.

use core::sync::atomic::{AtomicUsize, Ordering::Relaxed};

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;
use spin::Mutex;

use crate::dev::{BlockDevice, BLOCK_SIZE};

/// Block device persisted in a disk-image file.
pub struct FileDisk {
    image: Mutex<File>,
    nblocks: usize,
    reads: AtomicUsize,
    writes: AtomicUsize,
    mounts: AtomicUsize,
}

impl FileDisk {
    /// Opens the disk image at `path`, creating it if needed, and sizes it
    /// to exactly `nblocks` blocks.
    ///
    /// # Errors
    ///
    /// Fails if the image cannot be opened or resized.
    pub fn open(path: &Path, nblocks: usize) -> std::io::Result<Self> {
        let image = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        image.set_len((nblocks * BLOCK_SIZE) as u64)?;

        Ok(Self {
            image: Mutex::new(image),
            nblocks,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            mounts: AtomicUsize::new(0),
        })
    }

    fn sanity_check(&self, blocknum: usize) {
        assert!(
            blocknum < self.nblocks,
            "block number {blocknum} out of range (device has {} blocks)",
            self.nblocks
        );
    }

    fn seek_to(image: &mut File, blocknum: usize) {
        image
            .seek(SeekFrom::Start((blocknum * BLOCK_SIZE) as u64))
            .unwrap_or_else(|e| panic!("unable to seek to block {blocknum}: {e}"));
    }
}

impl BlockDevice for FileDisk {
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

        let mut image = self.image.lock();
        Self::seek_to(&mut image, blocknum);
        image
            .read_exact(data)
            .unwrap_or_else(|e| panic!("unable to read block {blocknum}: {e}"));

        self.reads.fetch_add(1, Relaxed);
    }

    fn write(&self, blocknum: usize, data: &[u8; BLOCK_SIZE]) {
        self.sanity_check(blocknum);

        let mut image = self.image.lock();
        Self::seek_to(&mut image, blocknum);
        image
            .write_all(data)
            .unwrap_or_else(|e| panic!("unable to write block {blocknum}: {e}"));

        self.writes.fetch_add(1, Relaxed);
    }

    fn reads(&self) -> usize {
        self.reads.load(Relaxed)
    }

    fn writes(&self) -> usize {
        self.writes.load(Relaxed)
    }
}

impl Drop for FileDisk {
    fn drop(&mut self) {
        debug!(
            target: "disk",
            "{} disk block reads, {} disk block writes",
            self.reads(),
            self.writes()
        );
    }
}
