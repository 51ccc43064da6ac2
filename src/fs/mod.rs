//! Filesystem core.
//!
//! The on-disk layout is the classic teaching-scale Unix one: block 0 holds
//! the superblock, blocks `[1, K]` hold the inode table (K is a tenth of the
//! device, rounded up), and every block past the table is free for file data
//! and indirect pointer tables.
//!
//! A [`FileSystem`] instance is bound to at most one device at a time.
//! Mounting validates the superblock against the device and rebuilds the
//! in-memory free-block bitmap by walking every valid inode; unmounting (or
//! dropping the instance) releases the device and discards the bitmap. All
//! file operations address inodes by plain [`InodeNumber`].

use core::fmt::Write as _;

use alloc::string::String;
use alloc::sync::Arc;
use bytemuck::Zeroable;
use log::{error, info};

use crate::dev::BlockDevice;
use crate::errors::{CanFail, FsError, MountError};
use crate::fs::bitmap::BlockBitmap;
use crate::fs::block::{Block, BlockAddr};
use crate::fs::inode::{Inode, InodeNumber, INODES_PER_BLOCK, POINTERS_PER_INODE};
use crate::fs::sb::{Superblock, SuperblockMagic};

pub(crate) mod bitmap;
pub mod block;
pub mod file;
pub mod inode;
pub mod sb;

pub use file::FileHandle;

/// Result type for file operations.
pub type FsResult<T> = Result<T, FsError>;

/// `Seek` provides a way to move the internal cursor of a [`FileHandle`], or
/// to retrieve the current position using `Seek::Current`.
pub enum Seek {
    /// Moves the cursor backwards of the provided number of bytes.
    Backward(usize),

    /// Does not move the cursor, used to retrieve the current position.
    Current,

    /// Moves the cursor forward of the provided number of bytes.
    Forward(usize),
}

/// A filesystem instance.
///
/// Starts out unbound; [`FileSystem::mount`] ties it to a device and every
/// file operation requires that bond. [`FileSystem::format`] and
/// [`FileSystem::debug`] operate on raw devices and need no instance.
pub struct FileSystem {
    pub(crate) mounted: Option<Mounted>,
}

/// State owned by a filesystem instance for the duration of a mount.
pub(crate) struct Mounted {
    pub(crate) dev: Arc<dyn BlockDevice>,
    pub(crate) geometry: Superblock,
    pub(crate) bitmap: BlockBitmap,
}

impl Mounted {
    /// Loads the inode named by `inumber`.
    ///
    /// # Errors
    ///
    /// Fails if `inumber` is out of range for the table, or if the slot is
    /// not in use.
    pub(crate) fn inode(&self, inumber: InodeNumber) -> FsResult<Inode> {
        if u32::from(inumber) >= self.geometry.inodes {
            return Err(FsError::BadInode);
        }

        let mut block = Block::zeroed();
        self.dev.read(inumber.block(), block.bytes_mut());

        let inode = block.inodes()[inumber.slot()];
        if !inode.is_valid() {
            return Err(FsError::BadInode);
        }

        Ok(inode)
    }

    /// Writes `inode` back into its slot on disk.
    pub(crate) fn store_inode(&self, inumber: InodeNumber, inode: &Inode) {
        let mut block = Block::zeroed();
        self.dev.read(inumber.block(), block.bytes_mut());

        block.inodes_mut()[inumber.slot()] = *inode;
        self.dev.write(inumber.block(), block.bytes());
    }

    /// Claims the lowest free block of the data region, if any remains.
    pub(crate) fn allocate_blk(&mut self) -> Option<BlockAddr> {
        let blk = self
            .bitmap
            .first_available_blk_in_range(self.geometry.data_region())?;
        self.bitmap.set_blk_in_use(blk);

        Some(blk)
    }
}

impl FileSystem {
    /// Creates an unbound filesystem instance.
    pub fn new() -> Self {
        Self { mounted: None }
    }

    /// Renders a human-readable report of the on-disk state: the superblock
    /// summary, then every valid inode in ascending inode-number order with
    /// its size and block lists.
    pub fn debug(dev: &dyn BlockDevice) -> String {
        let mut out = String::new();

        let mut block = Block::zeroed();
        dev.read(0, block.bytes_mut());
        let sb = *block.superblock();

        let _ = writeln!(out, "SuperBlock:");
        if sb.magic.is_valid() {
            let _ = writeln!(out, "    magic number is valid");
        } else {
            let _ = writeln!(out, "    magic number is not valid");
        }
        let _ = writeln!(out, "    {} blocks", sb.blocks);
        let _ = writeln!(out, "    {} inode blocks", sb.inode_blocks);
        let _ = writeln!(out, "    {} inodes", sb.inodes);

        // a corrupted superblock may claim more inode blocks than the device
        // holds; never read past the device
        let inode_blocks = (sb.inode_blocks as usize).min(dev.size().saturating_sub(1));

        let mut iblock = Block::zeroed();
        let mut pblock = Block::zeroed();
        for blk in 1..=inode_blocks {
            dev.read(blk, iblock.bytes_mut());

            for slot in 0..INODES_PER_BLOCK {
                let inode = iblock.inodes()[slot];
                if !inode.is_valid() {
                    continue;
                }

                let _ = writeln!(out, "Inode {}:", InodeNumber::from_parts(blk, slot));
                let _ = writeln!(out, "    size: {} bytes", inode.size());

                let _ = write!(out, "    direct blocks:");
                for k in 0..POINTERS_PER_INODE {
                    if !inode.direct(k).is_null() {
                        let _ = write!(out, " {}", inode.direct(k));
                    }
                }
                let _ = writeln!(out);

                if !inode.indirect().is_null() {
                    let _ = writeln!(out, "    indirect block: {}", inode.indirect());

                    dev.read(inode.indirect().into(), pblock.bytes_mut());
                    let _ = write!(out, "    indirect data blocks:");
                    for &ptr in pblock.pointers().iter() {
                        if ptr.is_null() {
                            break;
                        }
                        let _ = write!(out, " {ptr}");
                    }
                    let _ = writeln!(out);
                }
            }
        }

        out
    }

    /// Writes a fresh filesystem onto `dev`: a valid superblock in block 0
    /// and zeroes everywhere else, which leaves every inode slot free.
    ///
    /// Formatting is idempotent and does not alter the device mount state.
    ///
    /// # Errors
    ///
    /// Fails with [`MountError::DeviceBusy`] if the device reports itself
    /// mounted.
    pub fn format(dev: &dyn BlockDevice) -> CanFail<MountError> {
        if dev.mounted() {
            return Err(MountError::DeviceBusy);
        }

        let sb = Superblock::for_device(dev.size());

        let mut block = Block::zeroed();
        *block.superblock_mut() = sb;
        dev.write(0, block.bytes());

        let zero = Block::zeroed();
        for blk in 1..dev.size() {
            dev.write(blk, zero.bytes());
        }

        info!(
            target: "sfs",
            "formatted device: {} blocks, {} inode blocks, {} inodes",
            sb.blocks, sb.inode_blocks, sb.inodes
        );

        Ok(())
    }

    /// Binds this instance to `dev`.
    ///
    /// The superblock is validated against the device (magic, block count,
    /// inode-table extent, inode count, in that order), the device mount
    /// count is incremented, and the free-block bitmap is rebuilt from every
    /// valid inode's direct and indirect pointers.
    ///
    /// # Errors
    ///
    /// Fails with [`MountError::AlreadyMounted`] if this instance is bound,
    /// [`MountError::DeviceBusy`] if the device is mounted elsewhere, and
    /// [`MountError::BadSuperblock`] if validation fails.
    pub fn mount(&mut self, dev: Arc<dyn BlockDevice>) -> CanFail<MountError> {
        if self.mounted.is_some() {
            return Err(MountError::AlreadyMounted);
        }
        if dev.mounted() {
            return Err(MountError::DeviceBusy);
        }

        let mut block = Block::zeroed();
        dev.read(0, block.bytes_mut());
        let sb = *block.superblock();

        if !sb.magic.is_valid() {
            error!(
                target: "sfs",
                "invalid superblock magic (got {:#010x} expected {:#010x})",
                sb.magic, SuperblockMagic::MAGIC
            );
            return Err(MountError::BadSuperblock);
        }
        if sb.blocks as usize != dev.size() {
            error!(
                target: "sfs",
                "superblock claims {} blocks but the device has {}",
                sb.blocks,
                dev.size()
            );
            return Err(MountError::BadSuperblock);
        }
        if sb.inode_blocks != Superblock::inode_blocks_for(dev.size()) {
            error!(
                target: "sfs",
                "superblock claims {} inode blocks (expected {})",
                sb.inode_blocks,
                Superblock::inode_blocks_for(dev.size())
            );
            return Err(MountError::BadSuperblock);
        }
        if sb.inodes != sb.inode_blocks * INODES_PER_BLOCK as u32 {
            error!(
                target: "sfs",
                "superblock claims {} inodes (expected {})",
                sb.inodes,
                sb.inode_blocks * INODES_PER_BLOCK as u32
            );
            return Err(MountError::BadSuperblock);
        }

        dev.mount();

        // superblock and inode table are permanently allocated
        let mut bitmap = BlockBitmap::new(dev.size());
        for blk in 0..=sb.inode_blocks as usize {
            bitmap.set_blk_in_use(blk.into());
        }

        // separate buffers for the inode block and the indirect block, so
        // walking an indirect table does not clobber the table being scanned
        let mut iblock = Block::zeroed();
        let mut pblock = Block::zeroed();
        for blk in 1..=sb.inode_blocks as usize {
            dev.read(blk, iblock.bytes_mut());

            for slot in 0..INODES_PER_BLOCK {
                let inode = iblock.inodes()[slot];
                if !inode.is_valid() {
                    continue;
                }

                for k in 0..POINTERS_PER_INODE {
                    if !inode.direct(k).is_null() {
                        bitmap.set_blk_in_use(inode.direct(k));
                    }
                }

                if !inode.indirect().is_null() {
                    bitmap.set_blk_in_use(inode.indirect());

                    dev.read(inode.indirect().into(), pblock.bytes_mut());
                    for &ptr in pblock.pointers().iter() {
                        if ptr.is_null() {
                            break;
                        }
                        bitmap.set_blk_in_use(ptr);
                    }
                }
            }
        }

        info!(
            target: "sfs",
            "mounted filesystem: {} blocks, {} inode blocks, {} inodes",
            sb.blocks, sb.inode_blocks, sb.inodes
        );

        self.mounted = Some(Mounted {
            dev,
            geometry: sb,
            bitmap,
        });

        Ok(())
    }

    /// Releases the device bound to this instance, if any, and discards the
    /// free-block bitmap. A no-op on an unbound instance.
    pub fn unmount(&mut self) {
        if let Some(mounted) = self.mounted.take() {
            mounted.dev.unmount();
        }
    }

    /// Claims the lowest free inode slot and returns its number. The slot is
    /// reinitialized to an empty file and persisted before returning.
    ///
    /// # Errors
    ///
    /// Fails with [`FsError::NoFreeInode`] when the table is full; nothing
    /// is modified in that case.
    pub fn create(&mut self) -> FsResult<InodeNumber> {
        let fs = self.mounted.as_ref().ok_or(FsError::NotMounted)?;

        let mut block = Block::zeroed();
        for blk in 1..=fs.geometry.inode_blocks as usize {
            fs.dev.read(blk, block.bytes_mut());

            for slot in 0..INODES_PER_BLOCK {
                if block.inodes()[slot].is_valid() {
                    continue;
                }

                block.inodes_mut()[slot].reset();
                fs.dev.write(blk, block.bytes());

                return Ok(InodeNumber::from_parts(blk, slot));
            }
        }

        Err(FsError::NoFreeInode)
    }

    /// Removes the file named by `inumber`: every direct block, the indirect
    /// block and every pointer it holds (up to the first null address) are
    /// released in the bitmap, and the slot is persisted as free.
    ///
    /// # Errors
    ///
    /// Fails with [`FsError::BadInode`] if `inumber` does not name a file in
    /// use (including after a mount or a previous remove).
    pub fn remove(&mut self, inumber: InodeNumber) -> CanFail<FsError> {
        let fs = self.mounted.as_mut().ok_or(FsError::NotMounted)?;
        let mut inode = fs.inode(inumber)?;

        for k in 0..POINTERS_PER_INODE {
            if !inode.direct(k).is_null() {
                fs.bitmap.free_blk(inode.direct(k));
            }
        }

        if !inode.indirect().is_null() {
            let mut pblock = Block::zeroed();
            fs.dev.read(inode.indirect().into(), pblock.bytes_mut());

            fs.bitmap.free_blk(inode.indirect());
            for &ptr in pblock.pointers().iter() {
                if ptr.is_null() {
                    break;
                }
                fs.bitmap.free_blk(ptr);
            }
        }

        inode.invalidate();
        fs.store_inode(inumber, &inode);

        Ok(())
    }

    /// Returns the size in bytes of the file named by `inumber`.
    ///
    /// # Errors
    ///
    /// Fails with [`FsError::BadInode`] if `inumber` does not name a file in
    /// use.
    pub fn stat(&self, inumber: InodeNumber) -> FsResult<u32> {
        let fs = self.mounted.as_ref().ok_or(FsError::NotMounted)?;

        Ok(fs.inode(inumber)?.size())
    }
}

impl Default for FileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FileSystem {
    fn drop(&mut self) {
        self.unmount();
    }
}
