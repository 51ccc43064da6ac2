//! Byte-accurate file I/O through the direct and indirect pointers.
//!
//! Both directions work over the ordered address list of an inode: the five
//! direct pointers followed by up to 1024 entries of the indirect pointer
//! table, a null address meaning "no block at this logical position". A byte
//! offset `O` into the file maps to entry `O / 4096` of that list, at byte
//! `O % 4096` within the block.
//!
//! Reads stop at the first null address and return the bytes copied so far.
//! Writes allocate through the free-block bitmap as they go (including the
//! indirect pointer table itself, on first need), and a full disk ends the
//! transfer early with the byte count already on disk; a short count is a
//! normal return, not an error.

use alloc::vec::Vec;
use bytemuck::Zeroable;

use crate::dev::BLOCK_SIZE;
use crate::errors::FsError;
use crate::fs::block::{Block, BlockAddr};
use crate::fs::inode::{Inode, InodeNumber, MAX_DATA_BLOCKS, POINTERS_PER_INODE};
use crate::fs::{FileSystem, FsResult, Mounted, Seek};

impl Mounted {
    /// Materializes the ordered data-block address list of `inode`: the
    /// direct pointers, then the indirect table if one is attached.
    fn address_list(&self, inode: &Inode) -> Vec<BlockAddr> {
        let mut addrs = Vec::with_capacity(MAX_DATA_BLOCKS);
        addrs.extend_from_slice(inode.direct_all());

        if !inode.indirect().is_null() {
            let mut pblock = Block::zeroed();
            self.dev.read(inode.indirect().into(), pblock.bytes_mut());
            addrs.extend_from_slice(pblock.pointers());
        }

        addrs
    }
}

impl FileSystem {
    /// Reads up to `data.len()` bytes of the file named by `inumber`,
    /// starting at byte `offset`, and returns the number of bytes copied.
    ///
    /// The transfer is clamped to the file size, and a hole (null address)
    /// in the block list ends it early. Byte values are opaque; embedded
    /// zeroes are data like any other.
    ///
    /// # Errors
    ///
    /// Fails with [`FsError::BadInode`] if `inumber` does not name a file in
    /// use, and with [`FsError::OutOfRange`] if `offset` lies at or past the
    /// end of the file with a nonempty `data`.
    pub fn read(&self, inumber: InodeNumber, data: &mut [u8], offset: usize) -> FsResult<usize> {
        let fs = self.mounted.as_ref().ok_or(FsError::NotMounted)?;
        let inode = fs.inode(inumber)?;

        let size = inode.size() as usize;
        if offset > size || (offset == size && !data.is_empty()) {
            return Err(FsError::OutOfRange);
        }
        let length = usize::min(data.len(), size - offset);
        if length == 0 {
            return Ok(0);
        }

        let addrs = fs.address_list(&inode);
        let mut bi = offset / BLOCK_SIZE;
        let mut bo = offset % BLOCK_SIZE;

        let mut block = Block::zeroed();
        let mut copied = 0;
        while copied < length {
            let addr = match addrs.get(bi) {
                Some(&addr) if !addr.is_null() => addr,
                _ => break,
            };

            fs.dev.read(addr.into(), block.bytes_mut());

            let count = usize::min(BLOCK_SIZE - bo, length - copied);
            data[copied..copied + count].copy_from_slice(&block.bytes()[bo..bo + count]);

            copied += count;
            bo = 0;
            bi += 1;
        }

        Ok(copied)
    }

    /// Writes `data` into the file named by `inumber`, starting at byte
    /// `offset`, and returns the number of bytes that reached the disk.
    ///
    /// Data blocks are claimed from the free-block bitmap as the transfer
    /// advances, lowest free block first, as is the indirect pointer table
    /// itself the first time a block index past the direct pointers is
    /// touched.
    /// Running out of free blocks, or reaching the end of the address list,
    /// ends the write early with the byte count so far. The file size grows
    /// to cover every byte written; writing at `offset == size` appends.
    ///
    /// The inode is persisted before returning.
    ///
    /// # Errors
    ///
    /// Fails with [`FsError::BadInode`] if `inumber` does not name a file in
    /// use.
    pub fn write(&mut self, inumber: InodeNumber, data: &[u8], offset: usize) -> FsResult<usize> {
        let fs = self.mounted.as_mut().ok_or(FsError::NotMounted)?;
        let mut inode = fs.inode(inumber)?;

        if data.is_empty() {
            return Ok(0);
        }

        // indirect pointer table, loaded once if already attached
        let mut pointers: Option<Block> = (!inode.indirect().is_null()).then(|| {
            let mut pblock = Block::zeroed();
            fs.dev.read(inode.indirect().into(), pblock.bytes_mut());
            pblock
        });

        let mut bi = offset / BLOCK_SIZE;
        let mut bo = offset % BLOCK_SIZE;

        let mut block = Block::zeroed();
        let mut written = 0;
        while written < data.len() && bi < MAX_DATA_BLOCKS {
            let addr = if bi < POINTERS_PER_INODE {
                inode.direct(bi)
            } else {
                pointers
                    .as_ref()
                    .map(|p| p.pointers()[bi - POINTERS_PER_INODE])
                    .unwrap_or(BlockAddr::NULL)
            };

            let addr = if addr.is_null() {
                let Some(fresh) = fs.allocate_blk() else {
                    break;
                };

                if bi < POINTERS_PER_INODE {
                    inode.set_direct(bi, fresh);
                } else {
                    if inode.indirect().is_null() {
                        // the indirect table needs a block of its own first
                        let Some(table) = fs.allocate_blk() else {
                            fs.bitmap.free_blk(fresh);
                            break;
                        };
                        inode.set_indirect(table);
                        pointers = Some(Block::zeroed());
                    }

                    let pblock = pointers.as_mut().expect("indirect table not loaded");
                    pblock.pointers_mut()[bi - POINTERS_PER_INODE] = fresh;
                    fs.dev.write(inode.indirect().into(), pblock.bytes());
                }

                fresh
            } else {
                addr
            };

            fs.dev.read(addr.into(), block.bytes_mut());

            let count = usize::min(BLOCK_SIZE - bo, data.len() - written);
            block.bytes_mut()[bo..bo + count].copy_from_slice(&data[written..written + count]);
            fs.dev.write(addr.into(), block.bytes());

            written += count;
            bo = 0;
            bi += 1;

            inode.grow_to((offset + written) as u32);
        }

        fs.store_inode(inumber, &inode);

        Ok(written)
    }

    /// Opens a cursor-based handle on the file named by `inumber`.
    ///
    /// # Errors
    ///
    /// Fails with [`FsError::BadInode`] if `inumber` does not name a file in
    /// use.
    pub fn open(&mut self, inumber: InodeNumber) -> FsResult<FileHandle<'_>> {
        let fs = self.mounted.as_ref().ok_or(FsError::NotMounted)?;
        fs.inode(inumber)?;

        Ok(FileHandle {
            fs: self,
            inumber,
            cursor: 0,
        })
    }
}

/// Cursor-based access to one file.
///
/// Wraps the offset-addressed operations of [`FileSystem`] behind an
/// internal cursor, moved with [`Seek`] and advanced by every transfer.
pub struct FileHandle<'fs> {
    fs: &'fs mut FileSystem,
    inumber: InodeNumber,
    cursor: usize,
}

impl FileHandle<'_> {
    /// Reads some bytes from the file into `buf`, starting at the cursor,
    /// and advances the cursor by the number of bytes read. Returns 0 once
    /// the cursor has reached the end of the file.
    pub fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        let count = usize::min(buf.len(), self.size()?.saturating_sub(self.cursor));
        if count == 0 {
            return Ok(0);
        }

        let read = self.fs.read(self.inumber, &mut buf[..count], self.cursor)?;
        self.cursor += read;

        Ok(read)
    }

    /// Writes `buf` into the file at the cursor and advances the cursor by
    /// the number of bytes that reached the disk.
    pub fn write(&mut self, buf: &[u8]) -> FsResult<usize> {
        let written = self.fs.write(self.inumber, buf, self.cursor)?;
        self.cursor += written;

        Ok(written)
    }

    /// Changes the position of the file's internal cursor.
    ///
    /// Returns the new offset of the cursor, in bytes. Forward seeks clamp
    /// to the end of the file; backward seeks saturate at 0.
    pub fn seek(&mut self, pos: Seek) -> usize {
        match pos {
            Seek::Backward(count) => {
                self.cursor = self.cursor.saturating_sub(count);
            }
            Seek::Current => (),
            Seek::Forward(count) => {
                let size = self.size().unwrap_or(self.cursor);
                self.cursor = usize::min(self.cursor + count, size);
            }
        }

        self.cursor
    }

    /// Returns the size of the file, in bytes.
    pub fn size(&self) -> FsResult<usize> {
        Ok(self.fs.stat(self.inumber)? as usize)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dev::BlockDevice;
    use crate::fs::testutil::*;

    /// Number of blocks marked in-use in the live bitmap.
    fn used_blocks(fs: &FileSystem) -> usize {
        bitmap_snapshot(fs).iter().filter(|&&b| b).count()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn small_write_read() {
        let (_dev, mut fs) = mounted(10);
        let inumber = fs.create().expect("create failed");

        assert_eq!(fs.write(inumber, b"hello", 0), Ok(5));
        assert_eq!(fs.stat(inumber), Ok(5));

        let mut buf = [0u8; 5];
        assert_eq!(fs.read(inumber, &mut buf, 0), Ok(5));
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn write_spanning_blocks() {
        let (_dev, mut fs) = mounted(100);
        let inumber = fs.create().expect("create failed");

        let reserved = used_blocks(&fs);
        let data = pattern(8192);
        assert_eq!(fs.write(inumber, &data, 4000), Ok(8192));
        assert_eq!(fs.stat(inumber), Ok(12192));

        // bytes 4000..12192 touch file blocks 0, 1 and 2
        assert_eq!(used_blocks(&fs), reserved + 3);

        let mut buf = alloc::vec![0u8; 8192];
        assert_eq!(fs.read(inumber, &mut buf, 4000), Ok(8192));
        assert_eq!(buf, data);
    }

    #[test]
    fn write_allocates_indirect_table() {
        let (_dev, mut fs) = mounted(100);
        let inumber = fs.create().expect("create failed");

        let reserved = used_blocks(&fs);
        let data = pattern(6 * 4096);
        assert_eq!(fs.write(inumber, &data, 0), Ok(6 * 4096));

        // 5 direct + 1 indirect-referenced data block + the table itself
        assert_eq!(used_blocks(&fs), reserved + 7);

        let mut buf = alloc::vec![0u8; 6 * 4096];
        assert_eq!(fs.read(inumber, &mut buf, 0), Ok(6 * 4096));
        assert_eq!(buf, data);
    }

    #[test]
    fn write_stops_on_full_disk() {
        // 10 blocks: superblock + inode block leave 8 free, one of which
        // goes to the indirect table, so 7 blocks of data fit
        let (_dev, mut fs) = mounted(10);
        let inumber = fs.create().expect("create failed");

        assert_eq!(fs.write(inumber, &pattern(9 * 4096), 0), Ok(7 * 4096));
        assert_eq!(fs.stat(inumber), Ok(7 * 4096));

        // further writes past the end find no space either
        assert_eq!(fs.write(inumber, b"more", 7 * 4096), Ok(0));

        // inode slots are independent of data space
        assert!(fs.create().is_ok());
    }

    #[test]
    fn remove_frees_data_blocks() {
        let (_dev, mut fs) = mounted(100);
        let inumber = fs.create().expect("create failed");

        let reserved = used_blocks(&fs);
        let data = pattern(6 * 4096);
        fs.write(inumber, &data, 0).expect("write failed");

        fs.remove(inumber).expect("remove failed");
        assert_eq!(used_blocks(&fs), reserved);

        // the space is reusable by a fresh file of the same size
        let fresh = fs.create().expect("create failed");
        assert_eq!(fs.write(fresh, &data, 0), Ok(6 * 4096));
    }

    #[test]
    fn append_at_end_of_file() {
        let (_dev, mut fs) = mounted(10);
        let inumber = fs.create().expect("create failed");

        assert_eq!(fs.write(inumber, b"ab", 0), Ok(2));
        assert_eq!(fs.write(inumber, b"cd", 2), Ok(2));
        assert_eq!(fs.stat(inumber), Ok(4));

        let mut buf = [0u8; 4];
        assert_eq!(fs.read(inumber, &mut buf, 0), Ok(4));
        assert_eq!(&buf, b"abcd");
    }

    #[test]
    fn overwrite_preserves_rest() {
        let (_dev, mut fs) = mounted(10);
        let inumber = fs.create().expect("create failed");

        fs.write(inumber, b"hello world", 0).expect("write failed");
        assert_eq!(fs.write(inumber, b"HELL", 2), Ok(4));

        // size is monotonic: rewriting inside the file never shrinks it
        assert_eq!(fs.stat(inumber), Ok(11));

        let mut buf = [0u8; 11];
        fs.read(inumber, &mut buf, 0).expect("read failed");
        assert_eq!(&buf, b"heHELLworld");
    }

    #[test]
    fn read_is_binary_safe() {
        let (_dev, mut fs) = mounted(10);
        let inumber = fs.create().expect("create failed");

        let data = [1u8, 0, 2, 0, 0, 3];
        fs.write(inumber, &data, 0).expect("write failed");

        let mut buf = [0xFFu8; 6];
        assert_eq!(fs.read(inumber, &mut buf, 0), Ok(6));
        assert_eq!(buf, data);
    }

    #[test]
    fn read_clamps_to_size() {
        let (_dev, mut fs) = mounted(10);
        let inumber = fs.create().expect("create failed");
        fs.write(inumber, b"hello", 0).expect("write failed");

        let mut buf = [0u8; 64];
        assert_eq!(fs.read(inumber, &mut buf, 0), Ok(5));
        assert_eq!(fs.read(inumber, &mut buf, 3), Ok(2));
        assert_eq!(&buf[..2], b"lo");
    }

    #[test]
    fn read_past_end_of_file() {
        let (_dev, mut fs) = mounted(10);
        let inumber = fs.create().expect("create failed");
        fs.write(inumber, b"hello", 0).expect("write failed");

        let mut buf = [0u8; 4];
        assert_eq!(fs.read(inumber, &mut buf, 5), Err(FsError::OutOfRange));
        assert_eq!(fs.read(inumber, &mut buf, 100), Err(FsError::OutOfRange));
    }

    #[test]
    fn zero_length_transfers() {
        let (dev, mut fs) = mounted(10);
        let inumber = fs.create().expect("create failed");
        fs.write(inumber, b"hi", 0).expect("write failed");

        let writes = dev.writes();
        assert_eq!(fs.write(inumber, b"", 1), Ok(0));
        assert_eq!(fs.read(inumber, &mut [], 1), Ok(0));
        assert_eq!(dev.writes(), writes);
    }

    #[test]
    fn read_stops_at_hole() {
        // writing past a never-written block leaves a hole; reads end there
        let (_dev, mut fs) = mounted(10);
        let inumber = fs.create().expect("create failed");

        assert_eq!(fs.write(inumber, b"tail", 4096), Ok(4));
        assert_eq!(fs.stat(inumber), Ok(4100));

        let mut buf = [0u8; 64];
        assert_eq!(fs.read(inumber, &mut buf, 0), Ok(0));
        assert_eq!(fs.read(inumber, &mut buf[..4], 4096), Ok(4));
        assert_eq!(&buf[..4], b"tail");
    }

    #[test]
    fn write_stops_at_address_list_end() {
        // 1200 blocks leave enough free space to reach the 1029-entry
        // address-list ceiling
        let (_dev, mut fs) = mounted(1200);
        let inumber = fs.create().expect("create failed");

        let max = MAX_DATA_BLOCKS * 4096;
        assert_eq!(fs.write(inumber, &pattern(200), max - 100), Ok(100));
        assert_eq!(fs.stat(inumber), Ok(max as u32));

        assert_eq!(fs.write(inumber, b"past", max), Ok(0));
    }

    #[test]
    fn files_never_share_blocks() {
        let (_dev, mut fs) = mounted(100);

        let a = fs.create().expect("create failed");
        let b = fs.create().expect("create failed");
        fs.write(a, &pattern(6 * 4096), 0).expect("write failed");
        fs.write(b, &pattern(6 * 4096), 0).expect("write failed");

        let mounted = fs.mounted.as_ref().unwrap();
        let blocks_of = |inumber| {
            let inode = mounted.inode(inumber).expect("inode not found");
            let mut blocks: Vec<BlockAddr> = mounted
                .address_list(&inode)
                .into_iter()
                .filter(|addr| !addr.is_null())
                .collect();
            if !inode.indirect().is_null() {
                blocks.push(inode.indirect());
            }
            blocks
        };

        let of_a = blocks_of(a);
        for addr in blocks_of(b) {
            assert!(!of_a.contains(&addr));
        }
    }

    #[test]
    fn read_after_write_roundtrip() {
        let (_dev, mut fs) = mounted(100);
        let inumber = fs.create().expect("create failed");

        let data = pattern(3 * 4096 + 123);
        fs.write(inumber, &data, 0).expect("write failed");

        // arbitrary interior ranges return exactly what was written
        for (offset, length) in [(0, 10), (4090, 20), (4096, 4096), (8000, 4315)] {
            let mut buf = alloc::vec![0u8; length];
            assert_eq!(fs.read(inumber, &mut buf, offset), Ok(length));
            assert_eq!(buf, data[offset..offset + length]);
        }
    }

    #[test]
    fn filehandle0() {
        let (_dev, mut fs) = mounted(10);
        let inumber = fs.create().expect("create failed");

        let mut file = fs.open(inumber).expect("open failed");
        assert_eq!(file.write(b"hello world"), Ok(11));
        assert_eq!(file.seek(Seek::Current), 11);
        assert_eq!(file.size(), Ok(11));

        // EOF reads return 0
        let mut buf = [0u8; 8];
        assert_eq!(file.read(&mut buf), Ok(0));

        assert_eq!(file.seek(Seek::Backward(5)), 6);
        assert_eq!(file.read(&mut buf), Ok(5));
        assert_eq!(&buf[..5], b"world");

        // forward seeks clamp to the end of the file
        assert_eq!(file.seek(Seek::Backward(100)), 0);
        assert_eq!(file.seek(Seek::Forward(1000)), 11);
    }

    #[test]
    fn filehandle_open_invalid() {
        let (_dev, mut fs) = mounted(10);

        assert!(fs.open(InodeNumber::from(0u32)).is_err());
    }
}
