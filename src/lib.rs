//! A small Unix-style single-user filesystem layered on top of a fixed-size
//! block device.
//!
//! The on-disk layout follows the classic Unix design: block 0 holds the
//! superblock, the next tenth of the device is reserved for the inode table,
//! and everything past it is the data region. Each inode addresses its data
//! through five direct pointers plus a single indirect pointer block, and
//! files are named by plain integer inode numbers; there is no directory
//! namespace.
//!
//! Devices are consumed through the [`dev::BlockDevice`] trait; the crate
//! ships an in-memory emulator ([`dev::MemDisk`]) and, with the `std`
//! feature, a disk-image backed one ([`dev::FileDisk`]). The
//! [`fs::FileSystem`] type ties an instance to one device at a time and
//! exposes create/remove/stat/read/write over inode numbers.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod dev;
pub mod errors;
pub mod fs;

pub use crate::dev::{BlockDevice, MemDisk, BLOCK_SIZE};
pub use crate::fs::FileSystem;

extern crate alloc;

#[cfg(test)]
extern crate std;
