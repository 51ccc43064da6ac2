//! Error types shared across the crate.
//!
//! Every error enum implements the [`BaseError`] marker trait, which lets a
//! caller fold failures from different subsystems into the one boxed channel
//! of [`GenericError`]. Operations that can fail but return nothing on
//! success use the [`CanFail`] alias.

use core::fmt::Debug;

use alloc::boxed::Box;

/// Common trait implemented by every error type defined in this crate.
///
/// It is dependent on the [`Debug`] trait, which makes sense as we are
/// dealing with errors. Boxing through `dyn BaseError` carries unrelated
/// error types side by side:
///
/// ```
/// use sfs::errors::{BaseError, FsError, MountError};
///
/// let failures: Vec<Box<dyn BaseError>> = vec![
///     Box::new(MountError::DeviceBusy),
///     Box::new(FsError::BadInode),
/// ];
/// assert_eq!(failures.len(), 2);
/// ```
pub trait BaseError: Debug {}

/// Return type for operations that are allowed to fail, and don't need to
/// return anything.
pub type CanFail<T> = Result<(), T>;

/// Return type for operations whose failures span more than one error type.
///
/// For instance, provisioning a device crosses both the mount layer and the
/// file layer:
///
/// ```
/// use std::sync::Arc;
///
/// use sfs::errors::{BaseError, GenericError};
/// use sfs::{FileSystem, MemDisk};
///
/// fn provision(nblocks: usize) -> GenericError {
///     let dev = Arc::new(MemDisk::open(nblocks));
///     FileSystem::format(dev.as_ref()).map_err(|e| Box::new(e) as Box<dyn BaseError>)?;
///
///     let mut fs = FileSystem::new();
///     fs.mount(dev).map_err(|e| Box::new(e) as Box<dyn BaseError>)?;
///     fs.create().map_err(|e| Box::new(e) as Box<dyn BaseError>)?;
///
///     Ok(())
/// }
///
/// assert!(provision(10).is_ok());
/// ```
pub type GenericError = Result<(), Box<dyn BaseError>>;

/// Errors raised while formatting a device or binding a filesystem instance
/// to one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MountError {
    /// The filesystem instance is already bound to a device.
    AlreadyMounted,

    /// The device reports a nonzero mount count.
    DeviceBusy,

    /// The on-disk superblock failed validation (bad magic or geometry
    /// fields inconsistent with the device).
    BadSuperblock,
}

impl BaseError for MountError {}

/// Errors raised by file operations on a mounted filesystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsError {
    /// The filesystem instance is not bound to a device.
    NotMounted,

    /// The inode number is out of range, or the slot is not in use.
    BadInode,

    /// Every slot in the inode table is in use.
    NoFreeInode,

    /// The requested range lies entirely outside the file.
    OutOfRange,
}

impl BaseError for FsError {}

#[cfg(feature = "std")]
impl BaseError for std::io::Error {}
