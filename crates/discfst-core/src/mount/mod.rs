//! Mounting a disc and serving file operations on it.
//!
//! [`MountedDisc`] is the filesystem itself: it owns the block source, the
//! decrypt cache, the entry tree and the open handles, and implements
//! [`FsDevice`]. [`DiscMounter`] wraps it in the classic
//! `mount() -> id` / `unmount() -> bool` lifecycle against a
//! [`DeviceTable`].

pub mod device;
pub mod disc;
pub mod handles;
pub mod lifecycle;
pub mod options;
pub mod path;

use std::io;

use thiserror::Error;

use crate::disc::DiscError;
use crate::fs::{FstError, MetadataError};

pub use device::{DeviceTable, DirFd, Fd, FsDevice, FsError, ReadOutcome, RejectedDevice, SeekOrigin};
pub use disc::{MountedDisc, MountedPartition};
pub use handles::HandleTable;
pub use lifecycle::{DiscMounter, SCRATCH_ALIGN, ScratchRegion};
pub use options::{DEFAULT_DEVICE_NAME, MountOptions};

/// Why a mount was abandoned. Any of these leaves nothing mounted.
#[derive(Error, Debug)]
pub enum MountError {
    #[error("Scratch budget of {budget:#x} bytes cannot hold a {needed:#x}-byte read buffer")]
    ScratchTooSmall { budget: usize, needed: usize },

    #[error("Invalid device name '{0}': must be non-empty without ':' or '/'")]
    InvalidDeviceName(String),

    #[error("Failed to toggle raw read mode: {0}")]
    RawMode(#[source] io::Error),

    #[error(transparent)]
    Disc(#[from] DiscError),

    #[error("Partition {partition}: {source}")]
    Metadata {
        partition: u32,
        #[source]
        source: MetadataError,
    },

    #[error("Partition {partition}: malformed FST: {source}")]
    Fst {
        partition: u32,
        #[source]
        source: FstError,
    },

    #[error("Device '{0}' is already registered")]
    DeviceExists(String),
}
