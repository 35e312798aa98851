//! The device surface: the [`FsDevice`] operations a host I/O layer calls,
//! their errors, and the [`DeviceTable`] that routes `name:/path` strings.

use std::fmt;
use std::io;

use thiserror::Error;

use super::MountError;
use crate::fs::Stat;

/// An open file on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fd(pub u64);

/// An open directory iterator on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirFd(pub u64);

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd {}", self.0)
    }
}

impl fmt::Display for DirFd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dir {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Start,
    Current,
    End,
}

/// Result of a read: bytes copied and whether the request reached or ran
/// past end of file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    pub len: usize,
    pub eof: bool,
}

/// Per-call failures. Each maps to one errno value.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Bad file descriptor")]
    BadDescriptor,

    #[error("Invalid argument")]
    Invalid,

    #[error("Value too large for defined data type")]
    Overflow,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    /// The errno value a C-style caller would see.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::IsADirectory(_) => libc::EISDIR,
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::BadDescriptor => libc::EBADF,
            FsError::Invalid => libc::EINVAL,
            FsError::Overflow => libc::EOVERFLOW,
            FsError::Io(_) => libc::EIO,
        }
    }
}

/// Operations a mounted filesystem exposes to the host.
///
/// Every method takes the device exclusively; callers sharing a device
/// across threads serialize access themselves.
pub trait FsDevice {
    /// Name used as the `name:` path prefix.
    fn name(&self) -> &str;

    fn open(&mut self, path: &str) -> Result<Fd, FsError>;
    fn close(&mut self, fd: Fd) -> Result<(), FsError>;

    /// Read into `buf` from the handle's current offset and advance it.
    ///
    /// Fills `buf` completely unless end of file is reached first.
    fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<ReadOutcome, FsError>;

    /// Move the handle's offset. Positions outside `0..=size` are rejected.
    fn seek(&mut self, fd: Fd, offset: i64, origin: SeekOrigin) -> Result<u64, FsError>;

    fn fstat(&self, fd: Fd) -> Result<Stat, FsError>;
    fn stat(&self, path: &str) -> Result<Stat, FsError>;
    fn chdir(&mut self, path: &str) -> Result<(), FsError>;

    fn diropen(&mut self, path: &str) -> Result<DirFd, FsError>;
    fn dirreset(&mut self, dir: DirFd) -> Result<(), FsError>;
    /// Next child in stored order; `NotFound` once exhausted.
    fn dirnext(&mut self, dir: DirFd) -> Result<(String, Stat), FsError>;
    fn dirclose(&mut self, dir: DirFd) -> Result<(), FsError>;

    /// Drop all mounted state and hand the drive back (raw mode off).
    fn release(&mut self);
}

/// A device [`DeviceTable::add_device`] refused, handed back untouched.
pub struct RejectedDevice {
    pub error: MountError,
    pub device: Box<dyn FsDevice>,
}

impl fmt::Debug for RejectedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RejectedDevice")
            .field("error", &self.error)
            .field("device", &self.device.name())
            .finish()
    }
}

/// Registry of mounted devices, addressed by name.
#[derive(Default)]
pub struct DeviceTable {
    devices: Vec<Box<dyn FsDevice>>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device. Fails if the name is taken.
    pub fn add_device(&mut self, device: Box<dyn FsDevice>) -> Result<(), RejectedDevice> {
        if self.contains(device.name()) {
            let error = MountError::DeviceExists(device.name().to_string());
            return Err(RejectedDevice { error, device });
        }
        self.devices.push(device);
        Ok(())
    }

    pub fn remove_device(&mut self, name: &str) -> Option<Box<dyn FsDevice>> {
        let index = self.devices.iter().position(|d| d.name() == name)?;
        Some(self.devices.remove(index))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.devices.iter().any(|d| d.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<&dyn FsDevice> {
        self.devices
            .iter()
            .find(|d| d.name() == name)
            .map(AsRef::as_ref)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn FsDevice + 'static)> {
        self.devices
            .iter_mut()
            .find(|d| d.name() == name)
            .map(AsMut::as_mut)
    }

    /// The device a `name:/path` string addresses. Paths without a prefix
    /// have no device.
    pub fn find_for_path(&mut self, path: &str) -> Option<&mut (dyn FsDevice + 'static)> {
        let (name, _) = path.split_once(':')?;
        self.get_mut(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|d| d.name())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
