//! Read-only virtual filesystem over encrypted Wii disc images.
//!
//! A disc is mounted from any [`disc::BlockSource`], its partitions are
//! resolved and their title keys recovered, and each partition's
//! file-system-table is materialized into a directory tree. The resulting
//! [`mount::MountedDisc`] serves POSIX-style open/read/seek/stat and
//! directory iteration, decrypting 0x8000-byte clusters on demand through a
//! single-slot cache.

pub mod crypto;
pub mod disc;
pub mod error;
pub mod fs;
pub mod mount;
pub mod testing;

pub use mount::{DeviceTable, DiscMounter, FsDevice, MountOptions, MountedDisc};
