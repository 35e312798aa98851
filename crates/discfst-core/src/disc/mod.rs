//! On-disc structures: raw sector access, the disc header, and the partition
//! table with its tickets and partition info blocks.
//!
//! All multi-byte fields on a Wii disc are big-endian. Offsets inside the
//! partition structures are stored shifted right by two and are widened back
//! to byte offsets as soon as they are parsed.

pub mod header;
pub mod partition;
pub mod source;

use std::fmt;
use std::io;

use thiserror::Error;

use crate::crypto::CryptoError;

pub use header::DiscHeader;
pub use partition::{Partition, PartitionEntry, PartitionInfo, PartitionKind, Ticket};
pub use source::{AccessClock, BlockSource, FileBlockSource, MemoryBlockSource, SectorReader};

/// Raw sector size of the block source.
pub const SECTOR_SIZE: usize = 0x800;

/// Largest single burst read from the block source; also the size of the
/// scratch buffer and of one encrypted cluster.
pub const BURST_SIZE: usize = 0x8000;

/// Magic at [`DISC_MAGIC_OFFSET`] in sector 0.
pub const DISC_MAGIC: [u8; 4] = [0x5d, 0x1c, 0x9e, 0xa3];
pub const DISC_MAGIC_OFFSET: usize = 0x18;

/// The partition table groups live in sector 128.
pub const PARTITION_TABLE_SECTOR: u64 = 128;
pub const PARTITION_TABLE_OFFSET: u64 = PARTITION_TABLE_SECTOR * SECTOR_SIZE as u64;

/// Size of the RSA-2048 signature block preceding tickets and TMDs.
pub const SIGNATURE_SIZE: usize = 0x140;
/// Size of a signed ticket (signature block + ticket body).
pub const SIGNED_TICKET_SIZE: usize = 0x2a4;

/// Widen a `>> 2` on-disc offset field back to a byte offset.
#[inline]
pub const fn shifted(value: u32) -> u64 {
    (value as u64) << 2
}

#[inline]
pub(crate) fn be_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[inline]
pub(crate) fn be_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

/// Where on the disc an error happened.
#[derive(Debug, Clone, Default)]
pub struct DiscContext {
    /// Index of the partition in discovery order
    pub partition: Option<u32>,
    /// Absolute disc byte offset
    pub disc_offset: Option<u64>,
    /// The structure or entry being read
    pub what: Option<String>,
}

impl DiscContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_partition(mut self, partition: u32) -> Self {
        self.partition = Some(partition);
        self
    }

    #[must_use]
    pub fn with_offset(mut self, disc_offset: u64) -> Self {
        self.disc_offset = Some(disc_offset);
        self
    }

    #[must_use]
    pub fn with_what(mut self, what: impl Into<String>) -> Self {
        self.what = Some(what.into());
        self
    }
}

impl fmt::Display for DiscContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(ref what) = self.what {
            parts.push(what.clone());
        }
        if let Some(partition) = self.partition {
            parts.push(format!("partition {partition}"));
        }
        if let Some(offset) = self.disc_offset {
            parts.push(format!("at disc offset {offset:#x}"));
        }

        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Failures while reading disc-level structures.
#[derive(Error, Debug)]
pub enum DiscError {
    #[error("IO error reading {context}: {source}")]
    Io {
        #[source]
        source: io::Error,
        context: DiscContext,
    },

    /// Sector 0 does not carry the Wii disc magic.
    #[error("Not a Wii disc: magic {found:02x?} at 0x18, expected {DISC_MAGIC:02x?}")]
    BadMagic { found: [u8; 4] },

    #[error("Key recovery failed for {context}: {source}")]
    Crypto {
        #[source]
        source: CryptoError,
        context: DiscContext,
    },

    /// A structure points somewhere it cannot.
    #[error("Invalid structure in {context}: {reason}")]
    InvalidStructure { reason: String, context: DiscContext },
}

impl DiscError {
    #[must_use]
    pub fn io_with_context(source: io::Error, context: DiscContext) -> Self {
        DiscError::Io { source, context }
    }

    #[must_use]
    pub fn invalid(reason: impl Into<String>, context: DiscContext) -> Self {
        DiscError::InvalidStructure {
            reason: reason.into(),
            context,
        }
    }
}

impl From<io::Error> for DiscError {
    fn from(source: io::Error) -> Self {
        DiscError::Io {
            source,
            context: DiscContext::new(),
        }
    }
}
