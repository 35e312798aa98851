//! The per-partition `N_metadata` directory.
//!
//! These files don't exist in the FST; they are fabricated from the
//! partition structures so that the ticket, TMD, boot header, apploader,
//! main executable and the FST itself can be read like any other file.

use thiserror::Error;
use tracing::{debug, instrument};

use super::cluster::{CLUSTER_DATA_SIZE, CLUSTER_SIZE, ClusterCache, ClusterError};
use super::entry::{EntryId, EntryKind, EntryTree};
use super::fst::FstError;
use crate::crypto::ClusterCipher;
use crate::disc::{
    BlockSource, DiscError, Partition, PartitionInfo, SIGNED_TICKET_SIZE, SectorReader, be_u32,
    shifted,
};

/// Plaintext offset of the FST info block (`dol`, `fst`, `fst_size`, `fst_max_size`).
pub const FST_INFO_OFFSET: u64 = 0x420;
pub const FST_INFO_SIZE: usize = 16;

/// Size of the boot header exposed as `header`.
pub const BOOT_HEADER_SIZE: u64 = 0x400;

pub const APPLOADER_OFFSET: u64 = 0x2440;
/// The two apploader size fields follow its 0x14-byte date/entry-point prefix.
pub const APPLOADER_SIZES_OFFSET: u64 = APPLOADER_OFFSET + 0x14;
pub const APPLOADER_HEADER_SIZE: u64 = 32;

pub const DOL_HEADER_SIZE: usize = 0x100;
const DOL_TEXT_SEGMENTS: usize = 7;
const DOL_DATA_SEGMENTS: usize = 11;
const DOL_TEXT_OFFSETS: usize = 0x00;
const DOL_DATA_OFFSETS: usize = 0x1c;
const DOL_TEXT_SIZES: usize = 0x90;
const DOL_DATA_SIZES: usize = 0xac;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error(transparent)]
    Disc(#[from] DiscError),

    #[error("Reading {what}: {source}")]
    Cluster {
        what: &'static str,
        #[source]
        source: ClusterError,
    },

    #[error(transparent)]
    Tree(#[from] FstError),
}

/// FST info block with all offsets widened to bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FstInfo {
    pub dol_offset: u64,
    pub fst_offset: u64,
    pub fst_size: u64,
    pub fst_max_size: u64,
}

impl FstInfo {
    pub fn parse(block: &[u8; FST_INFO_SIZE]) -> Self {
        Self {
            dol_offset: shifted(be_u32(block, 0)),
            fst_offset: shifted(be_u32(block, 4)),
            fst_size: shifted(be_u32(block, 8)),
            fst_max_size: shifted(be_u32(block, 12)),
        }
    }

    pub fn has_dol(&self) -> bool {
        self.dol_offset != 0
    }

    pub fn has_fst(&self) -> bool {
        self.fst_offset != 0 && self.fst_size != 0
    }
}

/// Plaintext bytes the partition's data region can hold.
pub fn data_capacity(info: &PartitionInfo) -> u64 {
    info.data_size / CLUSTER_SIZE * CLUSTER_DATA_SIZE
}

/// Apploader file size from its two big-endian size fields.
pub fn appldr_size(sizes: &[u8; 8]) -> u64 {
    let size = u64::from(be_u32(sizes, 0)) + u64::from(be_u32(sizes, 4));
    if size == 0 { 0 } else { size + APPLOADER_HEADER_SIZE }
}

/// Executable size: the furthest end of any text or data segment.
pub fn dol_size(header: &[u8; DOL_HEADER_SIZE]) -> u64 {
    let segment_end = |offsets: usize, sizes: usize, i: usize| {
        u64::from(be_u32(header, offsets + i * 4)) + u64::from(be_u32(header, sizes + i * 4))
    };
    let text = (0..DOL_TEXT_SEGMENTS).map(|i| segment_end(DOL_TEXT_OFFSETS, DOL_TEXT_SIZES, i));
    let data = (0..DOL_DATA_SEGMENTS).map(|i| segment_end(DOL_DATA_OFFSETS, DOL_DATA_SIZES, i));
    text.chain(data).max().unwrap_or(0)
}

fn read_encrypted<S: BlockSource, C: ClusterCipher>(
    reader: &mut SectorReader<S>,
    cache: &mut ClusterCache<C>,
    partition: &Partition,
    plaintext_offset: u64,
    out: &mut [u8],
    what: &'static str,
) -> Result<(), MetadataError> {
    cache
        .read_plaintext(
            reader,
            &partition.title_key,
            partition.data_start(),
            plaintext_offset,
            out,
        )
        .map_err(|source| MetadataError::Cluster { what, source })
}

/// Read the FST info block at plaintext 0x420.
pub fn read_fst_info<S: BlockSource, C: ClusterCipher>(
    reader: &mut SectorReader<S>,
    cache: &mut ClusterCache<C>,
    partition: &Partition,
) -> Result<FstInfo, MetadataError> {
    let mut block = [0u8; FST_INFO_SIZE];
    read_encrypted(
        reader,
        cache,
        partition,
        FST_INFO_OFFSET,
        &mut block,
        "FST info",
    )?;
    Ok(FstInfo::parse(&block))
}

/// Populate `dir` with the metadata files of `partition`, in the fixed
/// order ticket, TMD, header, appldr.bin, main.dol, fst.bin.
#[instrument(level = "debug", skip_all, fields(partition = partition.index))]
pub fn add_metadata_entries<S: BlockSource, C: ClusterCipher>(
    tree: &mut EntryTree,
    dir: EntryId,
    reader: &mut SectorReader<S>,
    cache: &mut ClusterCache<C>,
    partition: &Partition,
    info: &FstInfo,
) -> Result<(), MetadataError> {
    let index = partition.index;

    tree.add_child(
        dir,
        "ticket",
        index,
        EntryKind::RawFile {
            disc_offset: partition.offset,
            size: SIGNED_TICKET_SIZE as u64,
        },
    )?;

    let tmd_size = partition.read_tmd_size(reader)?;
    tree.add_child(
        dir,
        "TMD",
        index,
        EntryKind::RawFile {
            disc_offset: partition.tmd_start(),
            size: tmd_size,
        },
    )?;

    tree.add_child(
        dir,
        "header",
        index,
        EntryKind::EncryptedFile {
            plaintext_offset: 0,
            size: BOOT_HEADER_SIZE,
        },
    )?;

    let mut sizes = [0u8; 8];
    read_encrypted(
        reader,
        cache,
        partition,
        APPLOADER_SIZES_OFFSET,
        &mut sizes,
        "apploader header",
    )?;
    tree.add_child(
        dir,
        "appldr.bin",
        index,
        EntryKind::EncryptedFile {
            plaintext_offset: APPLOADER_OFFSET,
            size: appldr_size(&sizes),
        },
    )?;

    if info.has_dol() {
        let mut header = [0u8; DOL_HEADER_SIZE];
        read_encrypted(
            reader,
            cache,
            partition,
            info.dol_offset,
            &mut header,
            "executable header",
        )?;
        tree.add_child(
            dir,
            "main.dol",
            index,
            EntryKind::EncryptedFile {
                plaintext_offset: info.dol_offset,
                size: dol_size(&header),
            },
        )?;
    }

    if info.has_fst() {
        tree.add_child(
            dir,
            "fst.bin",
            index,
            EntryKind::EncryptedFile {
                plaintext_offset: info.fst_offset,
                size: info.fst_size,
            },
        )?;
    }

    debug!(
        files = tree.children(dir).len(),
        tmd_size, "Synthesized metadata"
    );
    Ok(())
}
