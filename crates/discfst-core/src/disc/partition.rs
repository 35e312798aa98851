//! Partition table, signed tickets and partition info blocks.
//!
//! ```text
//! 0x40000  4 x { count: u32, table_offset: u32 >> 2 }
//! table    count x { partition_offset: u32 >> 2, type: u32 }
//!
//! partition + 0x000  signed ticket (0x140 signature + 0x164 body)
//! partition + 0x2a4  partition info (7 x u32)
//! partition + tmd    signed TMD
//! partition + data   encrypted clusters
//! ```

use std::fmt;

use tracing::{debug, instrument, warn};

use super::source::{BlockSource, SectorReader};
use super::{
    BURST_SIZE, DiscContext, DiscError, PARTITION_TABLE_OFFSET, SIGNATURE_SIZE, SIGNED_TICKET_SIZE, be_u16,
    be_u32, shifted,
};
use crate::crypto::{AES_BLOCK_SIZE, ClusterCipher, CommonKey, TitleKey};

/// Number of partition table groups in sector 128.
pub const PARTITION_GROUPS: usize = 4;

/// Upper bound on partitions per group; real discs carry at most a handful.
pub const MAX_PARTITIONS_PER_GROUP: u32 = 64;

/// Size of the partition info block that follows the signed ticket.
pub const PARTITION_INFO_SIZE: usize = 0x1c;

const TICKET_TITLE_KEY_OFFSET: usize = 0x1bf;
const TICKET_TITLE_ID_OFFSET: usize = 0x1dc;
const TICKET_COMMON_KEY_FLAG_OFFSET: usize = 0x1f1;

/// Offset of `num_contents` inside a signed TMD.
const TMD_NUM_CONTENTS_OFFSET: u64 = 0x1de;
const TMD_BODY_SIZE: u64 = 0xa4;
const TMD_CONTENT_RECORD_SIZE: u64 = 0x24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    Data,
    Update,
    Channel,
    Other(u32),
}

impl PartitionKind {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Data,
            1 => Self::Update,
            2 => Self::Channel,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => write!(f, "data"),
            Self::Update => write!(f, "update"),
            Self::Channel => write!(f, "channel"),
            Self::Other(raw) => write!(f, "type {raw:#x}"),
        }
    }
}

/// One row of a partition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionEntry {
    /// Absolute disc byte offset of the partition.
    pub offset: u64,
    pub kind: PartitionKind,
}

/// Read every partition table group, in group order.
#[instrument(level = "debug", skip(reader))]
pub fn read_partition_table<S: BlockSource>(
    reader: &mut SectorReader<S>,
) -> Result<Vec<PartitionEntry>, DiscError> {
    let mut groups = [0u8; PARTITION_GROUPS * 8];
    reader
        .read_exact_at(&mut groups, PARTITION_TABLE_OFFSET)
        .map_err(|e| {
            DiscError::io_with_context(
                e,
                DiscContext::new()
                    .with_what("partition table")
                    .with_offset(PARTITION_TABLE_OFFSET),
            )
        })?;

    let mut entries = Vec::new();
    for group in 0..PARTITION_GROUPS {
        let count = be_u32(&groups, group * 8);
        let table_offset = shifted(be_u32(&groups, group * 8 + 4));
        if count == 0 {
            continue;
        }
        if count > MAX_PARTITIONS_PER_GROUP {
            warn!(group, count, "Rejecting oversized partition group");
            return Err(DiscError::invalid(
                format!("group {group} claims {count} partitions"),
                DiscContext::new()
                    .with_what("partition table")
                    .with_offset(table_offset),
            ));
        }

        let mut table = vec![0u8; count as usize * 8];
        reader.read_exact_at(&mut table, table_offset).map_err(|e| {
            DiscError::io_with_context(
                e,
                DiscContext::new()
                    .with_what(format!("partition group {group}"))
                    .with_offset(table_offset),
            )
        })?;
        for row in table.chunks_exact(8) {
            entries.push(PartitionEntry {
                offset: shifted(be_u32(row, 0)),
                kind: PartitionKind::from_raw(be_u32(row, 4)),
            });
        }
        debug!(group, count, "Read partition group");
    }
    Ok(entries)
}

/// The fields of a signed ticket needed to recover the title key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub encrypted_title_key: [u8; AES_BLOCK_SIZE],
    pub title_id: [u8; 8],
    pub common_key: CommonKey,
}

impl Ticket {
    pub fn parse(signed: &[u8; SIGNED_TICKET_SIZE]) -> Self {
        let mut encrypted_title_key = [0u8; AES_BLOCK_SIZE];
        encrypted_title_key.copy_from_slice(
            &signed[TICKET_TITLE_KEY_OFFSET..TICKET_TITLE_KEY_OFFSET + AES_BLOCK_SIZE],
        );
        let mut title_id = [0u8; 8];
        title_id.copy_from_slice(&signed[TICKET_TITLE_ID_OFFSET..TICKET_TITLE_ID_OFFSET + 8]);
        Self {
            encrypted_title_key,
            title_id,
            common_key: CommonKey::from_ticket_flag(signed[TICKET_COMMON_KEY_FLAG_OFFSET]),
        }
    }
}

/// Partition info block, with every offset already widened to bytes and
/// relative to the partition start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartitionInfo {
    pub tmd_size: u32,
    pub tmd_offset: u64,
    pub cert_chain_size: u32,
    pub cert_chain_offset: u64,
    pub h3_offset: u64,
    pub data_offset: u64,
    pub data_size: u64,
}

impl PartitionInfo {
    pub fn parse(block: &[u8; PARTITION_INFO_SIZE]) -> Self {
        Self {
            tmd_size: be_u32(block, 0x00),
            tmd_offset: shifted(be_u32(block, 0x04)),
            cert_chain_size: be_u32(block, 0x08),
            cert_chain_offset: shifted(be_u32(block, 0x0c)),
            h3_offset: shifted(be_u32(block, 0x10)),
            data_offset: shifted(be_u32(block, 0x14)),
            data_size: shifted(be_u32(block, 0x18)),
        }
    }
}

/// A resolved partition: where it is, what it is, and its title key.
#[derive(Debug, Clone)]
pub struct Partition {
    pub index: u32,
    pub offset: u64,
    pub kind: PartitionKind,
    pub title_id: [u8; 8],
    pub common_key: CommonKey,
    pub title_key: TitleKey,
    pub info: PartitionInfo,
}

impl Partition {
    /// Absolute disc offset of the first encrypted cluster.
    pub fn data_start(&self) -> u64 {
        self.offset + self.info.data_offset
    }

    /// Absolute disc offset of the signed TMD.
    pub fn tmd_start(&self) -> u64 {
        self.offset + self.info.tmd_offset
    }

    pub fn title_id_hex(&self) -> String {
        hex::encode_upper(self.title_id)
    }

    fn context(&self) -> DiscContext {
        DiscContext::new()
            .with_partition(self.index)
            .with_offset(self.offset)
    }

    /// Size of the signed TMD, derived from its content count.
    pub fn read_tmd_size<S: BlockSource>(
        &self,
        reader: &mut SectorReader<S>,
    ) -> Result<u64, DiscError> {
        let at = self.tmd_start() + TMD_NUM_CONTENTS_OFFSET;
        let mut count = [0u8; 2];
        reader.read_exact_at(&mut count, at).map_err(|e| {
            DiscError::io_with_context(e, self.context().with_what("TMD").with_offset(at))
        })?;
        let num_contents = u64::from(be_u16(&count, 0));
        Ok(SIGNATURE_SIZE as u64 + TMD_BODY_SIZE + num_contents * TMD_CONTENT_RECORD_SIZE)
    }
}

/// Read the ticket and info block for one partition and recover its title key.
///
/// On return the cipher holds the common key; the caller installs the title
/// key when it starts decrypting clusters.
#[instrument(level = "debug", skip(reader, cipher, entry), fields(offset = entry.offset))]
pub fn resolve_partition<S, C>(
    reader: &mut SectorReader<S>,
    cipher: &mut C,
    entry: PartitionEntry,
    index: u32,
) -> Result<Partition, DiscError>
where
    S: BlockSource,
    C: ClusterCipher + ?Sized,
{
    let context = DiscContext::new()
        .with_partition(index)
        .with_offset(entry.offset);

    let mut signed = [0u8; SIGNED_TICKET_SIZE];
    reader
        .read_exact_at(&mut signed, entry.offset)
        .map_err(|e| DiscError::io_with_context(e, context.clone().with_what("ticket")))?;
    let ticket = Ticket::parse(&signed);

    let title_key = TitleKey::unwrap(
        cipher,
        ticket.common_key,
        &ticket.encrypted_title_key,
        &ticket.title_id,
    )
    .map_err(|source| DiscError::Crypto {
        source,
        context: context.clone().with_what("ticket"),
    })?;

    let info_at = entry.offset + SIGNED_TICKET_SIZE as u64;
    let mut block = [0u8; PARTITION_INFO_SIZE];
    reader.read_exact_at(&mut block, info_at).map_err(|e| {
        DiscError::io_with_context(
            e,
            context
                .clone()
                .with_what("partition info")
                .with_offset(info_at),
        )
    })?;
    let info = PartitionInfo::parse(&block);
    if info.data_offset == 0 {
        warn!(index, "Partition has no data region");
        return Err(DiscError::invalid(
            "data offset is zero",
            context.with_what("partition info"),
        ));
    }
    if (entry.offset + info.data_offset) % BURST_SIZE as u64 != 0 {
        warn!(index, data_offset = info.data_offset, "Data region is not cluster aligned");
        return Err(DiscError::invalid(
            format!(
                "data region at {:#x} is not cluster aligned",
                entry.offset + info.data_offset
            ),
            context.with_what("partition info"),
        ));
    }

    debug!(
        index,
        kind = %entry.kind,
        title_id = %hex::encode_upper(ticket.title_id),
        common_key = ?ticket.common_key,
        data_offset = info.data_offset,
        "Resolved partition"
    );

    Ok(Partition {
        index,
        offset: entry.offset,
        kind: entry.kind,
        title_id: ticket.title_id,
        common_key: ticket.common_key,
        title_key,
        info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_raw() {
        assert_eq!(PartitionKind::from_raw(0), PartitionKind::Data);
        assert_eq!(PartitionKind::from_raw(1), PartitionKind::Update);
        assert_eq!(PartitionKind::from_raw(2), PartitionKind::Channel);
        assert_eq!(PartitionKind::from_raw(7), PartitionKind::Other(7));
        assert_eq!(PartitionKind::Other(0x10).to_string(), "type 0x10");
    }

    #[test]
    fn test_ticket_field_offsets() {
        let mut signed = [0u8; SIGNED_TICKET_SIZE];
        signed[0x1bf..0x1cf].copy_from_slice(&[0xaa; 16]);
        signed[0x1dc..0x1e4].copy_from_slice(b"\x00\x01\x00\x00RSBE");
        signed[0x1f1] = 1;
        let ticket = Ticket::parse(&signed);
        assert_eq!(ticket.encrypted_title_key, [0xaa; 16]);
        assert_eq!(&ticket.title_id, b"\x00\x01\x00\x00RSBE");
        assert_eq!(ticket.common_key, CommonKey::Korean);
    }

    #[test]
    fn test_partition_info_shifts_offsets() {
        let mut block = [0u8; PARTITION_INFO_SIZE];
        block[0..4].copy_from_slice(&0x208u32.to_be_bytes());
        block[4..8].copy_from_slice(&0xb0u32.to_be_bytes());
        block[0x14..0x18].copy_from_slice(&0x8000u32.to_be_bytes());
        block[0x18..0x1c].copy_from_slice(&0x1000u32.to_be_bytes());
        let info = PartitionInfo::parse(&block);
        assert_eq!(info.tmd_size, 0x208);
        assert_eq!(info.tmd_offset, 0x2c0);
        assert_eq!(info.data_offset, 0x20000);
        assert_eq!(info.data_size, 0x4000);
    }
}
