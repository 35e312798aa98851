//! In-memory encrypted disc images.
//!
//! Layout of every generated partition (offsets relative to the partition):
//!
//! ```text
//! 0x00000  signed ticket, title key wrapped with the common key
//! 0x002a4  partition info
//! 0x002c0  signed TMD with one content record
//! 0x20000  encrypted clusters
//! ```
//!
//! and of its plaintext:
//!
//! ```text
//! 0x00000  boot header (copy of the disc header)
//! 0x00420  FST info
//! 0x02440  apploader
//! 0x07b00  main.dol (crosses the first cluster boundary)
//! 0x10000  FST
//! 0x20000  file data
//! ```

use super::fst::{FstNode, PlacedFile};
use crate::crypto::keys::title_iv;
use crate::crypto::{AES_BLOCK_SIZE, CommonKey, CryptoError, encrypt_cbc};
use crate::disc::{
    BURST_SIZE, DISC_MAGIC, DISC_MAGIC_OFFSET, MemoryBlockSource, PARTITION_TABLE_OFFSET,
    SIGNED_TICKET_SIZE,
};
use crate::fs::{CLUSTER_DATA_SIZE, CLUSTER_HEADER_SIZE, CLUSTER_IV_OFFSET, CLUSTER_SIZE};

/// Disc offset of the first partition.
pub const FIRST_PARTITION_OFFSET: u64 = 0x50000;
pub const TMD_OFFSET: u64 = 0x2c0;
pub const DATA_OFFSET: u64 = 0x20000;

pub const DOL_OFFSET: u64 = 0x7b00;
pub const FST_OFFSET: u64 = 0x10000;
pub const FILE_DATA_OFFSET: u64 = 0x20000;

const APPLOADER_OFFSET: usize = 0x2440;
const FST_INFO_OFFSET: usize = 0x420;
const TMD_SIZE: usize = 0x140 + 0xa4 + 0x24;
const PARTITION_TABLE_ROWS: u64 = PARTITION_TABLE_OFFSET + 0x20;

pub const DEFAULT_TITLE_KEY: [u8; AES_BLOCK_SIZE] = [
    0x1f, 0x2e, 0x3d, 0x4c, 0x5b, 0x6a, 0x79, 0x88, 0x97, 0xa6, 0xb5, 0xc4, 0xd3, 0xe2, 0xf1, 0x00,
];
pub const DEFAULT_TITLE_ID: [u8; 8] = *b"\x00\x01\x00\x00RFST";

/// Builder for a disc with one or more identical encrypted partitions.
#[derive(Debug, Clone)]
pub struct DiscImageBuilder {
    game_code: [u8; 4],
    maker_code: [u8; 2],
    title: String,
    magic: [u8; 4],
    title_key: [u8; AES_BLOCK_SIZE],
    title_id: [u8; 8],
    common_key: CommonKey,
    partitions: u32,
    root: FstNode,
    dol: bool,
    fst: bool,
}

impl Default for DiscImageBuilder {
    fn default() -> Self {
        Self {
            game_code: *b"RFST",
            maker_code: *b"01",
            title: "FST TEST DISC".to_string(),
            magic: DISC_MAGIC,
            title_key: DEFAULT_TITLE_KEY,
            title_id: DEFAULT_TITLE_ID,
            common_key: CommonKey::Standard,
            partitions: 1,
            root: FstNode::dir("", Vec::new()),
            dol: true,
            fst: true,
        }
    }
}

/// A generated image plus the plaintext it was built from.
#[derive(Debug, Clone)]
pub struct DiscImage {
    pub bytes: Vec<u8>,
    pub partition_offsets: Vec<u64>,
    pub ticket: Vec<u8>,
    pub tmd: Vec<u8>,
    pub boot_header: Vec<u8>,
    pub appldr: Vec<u8>,
    pub dol: Option<Vec<u8>>,
    pub fst: Option<Vec<u8>>,
    pub files: Vec<PlacedFile>,
}

impl DiscImage {
    pub fn source(&self) -> MemoryBlockSource {
        MemoryBlockSource::new(self.bytes.clone())
    }

    /// Contents of the FST file at `path` (relative to the partition root).
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.contents.as_slice())
    }
}

impl DiscImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file to the root of every partition.
    #[must_use]
    pub fn with_file(mut self, name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        if let FstNode::Dir { children, .. } = &mut self.root {
            children.push(FstNode::file(name, contents));
        }
        self
    }

    /// Replace the whole tree. `root` must be a directory.
    #[must_use]
    pub fn with_root(mut self, root: FstNode) -> Self {
        self.root = root;
        self
    }

    #[must_use]
    pub fn with_magic(mut self, magic: [u8; 4]) -> Self {
        self.magic = magic;
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn with_game_code(mut self, code: [u8; 4]) -> Self {
        self.game_code = code;
        self
    }

    #[must_use]
    pub fn with_title_key(mut self, key: [u8; AES_BLOCK_SIZE]) -> Self {
        self.title_key = key;
        self
    }

    #[must_use]
    pub fn with_common_key(mut self, key: CommonKey) -> Self {
        self.common_key = key;
        self
    }

    #[must_use]
    pub fn with_partitions(mut self, count: u32) -> Self {
        self.partitions = count;
        self
    }

    /// Leave the executable offset zero so no `main.dol` is exposed.
    #[must_use]
    pub fn without_dol(mut self) -> Self {
        self.dol = false;
        self
    }

    /// Leave the FST offset zero: the partition directory stays empty.
    #[must_use]
    pub fn without_fst(mut self) -> Self {
        self.fst = false;
        self
    }

    pub fn build(&self) -> Result<DiscImage, CryptoError> {
        let header = self.disc_header();
        let boot_header = header.clone();
        let appldr = apploader();
        let dol = self.dol.then(executable);
        let (fst, files) = if self.fst {
            let (bytes, files) = self.root.encode_at(FILE_DATA_OFFSET);
            (Some(bytes), files)
        } else {
            (None, Vec::new())
        };

        let plaintext = partition_plaintext(
            &boot_header,
            &appldr,
            dol.as_deref(),
            fst.as_deref(),
            &files,
        );
        let clusters = self.encrypt_clusters(&plaintext)?;
        let ticket = self.signed_ticket()?;
        let tmd = signed_tmd();
        let span = DATA_OFFSET + clusters.len() as u64;

        let partition_offsets: Vec<u64> = (0..u64::from(self.partitions))
            .map(|i| FIRST_PARTITION_OFFSET + i * span)
            .collect();
        let end = FIRST_PARTITION_OFFSET + span * u64::from(self.partitions);
        let mut bytes = vec![0u8; end as usize];
        bytes[..header.len()].copy_from_slice(&header);

        let groups = PARTITION_TABLE_OFFSET as usize;
        put_u32(&mut bytes, groups, self.partitions);
        put_u32(&mut bytes, groups + 4, (PARTITION_TABLE_ROWS >> 2) as u32);
        for (i, &offset) in partition_offsets.iter().enumerate() {
            let row = PARTITION_TABLE_ROWS as usize + i * 8;
            put_u32(&mut bytes, row, (offset >> 2) as u32);
            put_u32(&mut bytes, row + 4, 0);

            let base = offset as usize;
            bytes[base..base + ticket.len()].copy_from_slice(&ticket);
            let info = base + SIGNED_TICKET_SIZE;
            put_u32(&mut bytes, info, TMD_SIZE as u32);
            put_u32(&mut bytes, info + 0x04, (TMD_OFFSET >> 2) as u32);
            put_u32(&mut bytes, info + 0x14, (DATA_OFFSET >> 2) as u32);
            put_u32(&mut bytes, info + 0x18, (clusters.len() >> 2) as u32);
            let tmd_at = base + TMD_OFFSET as usize;
            bytes[tmd_at..tmd_at + tmd.len()].copy_from_slice(&tmd);
            let data_at = base + DATA_OFFSET as usize;
            bytes[data_at..data_at + clusters.len()].copy_from_slice(&clusters);
        }

        Ok(DiscImage {
            bytes,
            partition_offsets,
            ticket,
            tmd,
            boot_header,
            appldr,
            dol,
            fst,
            files,
        })
    }

    fn disc_header(&self) -> Vec<u8> {
        let mut header = vec![0u8; 0x400];
        header[..4].copy_from_slice(&self.game_code);
        header[4..6].copy_from_slice(&self.maker_code);
        header[DISC_MAGIC_OFFSET..DISC_MAGIC_OFFSET + 4].copy_from_slice(&self.magic);
        let title = self.title.as_bytes();
        let len = title.len().min(0x3f);
        header[0x20..0x20 + len].copy_from_slice(&title[..len]);
        header
    }

    fn encrypt_clusters(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut out = Vec::with_capacity(plaintext.len() / CLUSTER_DATA_SIZE as usize * BURST_SIZE);
        for (i, chunk) in plaintext.chunks(CLUSTER_DATA_SIZE as usize).enumerate() {
            let mut cluster = vec![0u8; CLUSTER_SIZE as usize];
            let iv: [u8; AES_BLOCK_SIZE] = std::array::from_fn(|b| (i * 31 + b * 7) as u8);
            cluster[CLUSTER_IV_OFFSET..CLUSTER_IV_OFFSET + AES_BLOCK_SIZE].copy_from_slice(&iv);
            let payload = &mut cluster[CLUSTER_HEADER_SIZE as usize..];
            payload[..chunk.len()].copy_from_slice(chunk);
            encrypt_cbc(&self.title_key, &iv, payload)?;
            out.extend_from_slice(&cluster);
        }
        Ok(out)
    }

    fn signed_ticket(&self) -> Result<Vec<u8>, CryptoError> {
        let mut ticket = vec![0u8; SIGNED_TICKET_SIZE];
        // Signature type RSA-2048
        put_u32(&mut ticket, 0, 0x0001_0001);
        let mut wrapped = self.title_key;
        encrypt_cbc(self.common_key.bytes(), &title_iv(&self.title_id), &mut wrapped)?;
        ticket[0x1bf..0x1bf + AES_BLOCK_SIZE].copy_from_slice(&wrapped);
        ticket[0x1dc..0x1e4].copy_from_slice(&self.title_id);
        ticket[0x1f1] = u8::from(self.common_key == CommonKey::Korean);
        Ok(ticket)
    }
}

/// Partition plaintext, padded to whole clusters.
fn partition_plaintext(
    boot_header: &[u8],
    appldr: &[u8],
    dol: Option<&[u8]>,
    fst: Option<&[u8]>,
    files: &[PlacedFile],
) -> Vec<u8> {
    let mut end = FST_OFFSET as usize;
    if let Some(fst) = fst {
        end = end.max(FST_OFFSET as usize + fst.len());
    }
    for file in files {
        end = end.max(file.plaintext_offset as usize + file.contents.len());
    }
    let len = (end as u64).next_multiple_of(CLUSTER_DATA_SIZE) as usize;
    let mut plain = vec![0u8; len];

    plain[..boot_header.len()].copy_from_slice(boot_header);
    plain[APPLOADER_OFFSET..APPLOADER_OFFSET + appldr.len()].copy_from_slice(appldr);
    if let Some(dol) = dol {
        let at = DOL_OFFSET as usize;
        plain[at..at + dol.len()].copy_from_slice(dol);
        put_u32(&mut plain, FST_INFO_OFFSET, (DOL_OFFSET >> 2) as u32);
    }
    if let Some(fst) = fst {
        let at = FST_OFFSET as usize;
        plain[at..at + fst.len()].copy_from_slice(fst);
        put_u32(&mut plain, FST_INFO_OFFSET + 4, (FST_OFFSET >> 2) as u32);
        put_u32(&mut plain, FST_INFO_OFFSET + 8, (fst.len() >> 2) as u32);
        put_u32(&mut plain, FST_INFO_OFFSET + 12, (fst.len() >> 2) as u32);
    }
    for file in files {
        let at = file.plaintext_offset as usize;
        plain[at..at + file.contents.len()].copy_from_slice(&file.contents);
    }
    plain
}

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_be_bytes());
}

fn signed_tmd() -> Vec<u8> {
    let mut tmd = vec![0u8; TMD_SIZE];
    put_u32(&mut tmd, 0, 0x0001_0001);
    tmd[0x1de..0x1e0].copy_from_slice(&1u16.to_be_bytes());
    for (i, b) in tmd[0x1e4..].iter_mut().enumerate() {
        *b = i as u8;
    }
    tmd
}

/// 32-byte apploader header with sizes 0x100 and 0x40, then the body.
fn apploader() -> Vec<u8> {
    let (code, trailer) = (0x100u32, 0x40u32);
    let mut appldr = vec![0u8; 32 + (code + trailer) as usize];
    appldr[..10].copy_from_slice(b"2026/10/16");
    put_u32(&mut appldr, 0x14, code);
    put_u32(&mut appldr, 0x18, trailer);
    for (i, b) in appldr[32..].iter_mut().enumerate() {
        *b = (i % 253) as u8;
    }
    appldr
}

/// A DOL with one 0x200-byte text segment at 0x100, so 0x300 bytes long.
fn executable() -> Vec<u8> {
    let mut dol = vec![0u8; 0x300];
    put_u32(&mut dol, 0x00, 0x100);
    put_u32(&mut dol, 0x90, 0x200);
    for (i, b) in dol[0x100..].iter_mut().enumerate() {
        *b = (i % 241) as u8 ^ 0x5a;
    }
    dol
}
