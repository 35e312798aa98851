//! Sector-addressed block sources and the burst reader built on them.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::trace;

use super::{BURST_SIZE, SECTOR_SIZE};

/// A seekable source of fixed-size 0x800-byte sectors.
///
/// This is the only primitive the filesystem needs from the drive. The raw
/// mode toggle exists for drives that must be told to allow long unencrypted
/// reads; sources that don't care can keep the default no-op.
pub trait BlockSource {
    /// Fill `buf[..sector_count * SECTOR_SIZE]` starting at `start_sector`.
    fn read_sectors(&mut self, buf: &mut [u8], sector_count: u32, start_sector: u64)
    -> io::Result<()>;

    fn set_raw_mode(&mut self, _enabled: bool) -> io::Result<()> {
        Ok(())
    }

    /// The 8-byte disc identifier at the very start of the disc.
    fn read_disc_id(&mut self) -> io::Result<u64> {
        let mut sector = [0u8; SECTOR_SIZE];
        self.read_sectors(&mut sector, 1, 0)?;
        let mut id = [0u8; 8];
        id.copy_from_slice(&sector[..8]);
        Ok(u64::from_be_bytes(id))
    }
}

impl<B: BlockSource + ?Sized> BlockSource for Box<B> {
    fn read_sectors(
        &mut self,
        buf: &mut [u8],
        sector_count: u32,
        start_sector: u64,
    ) -> io::Result<()> {
        (**self).read_sectors(buf, sector_count, start_sector)
    }

    fn set_raw_mode(&mut self, enabled: bool) -> io::Result<()> {
        (**self).set_raw_mode(enabled)
    }

    fn read_disc_id(&mut self) -> io::Result<u64> {
        (**self).read_disc_id()
    }
}

fn sector_span(buf: &[u8], sector_count: u32) -> io::Result<usize> {
    let len = sector_count as usize * SECTOR_SIZE;
    if buf.len() < len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "buffer of {} bytes cannot hold {sector_count} sectors",
                buf.len()
            ),
        ));
    }
    Ok(len)
}

/// Block source backed by a disc image file (or anything `Read + Seek`).
#[derive(Debug)]
pub struct FileBlockSource<F = File> {
    inner: F,
}

impl FileBlockSource<File> {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(File::open(path)?))
    }
}

impl<F: Read + Seek> FileBlockSource<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: Read + Seek> BlockSource for FileBlockSource<F> {
    fn read_sectors(
        &mut self,
        buf: &mut [u8],
        sector_count: u32,
        start_sector: u64,
    ) -> io::Result<()> {
        let len = sector_span(buf, sector_count)?;
        self.inner
            .seek(SeekFrom::Start(start_sector * SECTOR_SIZE as u64))?;
        self.inner.read_exact(&mut buf[..len])
    }
}

/// Block source over an in-memory image.
///
/// Reads past the end of the image fail with `UnexpectedEof`, like a short
/// image file would.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlockSource {
    data: Vec<u8>,
    raw_mode: bool,
    sector_reads: usize,
}

impl MemoryBlockSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            raw_mode: false,
            sector_reads: 0,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether long raw reads are currently enabled.
    pub fn raw_mode(&self) -> bool {
        self.raw_mode
    }

    /// Number of successful `read_sectors` calls so far.
    pub fn sector_reads(&self) -> usize {
        self.sector_reads
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl BlockSource for MemoryBlockSource {
    fn read_sectors(
        &mut self,
        buf: &mut [u8],
        sector_count: u32,
        start_sector: u64,
    ) -> io::Result<()> {
        let len = sector_span(buf, sector_count)?;
        let start = usize::try_from(start_sector)
            .ok()
            .and_then(|s| s.checked_mul(SECTOR_SIZE))
            .filter(|&s| s <= self.data.len())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("sector {start_sector} is past the end of the image"),
                )
            })?;
        let src = self.data.get(start..start + len).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{sector_count} sectors at {start_sector} run past the end of the image"),
            )
        })?;
        buf[..len].copy_from_slice(src);
        self.sector_reads += 1;
        Ok(())
    }

    fn set_raw_mode(&mut self, enabled: bool) -> io::Result<()> {
        self.raw_mode = enabled;
        Ok(())
    }
}

/// Timestamp of the most recent raw I/O, shared between a mounted disc and
/// whoever needs to poll it for idleness.
#[derive(Debug, Default)]
pub struct AccessClock {
    last: Mutex<Option<Instant>>,
}

impl AccessClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&self) {
        *self.last.lock() = Some(Instant::now());
    }

    pub fn last(&self) -> Option<Instant> {
        *self.last.lock()
    }

    pub fn reset(&self) {
        *self.last.lock() = None;
    }
}

/// Byte-addressed reads on top of a [`BlockSource`], through one reusable
/// burst-sized scratch buffer.
///
/// A single [`read`](Self::read) never transfers more than what fits in one
/// burst after the leading sector offset, so callers that need more loop,
/// or use [`read_exact_at`](Self::read_exact_at).
pub struct SectorReader<S> {
    source: S,
    scratch: Vec<u8>,
    clock: Arc<AccessClock>,
}

impl<S: BlockSource> SectorReader<S> {
    pub fn new(source: S, mut scratch: Vec<u8>, clock: Arc<AccessClock>) -> Self {
        scratch.resize(BURST_SIZE, 0);
        Self {
            source,
            scratch,
            clock,
        }
    }

    /// Read up to `out.len()` bytes at absolute disc `offset`, returning the
    /// number of bytes copied.
    pub fn read(&mut self, out: &mut [u8], offset: u64) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        let sector = offset / SECTOR_SIZE as u64;
        let sector_offset = (offset % SECTOR_SIZE as u64) as usize;
        let len = out.len().min(BURST_SIZE - sector_offset);
        let sectors = (sector_offset + len).div_ceil(SECTOR_SIZE);

        trace!(offset, len, sectors, "Sector read");
        let result = self.source.read_sectors(
            &mut self.scratch[..sectors * SECTOR_SIZE],
            sectors as u32,
            sector,
        );
        self.clock.touch();
        result?;

        out[..len].copy_from_slice(&self.scratch[sector_offset..sector_offset + len]);
        Ok(len)
    }

    /// Fill all of `out` from absolute disc `offset`.
    pub fn read_exact_at(&mut self, out: &mut [u8], offset: u64) -> io::Result<()> {
        let mut done = 0;
        while done < out.len() {
            done += self.read(&mut out[done..], offset + done as u64)?;
        }
        Ok(())
    }

    pub fn set_raw_mode(&mut self, enabled: bool) -> io::Result<()> {
        self.source.set_raw_mode(enabled)
    }

    pub fn read_disc_id(&mut self) -> io::Result<u64> {
        let id = self.source.read_disc_id();
        self.clock.touch();
        id
    }

    pub fn clock(&self) -> &Arc<AccessClock> {
        &self.clock
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }
}
