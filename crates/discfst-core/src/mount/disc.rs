//! A mounted disc: the filesystem behind the `fst:` device.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use super::device::{DirFd, Fd, FsDevice, FsError, ReadOutcome, SeekOrigin};
use super::handles::HandleTable;
use super::lifecycle::{SCRATCH_ALIGN, ScratchRegion};
use super::options::MountOptions;
use super::{MountError, path};
use crate::crypto::ClusterCipher;
use crate::disc::partition::{read_partition_table, resolve_partition};
use crate::disc::{
    AccessClock, BURST_SIZE, BlockSource, DiscContext, DiscError, DiscHeader, Partition,
    SECTOR_SIZE, SectorReader,
};
use crate::fs::{
    CacheStats, ClusterCache, EntryId, EntryKind, EntryTree, FstInfo, Stat, add_metadata_entries,
    parse_fst, read_fst, read_fst_info,
};

/// A partition as mounted: its structures and where it hangs in the tree.
#[derive(Debug, Clone)]
pub struct MountedPartition {
    pub partition: Partition,
    pub fst_info: FstInfo,
    /// The `N` directory holding the FST contents.
    pub root: EntryId,
    /// The `N_metadata` directory, when exposed.
    pub metadata: Option<EntryId>,
    /// FST entries parsed, root included; zero when the partition has no FST.
    pub fst_entries: u32,
}

#[derive(Debug)]
struct FileHandle {
    entry: EntryId,
    offset: u64,
}

#[derive(Debug)]
struct DirHandle {
    dir: EntryId,
    next: usize,
}

enum Location {
    Raw(u64),
    Plaintext { partition: usize, offset: u64 },
}

fn directory() -> EntryKind {
    EntryKind::Directory {
        children: Vec::new(),
        fst_index: None,
    }
}

/// A mounted disc image.
///
/// All state is owned and every operation takes `&mut self` (or `&self` for
/// pure lookups), so there is exactly one caller at a time. All handles share
/// one cluster cache.
pub struct MountedDisc<S, C> {
    name: String,
    reader: SectorReader<S>,
    cache: ClusterCache<C>,
    header: DiscHeader,
    partitions: Vec<MountedPartition>,
    tree: EntryTree,
    cwd: EntryId,
    files: HandleTable<FileHandle>,
    dirs: HandleTable<DirHandle>,
    released: bool,
}

impl<S: BlockSource, C: ClusterCipher> MountedDisc<S, C> {
    /// Mount `source`, decrypting with `cipher`.
    ///
    /// On failure raw mode is switched back off before the source is
    /// dropped, and nothing is left mounted.
    pub fn mount(source: S, cipher: C, options: &MountOptions) -> Result<Self, MountError> {
        options.validate()?;
        let scratch =
            ScratchRegion::reserve_top(options.scratch_budget, BURST_SIZE, SCRATCH_ALIGN)?;
        Self::mount_with(
            source,
            cipher,
            options,
            scratch.allocate(),
            Arc::new(AccessClock::new()),
        )
    }

    #[instrument(level = "info", skip_all, fields(device = %options.device_name))]
    pub(crate) fn mount_with(
        source: S,
        cipher: C,
        options: &MountOptions,
        scratch: Vec<u8>,
        clock: Arc<AccessClock>,
    ) -> Result<Self, MountError> {
        let mut reader = SectorReader::new(source, scratch, clock);
        reader.set_raw_mode(true).map_err(MountError::RawMode)?;

        let mut cache = ClusterCache::new(cipher);
        let mut tree = EntryTree::new();
        match load(&mut reader, &mut cache, &mut tree, options) {
            Ok((header, partitions)) => {
                reader.clock().touch();
                info!(
                    game = %header.game_code,
                    partitions = partitions.len(),
                    entries = tree.len(),
                    "Mounted disc"
                );
                let cwd = tree.root();
                Ok(Self {
                    name: options.device_name.clone(),
                    reader,
                    cache,
                    header,
                    partitions,
                    tree,
                    cwd,
                    files: HandleTable::new_auto_id(),
                    dirs: HandleTable::new_auto_id(),
                    released: false,
                })
            }
            Err(e) => {
                warn!(error = %e, "Mount failed");
                if let Err(raw) = reader.set_raw_mode(false) {
                    warn!(error = %raw, "Failed to leave raw read mode");
                }
                reader.clock().reset();
                Err(e)
            }
        }
    }

    /// Release everything and return the block source.
    pub fn unmount(mut self) -> S {
        self.release();
        self.reader.into_source()
    }

    /// The 8-byte disc identifier.
    pub fn disc_id(&self) -> u64 {
        self.header.disc_id
    }

    pub fn header(&self) -> &DiscHeader {
        &self.header
    }

    pub fn partitions(&self) -> &[MountedPartition] {
        &self.partitions
    }

    pub fn tree(&self) -> &EntryTree {
        &self.tree
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// When the block source was last touched; `None` once released.
    pub fn last_access(&self) -> Option<Instant> {
        self.reader.clock().last()
    }

    pub fn source(&self) -> &S {
        self.reader.source()
    }

    pub fn open_files(&self) -> usize {
        self.files.len()
    }

    /// Absolute path of the current directory.
    pub fn cwd(&self) -> String {
        path::path_of(&self.tree, self.cwd).unwrap_or_else(|| "/".to_string())
    }

    /// Resolve `path` against the tree and the current directory.
    pub fn lookup(&self, path: &str) -> Result<EntryId, FsError> {
        path::resolve(&self.tree, self.cwd, &self.name, path)
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    /// Read a whole file.
    pub fn read_to_end(&mut self, path: &str) -> Result<Vec<u8>, FsError> {
        let fd = self.open(path)?;
        let size = self.fstat(fd)?.size;
        let mut buf = vec![0u8; size as usize];
        let result = self.read(fd, &mut buf);
        self.close(fd)?;
        let outcome = result?;
        buf.truncate(outcome.len);
        Ok(buf)
    }

    /// Children of a directory with their attributes, in stored order.
    pub fn read_dir(&self, path: &str) -> Result<Vec<(String, Stat)>, FsError> {
        let id = self.lookup(path)?;
        if !self.tree[id].is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        Ok(self
            .tree
            .children(id)
            .iter()
            .map(|&child| (self.tree[child].name.clone(), self.tree[child].stat()))
            .collect())
    }

    /// Every entry below `path`, depth first, with paths relative to it.
    pub fn walk(
        &self,
        path: &str,
    ) -> Result<impl Iterator<Item = (String, Stat)> + '_, FsError> {
        let id = self.lookup(path)?;
        if !self.tree[id].is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        Ok(self
            .tree
            .walk(id)
            .map(|(path, entry)| (path, self.tree[entry].stat())))
    }

    fn location(&self, id: EntryId) -> Result<Location, FsError> {
        let entry = &self.tree[id];
        match entry.kind {
            EntryKind::RawFile { disc_offset, .. } => Ok(Location::Raw(disc_offset)),
            EntryKind::EncryptedFile {
                plaintext_offset, ..
            } => Ok(Location::Plaintext {
                partition: entry.partition as usize,
                offset: plaintext_offset,
            }),
            EntryKind::Directory { .. } => Err(FsError::IsADirectory(entry.name.clone())),
        }
    }

    /// Fill `buf` from byte `offset` of entry `id`.
    fn read_entry(&mut self, id: EntryId, offset: u64, buf: &mut [u8]) -> Result<(), FsError> {
        match self.location(id)? {
            Location::Raw(disc_offset) => {
                self.reader.read_exact_at(buf, disc_offset + offset)?;
            }
            Location::Plaintext {
                partition,
                offset: base,
            } => {
                let mounted = self.partitions.get(partition).ok_or_else(|| {
                    io::Error::other(format!("entry refers to unknown partition {partition}"))
                })?;
                self.cache
                    .read_plaintext(
                        &mut self.reader,
                        &mounted.partition.title_key,
                        mounted.partition.data_start(),
                        base + offset,
                        buf,
                    )
                    .map_err(io::Error::other)?;
            }
        }
        Ok(())
    }
}

/// Read the header, the partition table and every partition into `tree`.
fn load<S: BlockSource, C: ClusterCipher>(
    reader: &mut SectorReader<S>,
    cache: &mut ClusterCache<C>,
    tree: &mut EntryTree,
    options: &MountOptions,
) -> Result<(DiscHeader, Vec<MountedPartition>), MountError> {
    let mut sector = vec![0u8; SECTOR_SIZE];
    reader.read_exact_at(&mut sector, 0).map_err(|e| {
        DiscError::io_with_context(
            e,
            DiscContext::new().with_what("disc header").with_offset(0),
        )
    })?;
    let header = DiscHeader::parse(&sector)?;
    debug!(game = %header.game_code, title = %header.title, "Read disc header");

    let entries = read_partition_table(reader)?;
    let mut partitions = Vec::with_capacity(entries.len());
    for (i, entry) in entries.into_iter().enumerate() {
        let index = i as u32;
        let fst_error = |source| MountError::Fst {
            partition: index,
            source,
        };
        let metadata_error = |source| MountError::Metadata {
            partition: index,
            source,
        };

        let root = tree.root();
        let part_dir = tree
            .add_child(root, index.to_string(), index, directory())
            .map_err(fst_error)?;
        let meta_dir = if options.expose_metadata {
            Some(
                tree.add_child(root, format!("{index}_metadata"), index, directory())
                    .map_err(fst_error)?,
            )
        } else {
            None
        };

        let partition = resolve_partition(reader, cache.cipher_mut(), entry, index)?;
        let fst_info = read_fst_info(reader, cache, &partition).map_err(metadata_error)?;
        if let Some(meta_dir) = meta_dir {
            add_metadata_entries(tree, meta_dir, reader, cache, &partition, &fst_info)
                .map_err(metadata_error)?;
        }

        let fst_entries = if fst_info.has_fst() {
            let bytes = read_fst(reader, cache, &partition, &fst_info).map_err(fst_error)?;
            parse_fst(tree, part_dir, index, &bytes).map_err(fst_error)?
        } else {
            0
        };

        partitions.push(MountedPartition {
            partition,
            fst_info,
            root: part_dir,
            metadata: meta_dir,
            fst_entries,
        });
    }
    Ok((header, partitions))
}

impl<S: BlockSource, C: ClusterCipher> FsDevice for MountedDisc<S, C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self, path: &str) -> Result<Fd, FsError> {
        let entry = self.lookup(path)?;
        if self.tree[entry].is_dir() {
            return Err(FsError::IsADirectory(path.to_string()));
        }
        let id = self.files.insert_auto(FileHandle { entry, offset: 0 });
        debug!(path, fd = id, "Opened file");
        Ok(Fd(id))
    }

    fn close(&mut self, fd: Fd) -> Result<(), FsError> {
        self.files
            .remove(fd.0)
            .map(|_| ())
            .ok_or(FsError::BadDescriptor)
    }

    fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<ReadOutcome, FsError> {
        let handle = self.files.get(fd.0).ok_or(FsError::BadDescriptor)?;
        let (entry, offset) = (handle.entry, handle.offset);
        let size = self.tree[entry].size();

        let remaining = size.saturating_sub(offset);
        let len = (buf.len() as u64).min(remaining) as usize;
        let eof = buf.len() as u64 >= remaining;
        if len == 0 {
            return Ok(ReadOutcome { len: 0, eof: true });
        }

        self.read_entry(entry, offset, &mut buf[..len])?;
        if let Some(handle) = self.files.get_mut(fd.0) {
            handle.offset = offset + len as u64;
        }
        Ok(ReadOutcome { len, eof })
    }

    fn seek(&mut self, fd: Fd, offset: i64, origin: SeekOrigin) -> Result<u64, FsError> {
        let handle = self.files.get(fd.0).ok_or(FsError::BadDescriptor)?;
        let size = self.tree[handle.entry].size();
        let size_i = i64::try_from(size).map_err(|_| FsError::Overflow)?;
        let current = i64::try_from(handle.offset).map_err(|_| FsError::Overflow)?;

        let base = match origin {
            SeekOrigin::Start => 0,
            SeekOrigin::Current => current,
            SeekOrigin::End => size_i,
        };
        let position = match base.checked_add(offset) {
            Some(position) => position,
            None if offset > 0 => return Err(FsError::Overflow),
            None => return Err(FsError::Invalid),
        };
        if position < 0 || position > size_i {
            return Err(FsError::Invalid);
        }

        let position = position as u64;
        if let Some(handle) = self.files.get_mut(fd.0) {
            handle.offset = position;
        }
        Ok(position)
    }

    fn fstat(&self, fd: Fd) -> Result<Stat, FsError> {
        let handle = self.files.get(fd.0).ok_or(FsError::BadDescriptor)?;
        Ok(self.tree[handle.entry].stat())
    }

    fn stat(&self, path: &str) -> Result<Stat, FsError> {
        let entry = self.lookup(path)?;
        Ok(self.tree[entry].stat())
    }

    fn chdir(&mut self, path: &str) -> Result<(), FsError> {
        let entry = self.lookup(path)?;
        if !self.tree[entry].is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        self.cwd = entry;
        Ok(())
    }

    fn diropen(&mut self, path: &str) -> Result<DirFd, FsError> {
        let dir = self.lookup(path)?;
        if !self.tree[dir].is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        Ok(DirFd(self.dirs.insert_auto(DirHandle { dir, next: 0 })))
    }

    fn dirreset(&mut self, dir: DirFd) -> Result<(), FsError> {
        let handle = self.dirs.get_mut(dir.0).ok_or(FsError::BadDescriptor)?;
        handle.next = 0;
        Ok(())
    }

    fn dirnext(&mut self, dir: DirFd) -> Result<(String, Stat), FsError> {
        let handle = self.dirs.get_mut(dir.0).ok_or(FsError::BadDescriptor)?;
        let Some(&child) = self.tree.children(handle.dir).get(handle.next) else {
            return Err(FsError::NotFound(format!("end of {dir}")));
        };
        handle.next += 1;
        let entry = &self.tree[child];
        Ok((entry.name.clone(), entry.stat()))
    }

    fn dirclose(&mut self, dir: DirFd) -> Result<(), FsError> {
        self.dirs
            .remove(dir.0)
            .map(|_| ())
            .ok_or(FsError::BadDescriptor)
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(e) = self.reader.set_raw_mode(false) {
            warn!(error = %e, "Failed to leave raw read mode");
        }
        self.tree = EntryTree::new();
        self.cwd = self.tree.root();
        self.partitions.clear();
        self.cache.invalidate();
        self.files.clear();
        self.dirs.clear();
        self.reader.clock().reset();
        info!(device = %self.name, "Released disc");
    }
}
