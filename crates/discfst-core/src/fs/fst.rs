//! File-system-table parsing.
//!
//! The FST is a flat array of 12-byte entries followed by a table of
//! NUL-terminated names:
//!
//! ```text
//! +0  u8   type (1 = directory, 0 = file)
//! +1  u24  name offset into the name table
//! +4  u32  file: plaintext offset >> 2   | directory: parent index
//! +8  u32  file: size in bytes           | directory: index one past its last descendant
//! ```
//!
//! Entry 0 is the root; its "end index" is the total entry count, and the
//! name table starts right after the last entry. A directory owns every
//! entry between its own index and its end index, so the tree is rebuilt
//! with a stack of open directories instead of recursion.

use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::MAX_NAME_LEN;
use super::cluster::{ClusterCache, ClusterError};
use super::entry::{EntryId, EntryKind, EntryTree};
use super::metadata::{FstInfo, data_capacity};
use crate::crypto::ClusterCipher;
use crate::disc::{BlockSource, Partition, SectorReader, be_u32, shifted};

pub const FST_ENTRY_SIZE: usize = 12;

const FLAG_DIR: u8 = 0x01;

#[derive(Error, Debug)]
pub enum FstError {
    #[error("FST is empty")]
    Empty,

    #[error("FST root entry is not a directory")]
    RootNotDirectory,

    #[error("FST of {len} bytes cannot hold {count} entries")]
    Truncated { len: usize, count: u32 },

    /// A directory's end index does not nest inside its parent.
    #[error("Directory entry {index} ends at {end}, outside ({index}, {limit}]")]
    BadDirectoryEnd { index: u32, end: u32, limit: u32 },

    #[error("Entry {index}: name offset {offset:#x} is outside the name table")]
    NameOutOfTable { index: u32, offset: u32 },

    #[error("Entry {index}: name is not NUL-terminated")]
    UnterminatedName { index: u32 },

    #[error("Entry {index:?}: empty name")]
    EmptyName { index: Option<u32> },

    #[error("Entry {index:?}: name of {len} bytes exceeds the {MAX_NAME_LEN}-byte limit")]
    NameTooLong { index: Option<u32>, len: usize },

    /// `.`, `..` and names containing `/` cannot be reached by path.
    #[error("Entry {index}: unusable name {name:?}")]
    ReservedName { index: u32, name: String },

    #[error("Parent entry is not a directory")]
    NotADirectory,

    /// The table itself would lie past the end of the partition data.
    #[error("FST at {offset:#x}+{size:#x} exceeds the {capacity:#x}-byte data region")]
    OutOfBounds { offset: u64, size: u64, capacity: u64 },

    #[error("Reading FST: {0}")]
    Cluster(#[from] ClusterError),
}

struct RawEntry {
    is_dir: bool,
    name_offset: u32,
    offset: u32,
    length: u32,
}

impl RawEntry {
    fn at(table: &[u8], index: u32) -> Self {
        let at = index as usize * FST_ENTRY_SIZE;
        let word = be_u32(table, at);
        Self {
            is_dir: table[at] & FLAG_DIR != 0,
            name_offset: word & 0x00ff_ffff,
            offset: be_u32(table, at + 4),
            length: be_u32(table, at + 8),
        }
    }
}

fn entry_name(names: &[u8], index: u32, offset: u32) -> Result<String, FstError> {
    let tail = names
        .get(offset as usize..)
        .filter(|tail| !tail.is_empty())
        .ok_or(FstError::NameOutOfTable { index, offset })?;
    let len = tail
        .iter()
        .take(MAX_NAME_LEN)
        .position(|&b| b == 0)
        .ok_or_else(|| {
            if tail.len() >= MAX_NAME_LEN {
                FstError::NameTooLong {
                    index: Some(index),
                    len: tail.iter().position(|&b| b == 0).unwrap_or(tail.len()),
                }
            } else {
                FstError::UnterminatedName { index }
            }
        })?;
    if len == 0 {
        return Err(FstError::EmptyName { index: Some(index) });
    }
    let name = String::from_utf8_lossy(&tail[..len]).into_owned();
    if name == "." || name == ".." || name.contains('/') {
        return Err(FstError::ReservedName { index, name });
    }
    Ok(name)
}

/// Materialize the FST in `bytes` below `parent`, which takes the role of
/// the FST root. Returns the number of FST entries, root included.
#[instrument(level = "debug", skip(tree, bytes), fields(len = bytes.len()))]
pub fn parse_fst(
    tree: &mut EntryTree,
    parent: EntryId,
    partition: u32,
    bytes: &[u8],
) -> Result<u32, FstError> {
    if bytes.len() < FST_ENTRY_SIZE {
        return Err(FstError::Empty);
    }
    let root = RawEntry::at(bytes, 0);
    if !root.is_dir {
        return Err(FstError::RootNotDirectory);
    }
    let count = root.length;
    if count == 0 {
        return Err(FstError::Empty);
    }
    let table_len = (count as usize)
        .checked_mul(FST_ENTRY_SIZE)
        .filter(|&len| len <= bytes.len())
        .ok_or(FstError::Truncated {
            len: bytes.len(),
            count,
        })?;
    let names = &bytes[table_len..];

    tree.set_fst_index(parent, 0);

    // Open directories and their exclusive end indices
    let mut stack: Vec<(EntryId, u32)> = vec![(parent, count)];
    for index in 1..count {
        while stack.len() > 1 && stack.last().is_some_and(|&(_, end)| index >= end) {
            stack.pop();
        }
        let Some(&(dir, limit)) = stack.last() else {
            return Err(FstError::Empty);
        };

        let raw = RawEntry::at(bytes, index);
        let name = entry_name(names, index, raw.name_offset)?;

        if raw.is_dir {
            let end = raw.length;
            if end <= index || end > limit {
                warn!(index, end, limit, "Rejecting misnested FST directory");
                return Err(FstError::BadDirectoryEnd { index, end, limit });
            }
            let child = tree.add_child(
                dir,
                name,
                partition,
                EntryKind::Directory {
                    children: Vec::new(),
                    fst_index: Some(index),
                },
            )?;
            stack.push((child, end));
        } else {
            tree.add_child(
                dir,
                name,
                partition,
                EntryKind::EncryptedFile {
                    plaintext_offset: shifted(raw.offset),
                    size: u64::from(raw.length),
                },
            )?;
        }
    }

    debug!(count, partition, "Parsed FST");
    Ok(count)
}

/// Read the raw FST bytes of a partition through the cluster cache.
pub fn read_fst<S, C>(
    reader: &mut SectorReader<S>,
    cache: &mut ClusterCache<C>,
    partition: &Partition,
    info: &FstInfo,
) -> Result<Vec<u8>, FstError>
where
    S: BlockSource,
    C: ClusterCipher,
{
    let capacity = data_capacity(&partition.info);
    let in_bounds = info
        .fst_offset
        .checked_add(info.fst_size)
        .is_some_and(|end| end <= capacity);
    if !in_bounds {
        return Err(FstError::OutOfBounds {
            offset: info.fst_offset,
            size: info.fst_size,
            capacity,
        });
    }

    let mut bytes = vec![0u8; info.fst_size as usize];
    cache.read_plaintext(
        reader,
        &partition.title_key,
        partition.data_start(),
        info.fst_offset,
        &mut bytes,
    )?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FstNode;

    fn parse(bytes: &[u8]) -> Result<EntryTree, FstError> {
        let mut tree = EntryTree::new();
        let root = tree.root();
        parse_fst(&mut tree, root, 0, bytes)?;
        Ok(tree)
    }

    /// Hand-assembled table: entries, then names.
    fn table(entries: &[(u8, u32, u32, u32)], names: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for &(flags, name_offset, offset, length) in entries {
            out.extend_from_slice(&((u32::from(flags) << 24) | name_offset).to_be_bytes());
            out.extend_from_slice(&offset.to_be_bytes());
            out.extend_from_slice(&length.to_be_bytes());
        }
        out.extend_from_slice(names);
        out
    }

    #[test]
    fn test_nested_directories() {
        // root, a.txt, dir/, dir/b.bin, c
        let bytes = table(
            &[
                (1, 0, 0, 5),
                (0, 0, 0x100, 10),
                (1, 6, 0, 4),
                (0, 10, 0x200, 20),
                (0, 16, 0x300, 30),
            ],
            b"a.txt\0dir\0b.bin\0c\0",
        );
        let tree = parse(&bytes).unwrap();
        let root = tree.root();
        let names: Vec<&str> = tree
            .children(root)
            .iter()
            .map(|&id| tree[id].name.as_str())
            .collect();
        assert_eq!(names, vec!["a.txt", "dir", "c"]);

        let dir = tree.children(root)[1];
        assert_eq!(
            tree[dir].kind,
            EntryKind::Directory {
                children: tree.children(dir).to_vec(),
                fst_index: Some(2)
            }
        );
        let b = tree.children(dir)[0];
        assert_eq!(tree[b].name, "b.bin");
        assert_eq!(
            tree[b].kind,
            EntryKind::EncryptedFile {
                plaintext_offset: 0x800,
                size: 20
            }
        );
    }

    #[test]
    fn test_generated_tree_roundtrip() {
        let fst = FstNode::dir(
            "",
            vec![
                FstNode::dir("sys", vec![FstNode::file("x", vec![1; 0x40])]),
                FstNode::dir("empty", vec![]),
                FstNode::file("y", vec![2; 0x80]),
            ],
        );
        let (bytes, files) = fst.encode_at(0x20000);
        assert_eq!(files.len(), 2);
        let tree = parse(&bytes).unwrap();
        let paths: Vec<String> = tree.walk(tree.root()).map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["sys", "sys/x", "empty", "y"]);
    }

    #[test]
    fn test_directory_end_not_after_self() {
        let bytes = table(&[(1, 0, 0, 2), (1, 0, 0, 1)], b"d\0");
        assert!(matches!(
            parse(&bytes),
            Err(FstError::BadDirectoryEnd { index: 1, end: 1, .. })
        ));
    }

    #[test]
    fn test_directory_end_past_parent() {
        // dir claims to own entries up to 4 but the root only has 3
        let bytes = table(&[(1, 0, 0, 3), (1, 0, 0, 4), (0, 2, 0, 1)], b"d\0f\0");
        assert!(matches!(
            parse(&bytes),
            Err(FstError::BadDirectoryEnd { index: 1, end: 4, limit: 3 })
        ));
    }

    #[test]
    fn test_nested_end_past_enclosing_dir() {
        let bytes = table(
            &[(1, 0, 0, 4), (1, 0, 0, 3), (1, 2, 0, 4), (0, 4, 0, 1)],
            b"a\0b\0c\0",
        );
        assert!(matches!(
            parse(&bytes),
            Err(FstError::BadDirectoryEnd { index: 2, end: 4, limit: 3 })
        ));
    }

    #[test]
    fn test_truncated_table() {
        let mut bytes = table(&[(1, 0, 0, 3), (0, 0, 0, 1)], b"");
        bytes.truncate(20);
        assert!(matches!(parse(&bytes), Err(FstError::Truncated { count: 3, .. })));
    }

    #[test]
    fn test_root_must_be_directory() {
        let bytes = table(&[(0, 0, 0, 1)], b"");
        assert!(matches!(parse(&bytes), Err(FstError::RootNotDirectory)));
    }

    #[test]
    fn test_bad_names() {
        let empty = table(&[(1, 0, 0, 2), (0, 0, 0, 1)], b"\0");
        assert!(matches!(parse(&empty), Err(FstError::EmptyName { .. })));

        let outside = table(&[(1, 0, 0, 2), (0, 0x50, 0, 1)], b"a\0");
        assert!(matches!(
            parse(&outside),
            Err(FstError::NameOutOfTable { index: 1, .. })
        ));

        let unterminated = table(&[(1, 0, 0, 2), (0, 0, 0, 1)], b"abc");
        assert!(matches!(
            parse(&unterminated),
            Err(FstError::UnterminatedName { index: 1 })
        ));

        let mut long = vec![b'n'; MAX_NAME_LEN];
        long.push(0);
        let too_long = table(&[(1, 0, 0, 2), (0, 0, 0, 1)], &long);
        assert!(matches!(
            parse(&too_long),
            Err(FstError::NameTooLong { len: 128, .. })
        ));

        let mut longest = vec![b'n'; MAX_NAME_LEN - 1];
        longest.push(0);
        let ok = table(&[(1, 0, 0, 2), (0, 0, 0, 1)], &longest);
        assert!(parse(&ok).is_ok());
    }

    #[test]
    fn test_directory_type_byte_is_one() {
        // root, sys/, sys/main.dol, opening.bnr
        let bytes = table(
            &[
                (0x01, 0, 0, 4),
                (0x01, 0, 0, 3),
                (0x00, 4, 0x1000, 0x40),
                (0x00, 13, 0x2000, 0x80),
            ],
            b"sys\0main.dol\0opening.bnr\0",
        );
        assert_eq!(bytes[0], 0x01);
        let tree = parse(&bytes).unwrap();
        let paths: Vec<String> = tree.walk(tree.root()).map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["sys", "sys/main.dol", "opening.bnr"]);

        let sys = tree.children(tree.root())[0];
        assert!(tree[sys].is_dir());
        let bnr = tree.children(tree.root())[1];
        assert!(!tree[bnr].is_dir());
    }

    #[test]
    fn test_unreachable_names_rejected() {
        for name in [&b"..\0"[..], b".\0", b"a/b\0", b"/abs\0"] {
            let bytes = table(&[(1, 0, 0, 2), (1, 0, 0, 2)], name);
            assert!(
                matches!(parse(&bytes), Err(FstError::ReservedName { index: 1, .. })),
                "{name:?}"
            );
        }

        let dots = table(&[(1, 0, 0, 2), (0, 0, 0, 1)], b"...\0");
        assert!(parse(&dots).is_ok());
    }

    #[test]
    fn test_root_only() {
        let tree = parse(&table(&[(1, 0, 0, 1)], b"")).unwrap();
        assert!(tree.children(tree.root()).is_empty());
    }
}
