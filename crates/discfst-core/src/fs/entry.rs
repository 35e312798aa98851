//! The in-memory directory tree, stored as an arena.

use std::ops::Index;

use super::MAX_NAME_LEN;
use super::fst::FstError;
use crate::disc::SECTOR_SIZE;

/// Device number reported for every entry (`"FW"`).
pub const DEVICE_ID: u32 = 0x4657;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
/// `r--r--r--`
pub const READ_ONLY_PERMS: u32 = 0o444;

/// Index of an entry in its [`EntryTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u32);

impl EntryId {
    pub const ROOT: EntryId = EntryId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Directory {
        children: Vec<EntryId>,
        /// Index of this directory in its partition's FST, if it came from one.
        fst_index: Option<u32>,
    },
    /// Unencrypted bytes read straight from the disc.
    RawFile { disc_offset: u64, size: u64 },
    /// Bytes of partition plaintext.
    EncryptedFile { plaintext_offset: u64, size: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub partition: u32,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory { .. })
    }

    /// File size in bytes; zero for directories.
    pub fn size(&self) -> u64 {
        match self.kind {
            EntryKind::Directory { .. } => 0,
            EntryKind::RawFile { size, .. } | EntryKind::EncryptedFile { size, .. } => size,
        }
    }

    pub fn children(&self) -> &[EntryId] {
        match &self.kind {
            EntryKind::Directory { children, .. } => children,
            _ => &[],
        }
    }

    pub fn stat(&self) -> Stat {
        let size = self.size();
        let file_type = if self.is_dir() { S_IFDIR } else { S_IFREG };
        Stat {
            dev: DEVICE_ID,
            ino: 0,
            mode: file_type | READ_ONLY_PERMS,
            nlink: 1,
            uid: 1,
            gid: 2,
            rdev: DEVICE_ID,
            size,
            atime: 0,
            mtime: 0,
            ctime: 0,
            blksize: SECTOR_SIZE as u32,
            blocks: size.div_ceil(SECTOR_SIZE as u64),
        }
    }
}

/// POSIX-shaped attributes of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    pub dev: u32,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub blksize: u32,
    pub blocks: u64,
}

impl Stat {
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }
}

/// Arena of entries. Index 0 is always the root directory.
///
/// Every entry except the root is listed in exactly one parent's children,
/// in insertion order. Nothing is ever removed; the whole tree is dropped at
/// once on unmount.
#[derive(Debug, Clone)]
pub struct EntryTree {
    entries: Vec<DirEntry>,
}

impl Default for EntryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryTree {
    pub fn new() -> Self {
        Self {
            entries: vec![DirEntry {
                name: String::new(),
                partition: 0,
                kind: EntryKind::Directory {
                    children: Vec::new(),
                    fst_index: None,
                },
            }],
        }
    }

    pub fn root(&self) -> EntryId {
        EntryId::ROOT
    }

    pub fn get(&self, id: EntryId) -> Option<&DirEntry> {
        self.entries.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Never true: the root always exists.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a child to `parent` and return its id.
    pub fn add_child(
        &mut self,
        parent: EntryId,
        name: impl Into<String>,
        partition: u32,
        kind: EntryKind,
    ) -> Result<EntryId, FstError> {
        let name = name.into();
        if name.is_empty() {
            return Err(FstError::EmptyName { index: None });
        }
        if name.len() >= MAX_NAME_LEN {
            return Err(FstError::NameTooLong {
                index: None,
                len: name.len(),
            });
        }

        let id = EntryId(self.entries.len() as u32);
        match self.entries.get_mut(parent.index()).map(|p| &mut p.kind) {
            Some(EntryKind::Directory { children, .. }) => children.push(id),
            _ => return Err(FstError::NotADirectory),
        }
        self.entries.push(DirEntry {
            name,
            partition,
            kind,
        });
        Ok(id)
    }

    /// Record that `dir` is backed by FST entry `fst_index`.
    pub fn set_fst_index(&mut self, dir: EntryId, index: u32) {
        if let Some(DirEntry {
            kind: EntryKind::Directory { fst_index, .. },
            ..
        }) = self.entries.get_mut(dir.index())
        {
            *fst_index = Some(index);
        }
    }

    pub fn children(&self, dir: EntryId) -> &[EntryId] {
        match self.get(dir) {
            Some(entry) => entry.children(),
            None => &[],
        }
    }

    /// Depth-first walk below `from`, yielding `(path, id)` with paths
    /// relative to `from` and `/`-separated.
    pub fn walk(&self, from: EntryId) -> Walk<'_> {
        let mut stack = Vec::new();
        for &child in self.children(from).iter().rev() {
            stack.push((String::new(), child));
        }
        Walk { tree: self, stack }
    }
}

impl Index<EntryId> for EntryTree {
    type Output = DirEntry;

    fn index(&self, id: EntryId) -> &DirEntry {
        &self.entries[id.index()]
    }
}

/// Iterator returned by [`EntryTree::walk`].
pub struct Walk<'a> {
    tree: &'a EntryTree,
    stack: Vec<(String, EntryId)>,
}

impl Iterator for Walk<'_> {
    type Item = (String, EntryId);

    fn next(&mut self) -> Option<Self::Item> {
        let (prefix, id) = self.stack.pop()?;
        let entry = &self.tree[id];
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            format!("{prefix}/{}", entry.name)
        };
        for &child in entry.children().iter().rev() {
            self.stack.push((path.clone(), child));
        }
        Some((path, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir() -> EntryKind {
        EntryKind::Directory {
            children: Vec::new(),
            fst_index: None,
        }
    }

    fn file(size: u64) -> EntryKind {
        EntryKind::EncryptedFile {
            plaintext_offset: 0,
            size,
        }
    }

    #[test]
    fn test_root_exists() {
        let tree = EntryTree::new();
        assert!(tree[tree.root()].is_dir());
        assert_eq!(tree.len(), 1);
        assert!(tree.children(tree.root()).is_empty());
    }

    #[test]
    fn test_children_keep_insertion_order() {
        let mut tree = EntryTree::new();
        let root = tree.root();
        let b = tree.add_child(root, "b", 0, file(1)).unwrap();
        let a = tree.add_child(root, "a", 0, file(1)).unwrap();
        assert_eq!(tree.children(root), &[b, a]);
    }

    #[test]
    fn test_add_child_to_file_fails() {
        let mut tree = EntryTree::new();
        let f = tree.add_child(tree.root(), "f", 0, file(1)).unwrap();
        assert!(matches!(
            tree.add_child(f, "x", 0, file(1)),
            Err(FstError::NotADirectory)
        ));
    }

    #[test]
    fn test_name_limits() {
        let mut tree = EntryTree::new();
        let root = tree.root();
        assert!(tree.add_child(root, "", 0, file(1)).is_err());
        assert!(tree.add_child(root, "x".repeat(MAX_NAME_LEN), 0, file(1)).is_err());
        assert!(tree.add_child(root, "x".repeat(MAX_NAME_LEN - 1), 0, file(1)).is_ok());
    }

    #[test]
    fn test_stat_fields() {
        let mut tree = EntryTree::new();
        let f = tree.add_child(tree.root(), "f", 0, file(0x801)).unwrap();
        let st = tree[f].stat();
        assert_eq!(st.dev, 0x4657);
        assert_eq!(st.mode, S_IFREG | 0o444);
        assert_eq!((st.nlink, st.uid, st.gid), (1, 1, 2));
        assert_eq!(st.blksize, 0x800);
        assert_eq!(st.blocks, 2);
        assert!(!st.is_dir());

        let root = tree[tree.root()].stat();
        assert!(root.is_dir());
        assert_eq!(root.size, 0);
        assert_eq!(root.blocks, 0);
    }

    #[test]
    fn test_walk_is_depth_first() {
        let mut tree = EntryTree::new();
        let root = tree.root();
        let d = tree.add_child(root, "d", 0, dir()).unwrap();
        tree.add_child(d, "inner", 0, file(1)).unwrap();
        tree.add_child(root, "z", 0, file(1)).unwrap();

        let paths: Vec<String> = tree.walk(root).map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["d", "d/inner", "z"]);
    }
}
