//! Building file-system-tables from a tree description.

use crate::fs::FST_ENTRY_SIZE;

/// A node of a directory tree to be encoded as an FST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FstNode {
    Dir { name: String, children: Vec<FstNode> },
    File { name: String, contents: Vec<u8> },
}

/// A file's contents and where [`FstNode::encode_at`] placed them in
/// partition plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedFile {
    /// Path relative to the FST root, `/`-separated.
    pub path: String,
    pub plaintext_offset: u64,
    pub contents: Vec<u8>,
}

struct RawEntry {
    is_dir: bool,
    name: String,
    offset: u32,
    length: u32,
}

impl FstNode {
    pub fn dir(name: impl Into<String>, children: Vec<FstNode>) -> Self {
        Self::Dir {
            name: name.into(),
            children,
        }
    }

    pub fn file(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self::File {
            name: name.into(),
            contents: contents.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Dir { name, .. } | Self::File { name, .. } => name,
        }
    }

    /// Encode this node as the FST root.
    ///
    /// File contents are laid out from plaintext `data_start` in depth-first
    /// order, each starting on a 4-byte boundary. The table is zero-padded
    /// to a multiple of four bytes, as its on-disc size field requires.
    pub fn encode_at(&self, data_start: u64) -> (Vec<u8>, Vec<PlacedFile>) {
        let mut entries = Vec::new();
        let mut files = Vec::new();
        let mut cursor = data_start.next_multiple_of(4);
        flatten(self, 0, "", &mut entries, &mut files, &mut cursor);

        let mut names = Vec::new();
        let mut bytes = Vec::with_capacity(entries.len() * FST_ENTRY_SIZE);
        for entry in &entries {
            let name_offset = names.len() as u32;
            names.extend_from_slice(entry.name.as_bytes());
            names.push(0);

            let flags: u32 = if entry.is_dir { 0x01 } else { 0x00 };
            bytes.extend_from_slice(&((flags << 24) | name_offset).to_be_bytes());
            bytes.extend_from_slice(&entry.offset.to_be_bytes());
            bytes.extend_from_slice(&entry.length.to_be_bytes());
        }
        bytes.extend_from_slice(&names);
        bytes.resize(bytes.len().next_multiple_of(4), 0);
        (bytes, files)
    }
}

fn flatten(
    node: &FstNode,
    parent: u32,
    prefix: &str,
    entries: &mut Vec<RawEntry>,
    files: &mut Vec<PlacedFile>,
    cursor: &mut u64,
) {
    let index = entries.len();
    let path = if prefix.is_empty() {
        node.name().to_string()
    } else {
        format!("{prefix}/{}", node.name())
    };

    match node {
        FstNode::Dir { name, children } => {
            entries.push(RawEntry {
                is_dir: true,
                name: name.clone(),
                offset: parent,
                length: 0,
            });
            for child in children {
                flatten(child, index as u32, &path, entries, files, cursor);
            }
            entries[index].length = entries.len() as u32;
        }
        FstNode::File { name, contents } => {
            let offset = *cursor;
            *cursor = (offset + contents.len() as u64).next_multiple_of(4);
            entries.push(RawEntry {
                is_dir: false,
                name: name.clone(),
                offset: (offset >> 2) as u32,
                length: contents.len() as u32,
            });
            files.push(PlacedFile {
                path,
                plaintext_offset: offset,
                contents: contents.clone(),
            });
        }
    }
}
