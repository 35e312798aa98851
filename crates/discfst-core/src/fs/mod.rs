//! The partition filesystem: cluster decryption, the entry tree, FST
//! parsing and the synthetic metadata directory.

pub mod cluster;
pub mod entry;
pub mod fst;
pub mod metadata;

pub use cluster::{
    CLUSTER_DATA_SIZE, CLUSTER_HEADER_SIZE, CLUSTER_IV_OFFSET, CLUSTER_SIZE, CacheStats, ClusterCache,
    ClusterError, cipher_to_plaintext, plaintext_to_cipher,
};
pub use entry::{DirEntry, EntryId, EntryKind, EntryTree, Stat, Walk};
pub use fst::{FST_ENTRY_SIZE, FstError, parse_fst, read_fst};
pub use metadata::{FstInfo, MetadataError, add_metadata_entries, data_capacity, read_fst_info};

/// Longest allowed entry name, exclusive.
pub const MAX_NAME_LEN: usize = 128;
