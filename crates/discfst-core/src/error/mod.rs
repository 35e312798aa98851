//! Error types for the discfst-core crate
//!
//! Each layer defines its own error next to the code that raises it; this
//! module gathers them in one place:
//!
//! - [`CryptoError`]: cipher misuse (no key, partial blocks)
//! - [`DiscError`]: disc header and partition structures, with [`DiscContext`]
//! - [`ClusterError`]: reading or decrypting one cluster
//! - [`FstError`] / [`MetadataError`]: building a partition's tree
//! - [`MountError`]: anything that aborts a mount
//! - [`FsError`]: per-call failures on a mounted disc, each with an errno

pub use crate::crypto::CryptoError;
pub use crate::disc::{DiscContext, DiscError};
pub use crate::fs::{ClusterError, FstError, MetadataError};
pub use crate::mount::{FsError, MountError};
