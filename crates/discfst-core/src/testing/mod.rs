//! Test support: synthetic encrypted disc images and data generators.
//!
//! ```ignore
//! use discfst_core::testing::{DiscImageBuilder, assert_bytes_equal};
//!
//! let image = DiscImageBuilder::new().with_file("A.TXT", b"hi".to_vec()).build()?;
//! let mut disc = MountedDisc::mount(image.source(), Aes128Cbc::new(), &MountOptions::default())?;
//! assert_bytes_equal(&disc.read_to_end("fst:/0/A.TXT")?, b"hi", "A.TXT");
//! ```

pub mod assertions;
pub mod fst;
pub mod generators;
pub mod image;

pub use assertions::{assert_bytes_equal, assert_errno, assert_hash_equal, sha256};
pub use fst::{FstNode, PlacedFile};
pub use generators::{
    CLUSTER_PAYLOAD, all_byte_values, cluster_plus_one, long_filename, multi_cluster_content,
    one_cluster_content, patterned, random_bytes,
};
pub use image::{DiscImage, DiscImageBuilder};
