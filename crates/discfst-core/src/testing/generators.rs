//! Test data sized around the disc's cluster geometry.
//!
//! Encrypted file reads are split at cluster payload boundaries (0x7c00
//! plaintext bytes), so the interesting sizes sit on either side of them.

use rand::Rng;

use crate::fs::CLUSTER_DATA_SIZE;

/// Plaintext bytes per cluster.
pub const CLUSTER_PAYLOAD: usize = CLUSTER_DATA_SIZE as usize;

pub fn random_bytes(size: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..size).map(|_| rng.random()).collect()
}

/// Deterministic bytes that differ at every offset within 251 bytes, so a
/// misplaced copy shows up as a mismatch.
pub fn patterned(size: usize, seed: u8) -> Vec<u8> {
    (0..size)
        .map(|i| ((i % 251) as u8).wrapping_add(seed))
        .collect()
}

/// Exactly one cluster payload.
pub fn one_cluster_content() -> Vec<u8> {
    random_bytes(CLUSTER_PAYLOAD)
}

/// One byte past a cluster payload, forcing a second cluster.
pub fn cluster_plus_one() -> Vec<u8> {
    random_bytes(CLUSTER_PAYLOAD + 1)
}

/// Spans `clusters` full payloads plus a partial one.
pub fn multi_cluster_content(clusters: usize) -> Vec<u8> {
    random_bytes(clusters * CLUSTER_PAYLOAD + CLUSTER_PAYLOAD / 3)
}

/// Every byte value once.
pub fn all_byte_values() -> Vec<u8> {
    (0u8..=255).collect()
}

/// A name of `len` ASCII characters.
pub fn long_filename(len: usize) -> String {
    "n".repeat(len)
}
