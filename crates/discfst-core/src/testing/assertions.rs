//! Assertions with readable failure messages for large buffers.

use sha2::{Digest, Sha256};

use crate::mount::FsError;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Assert byte equality, reporting the first differing offset instead of
/// dumping both buffers.
pub fn assert_bytes_equal(actual: &[u8], expected: &[u8], context: &str) {
    assert!(
        actual.len() == expected.len(),
        "{context}: size mismatch - expected {} bytes, got {} bytes",
        expected.len(),
        actual.len()
    );
    if let Some(i) = actual.iter().zip(expected).position(|(a, e)| a != e) {
        panic!(
            "{context}: content mismatch at byte {i:#x} - expected 0x{:02x}, got 0x{:02x}",
            expected[i], actual[i]
        );
    }
}

pub fn assert_hash_equal(actual: &[u8], expected_hash: &[u8; 32], context: &str) {
    let actual_hash = sha256(actual);
    assert!(
        &actual_hash == expected_hash,
        "{context}: hash mismatch\n  expected: {}\n  got:      {}\n  (data size: {} bytes)",
        hex::encode(expected_hash),
        hex::encode(actual_hash),
        actual.len()
    );
}

/// Assert that a filesystem call failed with `errno`.
pub fn assert_errno<T: std::fmt::Debug>(result: Result<T, FsError>, errno: i32, context: &str) {
    match result {
        Ok(value) => panic!("{context}: expected errno {errno}, got success with {value:?}"),
        Err(err) => assert_eq!(
            err.errno(),
            errno,
            "{context}: expected errno {errno}, got {} ({err})",
            err.errno()
        ),
    }
}
