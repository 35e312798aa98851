//! Cryptographic primitives for Wii disc partitions.
//!
//! Everything on a Wii disc partition is AES-128-CBC:
//!
//! ```text
//! common key (fixed, one of two)
//!   └── AES-CBC decrypt ticket.encrypted_title_key, IV = title id || 0 * 8
//!         └── title key → AES-CBC decrypt each cluster payload,
//!                         IV = cluster header bytes 0x3D0..0x3E0
//! ```
//!
//! The cipher itself sits behind [`ClusterCipher`] so the filesystem layer can
//! be driven by a counting or failing stand-in during tests.

pub mod aes_cbc;
pub mod keys;

use thiserror::Error;

pub use aes_cbc::{Aes128Cbc, encrypt_cbc};
pub use keys::{AES_BLOCK_SIZE, CommonKey, TitleKey};

/// Errors that can occur during cryptographic operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// `decrypt` was called before any key was installed.
    #[error("No key installed - call set_key before decrypting")]
    NoKey,

    /// CBC operates on whole blocks only.
    #[error("Invalid CBC input length {len}: must be a non-zero multiple of {AES_BLOCK_SIZE}")]
    InvalidLength { len: usize },

    /// Input and output buffers differ in size.
    #[error("Buffer size mismatch: ciphertext {ciphertext} bytes, plaintext {plaintext} bytes")]
    BufferMismatch { ciphertext: usize, plaintext: usize },
}

/// The block-cipher primitive used by the cluster decrypt protocol.
///
/// Mirrors the classic `set_key` / `decrypt(iv, in, out)` shape: a key is
/// installed once and then reused for any number of CBC decryptions, each with
/// its own IV.
pub trait ClusterCipher {
    /// Install the key used by subsequent [`decrypt`](Self::decrypt) calls.
    fn set_key(&mut self, key: &[u8; AES_BLOCK_SIZE]);

    /// CBC-decrypt `ciphertext` into `plaintext` with the given IV.
    ///
    /// Both buffers must be the same length, a multiple of 16 bytes.
    fn decrypt(
        &mut self,
        iv: &[u8; AES_BLOCK_SIZE],
        ciphertext: &[u8],
        plaintext: &mut [u8],
    ) -> Result<(), CryptoError>;
}

impl<C: ClusterCipher + ?Sized> ClusterCipher for Box<C> {
    fn set_key(&mut self, key: &[u8; AES_BLOCK_SIZE]) {
        (**self).set_key(key);
    }

    fn decrypt(
        &mut self,
        iv: &[u8; AES_BLOCK_SIZE],
        ciphertext: &[u8],
        plaintext: &mut [u8],
    ) -> Result<(), CryptoError> {
        (**self).decrypt(iv, ciphertext, plaintext)
    }
}

pub(crate) fn check_cbc_lengths(ciphertext: &[u8], plaintext: &[u8]) -> Result<(), CryptoError> {
    if ciphertext.len() != plaintext.len() {
        return Err(CryptoError::BufferMismatch {
            ciphertext: ciphertext.len(),
            plaintext: plaintext.len(),
        });
    }
    if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidLength {
            len: ciphertext.len(),
        });
    }
    Ok(())
}
