//! AES-128-CBC backed by the RustCrypto `aes` and `cbc` crates.

use std::fmt;

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use generic_array::GenericArray;
use tracing::trace;
use zeroize::Zeroizing;

use super::{AES_BLOCK_SIZE, ClusterCipher, CryptoError, check_cbc_lengths};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

/// Default [`ClusterCipher`]: software AES-128 in CBC mode.
///
/// # Security
///
/// The installed key is wrapped in `Zeroizing` and erased when replaced or
/// dropped. The `Debug` implementation redacts it.
#[derive(Default)]
pub struct Aes128Cbc {
    key: Option<Zeroizing<[u8; AES_BLOCK_SIZE]>>,
}

impl Aes128Cbc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cipher with `key` already installed.
    pub fn with_key(key: &[u8; AES_BLOCK_SIZE]) -> Self {
        let mut cipher = Self::new();
        cipher.set_key(key);
        cipher
    }
}

impl fmt::Debug for Aes128Cbc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aes128Cbc")
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ClusterCipher for Aes128Cbc {
    fn set_key(&mut self, key: &[u8; AES_BLOCK_SIZE]) {
        self.key = Some(Zeroizing::new(*key));
    }

    fn decrypt(
        &mut self,
        iv: &[u8; AES_BLOCK_SIZE],
        ciphertext: &[u8],
        plaintext: &mut [u8],
    ) -> Result<(), CryptoError> {
        let key = self.key.as_ref().ok_or(CryptoError::NoKey)?;
        check_cbc_lengths(ciphertext, plaintext)?;
        trace!(len = ciphertext.len(), "AES-CBC decrypt");

        let mut decryptor = Aes128CbcDec::new(key.as_ref().into(), iv.into());
        plaintext.copy_from_slice(ciphertext);
        for block in plaintext.chunks_exact_mut(AES_BLOCK_SIZE) {
            decryptor.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        Ok(())
    }
}

/// CBC-encrypt `buf` in place.
///
/// The filesystem never writes, but synthetic disc images (and anything else
/// that needs to produce valid ciphertext) go through here.
pub fn encrypt_cbc(
    key: &[u8; AES_BLOCK_SIZE],
    iv: &[u8; AES_BLOCK_SIZE],
    buf: &mut [u8],
) -> Result<(), CryptoError> {
    if buf.is_empty() || buf.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidLength { len: buf.len() });
    }
    let mut encryptor = Aes128CbcEnc::new(key.into(), iv.into());
    for block in buf.chunks_exact_mut(AES_BLOCK_SIZE) {
        encryptor.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    Ok(())
}
