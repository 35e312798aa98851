//! Fixed common keys and per-partition title keys.

use std::fmt;

use zeroize::Zeroizing;

use super::{ClusterCipher, CryptoError};

/// AES block size, also the key and IV size for every cipher on the disc.
pub const AES_BLOCK_SIZE: usize = 16;

const STANDARD_COMMON_KEY: [u8; AES_BLOCK_SIZE] = [
    0xeb, 0xe4, 0x2a, 0x22, 0x5e, 0x85, 0x93, 0xe4, 0x48, 0xd9, 0xc5, 0x45, 0x73, 0x81, 0xaa, 0xf7,
];

const KOREAN_COMMON_KEY: [u8; AES_BLOCK_SIZE] = [
    0x63, 0xb8, 0x2b, 0xb4, 0xf4, 0x61, 0x4e, 0x2e, 0x13, 0xf2, 0xfe, 0xfb, 0xba, 0x4c, 0x9b, 0x7e,
];

/// Which common key wraps a ticket's title key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommonKey {
    Standard,
    Korean,
}

impl CommonKey {
    /// Select the key from the ticket's region flag byte. Any non-zero value
    /// means Korean.
    pub fn from_ticket_flag(flag: u8) -> Self {
        if flag != 0 {
            Self::Korean
        } else {
            Self::Standard
        }
    }

    pub fn bytes(self) -> &'static [u8; AES_BLOCK_SIZE] {
        match self {
            Self::Standard => &STANDARD_COMMON_KEY,
            Self::Korean => &KOREAN_COMMON_KEY,
        }
    }
}

/// A decrypted per-partition title key.
///
/// Zeroized on drop; never printed.
#[derive(Clone)]
pub struct TitleKey(Zeroizing<[u8; AES_BLOCK_SIZE]>);

impl TitleKey {
    pub fn from_bytes(bytes: [u8; AES_BLOCK_SIZE]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Recover a title key from the ticket fields.
    ///
    /// The IV is the 8-byte title id followed by eight zero bytes. The cipher
    /// is left holding the common key afterwards; callers install the title
    /// key before decrypting clusters.
    pub fn unwrap<C: ClusterCipher + ?Sized>(
        cipher: &mut C,
        common: CommonKey,
        encrypted: &[u8; AES_BLOCK_SIZE],
        title_id: &[u8; 8],
    ) -> Result<Self, CryptoError> {
        let iv = title_iv(title_id);
        let mut out = Zeroizing::new([0u8; AES_BLOCK_SIZE]);
        cipher.set_key(common.bytes());
        cipher.decrypt(&iv, encrypted, &mut out[..])?;
        Ok(Self(out))
    }

    pub fn as_bytes(&self) -> &[u8; AES_BLOCK_SIZE] {
        &self.0
    }
}

impl fmt::Debug for TitleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TitleKey([REDACTED])")
    }
}

/// IV used to wrap a title key: the title id padded with zeros.
pub fn title_iv(title_id: &[u8; 8]) -> [u8; AES_BLOCK_SIZE] {
    let mut iv = [0u8; AES_BLOCK_SIZE];
    iv[..8].copy_from_slice(title_id);
    iv
}
