//! Encrypted cluster layout and the single-slot decrypt cache.
//!
//! A partition's data region is a sequence of 0x8000-byte clusters:
//!
//! ```text
//! +--------------------------+------------------------------------+
//! | header 0x400             | payload 0x7c00 (AES-128-CBC)       |
//! |   hashes ... IV @ 0x3d0  |                                    |
//! +--------------------------+------------------------------------+
//! ```
//!
//! Partition plaintext is the concatenation of all payloads. The cache keeps
//! the last decrypted payload and its plaintext-space bounds, so consecutive
//! small reads inside one cluster cost one block read and one decryption.

use std::io;

use thiserror::Error;
use tracing::{instrument, trace};

use crate::crypto::{AES_BLOCK_SIZE, ClusterCipher, CryptoError, TitleKey};
use crate::disc::{BlockSource, SectorReader};

/// Size of one encrypted cluster on disc.
pub const CLUSTER_SIZE: u64 = 0x8000;

/// Size of the unencrypted hash/IV header of a cluster.
pub const CLUSTER_HEADER_SIZE: u64 = 0x400;

/// Plaintext bytes carried by one cluster.
pub const CLUSTER_DATA_SIZE: u64 = CLUSTER_SIZE - CLUSTER_HEADER_SIZE;

/// Offset of the payload IV inside the cluster header.
pub const CLUSTER_IV_OFFSET: usize = 0x3d0;

/// Map an offset into the ciphertext data region to partition plaintext.
///
/// Offsets inside a cluster header map to the start of that cluster's
/// payload.
#[inline]
pub const fn cipher_to_plaintext(offset: u64) -> u64 {
    offset / CLUSTER_SIZE * CLUSTER_DATA_SIZE
        + (offset % CLUSTER_SIZE).saturating_sub(CLUSTER_HEADER_SIZE)
}

/// Map a partition plaintext offset to its position in the ciphertext data
/// region.
#[inline]
pub const fn plaintext_to_cipher(offset: u64) -> u64 {
    offset / CLUSTER_DATA_SIZE * CLUSTER_SIZE + offset % CLUSTER_DATA_SIZE + CLUSTER_HEADER_SIZE
}

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("IO error reading cluster at disc offset {offset:#x}: {source}")]
    Io {
        #[source]
        source: io::Error,
        offset: u64,
    },

    #[error("Failed to decrypt cluster at disc offset {offset:#x}: {source}")]
    Crypto {
        #[source]
        source: CryptoError,
        offset: u64,
    },

    #[error("Cluster offset {offset:#x} is not aligned to {CLUSTER_SIZE:#x}")]
    Misaligned { offset: u64 },

    #[error("Range {within:#x}+{len:#x} is outside the cluster payload")]
    OutOfRange { within: usize, len: usize },
}

/// Hit/miss counters for the decrypt cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Single-slot cache of the most recently decrypted cluster payload.
///
/// `start..end` are plaintext-space bounds computed from absolute disc
/// offsets, so clusters of different partitions never alias. Both are zero
/// while the cache is empty.
pub struct ClusterCache<C> {
    cipher: C,
    start: u64,
    end: u64,
    plaintext: Box<[u8]>,
    ciphertext: Box<[u8]>,
    stats: CacheStats,
}

impl<C: ClusterCipher> ClusterCache<C> {
    pub fn new(cipher: C) -> Self {
        Self {
            cipher,
            start: 0,
            end: 0,
            plaintext: vec![0u8; CLUSTER_DATA_SIZE as usize].into_boxed_slice(),
            ciphertext: vec![0u8; CLUSTER_SIZE as usize].into_boxed_slice(),
            stats: CacheStats::default(),
        }
    }

    /// Copy `out.len()` plaintext bytes of the cluster at absolute disc
    /// offset `cluster_offset`, starting `within` bytes into the encrypted
    /// cluster (so `within` is at least the header size).
    ///
    /// A cache hit performs no I/O and no decryption.
    pub fn decrypt_range<S: BlockSource>(
        &mut self,
        reader: &mut SectorReader<S>,
        key: &TitleKey,
        out: &mut [u8],
        cluster_offset: u64,
        within: usize,
    ) -> Result<(), ClusterError> {
        if cluster_offset % CLUSTER_SIZE != 0 {
            return Err(ClusterError::Misaligned {
                offset: cluster_offset,
            });
        }
        let len = out.len();
        if (within as u64) < CLUSTER_HEADER_SIZE || (within + len) as u64 > CLUSTER_SIZE {
            return Err(ClusterError::OutOfRange { within, len });
        }

        let cluster_start = cipher_to_plaintext(cluster_offset + CLUSTER_HEADER_SIZE);
        let request_start = cluster_start + (within as u64 - CLUSTER_HEADER_SIZE);
        let request_end = request_start + len as u64;

        if self.end != 0 && request_start >= self.start && request_end <= self.end {
            self.stats.hits += 1;
            trace!(cluster_offset, within, len, "Cluster cache hit");
        } else {
            self.stats.misses += 1;
            trace!(cluster_offset, within, len, "Cluster cache miss");
            self.fill(reader, key, cluster_offset)?;
            self.start = cluster_start;
            self.end = cluster_start + CLUSTER_DATA_SIZE;
        }

        let from = (request_start - self.start) as usize;
        out.copy_from_slice(&self.plaintext[from..from + len]);
        Ok(())
    }

    fn fill<S: BlockSource>(
        &mut self,
        reader: &mut SectorReader<S>,
        key: &TitleKey,
        cluster_offset: u64,
    ) -> Result<(), ClusterError> {
        // The old payload is about to be overwritten
        self.invalidate();

        reader
            .read_exact_at(&mut self.ciphertext, cluster_offset)
            .map_err(|source| ClusterError::Io {
                source,
                offset: cluster_offset,
            })?;

        let mut iv = [0u8; AES_BLOCK_SIZE];
        iv.copy_from_slice(&self.ciphertext[CLUSTER_IV_OFFSET..CLUSTER_IV_OFFSET + AES_BLOCK_SIZE]);

        self.cipher.set_key(key.as_bytes());
        self.cipher
            .decrypt(
                &iv,
                &self.ciphertext[CLUSTER_HEADER_SIZE as usize..],
                &mut self.plaintext,
            )
            .map_err(|source| ClusterError::Crypto {
                source,
                offset: cluster_offset,
            })
    }

    /// Read `out.len()` bytes of partition plaintext starting at
    /// `plaintext_offset`, for a partition whose data region starts at
    /// absolute disc offset `data_start`. Crosses clusters as needed.
    #[instrument(level = "trace", skip(self, reader, key, out), fields(len = out.len()))]
    pub fn read_plaintext<S: BlockSource>(
        &mut self,
        reader: &mut SectorReader<S>,
        key: &TitleKey,
        data_start: u64,
        plaintext_offset: u64,
        out: &mut [u8],
    ) -> Result<(), ClusterError> {
        let mut done = 0;
        while done < out.len() {
            let cipher_offset = plaintext_to_cipher(plaintext_offset + done as u64);
            let cluster_offset = data_start + cipher_offset / CLUSTER_SIZE * CLUSTER_SIZE;
            let within = (cipher_offset % CLUSTER_SIZE) as usize;
            let n = (out.len() - done).min(CLUSTER_SIZE as usize - within);
            self.decrypt_range(reader, key, &mut out[done..done + n], cluster_offset, within)?;
            done += n;
        }
        Ok(())
    }

    /// Forget the cached cluster.
    pub fn invalidate(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn cipher_mut(&mut self) -> &mut C {
        &mut self.cipher
    }

    pub fn into_cipher(self) -> C {
        self.cipher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Aes128Cbc, encrypt_cbc};
    use crate::disc::{AccessClock, MemoryBlockSource};
    use proptest::prelude::*;
    use std::sync::Arc;

    const KEY: [u8; 16] = [0x42; 16];

    /// Counts decryptions, delegating to the real cipher.
    #[derive(Default)]
    struct CountingCipher {
        inner: Aes128Cbc,
        decrypts: usize,
    }

    impl ClusterCipher for CountingCipher {
        fn set_key(&mut self, key: &[u8; AES_BLOCK_SIZE]) {
            self.inner.set_key(key);
        }

        fn decrypt(
            &mut self,
            iv: &[u8; AES_BLOCK_SIZE],
            ciphertext: &[u8],
            plaintext: &mut [u8],
        ) -> Result<(), CryptoError> {
            self.decrypts += 1;
            self.inner.decrypt(iv, ciphertext, plaintext)
        }
    }

    /// `clusters` encrypted clusters at disc offset `base`; payload byte `i`
    /// of plaintext is `i % 253`.
    fn encrypted_region(base: usize, clusters: usize) -> (Vec<u8>, Vec<u8>) {
        let data_len = CLUSTER_DATA_SIZE as usize;
        let plain: Vec<u8> = (0..clusters * data_len).map(|i| (i % 253) as u8).collect();
        let mut image = vec![0u8; base + clusters * CLUSTER_SIZE as usize];
        for (n, chunk) in plain.chunks(data_len).enumerate() {
            let cluster = base + n * CLUSTER_SIZE as usize;
            let iv = [n as u8 ^ 0x5a; 16];
            image[cluster + CLUSTER_IV_OFFSET..cluster + CLUSTER_IV_OFFSET + 16]
                .copy_from_slice(&iv);
            let payload = &mut image[cluster + CLUSTER_HEADER_SIZE as usize..cluster + CLUSTER_SIZE as usize];
            payload.copy_from_slice(chunk);
            encrypt_cbc(&KEY, &iv, payload).unwrap();
        }
        (image, plain)
    }

    fn fixture(clusters: usize) -> (SectorReader<MemoryBlockSource>, Vec<u8>) {
        let (image, plain) = encrypted_region(0x10000, clusters);
        let reader = SectorReader::new(
            MemoryBlockSource::new(image),
            Vec::new(),
            Arc::new(AccessClock::new()),
        );
        (reader, plain)
    }

    #[test]
    fn test_offset_mappings() {
        assert_eq!(plaintext_to_cipher(0), 0x400);
        assert_eq!(plaintext_to_cipher(0x420), 0x820);
        assert_eq!(plaintext_to_cipher(0x7c00), 0x8400);
        assert_eq!(cipher_to_plaintext(0x400), 0);
        assert_eq!(cipher_to_plaintext(0x8400), 0x7c00);
        assert_eq!(cipher_to_plaintext(0x8000), 0x7c00);
    }

    proptest! {
        #[test]
        fn test_mapping_roundtrip(offset in 0u64..0x1_0000_0000) {
            prop_assert_eq!(cipher_to_plaintext(plaintext_to_cipher(offset)), offset);
        }
    }

    #[test]
    fn test_same_cluster_decrypts_once() {
        let (mut reader, plain) = fixture(2);
        let mut cache = ClusterCache::new(CountingCipher::default());
        let key = TitleKey::from_bytes(KEY);

        let mut a = [0u8; 64];
        let mut b = [0u8; 64];
        cache.decrypt_range(&mut reader, &key, &mut a, 0x10000, 0x400).unwrap();
        cache.decrypt_range(&mut reader, &key, &mut b, 0x10000, 0x1000).unwrap();

        assert_eq!(&a[..], &plain[..64]);
        assert_eq!(&b[..], &plain[0xc00..0xc40]);
        assert_eq!(cache.cipher_mut().decrypts, 1);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn test_switching_clusters_misses() {
        let (mut reader, plain) = fixture(2);
        let mut cache = ClusterCache::new(CountingCipher::default());
        let key = TitleKey::from_bytes(KEY);

        let mut out = [0u8; 16];
        cache.decrypt_range(&mut reader, &key, &mut out, 0x18000, 0x400).unwrap();
        assert_eq!(&out[..], &plain[0x7c00..0x7c10]);
        cache.decrypt_range(&mut reader, &key, &mut out, 0x10000, 0x400).unwrap();
        cache.decrypt_range(&mut reader, &key, &mut out, 0x18000, 0x400).unwrap();
        assert_eq!(cache.cipher_mut().decrypts, 3);
    }

    #[test]
    fn test_read_plaintext_crosses_clusters() {
        let (mut reader, plain) = fixture(3);
        let mut cache = ClusterCache::new(Aes128Cbc::new());
        let key = TitleKey::from_bytes(KEY);

        let mut out = vec![0u8; 0x9000];
        cache
            .read_plaintext(&mut reader, &key, 0x10000, 0x7000, &mut out)
            .unwrap();
        assert_eq!(&out[..], &plain[0x7000..0x10000]);
    }

    #[test]
    fn test_invalidate_forces_redecrypt() {
        let (mut reader, _) = fixture(1);
        let mut cache = ClusterCache::new(CountingCipher::default());
        let key = TitleKey::from_bytes(KEY);
        let mut out = [0u8; 16];

        cache.decrypt_range(&mut reader, &key, &mut out, 0x10000, 0x400).unwrap();
        assert!(!cache.is_empty());
        cache.invalidate();
        assert!(cache.is_empty());
        cache.decrypt_range(&mut reader, &key, &mut out, 0x10000, 0x400).unwrap();
        assert_eq!(cache.cipher_mut().decrypts, 2);
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let (mut reader, _) = fixture(1);
        let mut cache = ClusterCache::new(Aes128Cbc::new());
        let key = TitleKey::from_bytes(KEY);
        let mut out = [0u8; 16];

        assert!(matches!(
            cache.decrypt_range(&mut reader, &key, &mut out, 0x10010, 0x400),
            Err(ClusterError::Misaligned { .. })
        ));
        assert!(matches!(
            cache.decrypt_range(&mut reader, &key, &mut out, 0x10000, 0x3f0),
            Err(ClusterError::OutOfRange { .. })
        ));
        assert!(matches!(
            cache.decrypt_range(&mut reader, &key, &mut out, 0x10000, 0x7ff8),
            Err(ClusterError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_read_failure_leaves_cache_empty() {
        let (mut reader, _) = fixture(1);
        let mut cache = ClusterCache::new(Aes128Cbc::new());
        let key = TitleKey::from_bytes(KEY);
        let mut out = [0u8; 16];

        cache.decrypt_range(&mut reader, &key, &mut out, 0x10000, 0x400).unwrap();
        let err = cache
            .decrypt_range(&mut reader, &key, &mut out, 0x20000, 0x400)
            .unwrap_err();
        assert!(matches!(err, ClusterError::Io { offset: 0x20000, .. }));
        assert!(cache.is_empty());
    }
}
