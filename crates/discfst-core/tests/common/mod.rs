//! Shared fixtures for the integration tests.

#![allow(dead_code)] // Each test binary uses a different subset

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use discfst_core::crypto::{Aes128Cbc, ClusterCipher, CryptoError};
use discfst_core::disc::MemoryBlockSource;
use discfst_core::testing::{DiscImage, DiscImageBuilder, FstNode, patterned};
use discfst_core::{MountOptions, MountedDisc};

pub type Disc<C = Aes128Cbc> = MountedDisc<MemoryBlockSource, C>;

/// Sizes straddling the 0x7c00-byte cluster payload.
pub const BIG_SIZE: usize = 3 * 0x7c00 + 0x123;

/// Route library logs to the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A disc whose partition 0 holds:
///
/// ```text
/// A.TXT
/// data/
///   big.bin        BIG_SIZE bytes
///   nested/
///     deep.txt
///   Readme
/// empty/
/// ```
pub fn sample_image() -> DiscImage {
    DiscImageBuilder::new()
        .with_root(FstNode::dir(
            "",
            vec![
                FstNode::file("A.TXT", b"Hello from partition zero\n".to_vec()),
                FstNode::dir(
                    "data",
                    vec![
                        FstNode::file("big.bin", patterned(BIG_SIZE, 17)),
                        FstNode::dir(
                            "nested",
                            vec![FstNode::file("deep.txt", b"deep".to_vec())],
                        ),
                        FstNode::file("Readme", b"read me".to_vec()),
                    ],
                ),
                FstNode::dir("empty", vec![]),
            ],
        ))
        .build()
        .expect("sample image")
}

pub fn mount(image: &DiscImage) -> Disc {
    MountedDisc::mount(image.source(), Aes128Cbc::new(), &MountOptions::default())
        .expect("mount sample image")
}

/// AES-CBC that counts cluster decryptions, i.e. calls with more than one
/// block of input. Title key unwrapping (one block) is not counted.
#[derive(Default)]
pub struct CountingCipher {
    inner: Aes128Cbc,
    decrypts: Arc<AtomicUsize>,
}

impl CountingCipher {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let cipher = Self::default();
        let counter = Arc::clone(&cipher.decrypts);
        (cipher, counter)
    }
}

impl ClusterCipher for CountingCipher {
    fn set_key(&mut self, key: &[u8; 16]) {
        self.inner.set_key(key);
    }

    fn decrypt(
        &mut self,
        iv: &[u8; 16],
        ciphertext: &[u8],
        plaintext: &mut [u8],
    ) -> Result<(), CryptoError> {
        if ciphertext.len() > 16 {
            self.decrypts.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.decrypt(iv, ciphertext, plaintext)
    }
}

pub fn decrypts(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
