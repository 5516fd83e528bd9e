//! Key digest strategies.
//!
//! The trie consumes one digest byte per level, so the digest length is the
//! maximum depth. A persisted tree must always be read with the hasher it
//! was built with.

use sha2::{Digest, Sha256};

/// Digests a key into the byte path used to walk the trie.
pub trait KeyHasher {
    /// Fixed-length digest type.
    type Digest: AsRef<[u8]>;

    /// Digests `key`.
    fn digest(&self, key: &str) -> Self::Digest;
}

/// SHA-256 key digest (32 levels).
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl KeyHasher for Sha256Hasher {
    type Digest = [u8; 32];

    fn digest(&self, key: &str) -> [u8; 32] {
        Sha256::digest(key.as_bytes()).into()
    }
}

/// Uses the key bytes themselves, zero-padded or truncated to `len`.
///
/// Intended for fixtures where the trie shape must be chosen by hand.
#[derive(Debug, Clone, Copy)]
pub struct IdentityHasher {
    len: usize,
}

impl IdentityHasher {
    /// Creates an identity hasher producing `len`-byte digests.
    #[must_use]
    pub const fn new(len: usize) -> Self {
        Self { len }
    }
}

impl Default for IdentityHasher {
    fn default() -> Self {
        Self::new(32)
    }
}

impl KeyHasher for IdentityHasher {
    type Digest = Vec<u8>;

    fn digest(&self, key: &str) -> Vec<u8> {
        let mut out = vec![0; self.len];
        let bytes = key.as_bytes();
        let n = bytes.len().min(self.len);
        out[..n].copy_from_slice(&bytes[..n]);
        out
    }
}

impl<H: KeyHasher + ?Sized> KeyHasher for &H {
    type Digest = H::Digest;

    fn digest(&self, key: &str) -> H::Digest {
        (**self).digest(key)
    }
}
