//! Content-addressed block storage.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use safe_bump::{Checkpoint, Idx, SharedArena};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StoreError;

/// Content address of a stored block: SHA-256 of its bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(#[serde(with = "serde_bytes")] [u8; 32]);

impl Address {
    /// Computes the address of `bytes`.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Wraps a raw 32-byte digest.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// Get/put contract of the block store backing a trie.
///
/// Identical bytes must always yield the same address. Implementations are
/// shared between trees, so both operations take `&self`.
pub trait Blockstore {
    /// Fetches the block stored under `address`.
    ///
    /// Returns `Ok(None)` if the block is absent. Implementations must give
    /// up with [`StoreError::Timeout`] once `deadline` has passed.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure or timeout.
    fn get(&self, address: &Address, deadline: Instant) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `block` and returns its address.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    fn put(&self, block: Vec<u8>) -> Result<Address, StoreError>;
}

impl<B: Blockstore + ?Sized> Blockstore for &B {
    fn get(&self, address: &Address, deadline: Instant) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(address, deadline)
    }

    fn put(&self, block: Vec<u8>) -> Result<Address, StoreError> {
        (**self).put(block)
    }
}

impl<B: Blockstore + ?Sized> Blockstore for Arc<B> {
    fn get(&self, address: &Address, deadline: Instant) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(address, deadline)
    }

    fn put(&self, block: Vec<u8>) -> Result<Address, StoreError> {
        (**self).put(block)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Saved state of a [`MemoryStore`] for rollback.
#[derive(Clone, Copy)]
pub struct StoreCheckpoint {
    blocks: Checkpoint<Vec<u8>>,
    len: usize,
}

impl fmt::Debug for StoreCheckpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreCheckpoint")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

struct Blocks {
    arena: SharedArena<Vec<u8>>,
    index: HashMap<Address, Idx<Vec<u8>>>,
}

/// Thread-safe in-memory block store.
///
/// Blocks live in an append-only arena indexed by address; storing the
/// same bytes twice keeps a single copy.
pub struct MemoryStore {
    inner: Mutex<Blocks>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Blocks {
                arena: SharedArena::new(),
                index: HashMap::new(),
            }),
        }
    }

    /// Number of distinct blocks held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    /// Returns `true` if the store holds no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if a block is stored under `address`.
    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.inner.lock().index.contains_key(address)
    }

    /// Saves the current store state.
    #[must_use]
    pub fn checkpoint(&self) -> StoreCheckpoint {
        let blocks = self.inner.lock();
        StoreCheckpoint {
            blocks: blocks.arena.checkpoint(),
            len: blocks.arena.len(),
        }
    }

    /// Discards every block written after `cp` was taken.
    pub fn rollback(&self, cp: StoreCheckpoint) {
        let mut blocks = self.inner.lock();
        blocks.arena.rollback(cp.blocks);
        blocks.index.retain(|_, idx| idx.into_raw() < cp.len);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("blocks", &self.len())
            .finish()
    }
}

impl Blockstore for MemoryStore {
    fn get(&self, address: &Address, deadline: Instant) -> Result<Option<Vec<u8>>, StoreError> {
        if Instant::now() >= deadline {
            return Err(StoreError::Timeout);
        }
        let blocks = self.inner.lock();
        Ok(blocks
            .index
            .get(address)
            .map(|&idx| blocks.arena.get(idx).clone()))
    }

    fn put(&self, block: Vec<u8>) -> Result<Address, StoreError> {
        let address = Address::of(&block);
        let mut blocks = self.inner.lock();
        if !blocks.index.contains_key(&address) {
            let idx = blocks.arena.alloc(block);
            blocks.index.insert(address, idx);
        }
        Ok(address)
    }
}
