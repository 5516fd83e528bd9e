mod bitfield;
mod codec;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crate::error::StoreError;
use crate::{Address, Blockstore, Config, DagCborCodec, Hamt, IdentityHasher, MemoryStore};

/// Tree over `store` using key bytes as the digest (32 levels).
pub fn identity_tree(store: &MemoryStore) -> Hamt<&MemoryStore, IdentityHasher> {
    Hamt::with_parts(store, IdentityHasher::new(32), DagCborCodec, Config::default()).unwrap()
}

/// Reopens an identity-hashed tree persisted under `root`.
pub fn load_identity_tree<'a>(
    store: &'a MemoryStore,
    root: &Address,
    digest_len: usize,
) -> crate::Result<Hamt<&'a MemoryStore, IdentityHasher>> {
    Hamt::load_with(
        store,
        IdentityHasher::new(digest_len),
        DagCborCodec,
        Config::default(),
        root,
    )
}

/// Memory store that counts block fetches.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    pub gets: AtomicUsize,
}

impl CountingStore {
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

impl Blockstore for CountingStore {
    fn get(&self, address: &Address, deadline: Instant) -> Result<Option<Vec<u8>>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(address, deadline)
    }

    fn put(&self, block: Vec<u8>) -> Result<Address, StoreError> {
        self.inner.put(block)
    }
}
