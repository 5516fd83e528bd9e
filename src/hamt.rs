//! Tree handle tying a root node to its store, hasher and codec.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::Config;
use crate::codec::{self, Codec, DagCborCodec};
use crate::diff;
use crate::error::Result;
use crate::hash::{KeyHasher, Sha256Hasher};
use crate::node::{Ctx, KeyValue, Node, Pointer};
use crate::ops::get::get_recursive;
use crate::ops::insert::insert_recursive;
use crate::ops::remove::remove_recursive;
use crate::store::{Address, Blockstore};

/// Persistent content-addressed hash trie.
///
/// Mutations happen in memory; [`flush`](Self::flush) writes every changed
/// node to the store and returns the root address. Two trees holding the
/// same entries flush to the same address, whatever order they were built
/// in.
///
/// A `Hamt` is not `Sync`: loaded children are cached behind `&self`. Use
/// [`copy`](Self::copy) to hand an independent tree to another thread.
pub struct Hamt<S, H = Sha256Hasher, C = DagCborCodec> {
    root: Node,
    store: S,
    hasher: H,
    codec: C,
    config: Config,
    root_address: Option<Address>,
}

/// Shape summary of a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    /// Number of nodes, root included.
    pub nodes: usize,
    /// Number of stored entries.
    pub entries: usize,
    /// Bucket count by bucket length.
    pub bucket_sizes: BTreeMap<usize, usize>,
    /// Deepest level holding a node (root is 0).
    pub max_depth: usize,
}

// ---------------------------------------------------------------------------
// Construction: default hasher and codec
// ---------------------------------------------------------------------------

impl<S: Blockstore> Hamt<S> {
    /// Creates an empty tree over `store`.
    pub fn new(store: S) -> Self {
        Self {
            root: Node::new(),
            store,
            hasher: Sha256Hasher,
            codec: DagCborCodec,
            config: Config::default(),
            root_address: None,
        }
    }

    /// Opens the tree persisted under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`BlockNotFound`](crate::Error::BlockNotFound) if `root` is
    /// not in the store, or a store/codec error.
    pub fn load(store: S, root: &Address) -> Result<Self> {
        Self::load_with(store, Sha256Hasher, DagCborCodec, Config::default(), root)
    }
}

// ---------------------------------------------------------------------------
// Construction: injected collaborators
// ---------------------------------------------------------------------------

impl<S, H, C> Hamt<S, H, C>
where
    S: Blockstore,
    H: KeyHasher,
    C: Codec,
{
    /// Creates an empty tree with an explicit hasher, codec and config.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidConfig`](crate::Error::InvalidConfig) if `config`
    /// is rejected by [`Config::validate`].
    pub fn with_parts(store: S, hasher: H, codec: C, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            root: Node::new(),
            store,
            hasher,
            codec,
            config,
            root_address: None,
        })
    }

    /// Opens the tree persisted under `root` with an explicit hasher, codec
    /// and config. They must match the ones the tree was built with.
    ///
    /// # Errors
    ///
    /// Returns a config, store or codec error.
    pub fn load_with(
        store: S,
        hasher: H,
        codec: C,
        config: Config,
        root: &Address,
    ) -> Result<Self> {
        let mut hamt = Self::with_parts(store, hasher, codec, config)?;
        let node = hamt.ctx().load(root)?;
        hamt.root = node;
        hamt.root_address = Some(*root);
        Ok(hamt)
    }

    fn ctx(&self) -> Ctx<'_, S, H, C> {
        Ctx::new(&self.store, &self.hasher, &self.codec, &self.config)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`MaxDepth`](crate::Error::MaxDepth) if the digest runs out
    /// before the key's slot is reached, or a store/codec error while
    /// loading a shard.
    pub fn find(&self, key: &str) -> Result<Option<&[u8]>> {
        Ok(self.get_entry(key)?.map(|kv| kv.value.as_slice()))
    }

    /// Returns the stored entry for `key`.
    ///
    /// # Errors
    ///
    /// Same as [`find`](Self::find).
    pub fn get_entry(&self, key: &str) -> Result<Option<&KeyValue>> {
        let digest = self.hasher.digest(key);
        get_recursive(&self.ctx(), &self.root, digest.as_ref(), key, 0)
    }

    /// Returns `true` if `key` is present.
    ///
    /// # Errors
    ///
    /// Same as [`find`](Self::find).
    pub fn contains_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_entry(key)?.is_some())
    }

    /// Decodes the value under `key` as written by [`set_value`](Self::set_value).
    ///
    /// # Errors
    ///
    /// Same as [`find`](Self::find), plus [`Codec`](crate::Error::Codec) if
    /// the stored bytes do not decode as `T`.
    pub fn find_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.find(key)?.map(codec::decode_value).transpose()
    }

    /// Returns every entry, in digest order (not key order).
    ///
    /// # Errors
    ///
    /// Returns a store/codec error while loading a shard.
    pub fn all_pairs(&self) -> Result<Vec<KeyValue>> {
        let mut out = Vec::new();
        self.root.collect_pairs(&self.ctx(), &mut out)?;
        Ok(out.into_iter().cloned().collect())
    }

    /// Returns the entries of `newer` that are absent from `self` or hold a
    /// different value here. Keys removed in `newer` are not reported.
    ///
    /// Both trees must have been flushed; trees with identical roots return
    /// an empty result without traversal. `newer` is read from its own
    /// store.
    ///
    /// # Errors
    ///
    /// Returns [`Unflushed`](crate::Error::Unflushed) if a root has
    /// unpersisted children, or a store/codec error.
    pub fn find_new(&self, newer: &Self) -> Result<Vec<KeyValue>> {
        if self.codec.encode(&self.root)? == newer.codec.encode(&newer.root)? {
            debug!("diff of identical roots");
            return Ok(Vec::new());
        }
        diff::find_new(&self.ctx(), &self.root, &newer.ctx(), &newer.root)
    }

    /// Collects shape statistics, loading every shard.
    ///
    /// # Errors
    ///
    /// Returns a store/codec error while loading a shard.
    pub fn stats(&self) -> Result<Stats> {
        let mut stats = Stats::default();
        stats_rec(&self.ctx(), &self.root, 0, &mut stats)?;
        Ok(stats)
    }

    /// Total encoded size in bytes of every node reachable from the root.
    ///
    /// # Errors
    ///
    /// Returns [`Unflushed`](crate::Error::Unflushed) if the tree has
    /// unpersisted changes, or a store/codec error.
    pub fn persisted_size(&self) -> Result<u64> {
        size_rec(&self.ctx(), &self.root)
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Sets `key` to `value`. Returns the previous value, if any.
    ///
    /// # Errors
    ///
    /// Returns [`MaxDepth`](crate::Error::MaxDepth) if the key cannot be
    /// placed within the digest length (the tree is left unchanged), or a
    /// store/codec error while loading a shard.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) -> Result<Option<Vec<u8>>> {
        let entry = KeyValue::new(key, value);
        let digest = self.hasher.digest(&entry.key);
        let Self {
            root,
            store,
            hasher,
            codec,
            config,
            root_address,
        } = self;
        let ctx = Ctx::new(&*store, &*hasher, &*codec, &*config);
        let old = insert_recursive(&ctx, root, digest.as_ref(), entry, 0)?;
        *root_address = None;
        Ok(old)
    }

    /// Encodes `value` as DAG-CBOR and stores it under `key`.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set), plus [`Codec`](crate::Error::Codec) if
    /// `value` cannot be encoded.
    pub fn set_value<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Option<Vec<u8>>> {
        let bytes = codec::encode_value(value)?;
        self.set(key, bytes)
    }

    /// Removes `key`. Returns the removed value, or `None` if it was absent.
    ///
    /// # Errors
    ///
    /// Returns [`MaxDepth`](crate::Error::MaxDepth), or a store/codec error
    /// while loading a shard.
    pub fn delete(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let digest = self.hasher.digest(key);
        let Self {
            root,
            store,
            hasher,
            codec,
            config,
            root_address,
        } = self;
        let ctx = Ctx::new(&*store, &*hasher, &*codec, &*config);
        let removed = remove_recursive(&ctx, root, digest.as_ref(), key, 0)?;
        if removed.is_some() {
            *root_address = None;
        }
        Ok(removed.map(|kv| kv.value))
    }

    /// Persists every changed node, then the root, and returns the root
    /// address. All child caches are released.
    ///
    /// # Errors
    ///
    /// Returns a store/codec error; nodes persisted before the failure stay
    /// in the store.
    pub fn flush(&mut self) -> Result<Address> {
        let Self {
            root,
            store,
            hasher,
            codec,
            config,
            root_address,
        } = self;
        let ctx = Ctx::new(&*store, &*hasher, &*codec, &*config);
        root.flush(&ctx)?;
        let address = ctx.persist(root)?;
        debug!(%address, "flushed tree");
        *root_address = Some(address);
        Ok(address)
    }
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

impl<S, H, C> Hamt<S, H, C> {
    /// Address of the root as of the last flush or load, `None` if the tree
    /// changed since.
    #[must_use]
    pub const fn root_address(&self) -> Option<Address> {
        self.root_address
    }

    /// The in-memory root node.
    #[must_use]
    pub const fn root(&self) -> &Node {
        &self.root
    }

    /// The backing store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }
}

impl<S: Clone, H: Clone, C: Clone> Hamt<S, H, C> {
    /// Returns a fully independent tree with the same contents.
    ///
    /// Unflushed and cached children are deep-copied; persisted children
    /// are shared by address.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self {
            root: self.root.clone(),
            store: self.store.clone(),
            hasher: self.hasher.clone(),
            codec: self.codec.clone(),
            config: self.config.clone(),
            root_address: self.root_address,
        }
    }
}

impl<S, H, C> fmt::Debug for Hamt<S, H, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hamt")
            .field("root_address", &self.root_address)
            .field("slots", &self.root.pointers.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Walk helpers
// ---------------------------------------------------------------------------

fn stats_rec<S: Blockstore, H, C: Codec>(
    ctx: &Ctx<'_, S, H, C>,
    node: &Node,
    depth: usize,
    stats: &mut Stats,
) -> Result<()> {
    stats.nodes += 1;
    stats.max_depth = stats.max_depth.max(depth);
    for pointer in &node.pointers {
        match pointer {
            Pointer::Bucket(kvs) => {
                stats.entries += kvs.len();
                *stats.bucket_sizes.entry(kvs.len()).or_default() += 1;
            }
            Pointer::Shard(shard) => stats_rec(ctx, shard.load_child(ctx)?, depth + 1, stats)?,
        }
    }
    Ok(())
}

fn size_rec<S: Blockstore, H, C: Codec>(ctx: &Ctx<'_, S, H, C>, node: &Node) -> Result<u64> {
    let mut total = ctx.codec.encode(node)?.len() as u64;
    for pointer in &node.pointers {
        if let Pointer::Shard(shard) = pointer {
            total += size_rec(ctx, shard.load_child(ctx)?)?;
        }
    }
    Ok(total)
}
