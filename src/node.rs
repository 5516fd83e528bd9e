//! HAMT node, pointer and entry types.
//!
//! A [`Node`] owns its compacted pointer array. Each [`Shard`] pointer owns
//! its decoded child (if loaded), so the in-memory tree is a plain ownership
//! tree: no node is ever reachable through two parents. Persisted subtrees
//! are shared only by [`Address`].

use std::time::Instant;

use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::Config;
use crate::bitfield::Bitfield;
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::hash::KeyHasher;
use crate::store::{Address, Blockstore};

/// A key and its already-encoded value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyValue {
    /// The key.
    pub key: String,
    /// Opaque value bytes.
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,
}

impl KeyValue {
    /// Creates an entry.
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One occupied slot of a node.
#[derive(Debug, Clone)]
pub enum Pointer {
    /// Inline entries, strictly sorted by key, `1..=max_array_width` long.
    Bucket(Vec<KeyValue>),
    /// Link to a child node.
    Shard(Shard),
}

impl Pointer {
    /// Returns `true` if this slot links to a child node.
    #[must_use]
    pub const fn is_shard(&self) -> bool {
        matches!(self, Self::Shard(_))
    }
}

/// Link to a child node with an optional decoded copy of it.
///
/// `address` is `None` while the child has changes that were not flushed;
/// the cache is then the only copy of the child.
#[derive(Debug, Clone)]
pub struct Shard {
    address: Option<Address>,
    cache: OnceCell<Box<Node>>,
}

impl Shard {
    /// Link to a persisted child.
    #[must_use]
    pub const fn linked(address: Address) -> Self {
        Self {
            address: Some(address),
            cache: OnceCell::new(),
        }
    }

    /// Link to an in-memory child that has not been persisted yet.
    #[must_use]
    pub fn dirty(child: Node) -> Self {
        Self {
            address: None,
            cache: OnceCell::with_value(Box::new(child)),
        }
    }

    /// Address of the child, or `None` if it has unflushed changes.
    #[must_use]
    pub const fn address(&self) -> Option<Address> {
        self.address
    }

    /// Returns `true` if the decoded child is held in memory.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cache.get().is_some()
    }

    /// Returns the child, fetching and decoding it on first use.
    ///
    /// # Errors
    ///
    /// Propagates store and codec failures; returns
    /// [`Error::MalformedTree`] if the fetched child has no pointers.
    pub(crate) fn load_child<S, H, C>(&self, ctx: &Ctx<'_, S, H, C>) -> Result<&Node>
    where
        S: Blockstore,
        C: Codec,
    {
        let child = self.cache.get_or_try_init(|| {
            let address = self
                .address
                .ok_or(Error::MalformedTree("shard has neither address nor child"))?;
            let child = ctx.load(&address)?;
            if child.pointers.is_empty() {
                warn!(%address, "decoded shard has no pointers");
                return Err(Error::MalformedTree("shard with zero pointers"));
            }
            Ok(Box::new(child))
        })?;
        Ok(&**child)
    }

    /// Returns the child for mutation, loading it first if needed.
    ///
    /// Callers must [`invalidate`](Self::invalidate) the link once the child
    /// has actually changed.
    pub(crate) fn child_mut<S, H, C>(&mut self, ctx: &Ctx<'_, S, H, C>) -> Result<&mut Node>
    where
        S: Blockstore,
        C: Codec,
    {
        self.load_child(ctx)?;
        self.cache
            .get_mut()
            .map(|child| &mut **child)
            .ok_or(Error::MalformedTree("shard has neither address nor child"))
    }

    /// Drops the address after the cached child changed.
    pub(crate) fn invalidate(&mut self) {
        self.address = None;
    }

    /// Persists the child if it changed, then releases the cache.
    fn flush<S, H, C>(&mut self, ctx: &Ctx<'_, S, H, C>) -> Result<()>
    where
        S: Blockstore,
        C: Codec,
    {
        if self.address.is_none() {
            let child = self
                .cache
                .get_mut()
                .ok_or(Error::MalformedTree("shard has neither address nor child"))?;
            child.flush(ctx)?;
            let address = ctx.persist(child)?;
            trace!(%address, "persisted shard");
            self.address = Some(address);
        }
        self.cache.take();
        Ok(())
    }
}

/// One trie level: a 256-bit occupancy map and the compacted pointer array.
///
/// Invariant: `pointers.len() == bitfield.count_ones()`, and `pointers[i]`
/// belongs to the `i`-th set bit in ascending order.
///
/// `Clone` is a deep copy: loaded and dirty children are cloned, addresses
/// are copied by value.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub(crate) bitfield: Bitfield,
    pub(crate) pointers: Vec<Pointer>,
}

impl Node {
    /// Creates an empty node.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bitfield: Bitfield::new(),
            pointers: Vec::new(),
        }
    }

    /// Builds a node from its parts, checking the structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedTree`] if the pointer count does not match
    /// the bitfield or a bucket is empty or unsorted.
    pub fn from_parts(bitfield: Bitfield, pointers: Vec<Pointer>) -> Result<Self> {
        if bitfield.count_ones() != pointers.len() {
            return Err(Error::MalformedTree("bitfield does not match pointer count"));
        }
        for pointer in &pointers {
            if let Pointer::Bucket(kvs) = pointer {
                if kvs.is_empty() {
                    return Err(Error::MalformedTree("empty bucket"));
                }
                if kvs.windows(2).any(|w| w[0].key >= w[1].key) {
                    return Err(Error::MalformedTree("bucket keys not strictly sorted"));
                }
            }
        }
        Ok(Self { bitfield, pointers })
    }

    /// Occupancy map of this node.
    #[must_use]
    pub const fn bitfield(&self) -> &Bitfield {
        &self.bitfield
    }

    /// Compacted pointer array.
    #[must_use]
    pub fn pointers(&self) -> &[Pointer] {
        &self.pointers
    }

    /// Returns `true` if the node has no occupied slot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    /// Pointer occupying `slot`, if any.
    #[must_use]
    pub fn pointer_at(&self, slot: u8) -> Option<&Pointer> {
        if self.bitfield.test(slot) {
            self.pointers.get(self.bitfield.rank(slot))
        } else {
            None
        }
    }

    /// Returns `true` if any shard in this subtree has unflushed changes.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.pointers.iter().any(|p| match p {
            Pointer::Shard(shard) => shard.address.is_none(),
            Pointer::Bucket(_) => false,
        })
    }

    /// Persists every changed child bottom-up and drops all child caches.
    ///
    /// The node itself is not persisted.
    pub(crate) fn flush<S, H, C>(&mut self, ctx: &Ctx<'_, S, H, C>) -> Result<()>
    where
        S: Blockstore,
        C: Codec,
    {
        for pointer in &mut self.pointers {
            if let Pointer::Shard(shard) = pointer {
                shard.flush(ctx)?;
            }
        }
        Ok(())
    }

    /// Appends every entry in this subtree to `out`, in slot order.
    pub(crate) fn collect_pairs<'a, S, H, C>(
        &'a self,
        ctx: &Ctx<'_, S, H, C>,
        out: &mut Vec<&'a KeyValue>,
    ) -> Result<()>
    where
        S: Blockstore,
        C: Codec,
    {
        for pointer in &self.pointers {
            collect_pointer(pointer, ctx, out)?;
        }
        Ok(())
    }
}

/// Appends every entry reachable through `pointer` to `out`.
pub(crate) fn collect_pointer<'a, S, H, C>(
    pointer: &'a Pointer,
    ctx: &Ctx<'_, S, H, C>,
    out: &mut Vec<&'a KeyValue>,
) -> Result<()>
where
    S: Blockstore,
    C: Codec,
{
    match pointer {
        Pointer::Bucket(kvs) => out.extend(kvs),
        Pointer::Shard(shard) => shard.load_child(ctx)?.collect_pairs(ctx, out)?,
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Traversal context
// ---------------------------------------------------------------------------

/// Collaborators a traversal needs: store, key hasher, codec and config.
pub(crate) struct Ctx<'a, S, H, C> {
    pub store: &'a S,
    pub hasher: &'a H,
    pub codec: &'a C,
    pub config: &'a Config,
}

impl<'a, S, H, C> Ctx<'a, S, H, C> {
    pub const fn new(store: &'a S, hasher: &'a H, codec: &'a C, config: &'a Config) -> Self {
        Self {
            store,
            hasher,
            codec,
            config,
        }
    }
}

impl<S: Blockstore, H, C: Codec> Ctx<'_, S, H, C> {
    /// Fetches and decodes the node stored under `address`.
    pub fn load(&self, address: &Address) -> Result<Node> {
        trace!(%address, "loading node");
        let deadline = Instant::now()
            .checked_add(self.config.fetch_timeout)
            .ok_or(Error::InvalidConfig("fetch timeout overflows the clock"))?;
        let bytes = self
            .store
            .get(address, deadline)?
            .ok_or(Error::BlockNotFound(*address))?;
        self.codec.decode(&bytes)
    }

    /// Encodes and stores `node`, returning its address.
    pub fn persist(&self, node: &Node) -> Result<Address> {
        let bytes = self.codec.encode(node)?;
        Ok(self.store.put(bytes)?)
    }
}

impl<S, H: KeyHasher, C> Ctx<'_, S, H, C> {
    /// Digests `key` with the tree's hasher.
    pub fn digest(&self, key: &str) -> H::Digest {
        self.hasher.digest(key)
    }
}
