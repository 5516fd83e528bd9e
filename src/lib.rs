//! Persistent content-addressed hash array mapped trie.
//!
//! Keys are digested once; each trie level consumes one digest byte, so a
//! node has up to 256 slots tracked by a [`Bitfield`] and stored in a
//! compacted pointer array. A slot holds either a small sorted bucket of
//! entries or a link to a child node by content [`Address`].
//!
//! # Key properties
//!
//! - **Canonical form**: the same entries always flush to the same root
//!   address, regardless of insertion or deletion history (CHAMP-style
//!   collapse on delete).
//! - **Lazy persistence**: mutations stay in memory until
//!   [`Hamt::flush`], which writes changed nodes bottom-up.
//! - **Cheap diff**: [`diff()`] skips every subtree whose address is the
//!   same on both sides.
//! - **Zero `unsafe`**: enforced by `#![forbid(unsafe_code)]`
//!
//! # References
//!
//! - Bagwell, 2001: "Ideal Hash Trees"
//! - Steindorfer & Vinju, 2015: "Optimizing Hash-Array Mapped Tries
//!   for Fast and Lean Immutable JVM Collections", OOPSLA 2015

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![allow(clippy::module_name_repetitions)]

use std::time::Duration;

pub mod bitfield;
pub mod codec;
pub mod diff;
pub mod error;
pub mod hash;
pub mod node;
pub mod store;

mod hamt;
mod ops;

#[cfg(test)]
mod tests;

pub use bitfield::Bitfield;
pub use codec::{Codec, DagCborCodec};
pub use diff::diff;
pub use error::{CodecError, Error, Result, StoreError};
pub use hamt::{Hamt, Stats};
pub use hash::{IdentityHasher, KeyHasher, Sha256Hasher};
pub use node::{KeyValue, Node, Pointer, Shard};
pub use store::{Address, Blockstore, MemoryStore, StoreCheckpoint};

/// Default maximum number of entries in a bucket before it is pushed down.
pub const DEFAULT_MAX_ARRAY_WIDTH: usize = 3;

/// Default upper bound on a single block fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration options for a [`Hamt`].
///
/// Trees are only comparable (and only diffable) when built with the same
/// `max_array_width`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of key-value pairs in a bucket before it is promoted
    /// to a child node.
    pub max_array_width: usize,
    /// Deadline handed to the store for each block fetch.
    pub fetch_timeout: Duration,
}

impl Config {
    /// Checks that the configuration can build a valid tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `max_array_width` is zero.
    pub const fn validate(&self) -> Result<()> {
        if self.max_array_width == 0 {
            return Err(Error::InvalidConfig("max_array_width must be at least 1"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_array_width: DEFAULT_MAX_ARRAY_WIDTH,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}
