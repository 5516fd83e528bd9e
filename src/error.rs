//! Error types.

use std::collections::TryReserveError;
use std::convert::Infallible;

use serde_ipld_dagcbor::{DecodeError, EncodeError};
use thiserror::Error;

use crate::store::Address;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by trie operations.
///
/// A lookup miss is not an error: lookups and deletes report it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum Error {
    /// The key digest was exhausted before the key's slot was resolved.
    ///
    /// Signals a hasher/digest-length mismatch or a pathological collision
    /// chain. The operation is aborted.
    #[error("attempted to traverse hamt beyond max depth {depth}")]
    MaxDepth {
        /// Depth at which traversal stopped (equals the digest length).
        depth: usize,
    },
    /// A shard references a block the store does not hold.
    #[error("block {0} not found in store")]
    BlockNotFound(Address),
    /// Failure reported by the block store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// A node or value could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A persisted node violates the trie invariants.
    #[error("malformed tree: {0}")]
    MalformedTree(&'static str),
    /// A node with a not-yet-persisted child was handed to the codec.
    #[error("node has unflushed children")]
    Unflushed,
    /// The trie configuration is unusable.
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// Errors raised by a [`Blockstore`](crate::store::Blockstore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The fetch did not complete before its deadline.
    #[error("fetch deadline exceeded")]
    Timeout,
    /// Backend-specific failure (I/O, network, ...).
    #[error(transparent)]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Encoding failures of the DAG-CBOR codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("dag-cbor encode: {0}")]
    Encode(#[from] EncodeError<TryReserveError>),
    /// The bytes are not valid DAG-CBOR or do not match the expected shape.
    #[error("dag-cbor decode: {0}")]
    Decode(#[from] DecodeError<Infallible>),
}
