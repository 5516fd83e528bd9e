//! Node wire encoding.
//!
//! Content addressing relies on the codec being canonical: logically equal
//! nodes must encode to identical bytes.

use serde::{Deserialize, Serialize};

use crate::bitfield::Bitfield;
use crate::error::{CodecError, Error, Result};
use crate::node::{KeyValue, Node, Pointer, Shard};
use crate::store::Address;

/// Encodes nodes to bytes and back.
pub trait Codec {
    /// Encodes `node`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unflushed`] if a shard of `node` has no address.
    fn encode(&self, node: &Node) -> Result<Vec<u8>>;

    /// Decodes a node, validating its structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] on undecodable bytes and
    /// [`Error::MalformedTree`] on invariant violations.
    fn decode(&self, bytes: &[u8]) -> Result<Node>;
}

/// DAG-CBOR encoding of nodes.
///
/// Layout: `{bitfield: bytes, pointers: [{"Link": bytes} | {"Bucket": [{key, value: bytes}]}]}`,
/// where `bitfield` is the minimal big-endian form.
#[derive(Debug, Clone, Copy, Default)]
pub struct DagCborCodec;

#[derive(Serialize)]
struct NodeRef<'a> {
    #[serde(with = "serde_bytes")]
    bitfield: Vec<u8>,
    pointers: Vec<PointerRef<'a>>,
}

#[derive(Serialize)]
enum PointerRef<'a> {
    Link(Address),
    Bucket(&'a [KeyValue]),
}

#[derive(Deserialize)]
struct NodeRepr {
    #[serde(with = "serde_bytes")]
    bitfield: Vec<u8>,
    pointers: Vec<PointerRepr>,
}

#[derive(Deserialize)]
enum PointerRepr {
    Link(Address),
    Bucket(Vec<KeyValue>),
}

impl Codec for DagCborCodec {
    fn encode(&self, node: &Node) -> Result<Vec<u8>> {
        let pointers = node
            .pointers
            .iter()
            .map(|pointer| match pointer {
                Pointer::Bucket(kvs) => Ok(PointerRef::Bucket(kvs)),
                Pointer::Shard(shard) => shard
                    .address()
                    .map(PointerRef::Link)
                    .ok_or(Error::Unflushed),
            })
            .collect::<Result<Vec<_>>>()?;
        let repr = NodeRef {
            bitfield: node.bitfield.to_bytes(),
            pointers,
        };
        Ok(serde_ipld_dagcbor::to_vec(&repr).map_err(CodecError::from)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Node> {
        let repr: NodeRepr = serde_ipld_dagcbor::from_slice(bytes).map_err(CodecError::from)?;
        let bitfield = Bitfield::from_bytes(&repr.bitfield)?;
        let pointers = repr
            .pointers
            .into_iter()
            .map(|pointer| match pointer {
                PointerRepr::Link(address) => Pointer::Shard(Shard::linked(address)),
                PointerRepr::Bucket(kvs) => Pointer::Bucket(kvs),
            })
            .collect();
        Node::from_parts(bitfield, pointers)
    }
}

/// Encodes a value the way typed setters store it.
pub(crate) fn encode_value<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_ipld_dagcbor::to_vec(value).map_err(CodecError::from)?)
}

/// Decodes a value written by [`encode_value`].
pub(crate) fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    Ok(serde_ipld_dagcbor::from_slice(bytes).map_err(CodecError::from)?)
}
