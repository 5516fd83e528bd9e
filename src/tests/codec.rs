use std::time::{Duration, Instant};

use serde::Serialize;

use super::identity_tree;
use crate::{
    Address, Bitfield, Blockstore, Codec, CodecError, DagCborCodec, Error, KeyValue, MemoryStore,
    Node, Pointer, Shard,
};

fn bucket(keys: &[&str]) -> Pointer {
    Pointer::Bucket(keys.iter().map(|k| KeyValue::new(*k, k.as_bytes())).collect())
}

fn node_with(slots: &[u8], pointers: Vec<Pointer>) -> Node {
    let mut bf = Bitfield::new();
    for &s in slots {
        bf.set(s);
    }
    Node::from_parts(bf, pointers).unwrap()
}

#[test]
fn decode_restores_encoded_node() {
    let link = Address::of(b"child");
    let node = node_with(
        &[b'a', b'z'],
        vec![bucket(&["a1", "a2"]), Pointer::Shard(Shard::linked(link))],
    );
    let bytes = DagCborCodec.encode(&node).unwrap();
    let back = DagCborCodec.decode(&bytes).unwrap();

    assert_eq!(back.bitfield(), node.bitfield());
    match back.pointers() {
        [Pointer::Bucket(kvs), Pointer::Shard(shard)] => {
            assert_eq!(kvs.len(), 2);
            assert_eq!(kvs[0], KeyValue::new("a1", "a1".as_bytes()));
            assert_eq!(shard.address(), Some(link));
            assert!(!shard.is_cached());
        }
        other => panic!("unexpected pointers {other:?}"),
    }
    assert_eq!(DagCborCodec.encode(&back).unwrap(), bytes);
}

#[test]
fn empty_node_encodes() {
    let bytes = DagCborCodec.encode(&Node::new()).unwrap();
    assert!(DagCborCodec.decode(&bytes).unwrap().is_empty());
}

#[test]
fn dirty_shard_is_unflushed() {
    let child = node_with(&[b'1'], vec![bucket(&["x"])]);
    let node = node_with(&[b'P'], vec![Pointer::Shard(Shard::dirty(child))]);
    assert!(node.is_dirty());
    assert!(matches!(DagCborCodec.encode(&node), Err(Error::Unflushed)));
}

#[test]
fn garbage_is_decode_error_with_source() {
    let err = DagCborCodec.decode(b"\xff\x00garbage").unwrap_err();
    assert!(matches!(err, Error::Codec(CodecError::Decode(_))));
    assert!(err.to_string().starts_with("dag-cbor decode"));
    assert!(std::error::Error::source(&err).is_some());
}

/// Returns the byte that follows the first occurrence of `needle`.
fn byte_after(haystack: &[u8], needle: &[u8]) -> Option<u8> {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
        .and_then(|i| haystack.get(i + needle.len()).copied())
}

#[test]
fn byte_fields_encode_as_cbor_byte_strings() {
    let node = node_with(
        &[0, 9],
        vec![
            Pointer::Bucket(vec![KeyValue::new("k", vec![0xff; 32])]),
            Pointer::Shard(Shard::linked(Address::of(b"child"))),
        ],
    );
    let bytes = DagCborCodec.encode(&node).unwrap();

    // Major type 2 (byte string): 0x40 | len for short, 0x58 len for 24..=255.
    assert_eq!(byte_after(&bytes, b"\x68bitfield"), Some(0x42));
    assert_eq!(byte_after(&bytes, b"\x65value"), Some(0x58));
    assert_eq!(byte_after(&bytes, b"\x64Link"), Some(0x58));
    assert!(bytes.windows(34).any(|w| w[..2] == [0x58, 0x20] && w[2..].iter().all(|&b| b == 0xff)));

    // 64 payload bytes plus about 55 of keys and framing; integer arrays
    // would take over 180.
    assert!(bytes.len() < 130, "encoded len {}", bytes.len());
}

#[derive(Serialize)]
struct RawNode {
    #[serde(with = "serde_bytes")]
    bitfield: Vec<u8>,
    pointers: Vec<RawPointer>,
}

#[derive(Serialize)]
enum RawPointer {
    Bucket(Vec<KeyValue>),
}

fn raw(bitfield: Vec<u8>, buckets: Vec<Vec<KeyValue>>) -> Vec<u8> {
    let node = RawNode {
        bitfield,
        pointers: buckets.into_iter().map(RawPointer::Bucket).collect(),
    };
    serde_ipld_dagcbor::to_vec(&node).unwrap()
}

#[test]
fn pointer_count_mismatch_is_malformed() {
    let bytes = raw(vec![0b11], vec![vec![KeyValue::new("a", vec![1])]]);
    assert!(matches!(DagCborCodec.decode(&bytes), Err(Error::MalformedTree(_))));
}

#[test]
fn unsorted_bucket_is_malformed() {
    let bytes = raw(
        vec![0b1],
        vec![vec![KeyValue::new("b", vec![1]), KeyValue::new("a", vec![2])]],
    );
    assert!(matches!(DagCborCodec.decode(&bytes), Err(Error::MalformedTree(_))));
}

#[test]
fn empty_bucket_is_malformed() {
    let bytes = raw(vec![0b1], vec![vec![]]);
    assert!(matches!(DagCborCodec.decode(&bytes), Err(Error::MalformedTree(_))));
}

#[test]
fn leading_zero_bitfield_is_malformed() {
    let bytes = raw(vec![0, 0b1], vec![vec![KeyValue::new("a", vec![1])]]);
    assert!(matches!(DagCborCodec.decode(&bytes), Err(Error::MalformedTree(_))));
}

#[test]
fn persisted_size_matches_stored_blocks() {
    let store = MemoryStore::new();
    let mut tree = identity_tree(&store);
    for k in ["P1", "P2", "P3", "P4", "Q"] {
        tree.set(k, vec![7]).unwrap();
    }
    tree.flush().unwrap();

    let child = match tree.root().pointer_at(b'P') {
        Some(Pointer::Shard(shard)) => shard.address().unwrap(),
        other => panic!("expected shard, got {other:?}"),
    };
    let root_len = DagCborCodec.encode(tree.root()).unwrap().len();
    let child_len = store
        .get(&child, Instant::now() + Duration::from_secs(5))
        .unwrap()
        .unwrap()
        .len();
    assert_eq!(tree.persisted_size().unwrap(), (root_len + child_len) as u64);
}
