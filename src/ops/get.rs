//! Lookup operation: walks the digest path to find a key.

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::node::{Ctx, KeyValue, Node, Pointer};
use crate::store::Blockstore;

/// Searches for `key` in the subtree rooted at `node`.
///
/// `digest` is the full key digest; `depth` selects the byte used at this
/// level. Shards on the path are loaded and cached.
pub fn get_recursive<'a, S, H, C>(
    ctx: &Ctx<'_, S, H, C>,
    node: &'a Node,
    digest: &[u8],
    key: &str,
    depth: usize,
) -> Result<Option<&'a KeyValue>>
where
    S: Blockstore,
    C: Codec,
{
    let Some(&slot) = digest.get(depth) else {
        return Err(Error::MaxDepth { depth });
    };
    if !node.bitfield.test(slot) {
        return Ok(None);
    }

    match &node.pointers[node.bitfield.rank(slot)] {
        Pointer::Shard(shard) => {
            let child = shard.load_child(ctx)?;
            get_recursive(ctx, child, digest, key, depth + 1)
        }
        Pointer::Bucket(kvs) => Ok(kvs.iter().find(|kv| kv.key == key)),
    }
}
