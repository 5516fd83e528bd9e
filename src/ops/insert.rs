//! Insertion operation: in-place set with bucket overflow promotion.

use std::mem;

use tracing::debug;

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::hash::KeyHasher;
use crate::node::{Ctx, KeyValue, Node, Pointer, Shard};
use crate::store::Blockstore;

/// Sets `entry` in the subtree rooted at `node`.
///
/// Returns the previous value if the key was already present.
///
/// A full bucket is promoted to a shard: a fresh child is built from the
/// bucket's entries plus `entry`, one level deeper, and left unpersisted
/// until the next flush. The parent slot is only replaced once the child
/// has been built, so a [`MaxDepth`](Error::MaxDepth) during promotion
/// leaves this node unchanged.
pub fn insert_recursive<S, H, C>(
    ctx: &Ctx<'_, S, H, C>,
    node: &mut Node,
    digest: &[u8],
    entry: KeyValue,
    depth: usize,
) -> Result<Option<Vec<u8>>>
where
    S: Blockstore,
    H: KeyHasher,
    C: Codec,
{
    let Some(&slot) = digest.get(depth) else {
        return Err(Error::MaxDepth { depth });
    };
    let pos = node.bitfield.rank(slot);

    if !node.bitfield.test(slot) {
        // Empty slot → new single-entry bucket.
        node.bitfield.set(slot);
        node.pointers.insert(pos, Pointer::Bucket(vec![entry]));
        return Ok(None);
    }

    let pointer = &mut node.pointers[pos];
    match pointer {
        Pointer::Shard(shard) => {
            let child = shard.child_mut(ctx)?;
            let old = insert_recursive(ctx, child, digest, entry, depth + 1)?;
            shard.invalidate();
            Ok(old)
        }
        Pointer::Bucket(kvs) => match kvs.binary_search_by(|kv| kv.key.cmp(&entry.key)) {
            Ok(i) => Ok(Some(mem::replace(&mut kvs[i].value, entry.value))),
            Err(i) if kvs.len() < ctx.config.max_array_width => {
                kvs.insert(i, entry);
                Ok(None)
            }
            Err(_) => {
                let child = promote(ctx, kvs, entry, depth + 1)?;
                debug!(depth, slot, "promoted bucket to shard");
                *pointer = Pointer::Shard(Shard::dirty(child));
                Ok(None)
            }
        },
    }
}

/// Builds the child node that replaces a full bucket.
fn promote<S, H, C>(
    ctx: &Ctx<'_, S, H, C>,
    kvs: &[KeyValue],
    entry: KeyValue,
    depth: usize,
) -> Result<Node>
where
    S: Blockstore,
    H: KeyHasher,
    C: Codec,
{
    let mut child = Node::new();
    for kv in kvs.iter().cloned().chain(std::iter::once(entry)) {
        let digest = ctx.digest(&kv.key);
        insert_recursive(ctx, &mut child, digest.as_ref(), kv, depth)?;
    }
    Ok(child)
}
