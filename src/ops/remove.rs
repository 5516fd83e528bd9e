//! Removal operation: in-place delete with canonical shard collapse.

use std::mem;

use tracing::debug;

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::node::{Ctx, KeyValue, Node, Pointer};
use crate::store::Blockstore;

/// Removes `key` from the subtree rooted at `node`.
///
/// Returns the removed entry, or `None` if the key was absent (the tree is
/// then unchanged). After removing beneath a shard, the child is collapsed
/// back into a bucket whenever it holds no more than `max_array_width`
/// entries, all inline. This keeps the shape identical to a tree that never
/// held the removed key.
pub fn remove_recursive<S, H, C>(
    ctx: &Ctx<'_, S, H, C>,
    node: &mut Node,
    digest: &[u8],
    key: &str,
    depth: usize,
) -> Result<Option<KeyValue>>
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
    let pos = node.bitfield.rank(slot);

    let pointer = &mut node.pointers[pos];
    match pointer {
        Pointer::Bucket(kvs) => {
            let Some(i) = kvs.iter().position(|kv| kv.key == key) else {
                return Ok(None);
            };
            let removed = kvs.remove(i);
            if kvs.is_empty() {
                node.pointers.remove(pos);
                node.bitfield.clear(slot);
            }
            Ok(Some(removed))
        }
        Pointer::Shard(shard) => {
            let child = shard.child_mut(ctx)?;
            let Some(removed) = remove_recursive(ctx, child, digest, key, depth + 1)? else {
                return Ok(None);
            };
            let collapsed = collapse(child, ctx.config.max_array_width)?;
            shard.invalidate();
            if let Some(kvs) = collapsed {
                debug!(depth, slot, entries = kvs.len(), "collapsed shard into bucket");
                *pointer = Pointer::Bucket(kvs);
            }
            Ok(Some(removed))
        }
    }
}

/// Drains `child` into a single sorted bucket if it holds only buckets with
/// at most `width` entries in total.
///
/// A child left with a single bucket is the one-pointer case of the same
/// rule. Returns `None` and leaves `child` untouched otherwise.
fn collapse(child: &mut Node, width: usize) -> Result<Option<Vec<KeyValue>>> {
    if child.pointers.is_empty() {
        return Err(Error::MalformedTree("shard with zero pointers"));
    }

    let mut total = 0;
    for pointer in &child.pointers {
        match pointer {
            Pointer::Shard(_) => return Ok(None),
            Pointer::Bucket(kvs) => total += kvs.len(),
        }
    }
    if total > width {
        return Ok(None);
    }

    let mut merged: Vec<KeyValue> = mem::take(&mut child.pointers)
        .into_iter()
        .flat_map(|pointer| match pointer {
            Pointer::Bucket(kvs) => kvs,
            Pointer::Shard(_) => Vec::new(),
        })
        .collect();
    merged.sort_unstable_by(|a, b| a.key.cmp(&b.key));
    *child = Node::new();
    Ok(Some(merged))
}
