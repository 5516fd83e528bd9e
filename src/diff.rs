//! Change detection between two persisted trees.
//!
//! Only additions and value changes are reported: a key present in the
//! existing tree but absent from the new one does not appear in the result.

use tracing::debug;

use crate::codec::Codec;
use crate::error::Result;
use crate::hash::KeyHasher;
use crate::hamt::Hamt;
use crate::node::{self, Ctx, KeyValue, Node, Pointer};
use crate::ops::get::get_recursive;
use crate::store::{Address, Blockstore};

/// Returns the entries of `new` that are absent from `existing` or hold a
/// different value there.
///
/// Both roots are compared slot by slot (by digest byte, not by compacted
/// array position). A slot whose two sides are shards with the same address
/// is skipped without loading it. Entries of every other slot are looked up
/// from the root of `existing`, since the same key may sit at a shallower
/// depth on that side.
///
/// Each tree is read through its own context, so the two may live in
/// different stores.
pub(crate) fn find_new<S, H, C>(
    existing_ctx: &Ctx<'_, S, H, C>,
    existing: &Node,
    new_ctx: &Ctx<'_, S, H, C>,
    new: &Node,
) -> Result<Vec<KeyValue>>
where
    S: Blockstore,
    H: KeyHasher,
    C: Codec,
{
    let mut out = Vec::new();
    let mut candidates = Vec::new();

    for (slot, new_pointer) in new.bitfield.iter_ones().zip(&new.pointers) {
        let old_pointer = existing.pointer_at(slot);
        if let (Some(Pointer::Shard(old)), Pointer::Shard(cur)) = (old_pointer, new_pointer)
            && old.address().is_some()
            && old.address() == cur.address()
        {
            continue;
        }

        candidates.clear();
        node::collect_pointer(new_pointer, new_ctx, &mut candidates)?;

        if old_pointer.is_none() {
            out.extend(candidates.iter().map(|kv| (*kv).clone()));
            continue;
        }
        for kv in &candidates {
            let digest = existing_ctx.digest(&kv.key);
            match get_recursive(existing_ctx, existing, digest.as_ref(), &kv.key, 0)? {
                Some(old) if old.value == kv.value => {}
                _ => out.push((*kv).clone()),
            }
        }
    }

    debug!(entries = out.len(), "diff complete");
    Ok(out)
}

/// Loads two persisted roots from `store` and returns the entries new or
/// changed in `new` relative to `existing`.
///
/// Identical addresses short-circuit to an empty result.
///
/// # Errors
///
/// Propagates store and codec failures, and [`MaxDepth`](crate::Error::MaxDepth)
/// if the trees were built with a longer digest than the default hasher's.
pub fn diff<S: Blockstore>(store: S, existing: &Address, new: &Address) -> Result<Vec<KeyValue>> {
    if existing == new {
        debug!(address = %new, "diff of identical roots");
        return Ok(Vec::new());
    }
    let existing = Hamt::load(&store, existing)?;
    let new = Hamt::load(&store, new)?;
    existing.find_new(&new)
}
