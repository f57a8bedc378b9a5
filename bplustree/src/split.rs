//! Node splitting (spec §4.5, §4.6).
//!
//! Insert uses a postemptive strategy: the new entry goes into the leaf
//! first, and only then does the cascade climb upward splitting every
//! full ancestor it meets, stopping as soon as a parent has room to absorb
//! the promoted separator or the cascade reaches the root and the tree
//! grows a level. The ancestor guards needed for that climb are exactly
//! the ones `DescentContext` kept latched on the way down.
//!
//! Splits are right-biased: the new sibling takes the upper half of the
//! entries. This keeps the left (original) page id stable across a split
//! and avoids rewriting whoever already holds a reference to it.

use crate::key::FixedKey;
use crate::node::{InternalNodeMut, LeafNodeMut};
use crate::value::FixedValue;
use common::api::PageId;

/// Splits a full leaf in place. `left` keeps entries `[0, mid)`, `right`
/// (a freshly allocated, currently-empty leaf) receives `[mid, size)`, and
/// the leaf chain is relinked `left -> right -> left.old_next`.
///
/// Returns the separator key to insert into the parent: the first key now
/// in `right`, which becomes the lower bound of the right subtree.
pub fn split_leaf<K: FixedKey, V: FixedValue>(
    left: &mut LeafNodeMut<'_, K, V>,
    right: &mut LeafNodeMut<'_, K, V>,
    right_page_id: PageId,
) -> K {
    let size = left.size();
    let mid = size / 2;

    right.init(left.max_size() as u16);
    for i in mid..size {
        right.insert_at(i - mid, &left.key_at(i), &left.value_at(i));
    }

    right.set_next_page_id(left.next_page_id());
    left.set_next_page_id(right_page_id);

    for i in (mid..size).rev() {
        left.remove_at(i);
    }

    right.key_at(0)
}

/// Splits a full internal node in place. `left` keeps separators
/// `[0, mid)`, `right` receives `[mid, size)` renumbered so the first
/// moved separator becomes `right`'s slot-0 sentinel child.
///
/// Returns the separator key promoted to the parent: the key that used to
/// sit at `mid`, which is consumed (neither child keeps a copy of it),
/// matching the half-open routing invariant where routing is purely by
/// child pointer at the sentinel slot.
pub fn split_internal<K: FixedKey>(
    left: &mut InternalNodeMut<'_, K>,
    right: &mut InternalNodeMut<'_, K>,
) -> K {
    let size = left.size();
    let mid = size / 2;
    let promoted = left.key_at(mid);

    right.init(left.max_size() as u16);
    right.increase_size(1);
    right.set_child_0(left.child_at(mid));
    for i in (mid + 1)..size {
        right.insert_separator(i - mid, &left.key_at(i), left.child_at(i));
    }

    debug_assert!(mid >= 1, "internal split point must leave slot 0 behind");
    for i in (mid..size).rev() {
        left.remove_separator(i);
    }

    promoted
}
