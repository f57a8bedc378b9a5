//! Underflow resolution: borrowing from a sibling or merging with one
//! (spec §4.7).
//!
//! Remove uses the same postemptive strategy as insert, mirrored: the key
//! is deleted from the leaf first, and only then does the cascade climb
//! upward fixing up every node left in underflow, using the ancestor
//! guards `DescentContext` kept latched on the way down. "Fixed up" means
//! either pulling an entry from a sibling (when the sibling has one to
//! spare) or merging into a sibling (when it doesn't), with the left
//! sibling preferred as the merge target so that a page id going out of
//! existence is always the right-hand one.

use crate::key::FixedKey;
use crate::node::{InternalNodeMut, LeafNodeMut};
use crate::value::FixedValue;

/// Moves `left`'s last entry to the front of `right`, then rewrites the
/// parent separator between them to `right`'s new first key.
pub fn borrow_from_left_leaf<K: FixedKey, V: FixedValue>(
    left: &mut LeafNodeMut<'_, K, V>,
    right: &mut LeafNodeMut<'_, K, V>,
    parent: &mut InternalNodeMut<'_, K>,
    separator_index: usize,
) {
    let last = left.size() - 1;
    let key = left.key_at(last);
    let value = left.value_at(last);
    left.remove_at(last);
    right.insert_at(0, &key, &value);
    parent.set_key_at(separator_index, &right.key_at(0));
}

/// Moves `right`'s first entry to the end of `left`, then rewrites the
/// parent separator to `right`'s new first key.
pub fn borrow_from_right_leaf<K: FixedKey, V: FixedValue>(
    left: &mut LeafNodeMut<'_, K, V>,
    right: &mut LeafNodeMut<'_, K, V>,
    parent: &mut InternalNodeMut<'_, K>,
    separator_index: usize,
) {
    let key = right.key_at(0);
    let value = right.value_at(0);
    right.remove_at(0);
    left.insert_at(left.size(), &key, &value);
    parent.set_key_at(separator_index, &right.key_at(0));
}

/// Appends every entry of `right` onto `left` and relinks the leaf chain
/// around the now-empty `right`. The caller is responsible for removing
/// `right`'s separator from the parent and freeing its page.
pub fn merge_leaves<K: FixedKey, V: FixedValue>(
    left: &mut LeafNodeMut<'_, K, V>,
    right: &LeafNodeMut<'_, K, V>,
) {
    for i in 0..right.size() {
        left.insert_at(left.size(), &right.key_at(i), &right.value_at(i));
    }
    left.set_next_page_id(right.next_page_id());
}

/// Rotates `left`'s last child through the parent separator into `right`'s
/// slot 0, and pulls the old separator down as `right`'s new key at 1.
pub fn borrow_from_left_internal<K: FixedKey>(
    left: &mut InternalNodeMut<'_, K>,
    right: &mut InternalNodeMut<'_, K>,
    parent: &mut InternalNodeMut<'_, K>,
    separator_index: usize,
) {
    let last = left.size() - 1;
    let moved_child = left.child_at(last);
    let old_separator = parent.key_at(separator_index);

    right.shift_right(0);
    right.increase_size(1);
    right.set_child_at(0, moved_child);
    right.set_key_at(1, &old_separator);

    parent.set_key_at(separator_index, &left.key_at(last));
    left.remove_separator(last);
}

/// Rotates `right`'s slot-0 child through the parent separator into
/// `left`'s new last slot, and pulls the old separator down with it.
pub fn borrow_from_right_internal<K: FixedKey>(
    left: &mut InternalNodeMut<'_, K>,
    right: &mut InternalNodeMut<'_, K>,
    parent: &mut InternalNodeMut<'_, K>,
    separator_index: usize,
) {
    let moved_child = right.child_at(0);
    let old_separator = parent.key_at(separator_index);
    let new_first_key = right.key_at(1);

    left.insert_separator(left.size(), &old_separator, moved_child);
    right.shift_left(0);
    right.increase_size(-1);

    parent.set_key_at(separator_index, &new_first_key);
}

/// Pulls the parent separator down as `left`'s new key at the old
/// boundary, then appends every one of `right`'s children behind it. The
/// caller removes `right`'s separator from the parent and frees its page.
pub fn merge_internals<K: FixedKey>(
    left: &mut InternalNodeMut<'_, K>,
    right: &InternalNodeMut<'_, K>,
    separator_key: K,
) {
    let boundary = left.size();
    left.insert_separator(boundary, &separator_key, right.child_at(0));
    for i in 1..right.size() {
        left.insert_separator(left.size(), &right.key_at(i), right.child_at(i));
    }
}
