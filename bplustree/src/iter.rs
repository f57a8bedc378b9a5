//! A forward-only cursor over leaves (spec §4.8).
//!
//! The cursor holds at most one read latch on its current leaf between
//! `advance` calls; crossing into the next leaf releases the old latch
//! before taking the new one. It does not coordinate with writers beyond
//! that per-leaf latch. A concurrent merge can free a leaf the cursor has
//! already moved past, which is fine, since by then the cursor no longer
//! references it (spec §5, iterator invalidation).

use crate::key::FixedKey;
use crate::node::LeafNode;
use crate::value::FixedValue;
use common::api::{BufferPool, ReadPageGuard, INVALID_PAGE_ID};
use std::marker::PhantomData;

enum State<'a> {
    End,
    At {
        guard: Box<dyn ReadPageGuard + 'a>,
        slot: usize,
    },
}

/// A live position in the tree's leaf chain. Borrows the buffer pool for
/// as long as it's held, so a cursor cannot outlive the tree it was taken
/// from.
pub struct Cursor<'a, K, V> {
    pool: &'a dyn BufferPool,
    state: State<'a>,
    _marker: PhantomData<(K, V)>,
}

impl<'a, K: FixedKey, V: FixedValue> Cursor<'a, K, V> {
    pub(crate) fn end(pool: &'a dyn BufferPool) -> Self {
        Self {
            pool,
            state: State::End,
            _marker: PhantomData,
        }
    }

    pub(crate) fn at(pool: &'a dyn BufferPool, guard: Box<dyn ReadPageGuard + 'a>, slot: usize) -> Self {
        Self {
            pool,
            state: State::At { guard, slot },
            _marker: PhantomData,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self.state, State::End)
    }

    /// The `(key, value)` at the cursor's current position, or `None` at
    /// the end sentinel.
    pub fn current(&self) -> Option<(K, V)> {
        match &self.state {
            State::End => None,
            State::At { guard, slot } => {
                let leaf = LeafNode::<K, V>::new(guard);
                Some((leaf.key_at(*slot), leaf.value_at(*slot)))
            }
        }
    }

    /// Moves to the next entry, crossing into the next leaf if the
    /// current one is exhausted.
    pub fn advance(&mut self) {
        let (cross, next_slot) = match &self.state {
            State::End => return,
            State::At { guard, slot } => {
                let leaf = LeafNode::<K, V>::new(guard);
                if slot + 1 < leaf.size() {
                    (None, slot + 1)
                } else {
                    (Some(leaf.next_page_id()), 0)
                }
            }
        };

        match cross {
            None => {
                if let State::At { slot, .. } = &mut self.state {
                    *slot = next_slot;
                }
            }
            Some(next_id) if next_id == INVALID_PAGE_ID => {
                self.state = State::End;
            }
            Some(next_id) => {
                let guard = self
                    .pool
                    .fetch_read(next_id)
                    .unwrap_or_else(|e| panic!("leaf page {next_id} unreachable: {e}"));
                self.state = State::At { guard, slot: next_slot };
            }
        }
    }
}

impl<'a, K: FixedKey, V: FixedValue> PartialEq for Cursor<'a, K, V> {
    /// Two cursors are equal iff both are the end sentinel or both name
    /// the same leaf and slot (spec §4.8 `eq`).
    fn eq(&self, other: &Self) -> bool {
        match (&self.state, &other.state) {
            (State::End, State::End) => true,
            (State::At { guard: g1, slot: s1 }, State::At { guard: g2, slot: s2 }) => g1.page_id() == g2.page_id() && s1 == s2,
            _ => false,
        }
    }
}

impl<'a, K: FixedKey, V: FixedValue> Eq for Cursor<'a, K, V> {}

impl<'a, K: FixedKey, V: FixedValue> Iterator for Cursor<'a, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.current();
        if item.is_some() {
            self.advance();
        }
        item
    }
}
