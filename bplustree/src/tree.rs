//! The disk-resident, concurrent B+ tree itself (spec §6.2).
//!
//! `BPlusTree<K, V, C>` owns nothing but a handle to a buffer pool, a
//! comparator, and the two fanout constants; every byte of actual state
//! lives in pages fetched through `pool`. All three public mutators
//! (`get`, `insert`, `remove`) crab-latch their way down from the header
//! page, matching the protocol in spec §5.
//!
//! Failures surfaced by the buffer pool (no free frames, an unreadable
//! page) propagate to the caller as `BpmError` (spec §7); they are a
//! distinct channel from the `bool` domain outcomes (`insert` on a
//! duplicate key, `get`/`remove` of an absent one). Internal consistency
//! violations (a corrupt discriminant byte, a parent whose child pointer
//! doesn't actually lead back to it) are treated as fatal and panic,
//! since continuing risks persisting a broken tree.

use crate::descent::DescentContext;
use crate::header;
use crate::iter::Cursor;
use crate::key::{FixedKey, KeyComparator};
use crate::layout::{self, NodeKind};
use crate::node::{InternalNode, InternalNodeMut, LeafNode, LeafNodeMut};
use crate::split;
use crate::value::FixedValue;
use common::api::{BpmError, BufferPool, PageId, WritePageGuard, INVALID_PAGE_ID};
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;

/// A named, page-backed B+ tree index over keys `K` mapping to values `V`,
/// ordered by the externally supplied comparator `C`.
pub struct BPlusTree<K, V, C> {
    name: String,
    header_page_id: PageId,
    pool: Arc<dyn BufferPool>,
    comparator: C,
    leaf_max_size: u16,
    internal_max_size: u16,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, C> BPlusTree<K, V, C>
where
    K: FixedKey,
    V: FixedValue,
    C: KeyComparator<K>,
{
    /// Creates a tree rooted at `header_page_id`, which must already be
    /// allocated (e.g. via `pool.new_page()`). The header page's
    /// `root_page_id` is reset to `INVALID` as part of construction.
    pub fn new(
        name: impl Into<String>,
        header_page_id: PageId,
        pool: Arc<dyn BufferPool>,
        comparator: C,
        leaf_max_size: u16,
        internal_max_size: u16,
    ) -> Result<Self, BpmError> {
        let name = name.into();
        let mut header_guard = pool.fetch_write(header_page_id)?;
        header::init(&mut header_guard);
        drop(header_guard);
        tracing::debug!(tree = %name, header_page_id, leaf_max_size, internal_max_size, "index created");
        Ok(Self {
            name,
            header_page_id,
            pool,
            comparator,
            leaf_max_size,
            internal_max_size,
            _marker: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    fn cmp(&self) -> &dyn KeyComparator<K> {
        &self.comparator
    }

    pub fn root_page_id(&self) -> Result<PageId, BpmError> {
        let header_guard = self.pool.fetch_read(self.header_page_id)?;
        Ok(header::root_page_id(&header_guard))
    }

    pub fn is_empty(&self) -> Result<bool, BpmError> {
        Ok(self.root_page_id()? == INVALID_PAGE_ID)
    }

    /// Appends the value stored under `key`, if any, to `result`. Keys are
    /// unique, so at most one value is ever appended.
    pub fn get(&self, key: &K, result: &mut Vec<V>) -> Result<bool, BpmError> {
        let header_guard = self.pool.fetch_read(self.header_page_id)?;
        let root_page_id = header::root_page_id(&header_guard);
        if root_page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let mut current = self.pool.fetch_read(root_page_id)?;
        drop(header_guard);

        loop {
            match layout::kind(&current) {
                NodeKind::Internal => {
                    let node = InternalNode::<K>::new(&current);
                    let child_id = node.child_at(node.find_child_index(key, self.cmp()));
                    current = self.pool.fetch_read(child_id)?;
                }
                NodeKind::Leaf => {
                    let node = LeafNode::<K, V>::new(&current);
                    let pos = node.find(key, self.cmp());
                    if pos >= 0 && self.comparator.compare(&node.key_at(pos as usize), key) == Ordering::Equal {
                        result.push(node.value_at(pos as usize));
                        return Ok(true);
                    }
                    return Ok(false);
                }
            }
        }
    }

    /// Inserts `(key, value)`. Returns `false` without mutating the tree if
    /// `key` is already present.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool, BpmError> {
        let mut header_guard = self.pool.fetch_write(self.header_page_id)?;
        let root_page_id = header::root_page_id(&header_guard);

        if root_page_id == INVALID_PAGE_ID {
            let basic = self.pool.new_page()?;
            let mut root_guard = self.pool.upgrade_write(basic)?;
            let root_id = root_guard.page_id();
            {
                let mut leaf = LeafNodeMut::<K, V>::new(&mut root_guard);
                leaf.init(self.leaf_max_size);
                leaf.insert_at(0, key, value);
            }
            header::set_root_page_id(&mut header_guard, root_id);
            tracing::debug!(tree = %self.name, page_id = root_id, "created tree root leaf");
            return Ok(true);
        }

        drop(header_guard);

        let mut ctx = DescentContext::new();
        let mut current_id = root_page_id;
        let mut current = self.pool.fetch_write(current_id)?;

        loop {
            match layout::kind(&current) {
                NodeKind::Internal => {
                    let safe = InternalNode::<K>::new(&current).is_safe_for_insert();
                    ctx.push(current);
                    if safe {
                        ctx.release_ancestors();
                    }
                    let node = InternalNode::<K>::new(ctx.current());
                    current_id = node.child_at(node.find_child_index(key, self.cmp()));
                    current = self.pool.fetch_write(current_id)?;
                }
                NodeKind::Leaf => {
                    let mut leaf = LeafNodeMut::<K, V>::new(&mut current);
                    let pos = leaf.find(key, self.cmp());
                    if pos >= 0 && self.comparator.compare(&leaf.key_at(pos as usize), key) == Ordering::Equal {
                        return Ok(false);
                    }
                    let insert_pos = (pos + 1) as usize;
                    leaf.insert_at(insert_pos, key, value);
                    break;
                }
            }
        }

        self.split_cascade(ctx, current, current_id)?;
        Ok(true)
    }

    /// Splits `child_guard` (a leaf on the first call) and every full
    /// ancestor it bubbles up into, until either a parent has room or the
    /// cascade reaches the root, in which case the tree grows a level
    /// (spec §4.5, §4.6).
    fn split_cascade(&self, mut ctx: DescentContext<'_>, mut child_guard: Box<dyn WritePageGuard + '_>, mut child_id: PageId) -> Result<(), BpmError> {
        let mut child_is_leaf = layout::kind(&child_guard) == NodeKind::Leaf;

        loop {
            let needs_split = if child_is_leaf {
                LeafNode::<K, V>::new(&child_guard).is_full()
            } else {
                InternalNode::<K>::new(&child_guard).is_full()
            };
            if !needs_split {
                return Ok(());
            }

            let basic = self.pool.new_page()?;
            let mut right_guard = self.pool.upgrade_write(basic)?;
            let right_id = right_guard.page_id();

            let separator = if child_is_leaf {
                let mut left = LeafNodeMut::<K, V>::new(&mut child_guard);
                let mut right = LeafNodeMut::<K, V>::new(&mut right_guard);
                split::split_leaf(&mut left, &mut right, right_id)
            } else {
                let mut left = InternalNodeMut::<K>::new(&mut child_guard);
                let mut right = InternalNodeMut::<K>::new(&mut right_guard);
                split::split_internal(&mut left, &mut right)
            };
            tracing::trace!(tree = %self.name, left = child_id, right = right_id, "split node");
            drop(right_guard);
            drop(child_guard);

            match ctx.pop() {
                Some(mut parent_guard) => {
                    let mut parent = InternalNodeMut::<K>::new(&mut parent_guard);
                    let left_index = parent.find_child_index(&separator, self.cmp());
                    parent.insert_separator(left_index + 1, &separator, right_id);
                    child_guard = parent_guard;
                    child_id = child_guard.page_id();
                    child_is_leaf = false;
                }
                None => {
                    let basic = self.pool.new_page()?;
                    let mut new_root_guard = self.pool.upgrade_write(basic)?;
                    let new_root_id = new_root_guard.page_id();
                    {
                        let mut new_root = InternalNodeMut::<K>::new(&mut new_root_guard);
                        new_root.init(self.internal_max_size);
                        new_root.increase_size(1);
                        new_root.set_child_0(child_id);
                        new_root.insert_separator(1, &separator, right_id);
                    }
                    let mut header_guard = self.pool.fetch_write(self.header_page_id)?;
                    header::set_root_page_id(&mut header_guard, new_root_id);
                    tracing::debug!(tree = %self.name, old_root = child_id, new_root = new_root_id, "tree grew a level");
                    return Ok(());
                }
            }
        }
    }

    /// Removes `key`. A no-op if `key` is absent.
    pub fn remove(&self, key: &K) -> Result<(), BpmError> {
        let header_guard = self.pool.fetch_write(self.header_page_id)?;
        let root_page_id = header::root_page_id(&header_guard);
        if root_page_id == INVALID_PAGE_ID {
            return Ok(());
        }
        drop(header_guard);

        let mut ctx = DescentContext::new();
        let mut current_id = root_page_id;
        let mut current = self.pool.fetch_write(current_id)?;

        loop {
            match layout::kind(&current) {
                NodeKind::Internal => {
                    let safe = InternalNode::<K>::new(&current).is_safe_for_delete();
                    ctx.push(current);
                    if safe {
                        ctx.release_ancestors();
                    }
                    let node = InternalNode::<K>::new(ctx.current());
                    current_id = node.child_at(node.find_child_index(key, self.cmp()));
                    current = self.pool.fetch_write(current_id)?;
                }
                NodeKind::Leaf => {
                    let mut leaf = LeafNodeMut::<K, V>::new(&mut current);
                    let pos = leaf.find(key, self.cmp());
                    if pos < 0 || self.comparator.compare(&leaf.key_at(pos as usize), key) != Ordering::Equal {
                        return Ok(());
                    }
                    leaf.remove_at(pos as usize);
                    break;
                }
            }
        }

        self.underflow_cascade(ctx, current, current_id)
    }

    /// Resolves underflow in `node_guard` and every ancestor a merge
    /// bubbles it into, by borrowing from or merging with a sibling (spec
    /// §4.7), then shrinks the root if the cascade reached it.
    fn underflow_cascade(&self, mut ctx: DescentContext<'_>, mut node_guard: Box<dyn WritePageGuard + '_>, mut node_id: PageId) -> Result<(), BpmError> {
        let mut node_is_leaf = layout::kind(&node_guard) == NodeKind::Leaf;

        loop {
            let underflow = if node_is_leaf {
                LeafNode::<K, V>::new(&node_guard).is_underflow()
            } else {
                InternalNode::<K>::new(&node_guard).is_underflow()
            };
            if !underflow {
                return self.finish_remove(ctx, node_guard, node_is_leaf);
            }

            let mut parent_guard = match ctx.pop() {
                Some(p) => p,
                None => return self.shrink_root_if_needed(node_guard, node_is_leaf),
            };

            let parent_size = InternalNode::<K>::new(&parent_guard).size();
            let self_index = (0..parent_size)
                .find(|&i| InternalNode::<K>::new(&parent_guard).child_at(i) == node_id)
                .expect("parent-child link inconsistent");

            let (node_is_left, sibling_index, separator_index) = if self_index > 0 {
                (false, self_index - 1, self_index)
            } else {
                (true, self_index + 1, self_index + 1)
            };
            let sibling_id = InternalNode::<K>::new(&parent_guard).child_at(sibling_index);
            let mut sibling_guard = self.pool.fetch_write(sibling_id)?;

            let sibling_has_spare = if node_is_leaf {
                LeafNode::<K, V>::new(&sibling_guard).is_safe_for_delete()
            } else {
                InternalNode::<K>::new(&sibling_guard).is_safe_for_delete()
            };

            let mut merged = false;
            if sibling_has_spare {
                self.resolve_by_borrow(
                    node_is_leaf,
                    node_is_left,
                    &mut node_guard,
                    &mut sibling_guard,
                    &mut parent_guard,
                    separator_index,
                );
                drop(sibling_guard);
            } else {
                let separator_key = InternalNode::<K>::new(&parent_guard).key_at(separator_index);
                let survivor_id = self.resolve_by_merge(
                    node_is_leaf,
                    node_is_left,
                    node_id,
                    sibling_id,
                    &mut node_guard,
                    &mut sibling_guard,
                    separator_key,
                );
                {
                    let mut parent = InternalNodeMut::<K>::new(&mut parent_guard);
                    parent.remove_separator(separator_index);
                }
                tracing::trace!(tree = %self.name, survivor = survivor_id, "merged node");
                if survivor_id == node_id {
                    drop(sibling_guard);
                } else {
                    node_guard = sibling_guard;
                }
                merged = true;
            }

            if merged {
                node_id = parent_guard.page_id();
                node_guard = parent_guard;
                node_is_leaf = false;
            } else {
                drop(parent_guard);
                return self.finish_remove(ctx, node_guard, node_is_leaf);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_by_borrow<'a>(
        &self,
        node_is_leaf: bool,
        node_is_left: bool,
        node_guard: &mut Box<dyn WritePageGuard + 'a>,
        sibling_guard: &mut Box<dyn WritePageGuard + 'a>,
        parent_guard: &mut Box<dyn WritePageGuard + 'a>,
        separator_index: usize,
    ) {
        use crate::merge::{
            borrow_from_left_internal, borrow_from_left_leaf, borrow_from_right_internal, borrow_from_right_leaf,
        };

        let (left_guard, right_guard) = if node_is_left {
            (node_guard, sibling_guard)
        } else {
            (sibling_guard, node_guard)
        };

        if node_is_leaf {
            let mut left = LeafNodeMut::<K, V>::new(left_guard.as_mut());
            let mut right = LeafNodeMut::<K, V>::new(right_guard.as_mut());
            let mut parent = InternalNodeMut::<K>::new(parent_guard.as_mut());
            if node_is_left {
                borrow_from_right_leaf(&mut left, &mut right, &mut parent, separator_index);
            } else {
                borrow_from_left_leaf(&mut left, &mut right, &mut parent, separator_index);
            }
        } else {
            let mut left = InternalNodeMut::<K>::new(left_guard.as_mut());
            let mut right = InternalNodeMut::<K>::new(right_guard.as_mut());
            let mut parent = InternalNodeMut::<K>::new(parent_guard.as_mut());
            if node_is_left {
                borrow_from_right_internal(&mut left, &mut right, &mut parent, separator_index);
            } else {
                borrow_from_left_internal(&mut left, &mut right, &mut parent, separator_index);
            }
        }
    }

    /// Merges `node` and `sibling` into whichever of the two is the
    /// left-hand one, and returns the surviving page id.
    #[allow(clippy::too_many_arguments)]
    fn resolve_by_merge<'a>(
        &self,
        node_is_leaf: bool,
        node_is_left: bool,
        node_id: PageId,
        sibling_id: PageId,
        node_guard: &mut Box<dyn WritePageGuard + 'a>,
        sibling_guard: &mut Box<dyn WritePageGuard + 'a>,
        separator_key: K,
    ) -> PageId {
        use crate::merge::{merge_internals, merge_leaves};

        if node_is_leaf {
            if node_is_left {
                let mut left = LeafNodeMut::<K, V>::new(node_guard.as_mut());
                let right = LeafNodeMut::<K, V>::new(sibling_guard.as_mut());
                merge_leaves(&mut left, &right);
                node_id
            } else {
                let mut left = LeafNodeMut::<K, V>::new(sibling_guard.as_mut());
                let right = LeafNodeMut::<K, V>::new(node_guard.as_mut());
                merge_leaves(&mut left, &right);
                sibling_id
            }
        } else if node_is_left {
            let mut left = InternalNodeMut::<K>::new(node_guard.as_mut());
            let right = InternalNodeMut::<K>::new(sibling_guard.as_mut());
            merge_internals(&mut left, &right, separator_key);
            node_id
        } else {
            let mut left = InternalNodeMut::<K>::new(sibling_guard.as_mut());
            let right = InternalNodeMut::<K>::new(node_guard.as_mut());
            merge_internals(&mut left, &right, separator_key);
            sibling_id
        }
    }

    fn finish_remove(&self, ctx: DescentContext<'_>, node_guard: Box<dyn WritePageGuard + '_>, node_is_leaf: bool) -> Result<(), BpmError> {
        if ctx.is_empty() {
            self.shrink_root_if_needed(node_guard, node_is_leaf)
        } else {
            Ok(())
        }
    }

    /// A cursor positioned at the smallest key in the tree, or the end
    /// sentinel if the tree is empty (spec §4.8 `begin()`).
    pub fn begin(&self) -> Result<Cursor<'_, K, V>, BpmError> {
        let header_guard = self.pool.fetch_read(self.header_page_id)?;
        let root_page_id = header::root_page_id(&header_guard);
        if root_page_id == INVALID_PAGE_ID {
            return Ok(Cursor::end(self.pool.as_ref()));
        }

        let mut current = self.pool.fetch_read(root_page_id)?;
        drop(header_guard);

        loop {
            match layout::kind(&current) {
                NodeKind::Internal => {
                    let child_id = InternalNode::<K>::new(&current).child_at(0);
                    current = self.pool.fetch_read(child_id)?;
                }
                NodeKind::Leaf => {
                    if LeafNode::<K, V>::new(&current).size() == 0 {
                        return Ok(Cursor::end(self.pool.as_ref()));
                    }
                    return Ok(Cursor::at(self.pool.as_ref(), current, 0));
                }
            }
        }
    }

    /// A cursor positioned at the smallest slot whose key is `>= key`,
    /// scanning forward through leaves if necessary (spec §4.8 `begin(k)`).
    pub fn begin_at(&self, key: &K) -> Result<Cursor<'_, K, V>, BpmError> {
        let header_guard = self.pool.fetch_read(self.header_page_id)?;
        let root_page_id = header::root_page_id(&header_guard);
        if root_page_id == INVALID_PAGE_ID {
            return Ok(Cursor::end(self.pool.as_ref()));
        }

        let mut current = self.pool.fetch_read(root_page_id)?;
        drop(header_guard);

        loop {
            match layout::kind(&current) {
                NodeKind::Internal => {
                    let node = InternalNode::<K>::new(&current);
                    let child_id = node.child_at(node.find_child_index(key, self.cmp()));
                    current = self.pool.fetch_read(child_id)?;
                }
                NodeKind::Leaf => {
                    let mut leaf_guard = current;
                    loop {
                        let leaf = LeafNode::<K, V>::new(&leaf_guard);
                        let mut slot = 0;
                        while slot < leaf.size() && self.comparator.compare(&leaf.key_at(slot), key) == Ordering::Less {
                            slot += 1;
                        }
                        if slot < leaf.size() {
                            return Ok(Cursor::at(self.pool.as_ref(), leaf_guard, slot));
                        }
                        let next_id = leaf.next_page_id();
                        if next_id == INVALID_PAGE_ID {
                            return Ok(Cursor::end(self.pool.as_ref()));
                        }
                        leaf_guard = self.pool.fetch_read(next_id)?;
                    }
                }
            }
        }
    }

    /// The end sentinel cursor (spec §4.8 `end()`).
    pub fn end(&self) -> Cursor<'_, K, V> {
        Cursor::end(self.pool.as_ref())
    }

    /// Spec §4.7 root shrink: collapses a single-child internal root, or
    /// clears `root_page_id` when the root leaf has emptied out.
    fn shrink_root_if_needed(&self, root_guard: Box<dyn WritePageGuard + '_>, root_is_leaf: bool) -> Result<(), BpmError> {
        let new_root_id = if root_is_leaf {
            if LeafNode::<K, V>::new(&root_guard).size() == 0 {
                Some(INVALID_PAGE_ID)
            } else {
                None
            }
        } else {
            let node = InternalNode::<K>::new(&root_guard);
            if node.size() == 1 {
                Some(node.child_at(0))
            } else {
                None
            }
        };

        if let Some(new_root_id) = new_root_id {
            let mut header_guard = self.pool.fetch_write(self.header_page_id)?;
            let old_root_id = root_guard.page_id();
            header::set_root_page_id(&mut header_guard, new_root_id);
            tracing::debug!(tree = %self.name, old_root = old_root_id, new_root = new_root_id, "tree shrank a level");
        }
        Ok(())
    }
}
