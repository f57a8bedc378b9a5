//! The latch-coupled ancestor path used by `insert` and `remove` (spec
//! §4.3, §4.5, §4.7, §9 "safe node" release).
//!
//! Both operations walk root-to-leaf holding a write latch on every node
//! visited. Before descending past a node, it is checked for safety:
//! "safe for insert" means it cannot possibly need to split to absorb the
//! one insertion in flight; "safe for delete" means it cannot possibly
//! underflow from the one removal in flight. Once a node proves safe,
//! every latch held above it is released, since no structural change can
//! propagate past it. The retained guards always form a contiguous suffix
//! of the descent path ending at the node currently being examined.
//!
//! The header page's latch is handled separately by the caller (spec
//! §4.5, §4.7): it is released right after `root_page_id` is read and,
//! only if the cascade reaches all the way to a root split or shrink,
//! re-acquired fresh to install the new id.

use common::api::WritePageGuard;
use std::collections::VecDeque;

/// An ordered deque of latched ancestor guards, oldest (closest to the
/// root) first.
pub struct DescentContext<'a> {
    path: VecDeque<Box<dyn WritePageGuard + 'a>>,
}

impl<'a> DescentContext<'a> {
    pub fn new() -> Self {
        Self {
            path: VecDeque::new(),
        }
    }

    pub fn push(&mut self, guard: Box<dyn WritePageGuard + 'a>) {
        self.path.push_back(guard);
    }

    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// The node currently being examined: the bottom of the path.
    pub fn current(&self) -> &(dyn WritePageGuard + 'a) {
        self.path.back().expect("descent path is empty").as_ref()
    }

    pub fn current_mut(&mut self) -> &mut (dyn WritePageGuard + 'a) {
        self.path.back_mut().expect("descent path is empty").as_mut()
    }

    /// The node one level above `current`, if still latched.
    pub fn parent_mut(&mut self) -> Option<&mut (dyn WritePageGuard + 'a)> {
        let len = self.path.len();
        if len < 2 {
            None
        } else {
            self.path.get_mut(len - 2).map(|g| g.as_mut())
        }
    }

    /// Drops every guard above `current` because `current` has just been
    /// proven safe and can absorb the in-flight operation on its own.
    pub fn release_ancestors(&mut self) {
        while self.path.len() > 1 {
            self.path.pop_front();
        }
    }

    /// Pops and returns the bottom-most guard, e.g. to hand a leaf's write
    /// guard off to a split or merge routine that replaces or frees it.
    pub fn pop(&mut self) -> Option<Box<dyn WritePageGuard + 'a>> {
        self.path.pop_back()
    }
}

impl<'a> Default for DescentContext<'a> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    // DescentContext is exercised indirectly through `BPlusTree::insert` /
    // `remove` integration tests, which are the only place a real
    // `BufferPool` is available to latch against.
}
