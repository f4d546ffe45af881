//! A non-blocking leaf-oriented binary search tree.
//!
//! Keys live in the leaves. Internal nodes only route searches, and every
//! internal node has exactly two children. An insert replaces a leaf with a
//! three-node subtree, and a delete removes a leaf together with its parent.
//! Both are multi-node changes made from single-word CASes: the operation
//! first flags the node(s) it is about to modify with a descriptor that
//! records everything needed to finish it, then performs the child swap,
//! then clears the flag. Any thread that runs into a flagged node finishes
//! that operation before retrying its own, so no thread ever waits on
//! another.
//!
//! Memory is managed with epoch-based reclamation. All operations take a
//! [`Guard`]. Unlinked nodes and replaced records are destroyed two grace
//! periods after they are retired.

mod cursor;
pub mod node;
mod traversal;
pub mod update;

use std::cmp::max;
use std::sync::atomic::{AtomicIsize, Ordering};

use crossbeam_ebr::{unprotected, Atomic, Guard, Owned, Shared};
use tracing::{debug, trace};

use self::cursor::{internal, Cursor};
pub use self::node::{Internal, Node};
use self::update::{
    discard_delete, discard_insert, load, retire, DeleteInfo, InsertInfo, Update, UpdateTag,
};
use crate::concurrent_set::ConcurrentSet;
use crate::debug_delay;
use crate::error::{Result, TreeError};

/// A lock-free ordered set over keys strictly between two sentinel bounds.
///
/// The tree does not rebalance; its shape depends on the order of updates.
pub struct EFRBTree<K> {
    root: Atomic<Node<K>>,
    min: K,
    max: K,
    size: AtomicIsize,
}

impl<K> EFRBTree<K>
where
    K: Ord + Clone,
{
    /// Creates an empty tree whose members must lie strictly between `min`
    /// and `max`.
    pub fn new(min: K, max: K) -> Result<Self> {
        if min >= max {
            return Err(TreeError::InvalidBounds);
        }
        debug!("creating tree");
        Ok(Self {
            root: Atomic::new(Node::internal(
                max.clone(),
                Node::sentinel(min.clone()),
                Node::sentinel(max.clone()),
            )),
            min,
            max,
            size: AtomicIsize::new(0),
        })
    }

    /// The configured `(min, max)` sentinel keys.
    pub fn bounds(&self) -> (&K, &K) {
        (&self.min, &self.max)
    }

    /// Number of members.
    ///
    /// An insert counts itself after its splice, so a delete of the same key
    /// may be counted first. Such transient negatives are reported as zero.
    pub fn len(&self) -> usize {
        max(self.size.load(Ordering::Acquire), 0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn in_bounds(&self, key: &K) -> bool {
        &self.min < key && key < &self.max
    }

    fn check_bounds(&self, key: &K) -> Result<()> {
        if self.in_bounds(key) {
            Ok(())
        } else {
            Err(TreeError::KeyOutOfBounds)
        }
    }

    pub fn find(&self, key: &K, guard: &Guard) -> bool {
        if !self.in_bounds(key) {
            return false;
        }
        let mut cursor = Cursor::new(self.root.load(Ordering::Acquire, guard));
        cursor.search(key, guard);
        cursor.leaf().key() == key
    }

    /// Adds `key`. Returns `Ok(false)` if it is already present.
    pub fn insert(&self, key: K, guard: &Guard) -> Result<bool> {
        self.check_bounds(&key)?;
        loop {
            let mut cursor = Cursor::new(self.root.load(Ordering::Acquire, guard));
            cursor.search(&key, guard);
            let l_node = cursor.leaf();
            let p_node = cursor.parent();

            if *l_node.key() == key {
                return Ok(false);
            }
            if UpdateTag::of(cursor.pupdate) != UpdateTag::CLEAN {
                self.help(cursor.pupdate, guard);
                continue;
            }

            let new = Node::leaf(key.clone());
            let new_sibling = l_node.duplicate_leaf();
            let (left, right) = if key < *l_node.key() {
                (new, new_sibling)
            } else {
                (new_sibling, new)
            };
            let new_internal = Owned::new(Node::internal(
                // key field max(k, l → key)
                right.key().clone(),
                // the one with the smaller key is the left child
                left,
                right,
            ))
            .into_shared(guard);

            let new_pupdate = Owned::new(Update::Insert(InsertInfo::new(
                cursor.p,
                new_internal,
                cursor.l,
            )))
            .into_shared(guard)
            .with_tag(UpdateTag::IFLAG.bits());

            let _ = debug_delay();
            match p_node.cas_update(cursor.pupdate, new_pupdate, guard) {
                Ok(_) => {
                    unsafe { retire(cursor.pupdate, guard) };
                    self.help_insert(new_pupdate, guard);
                    return Ok(true);
                }
                Err(e) => {
                    trace!("iflag lost, helping");
                    unsafe { discard_insert(new_pupdate) };
                    self.help(e.current, guard);
                }
            }
        }
    }

    /// Removes `key`. Returns `Ok(false)` if it is not present.
    pub fn delete(&self, key: &K, guard: &Guard) -> Result<bool> {
        self.check_bounds(key)?;
        loop {
            let mut cursor = Cursor::new(self.root.load(Ordering::Acquire, guard));
            cursor.search(key, guard);

            if cursor.leaf().key() != key {
                return Ok(false);
            }
            // Members are never children of the root, so a grandparent exists.
            let gp_node = match cursor.grandparent() {
                Some(gp_node) => gp_node,
                None => return Ok(false),
            };

            if UpdateTag::of(cursor.gpupdate) != UpdateTag::CLEAN {
                self.help(cursor.gpupdate, guard);
                continue;
            }
            if UpdateTag::of(cursor.pupdate) != UpdateTag::CLEAN {
                self.help(cursor.pupdate, guard);
                continue;
            }

            let new_update = Owned::new(Update::Delete(DeleteInfo::new(
                cursor.gp,
                cursor.p,
                cursor.l,
                cursor.pupdate,
            )))
            .into_shared(guard)
            .with_tag(UpdateTag::DFLAG.bits());

            let _ = debug_delay();
            match gp_node.cas_update(cursor.gpupdate, new_update, guard) {
                Ok(_) => {
                    unsafe { retire(cursor.gpupdate, guard) };
                    if self.help_delete(new_update, guard) {
                        return Ok(true);
                    }
                }
                Err(e) => {
                    trace!("dflag lost, helping");
                    unsafe { discard_delete(new_update) };
                    self.help(e.current, guard);
                }
            }
        }
    }

    /// Drives the operation behind a flagged or marked descriptor forward.
    fn help<'g>(&'g self, update: Shared<'g, Update<K>>, guard: &'g Guard) {
        let tag = UpdateTag::of(update);
        trace!(?tag, "helping");
        match tag {
            UpdateTag::IFLAG => self.help_insert(update, guard),
            UpdateTag::MARK => self.help_marked(update, guard),
            UpdateTag::DFLAG => {
                let _ = self.help_delete(update, guard);
            }
            _ => {}
        }
    }

    fn help_insert<'g>(&'g self, op: Shared<'g, Update<K>>, guard: &'g Guard) {
        // Precondition: op points to an IInfo record (i.e., it is not ⊥)
        let info = unsafe { op.deref() }.as_insert();
        let p = load(&info.p, guard);
        let new_internal = load(&info.new_internal, guard);
        let leaf = load(&info.l, guard);

        let p_ref = internal(p);
        let _ = debug_delay();
        if p_ref.cas_child(leaf, new_internal, guard).is_ok() {
            self.size.fetch_add(1, Ordering::AcqRel);
            unsafe { retire(leaf, guard) };
        }
        let _ = p_ref.cas_update(
            op.with_tag(UpdateTag::IFLAG.bits()),
            op.with_tag(UpdateTag::CLEAN.bits()),
            guard,
        );
    }

    /// Returns whether the delete behind `op` took effect. On `false` the
    /// grandparent has been released and the delete must start over.
    fn help_delete<'g>(&'g self, op: Shared<'g, Update<K>>, guard: &'g Guard) -> bool {
        // Precondition: op points to a DInfo record (i.e., it is not ⊥)
        let info = unsafe { op.deref() }.as_delete();
        let p_ref = internal(load(&info.p, guard));
        let pupdate = load(&info.pupdate, guard);
        let marked = op.with_tag(UpdateTag::MARK.bits());

        let _ = debug_delay();
        match p_ref.cas_update(pupdate, marked, guard) {
            Ok(_) => {
                // (prev value) = op → pupdate
                unsafe { retire(pupdate, guard) };
                self.help_marked(marked, guard);
                true
            }
            Err(e) if e.current == marked => {
                // (prev value) = <Mark, op>
                self.help_marked(marked, guard);
                true
            }
            Err(e) => {
                self.help(e.current, guard);
                trace!("mark lost, backtracking");
                let _ = internal(load(&info.gp, guard)).cas_update(
                    op.with_tag(UpdateTag::DFLAG.bits()),
                    op.with_tag(UpdateTag::CLEAN.bits()),
                    guard,
                );
                false
            }
        }
    }

    fn help_marked<'g>(&'g self, op: Shared<'g, Update<K>>, guard: &'g Guard) {
        // Precondition: op points to a DInfo record (i.e., it is not ⊥)
        let info = unsafe { op.deref() }.as_delete();
        let gp = load(&info.gp, guard);
        let p = load(&info.p, guard);
        let l = load(&info.l, guard);

        // Set other to point to the sibling of the node to which op → l points
        let p_ref = internal(p);
        let other = if p_ref.right(guard) == l {
            p_ref.left(guard)
        } else {
            p_ref.right(guard)
        };

        // Splice the node to which op → p points out of the tree, replacing it by other
        let gp_ref = internal(gp);
        let _ = debug_delay();
        if gp_ref.cas_child(p, other, guard).is_ok() {
            self.size.fetch_sub(1, Ordering::AcqRel);
            unsafe {
                retire(p, guard);
                retire(l, guard);
            }
        }
        let _ = gp_ref.cas_update(
            op.with_tag(UpdateTag::DFLAG.bits()),
            op.with_tag(UpdateTag::CLEAN.bits()),
            guard,
        );
    }
}

impl<K> Drop for EFRBTree<K> {
    fn drop(&mut self) {
        debug!("dropping tree");
        unsafe {
            let guard = unprotected();
            let mut stack = vec![self.root.load(Ordering::Relaxed, guard)];

            while let Some(node) = stack.pop() {
                if node.is_null() {
                    continue;
                }
                if let Node::Internal(internal) = node.deref() {
                    stack.push(internal.left(guard));
                    stack.push(internal.right(guard));
                    let update = internal.update(guard);
                    if !update.is_null() {
                        drop(update.with_tag(0).into_owned());
                    }
                }
                drop(node.into_owned());
            }
        }
    }
}

impl<K> ConcurrentSet<K> for EFRBTree<K>
where
    K: Ord + Clone,
{
    fn with_bounds(min: K, max: K) -> Result<Self> {
        EFRBTree::new(min, max)
    }

    fn contains(&self, key: &K, guard: &Guard) -> bool {
        self.find(key, guard)
    }

    fn insert(&self, key: K, guard: &Guard) -> Result<bool> {
        self.insert(key, guard)
    }

    fn remove(&self, key: &K, guard: &Guard) -> Result<bool> {
        self.delete(key, guard)
    }

    fn len(&self) -> usize {
        self.len()
    }
}
