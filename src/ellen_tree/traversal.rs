//! Read-only walks over the tree.
//!
//! These read child pointers under the caller's guard without validating
//! descriptors, so a walk concurrent with updates observes each subtree at the
//! time it reaches it. That is enough for point-in-time snapshots on a quiet
//! tree and for approximate views on a busy one.

use std::sync::atomic::Ordering;

use crossbeam_ebr::{Guard, Shared};

use super::node::Node;
use super::EFRBTree;

impl<K> EFRBTree<K>
where
    K: Ord + Clone,
{
    /// Visits every node, internal ones included, in key order. The visitor
    /// receives each node with its depth (the root is at depth 0).
    pub fn in_order<'g, F>(&self, guard: &'g Guard, mut visitor: F)
    where
        K: 'g,
        F: FnMut(&'g Node<K>, usize),
    {
        // (node, depth, children already pushed)
        let mut stack: Vec<(Shared<'g, Node<K>>, usize, bool)> =
            vec![(self.root.load(Ordering::Acquire, guard), 0, false)];

        while let Some((node, depth, expanded)) = stack.pop() {
            let node_ref = unsafe { node.deref() };
            match node_ref {
                Node::Internal(internal) if !expanded => {
                    stack.push((internal.right(guard), depth + 1, false));
                    stack.push((node, depth, true));
                    stack.push((internal.left(guard), depth + 1, false));
                }
                _ => visitor(node_ref, depth),
            }
        }
    }

    /// Visits every node before its children, left subtree first.
    pub fn pre_order<'g, F>(&self, guard: &'g Guard, mut visitor: F)
    where
        K: 'g,
        F: FnMut(&'g Node<K>, usize),
    {
        let mut stack = vec![(self.root.load(Ordering::Acquire, guard), 0)];

        while let Some((node, depth)) = stack.pop() {
            let node_ref = unsafe { node.deref() };
            visitor(node_ref, depth);
            if let Node::Internal(internal) = node_ref {
                stack.push((internal.right(guard), depth + 1));
                stack.push((internal.left(guard), depth + 1));
            }
        }
    }

    /// Members in ascending order, sentinels excluded.
    pub fn snapshot(&self, guard: &Guard) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.len());
        self.in_order(guard, |node, _| {
            if let Node::Leaf(key) = node {
                keys.push(key.clone());
            }
        });
        keys
    }
}
