use std::fmt;
use std::sync::atomic::Ordering;

use crossbeam_ebr::{Atomic, CompareExchangeError, Guard, Owned, Shared};

use super::update::Update;

/// A tree node.
///
/// Leaves carry a key and nothing else. Sentinel leaves hold the tree's
/// configured bounds and are never removed. Internal nodes route searches and
/// own the descriptor through which updates are coordinated.
pub enum Node<K> {
    Leaf(K),
    Sentinel(K),
    Internal(Internal<K>),
}

/// Internal node of the tree.
///
/// `key` is a routing key: a search for `k` goes left iff `k < key`.
pub struct Internal<K> {
    key: K,
    // tag on low bits: {Clean, DFlag, IFlag, Mark}
    update: Atomic<Update<K>>,
    left: Atomic<Node<K>>,
    right: Atomic<Node<K>>,
}

impl<K> Node<K> {
    pub fn leaf(key: K) -> Self {
        Node::Leaf(key)
    }

    pub fn sentinel(key: K) -> Self {
        Node::Sentinel(key)
    }

    pub fn internal(key: K, left: Self, right: Self) -> Self {
        Node::Internal(Internal {
            key,
            update: Atomic::null(),
            left: Atomic::new(left),
            right: Atomic::new(right),
        })
    }

    #[inline]
    pub fn key(&self) -> &K {
        match self {
            Node::Leaf(key) | Node::Sentinel(key) => key,
            Node::Internal(internal) => &internal.key,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        !self.is_internal()
    }

    #[inline]
    pub fn is_internal(&self) -> bool {
        matches!(self, Node::Internal(_))
    }

    #[inline]
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Node::Sentinel(_))
    }

    #[inline]
    pub fn as_internal(&self) -> Option<&Internal<K>> {
        match self {
            Node::Internal(internal) => Some(internal),
            _ => None,
        }
    }

    /// Returns a fresh leaf with the same key and kind.
    ///
    /// An insert never reuses the leaf it replaces. Linking a copy guarantees
    /// that a replaced leaf is never a child again, so a late helper's child
    /// CAS against it cannot succeed twice.
    pub(crate) fn duplicate_leaf(&self) -> Self
    where
        K: Clone,
    {
        match self {
            Node::Leaf(key) => Node::Leaf(key.clone()),
            Node::Sentinel(key) => Node::Sentinel(key.clone()),
            Node::Internal(_) => unreachable!("only leaves are duplicated"),
        }
    }
}

impl<K> Internal<K> {
    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    #[inline]
    pub fn left<'g>(&self, guard: &'g Guard) -> Shared<'g, Node<K>> {
        self.left.load(Ordering::Acquire, guard)
    }

    #[inline]
    pub fn right<'g>(&self, guard: &'g Guard) -> Shared<'g, Node<K>> {
        self.right.load(Ordering::Acquire, guard)
    }

    /// Loads the descriptor. The tag is the state, the pointer the record.
    #[inline]
    pub fn update<'g>(&self, guard: &'g Guard) -> Shared<'g, Update<K>> {
        self.update.load(Ordering::Acquire, guard)
    }

    #[inline]
    pub(crate) fn cas_update<'g>(
        &self,
        current: Shared<'g, Update<K>>,
        new: Shared<'g, Update<K>>,
        guard: &'g Guard,
    ) -> Result<Shared<'g, Update<K>>, CompareExchangeError<'g, Update<K>, Shared<'g, Update<K>>>>
    {
        self.update
            .compare_exchange(current, new, Ordering::SeqCst, Ordering::SeqCst, guard)
    }

    /// Swings the child slot on `new`'s side of this node from `old` to `new`.
    ///
    /// The slot is chosen by comparing `new`'s key with the routing key, so it
    /// is the slot `old` must occupy for the CAS to mean anything.
    #[inline]
    pub(crate) fn cas_child<'g>(
        &self,
        old: Shared<'g, Node<K>>,
        new: Shared<'g, Node<K>>,
        guard: &'g Guard,
    ) -> Result<Shared<'g, Node<K>>, CompareExchangeError<'g, Node<K>, Shared<'g, Node<K>>>>
    where
        K: Ord,
    {
        // Precondition: new points to a Node (i.e., it is not ⊥)
        let new_node = unsafe { new.deref() };
        let slot = if new_node.key() < &self.key {
            &self.left
        } else {
            &self.right
        };
        slot.compare_exchange(old, new, Ordering::SeqCst, Ordering::SeqCst, guard)
    }

    /// Takes both children out of an unpublished node so they can be freed.
    ///
    /// # Safety
    ///
    /// No other thread may have observed this node.
    pub(crate) unsafe fn take_children(&self) -> (Owned<Node<K>>, Owned<Node<K>>) {
        let guard = crossbeam_ebr::unprotected();
        (
            self.left.load(Ordering::Relaxed, guard).into_owned(),
            self.right.load(Ordering::Relaxed, guard).into_owned(),
        )
    }
}

impl<K: fmt::Debug> fmt::Debug for Node<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Leaf(key) => write!(f, "Leaf({:?})", key),
            Node::Sentinel(key) => write!(f, "Sentinel({:?})", key),
            Node::Internal(internal) => write!(f, "Internal({:?})", internal.key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Node;
    use crossbeam_ebr::{pin, Owned};

    #[test]
    fn capabilities() {
        let leaf = Node::leaf(3);
        assert!(leaf.is_leaf() && !leaf.is_internal() && !leaf.is_sentinel());
        assert_eq!(*leaf.key(), 3);

        let sentinel = Node::sentinel(0);
        assert!(sentinel.is_leaf() && sentinel.is_sentinel());

        let internal = Node::internal(5, Node::leaf(3), Node::leaf(5));
        assert!(internal.is_internal() && !internal.is_leaf());
        assert_eq!(*internal.key(), 5);
        assert_eq!(format!("{:?}", internal), "Internal(5)");

        let internal = internal.as_internal().unwrap();
        let (left, right) = unsafe { internal.take_children() };
        assert_eq!(*left.key(), 3);
        assert_eq!(*right.key(), 5);
    }

    #[test]
    fn duplicate_keeps_kind() {
        assert!(Node::sentinel(7).duplicate_leaf().is_sentinel());
        assert!(!Node::leaf(7).duplicate_leaf().is_sentinel());
    }

    #[test]
    fn cas_child_picks_side_by_key() {
        let guard = &pin();
        let parent = Node::internal(10, Node::leaf(4), Node::leaf(10));
        let internal = parent.as_internal().unwrap();

        let old_left = internal.left(guard);
        let new_left = Owned::new(Node::leaf(2)).into_shared(guard);
        assert!(internal.cas_child(old_left, new_left, guard).is_ok());
        assert_eq!(internal.left(guard), new_left);

        // A key >= the routing key targets the right slot, where old_left is not.
        let stray = Owned::new(Node::leaf(12)).into_shared(guard);
        assert!(internal.cas_child(old_left, stray, guard).is_err());

        unsafe {
            drop(old_left.into_owned());
            drop(stray.into_owned());
            let (left, right) = internal.take_children();
            drop((left, right));
        }
    }
}
