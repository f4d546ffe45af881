use crossbeam_ebr::{Guard, Shared};

use super::node::{Internal, Node};
use super::update::Update;

pub(crate) struct Cursor<'g, K> {
    pub(crate) gp: Shared<'g, Node<K>>,
    pub(crate) p: Shared<'g, Node<K>>,
    pub(crate) l: Shared<'g, Node<K>>,
    pub(crate) pupdate: Shared<'g, Update<K>>,
    pub(crate) gpupdate: Shared<'g, Update<K>>,
}

impl<'g, K> Cursor<'g, K>
where
    K: Ord,
{
    pub(crate) fn new(root: Shared<'g, Node<K>>) -> Self {
        Self {
            gp: Shared::null(),
            p: Shared::null(),
            l: root,
            pupdate: Shared::null(),
            gpupdate: Shared::null(),
        }
    }

    /// Used by Insert, Delete and Find to traverse a branch of the BST.
    ///
    /// It satisfies following postconditions:
    ///
    /// 1. l points to a leaf and p points to an internal node
    /// 2. Either p → left has contained l (if k < p → key) or p → right has contained l (if k ≥ p → key)
    /// 3. p → update has contained pupdate
    /// 4. if gp is not null, then
    ///     - either gp → left has contained p (if k < gp → key) or gp → right has contained p (if k ≥ gp → key)
    ///     - gp → update has contained gpupdate
    ///
    /// Each descriptor is loaded before the child below it, so a CLEAN
    /// descriptor proves the child read afterwards belonged to that node
    /// while it was CLEAN.
    #[inline]
    pub(crate) fn search(&mut self, key: &K, guard: &'g Guard) {
        loop {
            let internal = match unsafe { self.l.deref() } {
                Node::Internal(internal) => internal,
                _ => break,
            };
            self.gp = self.p;
            self.p = self.l;
            self.gpupdate = self.pupdate;
            self.pupdate = internal.update(guard);
            self.l = if key < internal.key() {
                internal.left(guard)
            } else {
                internal.right(guard)
            };
        }
    }

    #[inline]
    pub(crate) fn leaf(&self) -> &'g Node<K> {
        unsafe { self.l.deref() }
    }

    #[inline]
    pub(crate) fn parent(&self) -> &'g Internal<K> {
        internal(self.p)
    }

    #[inline]
    pub(crate) fn grandparent(&self) -> Option<&'g Internal<K>> {
        if self.gp.is_null() {
            None
        } else {
            Some(internal(self.gp))
        }
    }
}

/// Views a pointer known to reference an internal node.
#[inline]
pub(crate) fn internal<'g, K>(node: Shared<'g, Node<K>>) -> &'g Internal<K> {
    match unsafe { node.as_ref() } {
        Some(Node::Internal(internal)) => internal,
        _ => unreachable!("expected an internal node"),
    }
}
