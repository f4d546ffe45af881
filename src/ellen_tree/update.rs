//! Operation records published through an internal node's descriptor.
//!
//! A descriptor is a single tagged pointer. The low bits hold the state
//! ([`UpdateTag`]) and the address points to the [`Update`] record of the
//! operation that set it, so the pair is read and swapped atomically.
//! A CLEAN descriptor keeps pointing at the record of the last finished
//! operation: record addresses serve as version stamps, and a DeleteInfo's
//! snapshot of its parent's descriptor only matches while nothing changed.

use std::sync::atomic::Ordering;

use crossbeam_ebr::{default_collector, Atomic, Guard, Shared};

use super::node::Node;
use crate::debug_delay;

bitflags! {
    pub struct UpdateTag: usize {
        const CLEAN = 0usize;
        const DFLAG = 1usize;
        const IFLAG = 2usize;
        const MARK = 3usize;
    }
}

impl UpdateTag {
    #[inline]
    pub fn of<T>(update: Shared<'_, T>) -> Self {
        UpdateTag::from_bits_truncate(update.tag())
    }
}

pub enum Update<K> {
    Insert(InsertInfo<K>),
    Delete(DeleteInfo<K>),
}

/// Replaces leaf `l` under `p` with the subtree rooted at `new_internal`.
pub struct InsertInfo<K> {
    pub(crate) p: Atomic<Node<K>>,
    pub(crate) new_internal: Atomic<Node<K>>,
    pub(crate) l: Atomic<Node<K>>,
}

/// Removes leaf `l` and its parent `p`, promoting `l`'s sibling into `gp`.
pub struct DeleteInfo<K> {
    pub(crate) gp: Atomic<Node<K>>,
    pub(crate) p: Atomic<Node<K>>,
    pub(crate) l: Atomic<Node<K>>,
    /// `p`'s descriptor as seen by the search that created this record.
    pub(crate) pupdate: Atomic<Update<K>>,
}

impl<K> InsertInfo<K> {
    pub(crate) fn new<'g>(
        p: Shared<'g, Node<K>>,
        new_internal: Shared<'g, Node<K>>,
        l: Shared<'g, Node<K>>,
    ) -> Self {
        Self {
            p: Atomic::from(p),
            new_internal: Atomic::from(new_internal),
            l: Atomic::from(l),
        }
    }
}

impl<K> DeleteInfo<K> {
    pub(crate) fn new<'g>(
        gp: Shared<'g, Node<K>>,
        p: Shared<'g, Node<K>>,
        l: Shared<'g, Node<K>>,
        pupdate: Shared<'g, Update<K>>,
    ) -> Self {
        Self {
            gp: Atomic::from(gp),
            p: Atomic::from(p),
            l: Atomic::from(l),
            pupdate: Atomic::from(pupdate),
        }
    }
}

impl<K> Update<K> {
    pub(crate) fn as_insert(&self) -> &InsertInfo<K> {
        match self {
            Update::Insert(info) => info,
            Update::Delete(_) => unreachable!("op is not pointing to an IInfo record"),
        }
    }

    pub(crate) fn as_delete(&self) -> &DeleteInfo<K> {
        match self {
            Update::Delete(info) => info,
            Update::Insert(_) => unreachable!("op is not pointing to a DInfo record"),
        }
    }
}

#[inline]
pub(crate) fn load<'g, T>(field: &Atomic<T>, guard: &'g Guard) -> Shared<'g, T> {
    field.load(Ordering::Acquire, guard)
}

/// Hands an unlinked allocation to the collector.
///
/// Destruction waits for two grace periods instead of one. A helper may pick
/// up a descriptor after one of the records it references was already
/// retired, and then compare against that address. Descriptors are released
/// before their owner unpins, so every such helper is pinned when the first
/// grace period ends, and the second one outlives it.
///
/// # Safety
///
/// `ptr` must be unreachable for threads that pin later, and exactly one
/// thread may retire it.
pub(crate) unsafe fn retire<T>(ptr: Shared<'_, T>, guard: &Guard) {
    if ptr.is_null() {
        return;
    }
    let _ = debug_delay();
    let ptr = ptr.with_tag(0);
    // The second grace period must be tracked by the same collector.
    let collector = guard.collector().cloned();
    guard.defer_unchecked(move || match collector {
        Some(collector) if collector == *default_collector() => {
            crossbeam_ebr::pin().defer_destroy(ptr);
        }
        Some(collector) => {
            let handle = collector.register();
            handle.pin().defer_destroy(ptr);
        }
        // Unprotected: nobody else can reach the object.
        None => drop(ptr.into_owned()),
    });
}

/// Frees the record and the subtree of an insert whose flag CAS failed.
///
/// # Safety
///
/// The record must never have been published.
pub(crate) unsafe fn discard_insert<K>(op: Shared<'_, Update<K>>) {
    let op = op.with_tag(0).into_owned().into_box();
    if let Update::Insert(info) = *op {
        let new_internal = info.new_internal.into_owned();
        if let Some(internal) = new_internal.as_internal() {
            let (left, right) = internal.take_children();
            drop((left, right));
        }
    }
}

/// Frees the record of a delete whose flag CAS failed.
///
/// # Safety
///
/// The record must never have been published.
pub(crate) unsafe fn discard_delete<K>(op: Shared<'_, Update<K>>) {
    drop(op.with_tag(0).into_owned());
}
