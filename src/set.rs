//! A set facade over [`EFRBTree`] that pins internally.

use std::fmt;
use std::vec;

use crossbeam_ebr::pin;

use crate::ellen_tree::EFRBTree;
use crate::error::{Result, TreeError};

/// A concurrent ordered set of keys strictly between `min` and `max`.
///
/// Shareable across threads by reference; every method pins the calling
/// thread for its own duration only.
pub struct TreeSet<K> {
    tree: EFRBTree<K>,
}

impl<K> TreeSet<K>
where
    K: Ord + Clone,
{
    pub fn new(min: K, max: K) -> Result<Self> {
        Ok(Self {
            tree: EFRBTree::new(min, max)?,
        })
    }

    pub fn insert(&self, key: K) -> Result<bool> {
        self.tree.insert(key, &pin())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.tree.find(key, &pin())
    }

    pub fn remove(&self, key: &K) -> Result<bool> {
        self.tree.delete(key, &pin())
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn bounds(&self) -> (&K, &K) {
        self.tree.bounds()
    }

    /// Iterates over a snapshot taken now. Later updates are not reflected.
    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            set: self,
            keys: self.tree.snapshot(&pin()).into_iter(),
            last: None,
        }
    }

    pub fn tree(&self) -> &EFRBTree<K> {
        &self.tree
    }
}

/// Snapshot iterator of a [`TreeSet`].
pub struct Iter<'a, K> {
    set: &'a TreeSet<K>,
    keys: vec::IntoIter<K>,
    last: Option<K>,
}

impl<'a, K> Iter<'a, K>
where
    K: Ord + Clone,
{
    /// Removes the most recently yielded key from the set.
    ///
    /// Returns whether this call removed it; another thread may have removed
    /// it after the snapshot was taken.
    pub fn remove(&mut self) -> Result<bool> {
        match self.last.take() {
            Some(key) => self.set.remove(&key),
            None => Err(TreeError::NoCurrentElement),
        }
    }
}

impl<'a, K> Iterator for Iter<'a, K>
where
    K: Clone,
{
    type Item = K;

    fn next(&mut self) -> Option<K> {
        let key = self.keys.next()?;
        self.last = Some(key.clone());
        Some(key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.keys.size_hint()
    }
}

impl<'a, K: Clone> ExactSizeIterator for Iter<'a, K> {}

impl<'a, K> IntoIterator for &'a TreeSet<K>
where
    K: Ord + Clone,
{
    type Item = K;
    type IntoIter = Iter<'a, K>;

    fn into_iter(self) -> Iter<'a, K> {
        self.iter()
    }
}

impl<K> fmt::Debug for TreeSet<K>
where
    K: Ord + Clone + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
