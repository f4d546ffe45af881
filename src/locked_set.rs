//! A lock-based set with the same contract as the tree, for comparison.

use std::collections::BTreeSet;
use std::sync::RwLock;

use crossbeam_ebr::Guard;

use crate::concurrent_set::ConcurrentSet;
use crate::error::{Result, TreeError};

pub struct LockedSet<K> {
    inner: RwLock<BTreeSet<K>>,
    min: K,
    max: K,
}

impl<K: Ord> LockedSet<K> {
    fn check_bounds(&self, key: &K) -> Result<()> {
        if &self.min < key && key < &self.max {
            Ok(())
        } else {
            Err(TreeError::KeyOutOfBounds)
        }
    }
}

impl<K: Ord> ConcurrentSet<K> for LockedSet<K> {
    fn with_bounds(min: K, max: K) -> Result<Self> {
        if min >= max {
            return Err(TreeError::InvalidBounds);
        }
        Ok(Self {
            inner: RwLock::new(BTreeSet::new()),
            min,
            max,
        })
    }

    fn contains(&self, key: &K, _guard: &Guard) -> bool {
        // A poisoned lock still guards a consistent set: no operation panics
        // while holding it halfway through a change.
        let set = self.inner.read().unwrap_or_else(|e| e.into_inner());
        set.contains(key)
    }

    fn insert(&self, key: K, _guard: &Guard) -> Result<bool> {
        self.check_bounds(&key)?;
        let mut set = self.inner.write().unwrap_or_else(|e| e.into_inner());
        Ok(set.insert(key))
    }

    fn remove(&self, key: &K, _guard: &Guard) -> Result<bool> {
        self.check_bounds(key)?;
        let mut set = self.inner.write().unwrap_or_else(|e| e.into_inner());
        Ok(set.remove(key))
    }

    fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}
