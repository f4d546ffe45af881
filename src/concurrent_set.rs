use crossbeam_ebr::Guard;

use crate::error::Result;

/// An ordered set whose members lie strictly between two bounds fixed at
/// construction.
pub trait ConcurrentSet<K>: Sized {
    fn with_bounds(min: K, max: K) -> Result<Self>;
    fn contains(&self, key: &K, guard: &Guard) -> bool;
    fn insert(&self, key: K, guard: &Guard) -> Result<bool>;
    fn remove(&self, key: &K, guard: &Guard) -> Result<bool>;
    fn len(&self) -> usize;
}
