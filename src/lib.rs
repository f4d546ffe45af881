//! A lock-free ordered set built on a non-blocking binary search tree.
//!
//! [`EFRBTree`] is the concurrent core: every operation takes an epoch
//! [`Guard`](crossbeam_ebr::Guard) and may run from any number of threads
//! without locks. [`TreeSet`] wraps it for callers that do not manage guards
//! themselves.
//!
//! ```
//! use efrb_tree::TreeSet;
//!
//! let set = TreeSet::new(0, 100).unwrap();
//! assert_eq!(set.insert(10), Ok(true));
//! assert_eq!(set.insert(10), Ok(false));
//! assert!(set.contains(&10));
//! assert_eq!(set.iter().collect::<Vec<_>>(), vec![10]);
//! ```

extern crate crossbeam_ebr;
extern crate crossbeam_utils;
#[macro_use]
extern crate bitflags;

pub mod concurrent_set;
pub mod config;
pub mod ellen_tree;
pub mod error;
pub mod locked_set;
pub mod set;

pub use self::concurrent_set::ConcurrentSet;
pub use self::ellen_tree::EFRBTree;
pub use self::error::{Result, TreeError};
pub use self::locked_set::LockedSet;
pub use self::set::TreeSet;

#[cfg(not(feature = "fault_injection"))]
#[inline]
pub(crate) const fn debug_delay() -> bool {
    false
}

/// Induces random jitter right before CASes and retirements, shaking out
/// more interleavings. Compiled away without the `fault_injection` feature.
#[cfg(feature = "fault_injection")]
pub(crate) fn debug_delay() -> bool {
    use rand::{thread_rng, Rng};

    if thread_rng().gen_range(0..100) == 0 {
        std::thread::yield_now();
        true
    } else {
        false
    }
}
