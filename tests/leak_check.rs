//! Every key the tree ever held must be dropped once the tree is gone and
//! the collector has run, including nodes retired while threads raced.

mod common;

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Barrier;

use crossbeam_ebr::pin;
use crossbeam_utils::thread::scope;

use efrb_tree::{EFRBTree, TreeSet};

mod counted {
    use super::*;

    static LIVE: AtomicIsize = AtomicIsize::new(0);

    pub fn live() -> isize {
        LIVE.load(Ordering::SeqCst)
    }

    /// A key that tracks how many of its copies are alive.
    #[derive(Debug)]
    pub struct Key(u32);

    impl Key {
        pub fn new(value: u32) -> Self {
            LIVE.fetch_add(1, Ordering::SeqCst);
            Key(value)
        }
    }

    impl Clone for Key {
        fn clone(&self) -> Self {
            Key::new(self.0)
        }
    }

    impl Drop for Key {
        fn drop(&mut self) {
            LIVE.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl PartialEq for Key {
        fn eq(&self, other: &Self) -> bool {
            self.0 == other.0
        }
    }

    impl Eq for Key {}

    impl PartialOrd for Key {
        fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
            Some(self.cmp(other))
        }
    }

    impl Ord for Key {
        fn cmp(&self, other: &Self) -> CmpOrdering {
            self.0.cmp(&other.0)
        }
    }
}

use counted::Key;

/// Pins and flushes until the collector has run every deferred destructor.
fn drain() {
    for _ in 0..1_000_000 {
        if counted::live() == 0 {
            return;
        }
        pin().flush();
    }
}

#[test]
fn leak_check() {
    common::init_tracing();
    let threads = common::concurrency();
    let n: u32 = 4 * 1024;

    {
        let tree = &EFRBTree::new(Key::new(0), Key::new(u32::MAX)).unwrap();
        let barrier = &Barrier::new(threads);

        scope(|s| {
            for t in 0..threads as u32 {
                s.spawn(move |_| {
                    barrier.wait();
                    // Overlapping ranges so that threads help each other.
                    for i in 0..n {
                        let key = 1 + (i + t * n / 2) % (2 * n);
                        let guard = &pin();
                        tree.insert(Key::new(key), guard).unwrap();
                        if i % 3 != 0 {
                            tree.delete(&Key::new(key), guard).unwrap();
                        }
                    }
                    for i in 0..n {
                        let _ = tree.delete(&Key::new(1 + (i + t * n / 2) % (2 * n)), &pin());
                    }
                });
            }
        })
        .unwrap();

        assert!(tree.is_empty());
        assert!(tree.snapshot(&pin()).is_empty());
    }

    drain();
    assert_eq!(counted::live(), 0, "keys leaked or freed twice");

    // Dropping a populated set frees the reachable nodes directly.
    {
        let set = TreeSet::new(Key::new(0), Key::new(1_000)).unwrap();
        for key in 1..1_000 {
            assert_eq!(set.insert(Key::new(key)), Ok(true));
        }
        for key in (1..1_000).step_by(2) {
            assert_eq!(set.remove(&Key::new(key)), Ok(true));
        }
        assert_eq!(set.len(), 499);
    }

    drain();
    assert_eq!(counted::live(), 0, "keys leaked or freed twice");
}
