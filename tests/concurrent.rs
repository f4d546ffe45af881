mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;
use std::thread::yield_now;
use std::time::Duration;

use crossbeam_ebr::pin;
use crossbeam_utils::thread::scope;
use rand::prelude::*;

use efrb_tree::{ConcurrentSet, EFRBTree, LockedSet, TreeError, TreeSet};

const PER_THREAD: usize = 2_000;

fn disjoint_keys<S: ConcurrentSet<usize> + Send + Sync>() {
    common::init_tracing();
    let threads = common::concurrency();
    let set = &S::with_bounds(0, threads * PER_THREAD + 1).unwrap();
    let barrier = &Barrier::new(threads);

    scope(|s| {
        for t in 0..threads {
            s.spawn(move |_| {
                let unique_key = |k: usize| k * threads + t + 1;
                let mut keys: Vec<usize> = (0..PER_THREAD).collect();
                keys.shuffle(&mut thread_rng());

                barrier.wait();
                for &k in &keys {
                    let guard = &pin();
                    let key = unique_key(k);
                    assert!(!set.contains(&key, guard));
                    assert_eq!(set.insert(key, guard), Ok(true), "failed to insert {key}");
                    assert!(set.contains(&key, guard), "failed to find {key}");
                }
                for &k in keys.iter().filter(|k| *k % 2 == 0) {
                    let key = unique_key(k);
                    assert_eq!(set.remove(&key, &pin()), Ok(true), "failed to remove {key}");
                }
                for k in 0..PER_THREAD {
                    let key = unique_key(k);
                    assert_eq!(set.contains(&key, &pin()), k % 2 == 1, "wrong membership of {key}");
                }
            });
        }
    })
    .unwrap();

    assert_eq!(set.len(), threads * PER_THREAD / 2);
}

#[test]
fn disjoint_keys_efrb_tree() {
    disjoint_keys::<EFRBTree<usize>>();
}

#[test]
fn disjoint_keys_locked_set() {
    disjoint_keys::<LockedSet<usize>>();
}

#[test]
fn disjoint_keys_final_snapshot() {
    common::init_tracing();
    let threads = common::concurrency();
    let tree = &EFRBTree::new(0, threads * PER_THREAD + 1).unwrap();

    scope(|s| {
        for t in 0..threads {
            s.spawn(move |_| {
                for k in 0..PER_THREAD {
                    let key = k * threads + t + 1;
                    tree.insert(key, &pin()).unwrap();
                    if k % 3 == 0 {
                        assert_eq!(tree.delete(&key, &pin()), Ok(true));
                    }
                }
            });
        }
    })
    .unwrap();

    let expected: Vec<usize> = (1..=threads * PER_THREAD)
        .filter(|key| ((key - 1) / threads) % 3 != 0)
        .collect();
    assert_eq!(tree.snapshot(&pin()), expected);
    assert_eq!(tree.len(), expected.len());
}

/// Threads fight over a handful of keys. Only successful updates count, so
/// the sum of every thread's net successes is the final size.
#[test]
fn contended_keys_keep_count() {
    common::init_tracing();
    let threads = common::concurrency();
    let tree = &EFRBTree::new(0, 17).unwrap();
    let barrier = &Barrier::new(threads);

    let net: isize = scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(move |_| {
                    let rng = &mut thread_rng();
                    let mut net = 0isize;
                    barrier.wait();
                    for i in 0..20_000 {
                        let key = rng.gen_range(1..=16);
                        let guard = &pin();
                        if rng.gen_bool(0.5) {
                            if tree.insert(key, guard).unwrap() {
                                net += 1;
                            }
                        } else if tree.delete(&key, guard).unwrap() {
                            net -= 1;
                        }
                        if i % 64 == 0 {
                            yield_now();
                        }
                    }
                    net
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum::<isize>()
    })
    .unwrap();

    let snapshot = tree.snapshot(&pin());
    assert_eq!(net as usize, snapshot.len());
    assert_eq!(tree.len(), snapshot.len());
    assert!(snapshot.iter().all(|key| (1..=16).contains(key)));
    for key in 1..=16 {
        assert_eq!(tree.find(&key, &pin()), snapshot.contains(&key));
    }
}

/// Snapshots taken while writers run must stay sorted and in bounds, and a
/// thread that holds its pin for long stretches must not see freed memory.
#[test]
fn snapshots_under_churn_with_stalled_reader() {
    common::init_tracing();
    const MAX: u32 = 512;
    let writers = common::concurrency();
    let set = &TreeSet::new(0, MAX).unwrap();
    let stop = &AtomicBool::new(false);

    scope(|s| {
        s.spawn(move |_| {
            let mut guard = pin();
            let mut rounds = 0u32;
            while !stop.load(Ordering::Acquire) {
                std::thread::sleep(Duration::from_millis(1));
                rounds += 1;
                if rounds % 20 == 0 {
                    guard.repin();
                }
            }
        });

        let handles: Vec<_> = (0..writers)
            .map(|_| {
                s.spawn(move |_| {
                    let rng = &mut thread_rng();
                    for i in 0..10_000 {
                        let key = rng.gen_range(1..MAX);
                        if rng.gen_bool(0.5) {
                            set.insert(key).unwrap();
                        } else {
                            set.remove(&key).unwrap();
                        }
                        if i % 128 == 0 {
                            yield_now();
                        }
                    }
                })
            })
            .chain((0..2).map(|_| {
                s.spawn(move |_| {
                    for _ in 0..200 {
                        let keys: Vec<u32> = set.iter().collect();
                        assert!(keys.windows(2).all(|w| w[0] < w[1]), "unsorted: {keys:?}");
                        assert!(keys.iter().all(|k| 0 < *k && *k < MAX));
                        yield_now();
                    }
                })
            }))
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        stop.store(true, Ordering::Release);
    })
    .unwrap();

    assert_eq!(set.iter().len(), set.len());
}

#[test]
fn out_of_range_keys_are_rejected_everywhere() {
    let tree = EFRBTree::new(10, 20).unwrap();
    let guard = &pin();
    for key in [i64::MIN, 9, 10, 20, 21, i64::MAX] {
        assert_eq!(tree.insert(key, guard), Err(TreeError::KeyOutOfBounds));
        assert_eq!(tree.delete(&key, guard), Err(TreeError::KeyOutOfBounds));
        assert!(!tree.find(&key, guard));
    }
    assert!(tree.is_empty());
}
