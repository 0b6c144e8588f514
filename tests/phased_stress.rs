use koel::sync::{CuckooSet, PhasedCuckooSet};

use std::{sync::Barrier, thread};

use rand::Rng;

const NUM_THREADS: usize = 8;
const OPS_PER_THREAD: usize = 15_000;
const INITIAL_CAPACITY: usize = 1024;
const KEY_RANGE: u64 = 4 * INITIAL_CAPACITY as u64;

/// The phased set must reconcile the same mixed workload as the striped one:
/// 30% insert / 30% remove / 40% contains, final length equal to the
/// pre-populated length plus every thread's net delta.
#[test]
fn mixed_workload_reconciles_with_per_thread_deltas() {
    let _ = env_logger::builder().is_test(true).try_init();

    let set = PhasedCuckooSet::new(INITIAL_CAPACITY, 100, 4, 2);
    set.populate(INITIAL_CAPACITY / 2);
    let len_before = set.len() as i64;

    let barrier = std::sync::Arc::new(Barrier::new(NUM_THREADS));
    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let set = set.clone();
            let barrier = std::sync::Arc::clone(&barrier);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                let mut delta = 0_i64;
                barrier.wait();

                for _ in 0..OPS_PER_THREAD {
                    let choice: f64 = rng.gen();
                    let key = rng.gen_range(0..KEY_RANGE);

                    if choice < 0.30 {
                        if set.insert(key) {
                            delta += 1;
                        }
                    } else if choice < 0.60 {
                        if set.remove(&key) {
                            delta -= 1;
                        }
                    } else {
                        set.contains(&key);
                    }
                }

                delta
            })
        })
        .collect();

    let mut expected = len_before;
    for handle in handles {
        expected += handle.join().expect("worker thread panicked");
    }

    assert_eq!(set.len() as i64, expected);
}

/// A small table under concurrent insert pressure must relocate and grow
/// without losing elements or deadlocking.
#[test]
fn growth_under_concurrent_traffic_keeps_every_element() {
    let set: PhasedCuckooSet<u64> = CuckooSet::builder(4)
        .displacement_limit(100)
        .probe_size(4)
        .threshold(2)
        .build();
    let barrier = std::sync::Arc::new(Barrier::new(NUM_THREADS));

    let handles: Vec<_> = (0..NUM_THREADS as u64)
        .map(|t| {
            let set = set.clone();
            let barrier = std::sync::Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..2_000_u64 {
                    let key = t * 1_000_000 + i;
                    assert!(set.insert(key));
                    assert!(set.contains(&key));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker thread panicked");
    }

    assert_eq!(set.len(), NUM_THREADS * 2_000);
    for t in 0..NUM_THREADS as u64 {
        for i in 0..2_000_u64 {
            assert!(set.contains(&(t * 1_000_000 + i)));
        }
    }
}

/// Threads hammering the same handful of keys exercise the vanished-victim
/// path of relocation: a relocation that loses its victim to a concurrent
/// remove must carry on rather than stall or double-move.
#[test]
fn contended_keys_survive_relocation_races() {
    const HOT_KEYS: u64 = 16;

    let set = PhasedCuckooSet::new(8, 100, 4, 2);
    let barrier = std::sync::Arc::new(Barrier::new(NUM_THREADS));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let set = set.clone();
            let barrier = std::sync::Arc::clone(&barrier);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                let mut delta = 0_i64;
                barrier.wait();

                for _ in 0..10_000 {
                    let key = rng.gen_range(0..HOT_KEYS);
                    if rng.gen::<bool>() {
                        if set.insert(key) {
                            delta += 1;
                        }
                    } else if set.remove(&key) {
                        delta -= 1;
                    }
                }

                delta
            })
        })
        .collect();

    let mut expected = 0_i64;
    for handle in handles {
        expected += handle.join().expect("worker thread panicked");
    }

    assert_eq!(set.len() as i64, expected);
}
