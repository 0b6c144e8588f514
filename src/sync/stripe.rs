use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, MutexGuard};

/// One lock-guarded bucket per table slot, padded to its own cache line so
/// neighbouring buckets do not share one under write contention.
pub(crate) type BucketTable<B> = Box<[CachePadded<Mutex<B>>]>;

pub(crate) fn bucket_table<B: Default>(capacity: usize) -> BucketTable<B> {
    (0..capacity)
        .map(|_| CachePadded::new(Mutex::new(B::default())))
        .collect()
}

/// Locks the bucket pair `(table0[i0], table1[i1])` in the canonical order:
/// the lower index first, table 0 before table 1 on equal indices. Every
/// caller that holds two bucket locks at once goes through here, so no two
/// operations can wait on each other's buckets in a cycle.
///
/// The returned guards are in `(table0, table1)` order regardless of which
/// lock was taken first.
pub(crate) fn lock_pair<'a, B>(
    table0: &'a [CachePadded<Mutex<B>>],
    table1: &'a [CachePadded<Mutex<B>>],
    i0: usize,
    i1: usize,
) -> (MutexGuard<'a, B>, MutexGuard<'a, B>) {
    if i0 <= i1 {
        let guard0 = table0[i0].lock();
        let guard1 = table1[i1].lock();
        (guard0, guard1)
    } else {
        let guard1 = table1[i1].lock();
        let guard0 = table0[i0].lock();
        (guard0, guard1)
    }
}
