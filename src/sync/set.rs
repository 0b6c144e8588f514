use super::{
    stripe::{self, BucketTable},
    SetBuilder,
};
use crate::common::{hash::SeedPair, slot_eq};

use std::{
    borrow::Borrow,
    collections::hash_map::RandomState,
    fmt,
    hash::{BuildHasher, Hash},
    sync::Arc,
};

use parking_lot::RwLock;
use rand::Rng;

/// A thread-safe cuckoo hashing set holding one element per bucket.
///
/// Each bucket carries its own lock, so operations on elements with disjoint
/// bucket pairs proceed in parallel. Growing the tables is coordinated
/// through a readers-writer barrier: every operation holds it in shared mode
/// while a resize takes it exclusively, which drains in-flight operations
/// and keeps them out until the new tables and hash seeds are installed.
///
/// An insert whose two home buckets are both occupied must displace
/// incumbents along a chain that crosses other buckets; the set escalates
/// such inserts to the exclusive barrier and runs the chain alone. With
/// tables sized sensibly this path is rare, and everything else stays on the
/// two-bucket fast path.
///
/// # Examples
///
/// Reading and updating a set from multiple threads:
///
/// ```rust
/// use koel::sync::CuckooSet;
///
/// use std::thread;
///
/// const NUM_THREADS: u64 = 4;
/// const KEYS_PER_THREAD: u64 = 64;
///
/// let set = CuckooSet::new(512, 100);
///
/// let threads: Vec<_> = (0..NUM_THREADS)
///     .map(|t| {
///         // To share the same set across threads, clone it. This is a
///         // cheap operation.
///         let my_set = set.clone();
///
///         thread::spawn(move || {
///             let start = t * KEYS_PER_THREAD;
///             for key in start..start + KEYS_PER_THREAD {
///                 assert!(my_set.insert(key));
///             }
///         })
///     })
///     .collect();
///
/// threads.into_iter().for_each(|t| t.join().expect("thread failed"));
///
/// for key in 0..NUM_THREADS * KEYS_PER_THREAD {
///     assert!(set.contains(&key));
/// }
/// assert_eq!(set.len(), (NUM_THREADS * KEYS_PER_THREAD) as usize);
/// ```
///
/// # Sharing a set across threads
///
/// Clone the set and move the clone into the other thread; all clones point
/// at the same tables. `CuckooSet<T, S>` is `Send` and `Sync` when `T` and
/// `S` are.
///
/// # Hashing Algorithm
///
/// By default the set hashes with `std::collections::HashMap`'s hasher
/// (currently SipHash 1-3), which resists HashDoS attacks. A different
/// algorithm can be supplied per set through
/// [`SetBuilder::build_with_hasher`](./struct.SetBuilder.html#method.build_with_hasher).
pub struct CuckooSet<T, S = RandomState> {
    base: Arc<BaseSet<T, S>>,
}

impl<T, S> Clone for CuckooSet<T, S> {
    fn clone(&self) -> Self {
        Self {
            base: Arc::clone(&self.base),
        }
    }
}

struct BaseSet<T, S> {
    /// The resize barrier. Shared holders run bucket operations; the
    /// exclusive holder swaps the tables and seeds.
    inner: RwLock<Inner<T>>,
    build_hasher: S,
    displacement_limit: usize,
}

struct Inner<T> {
    seeds: SeedPair,
    table0: BucketTable<Option<T>>,
    table1: BucketTable<Option<T>>,
}

impl<T> CuckooSet<T, RandomState>
where
    T: Hash + Eq,
{
    /// Constructs a new `CuckooSet<T>` with `initial_capacity` buckets per
    /// table and the given displacement limit.
    ///
    /// To adjust other knobs, or to supply a hasher, use the
    /// [`SetBuilder`](./struct.SetBuilder.html).
    ///
    /// # Panics
    ///
    /// Panics if `initial_capacity` or `displacement_limit` is zero.
    pub fn new(initial_capacity: usize, displacement_limit: usize) -> Self {
        Self::with_everything(initial_capacity, displacement_limit, RandomState::default())
    }

    /// Returns a [`SetBuilder`](./struct.SetBuilder.html), which can build a
    /// `CuckooSet` or `PhasedCuckooSet` with various configuration knobs.
    pub fn builder(initial_capacity: usize) -> SetBuilder<CuckooSet<T, RandomState>> {
        SetBuilder::new(initial_capacity)
    }
}

//
// public
//
impl<T, S> CuckooSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    pub(crate) fn with_everything(
        initial_capacity: usize,
        displacement_limit: usize,
        build_hasher: S,
    ) -> Self {
        assert!(initial_capacity > 0, "initial_capacity must not be zero");
        assert!(displacement_limit > 0, "displacement_limit must not be zero");

        Self {
            base: Arc::new(BaseSet {
                inner: RwLock::new(Inner::with_capacity(initial_capacity, SeedPair::random())),
                build_hasher,
                displacement_limit,
            }),
        }
    }

    /// Returns `true` if the set holds an element equal to `value`.
    ///
    /// The value may be any borrowed form of the element type, but `Hash` and
    /// `Eq` on the borrowed form _must_ match those for the element type.
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let inner = self.base.inner.read();
        let (i0, i1) = inner.index_pair(&self.base.build_hasher, value);
        let (bucket0, bucket1) = stripe::lock_pair(&inner.table0, &inner.table1, i0, i1);
        slot_eq(&bucket0, value) || slot_eq(&bucket1, value)
    }

    /// Adds `value` to the set.
    ///
    /// Returns `true` if the element was newly inserted, `false` if an equal
    /// element was already present. Inserting may grow the tables.
    pub fn insert(&self, value: T) -> bool {
        {
            let inner = self.base.inner.read();
            let (i0, i1) = inner.index_pair(&self.base.build_hasher, &value);
            let (mut bucket0, mut bucket1) =
                stripe::lock_pair(&inner.table0, &inner.table1, i0, i1);

            if slot_eq(&bucket0, &value) || slot_eq(&bucket1, &value) {
                return false;
            }
            if bucket0.is_none() {
                *bucket0 = Some(value);
                return true;
            }
            if bucket1.is_none() {
                *bucket1 = Some(value);
                return true;
            }
        }

        // Both home buckets are taken. The displacement chain would have to
        // lock buckets of other elements, so it runs alone under the
        // exclusive barrier instead.
        self.insert_displacing(value)
    }

    /// Removes the element equal to `value` from the set, checking table 0
    /// first.
    ///
    /// Returns `true` if such an element was present.
    pub fn remove<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let inner = self.base.inner.read();
        let (i0, i1) = inner.index_pair(&self.base.build_hasher, value);
        let (mut bucket0, mut bucket1) = stripe::lock_pair(&inner.table0, &inner.table1, i0, i1);

        if slot_eq(&bucket0, value) {
            *bucket0 = None;
            true
        } else if slot_eq(&bucket1, value) {
            *bucket1 = None;
            true
        } else {
            false
        }
    }

    /// Returns a best-effort count of the elements in the set.
    ///
    /// The count is exact while no other thread is mutating the set;
    /// operations running concurrently with the scan may or may not be
    /// reflected in it.
    pub fn len(&self) -> usize {
        let inner = self.base.inner.read();
        inner.occupied()
    }

    /// Returns `true` if [`len`](#method.len) observes no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current number of buckets per table. The count doubles on
    /// every resize and never shrinks.
    pub fn capacity(&self) -> usize {
        self.base.inner.read().capacity()
    }

    /// Returns the displacement limit this set was built with.
    pub fn displacement_limit(&self) -> usize {
        self.base.displacement_limit
    }
}

impl<S> CuckooSet<u64, S>
where
    S: BuildHasher,
{
    /// Inserts `n` distinct elements drawn uniformly from `[0, 8n)`,
    /// redrawing whenever a draw is already present.
    pub fn populate(&self, n: usize) {
        if n == 0 {
            return;
        }

        let mut rng = rand::thread_rng();
        let upper = n as u64 * 8;
        for _ in 0..n {
            while !self.insert(rng.gen_range(0..upper)) {}
        }
    }
}

//
// private
//
impl<T, S> CuckooSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Inserts `value` under the exclusive barrier, running the displacement
    /// chain without bucket locks and growing the tables whenever the chain
    /// overflows.
    fn insert_displacing(&self, value: T) -> bool {
        let mut inner = self.base.inner.write();

        // The fast path gave up its locks before escalating, so another
        // thread may have inserted an equal element in the meantime.
        let (i0, i1) = inner.index_pair(&self.base.build_hasher, &value);
        if slot_eq(inner.table0[i0].get_mut(), &value) || slot_eq(inner.table1[i1].get_mut(), &value)
        {
            return false;
        }

        let mut carry = value;
        loop {
            match inner.chain_insert(&self.base.build_hasher, self.base.displacement_limit, carry)
            {
                Ok(()) => return true,
                Err(evicted) => {
                    carry = evicted;
                    inner.grow(&self.base.build_hasher, self.base.displacement_limit);
                }
            }
        }
    }
}

impl<T> Inner<T> {
    fn with_capacity(capacity: usize, seeds: SeedPair) -> Self {
        Self {
            seeds,
            table0: stripe::bucket_table(capacity),
            table1: stripe::bucket_table(capacity),
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.table0.len()
    }

    #[inline]
    fn index_pair<Q, S>(&self, build_hasher: &S, value: &Q) -> (usize, usize)
    where
        Q: Hash + ?Sized,
        S: BuildHasher,
    {
        self.seeds.index_pair(build_hasher, value, self.capacity())
    }

    fn occupied(&self) -> usize {
        self.table0
            .iter()
            .chain(self.table1.iter())
            .filter(|bucket| bucket.lock().is_some())
            .count()
    }

    /// The displacement chain of the insertion engine. Requires exclusive
    /// access; bucket locks are bypassed with `get_mut`. Returns the element
    /// left without a slot when the bound is hit.
    fn chain_insert<S>(&mut self, build_hasher: &S, limit: usize, value: T) -> Result<(), T>
    where
        T: Hash,
        S: BuildHasher,
    {
        let capacity = self.capacity();
        let mut carry = value;

        for _ in 0..limit {
            let (i0, _) = self.seeds.index_pair(build_hasher, &carry, capacity);
            carry = match self.table0[i0].get_mut().replace(carry) {
                None => return Ok(()),
                Some(evicted) => evicted,
            };

            let (_, i1) = self.seeds.index_pair(build_hasher, &carry, capacity);
            carry = match self.table1[i1].get_mut().replace(carry) {
                None => return Ok(()),
                Some(evicted) => evicted,
            };
        }

        Err(carry)
    }

    fn drain_elements(&mut self) -> Vec<T> {
        self.table0
            .iter_mut()
            .chain(self.table1.iter_mut())
            .filter_map(|bucket| bucket.get_mut().take())
            .collect()
    }

    /// Doubles the tables, reseeds the hash functions and reinserts every
    /// element. A reinsertion chain that overflows doubles the tables again
    /// and starts the reinsertion over. Requires exclusive access.
    fn grow<S>(&mut self, build_hasher: &S, limit: usize)
    where
        T: Hash,
        S: BuildHasher,
    {
        let old_capacity = self.capacity();
        let mut pending = self.drain_elements();

        let mut new_capacity = old_capacity * 2;
        loop {
            let mut fresh = Inner::with_capacity(new_capacity, SeedPair::random());

            let mut overflow = None;
            while let Some(value) = pending.pop() {
                if let Err(evicted) = fresh.chain_insert(build_hasher, limit, value) {
                    overflow = Some(evicted);
                    break;
                }
            }

            match overflow {
                None => {
                    log::debug!(
                        "grew striped cuckoo set from {} to {} buckets per table",
                        old_capacity,
                        new_capacity
                    );
                    *self = fresh;
                    return;
                }
                Some(evicted) => {
                    pending.push(evicted);
                    pending.extend(fresh.drain_elements());
                    new_capacity *= 2;
                }
            }
        }
    }
}

impl<T, S> fmt::Debug for CuckooSet<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.base.inner.read();
        f.debug_struct("CuckooSet")
            .field("capacity", &inner.capacity())
            .field("len", &inner.occupied())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::CuckooSet;

    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Barrier,
        },
        thread,
    };

    #[test]
    fn basic_single_element_lifecycle() {
        let set = CuckooSet::new(8, 100);

        assert!(set.insert(5));
        assert!(!set.insert(5));
        assert!(set.contains(&5));
        assert!(set.remove(&5));
        assert!(!set.contains(&5));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn tiny_table_grows_to_fit() {
        let set = CuckooSet::new(2, 3);

        for i in 0..8 {
            assert!(set.insert(i * 31));
        }

        assert!(set.capacity() >= 4);
        assert_eq!(set.len(), 8);
        for i in 0..8 {
            assert!(set.contains(&(i * 31)));
        }
    }

    #[test]
    fn remove_of_absent_element_is_a_no_op() {
        let set = CuckooSet::new(8, 100);
        set.insert("present");

        assert!(!set.remove(&"absent"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn clones_share_the_same_tables() {
        let set = CuckooSet::new(8, 100);
        let other = set.clone();

        assert!(set.insert(1));
        assert!(other.contains(&1));
        assert!(other.remove(&1));
        assert!(!set.contains(&1));
    }

    #[test]
    fn concurrent_distinct_inserts_are_all_kept() {
        const THREADS: u64 = 4;
        const PER_THREAD: u64 = 500;

        let set = CuckooSet::new(64, 100);
        let barrier = std::sync::Arc::new(Barrier::new(THREADS as usize));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let set = set.clone();
                let barrier = std::sync::Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..PER_THREAD {
                        assert!(set.insert(t * PER_THREAD + i));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("insert thread panicked");
        }

        assert_eq!(set.len(), (THREADS * PER_THREAD) as usize);
        for key in 0..THREADS * PER_THREAD {
            assert!(set.contains(&key));
        }
    }

    #[test]
    fn concurrent_duplicate_inserts_accept_exactly_one() {
        const THREADS: usize = 8;

        let set = CuckooSet::new(16, 100);
        let barrier = std::sync::Arc::new(Barrier::new(THREADS));
        let accepted = std::sync::Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let set = set.clone();
                let barrier = std::sync::Arc::clone(&barrier);
                let accepted = std::sync::Arc::clone(&accepted);
                thread::spawn(move || {
                    barrier.wait();
                    if set.insert("contested") {
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("insert thread panicked");
        }

        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn populate_inserts_exactly_n_distinct_elements() {
        let set = CuckooSet::new(64, 100);
        set.populate(100);

        assert_eq!(set.len(), 100);
    }

    #[test]
    fn capacity_only_grows() {
        let set = CuckooSet::new(2, 3);
        let mut last = set.capacity();

        for i in 0..64_u64 {
            set.insert(i);
            let now = set.capacity();
            assert!(now >= last);
            last = now;
        }
    }
}
