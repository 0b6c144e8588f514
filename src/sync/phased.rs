use super::stripe::{self, BucketTable};
use crate::common::{hash::SeedPair, probe::ProbeBucket};

use std::{
    borrow::Borrow,
    collections::hash_map::RandomState,
    fmt,
    hash::{BuildHasher, Hash},
    sync::Arc,
};

use parking_lot::RwLock;
use rand::Rng;

/// A thread-safe cuckoo hashing set whose buckets hold a small bounded group
/// of elements.
///
/// Buckets accept up to `probe_size` elements but aim to stay below a softer
/// `threshold`. An insert that pushes a bucket over the threshold schedules a
/// relocation pass, which walks the bucket's oldest element to its alternate
/// bucket, chaining through further buckets if needed. Only when relocation
/// cannot find room, or both home buckets are completely full, do the tables
/// grow. This keeps resizes rare under write-heavy workloads at the cost of
/// scanning up to `probe_size` entries per bucket on lookups.
///
/// The locking protocol matches [`CuckooSet`](./struct.CuckooSet.html): one
/// lock per bucket taken in canonical order, plus a readers-writer barrier
/// that serializes resizes against everything else. Relocation takes at most
/// one bucket pair at a time, so it cannot deadlock with other operations.
///
/// # Examples
///
/// ```rust
/// use koel::sync::CuckooSet;
///
/// let set = CuckooSet::builder(4)
///     .probe_size(4)
///     .threshold(2)
///     .build();
///
/// for i in 0..16 {
///     assert!(set.insert(i));
/// }
/// for i in 0..16 {
///     assert!(set.contains(&i));
/// }
/// ```
pub struct PhasedCuckooSet<T, S = RandomState> {
    base: Arc<BaseSet<T, S>>,
}

impl<T, S> Clone for PhasedCuckooSet<T, S> {
    fn clone(&self) -> Self {
        Self {
            base: Arc::clone(&self.base),
        }
    }
}

struct BaseSet<T, S> {
    inner: RwLock<Inner<T>>,
    build_hasher: S,
    displacement_limit: usize,
    probe_size: usize,
    threshold: usize,
}

struct Inner<T> {
    seeds: SeedPair,
    table0: BucketTable<ProbeBucket<T>>,
    table1: BucketTable<ProbeBucket<T>>,
}

/// Where an insert left the table after releasing its bucket locks.
enum Placement<T> {
    /// The element rests in a bucket below the threshold.
    Done,
    /// The element was appended to an over-threshold bucket that should be
    /// rebalanced.
    Rebalance { table: usize, index: usize },
    /// Both home buckets are full; the element could not be placed.
    Full(T),
}

impl<T> PhasedCuckooSet<T, RandomState>
where
    T: Hash + Eq + Clone,
{
    /// Constructs a new `PhasedCuckooSet<T>` with `initial_capacity` buckets
    /// per table, the given displacement limit, and the given bucket bounds.
    ///
    /// To supply a hasher, use the [`SetBuilder`](./struct.SetBuilder.html).
    ///
    /// # Panics
    ///
    /// Panics if `initial_capacity`, `displacement_limit` or `probe_size` is
    /// zero, or if `threshold` is not below `probe_size`.
    pub fn new(
        initial_capacity: usize,
        displacement_limit: usize,
        probe_size: usize,
        threshold: usize,
    ) -> Self {
        Self::with_everything(
            initial_capacity,
            displacement_limit,
            probe_size,
            threshold,
            RandomState::default(),
        )
    }
}

//
// public
//
impl<T, S> PhasedCuckooSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    pub(crate) fn with_everything(
        initial_capacity: usize,
        displacement_limit: usize,
        probe_size: usize,
        threshold: usize,
        build_hasher: S,
    ) -> Self {
        assert!(initial_capacity > 0, "initial_capacity must not be zero");
        assert!(displacement_limit > 0, "displacement_limit must not be zero");
        assert!(probe_size > 0, "probe_size must not be zero");
        assert!(
            threshold < probe_size,
            "threshold must be below probe_size"
        );

        Self {
            base: Arc::new(BaseSet {
                inner: RwLock::new(Inner::with_capacity(initial_capacity, SeedPair::random())),
                build_hasher,
                displacement_limit,
                probe_size,
                threshold,
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
        bucket0.contains(value) || bucket1.contains(value)
    }

    /// Adds `value` to the set.
    ///
    /// Returns `true` if the element was newly inserted, `false` if an equal
    /// element was already present. Inserting may rebalance buckets or grow
    /// the tables.
    pub fn insert(&self, value: T) -> bool
    where
        T: Clone,
    {
        let mut value = value;
        loop {
            let inner = self.base.inner.read();
            let capacity = inner.capacity();
            let (i0, i1) = inner.index_pair(&self.base.build_hasher, &value);

            let placement = {
                let (mut bucket0, mut bucket1) =
                    stripe::lock_pair(&inner.table0, &inner.table1, i0, i1);

                if bucket0.contains(&value) || bucket1.contains(&value) {
                    return false;
                }

                if bucket0.len() < self.base.threshold {
                    bucket0.push(value);
                    Placement::Done
                } else if bucket1.len() < self.base.threshold {
                    bucket1.push(value);
                    Placement::Done
                } else if bucket0.len() < self.base.probe_size {
                    bucket0.push(value);
                    Placement::Rebalance {
                        table: 0,
                        index: i0,
                    }
                } else if bucket1.len() < self.base.probe_size {
                    bucket1.push(value);
                    Placement::Rebalance {
                        table: 1,
                        index: i1,
                    }
                } else {
                    Placement::Full(value)
                }
            };

            match placement {
                Placement::Done => return true,
                Placement::Rebalance { table, index } => {
                    // The element is in; rebalancing is housekeeping. A
                    // failed pass means the neighbourhood is saturated and
                    // only growing will relieve it.
                    if !self.relocate(&inner, table, index) {
                        drop(inner);
                        self.resize(capacity);
                    }
                    return true;
                }
                Placement::Full(unplaced) => {
                    value = unplaced;
                    drop(inner);
                    self.resize(capacity);
                }
            }
        }
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

        bucket0.remove(value) || bucket1.remove(value)
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

    /// Returns the maximum number of elements a bucket may hold.
    pub fn probe_size(&self) -> usize {
        self.base.probe_size
    }

    /// Returns the bucket length above which inserts schedule a relocation
    /// pass.
    pub fn threshold(&self) -> usize {
        self.base.threshold
    }

    /// Returns the length of the fullest bucket.
    #[cfg(test)]
    pub(crate) fn max_probe_len(&self) -> usize {
        let inner = self.base.inner.read();
        inner
            .table0
            .iter()
            .chain(inner.table1.iter())
            .map(|bucket| bucket.lock().len())
            .max()
            .unwrap_or(0)
    }
}

impl<S> PhasedCuckooSet<u64, S>
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
impl<T, S> PhasedCuckooSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Tries to bring the bucket at `(table, index)` back below the
    /// threshold by walking its oldest element to the alternate bucket,
    /// chaining through destinations for up to the displacement limit.
    ///
    /// Runs under the shared barrier. Each round holds at most one bucket
    /// pair, acquired in canonical order, and releases it before the next
    /// round; between rounds other threads may mutate the buckets, so a
    /// vanished victim is re-checked rather than assumed.
    ///
    /// Returns `false` if a destination was completely full; the caller
    /// resolves that by growing the tables.
    fn relocate(&self, inner: &Inner<T>, table: usize, index: usize) -> bool
    where
        T: Clone,
    {
        let threshold = self.base.threshold;
        let probe_size = self.base.probe_size;
        let mut table = table;
        let mut index = index;

        for _round in 0..self.base.displacement_limit {
            let victim = {
                let source = inner.bucket(table, index).lock();
                if source.len() < threshold {
                    return true;
                }
                match source.oldest() {
                    Some(oldest) => oldest.clone(),
                    // Only reachable with a zero threshold; an empty bucket
                    // cannot be rebalanced any further.
                    None => return true,
                }
            };

            let (j0, j1) = inner.index_pair(&self.base.build_hasher, &victim);
            let (bucket0, bucket1) = stripe::lock_pair(&inner.table0, &inner.table1, j0, j1);
            let (mut source, mut destination) = if table == 0 {
                (bucket0, bucket1)
            } else {
                (bucket1, bucket0)
            };

            if source.remove(&victim) {
                if destination.len() < threshold {
                    destination.push(victim);
                    return true;
                } else if destination.len() < probe_size {
                    destination.push(victim);
                    // The destination is now over threshold; the chain moves
                    // there.
                    index = if table == 0 { j1 } else { j0 };
                    table = 1 - table;
                } else {
                    // No room anywhere; put the victim back and let the
                    // caller grow the tables.
                    source.push(victim);
                    return false;
                }
            } else if source.len() >= threshold {
                // Another thread removed the victim but the bucket is still
                // crowded; try again with its current oldest element.
                continue;
            } else {
                return true;
            }
        }

        log::trace!(
            "relocation gave up after {} rounds; growing instead",
            self.base.displacement_limit
        );
        false
    }

    /// Grows the tables, unless another thread already did so since the
    /// caller observed `seen_capacity`.
    fn resize(&self, seen_capacity: usize) {
        let mut inner = self.base.inner.write();
        if inner.capacity() != seen_capacity {
            // Lost the race; the table has grown since the decision was
            // made. The caller simply retries its operation.
            return;
        }
        inner.grow(&self.base.build_hasher, self.base.probe_size);
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

    #[inline]
    fn bucket(&self, table: usize, index: usize) -> &parking_lot::Mutex<ProbeBucket<T>> {
        if table == 0 {
            &self.table0[index]
        } else {
            &self.table1[index]
        }
    }

    fn occupied(&self) -> usize {
        self.table0
            .iter()
            .chain(self.table1.iter())
            .map(|bucket| bucket.lock().len())
            .sum()
    }

    fn drain_elements(&mut self) -> Vec<T> {
        let mut elements = Vec::new();
        for bucket in self.table0.iter_mut().chain(self.table1.iter_mut()) {
            elements.extend(bucket.get_mut().drain());
        }
        elements
    }

    /// Reinserts `value` during a rebuild. The emptier of the two home
    /// buckets wins; buckets may end up over the threshold, which later
    /// inserts rebalance lazily. Fails only when both buckets are full.
    fn place<S>(&mut self, build_hasher: &S, probe_size: usize, value: T) -> Result<(), T>
    where
        T: Hash,
        S: BuildHasher,
    {
        let capacity = self.capacity();
        let (i0, i1) = self.seeds.index_pair(build_hasher, &value, capacity);

        let len0 = self.table0[i0].get_mut().len();
        let len1 = self.table1[i1].get_mut().len();

        if len0 <= len1 && len0 < probe_size {
            self.table0[i0].get_mut().push(value);
            Ok(())
        } else if len1 < probe_size {
            self.table1[i1].get_mut().push(value);
            Ok(())
        } else if len0 < probe_size {
            self.table0[i0].get_mut().push(value);
            Ok(())
        } else {
            Err(value)
        }
    }

    /// Doubles the tables, reseeds the hash functions and reinserts every
    /// element. If some element cannot be placed even in the doubled tables,
    /// they double again and the reinsertion starts over. Requires exclusive
    /// access.
    fn grow<S>(&mut self, build_hasher: &S, probe_size: usize)
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
                if let Err(unplaced) = fresh.place(build_hasher, probe_size, value) {
                    overflow = Some(unplaced);
                    break;
                }
            }

            match overflow {
                None => {
                    log::debug!(
                        "grew phased cuckoo set from {} to {} buckets per table",
                        old_capacity,
                        new_capacity
                    );
                    *self = fresh;
                    return;
                }
                Some(unplaced) => {
                    pending.push(unplaced);
                    pending.extend(fresh.drain_elements());
                    new_capacity *= 2;
                }
            }
        }
    }
}

impl<T, S> fmt::Debug for PhasedCuckooSet<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.base.inner.read();
        f.debug_struct("PhasedCuckooSet")
            .field("capacity", &inner.capacity())
            .field("len", &inner.occupied())
            .finish()
    }
}
