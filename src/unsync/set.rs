use super::SetBuilder;
use crate::common::{hash::SeedPair, slot_eq};

use std::{
    borrow::Borrow,
    collections::hash_map::RandomState,
    fmt,
    hash::{BuildHasher, Hash},
};

use rand::Rng;

/// A cuckoo hashing set that is _not_ thread-safe.
///
/// Every element is stored in one of two home buckets, determined by two
/// independently seeded hash functions. `insert` displaces incumbents along a
/// bounded chain to free a home slot; when the chain exceeds the displacement
/// limit, the tables double in size, the hash functions are reseeded and every
/// element is reinserted.
///
/// Lookups and removals inspect at most two buckets.
///
/// # Examples
///
/// ```rust
/// use koel::unsync::CuckooSet;
///
/// let mut set = CuckooSet::new(8, 100);
///
/// assert!(set.insert(5));
/// assert!(!set.insert(5));
/// assert!(set.contains(&5));
/// assert!(set.remove(&5));
/// assert!(!set.contains(&5));
/// assert_eq!(set.len(), 0);
/// ```
///
/// # Hashing Algorithm
///
/// By default the set hashes with `std::collections::HashMap`'s hasher
/// (currently SipHash 1-3), which resists HashDoS attacks. A different
/// algorithm can be supplied per set through
/// [`SetBuilder::build_with_hasher`](./struct.SetBuilder.html#method.build_with_hasher).
pub struct CuckooSet<T, S = RandomState> {
    table0: Vec<Option<T>>,
    table1: Vec<Option<T>>,
    seeds: SeedPair,
    build_hasher: S,
    displacement_limit: usize,
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
    /// `CuckooSet` with various configuration knobs.
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
            table0: empty_table(initial_capacity),
            table1: empty_table(initial_capacity),
            seeds: SeedPair::random(),
            build_hasher,
            displacement_limit,
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
        let (i0, i1) = self.index_pair(value);
        slot_eq(&self.table0[i0], value) || slot_eq(&self.table1[i1], value)
    }

    /// Adds `value` to the set.
    ///
    /// Returns `true` if the element was newly inserted, `false` if an equal
    /// element was already present. Inserting may grow the tables.
    pub fn insert(&mut self, value: T) -> bool {
        if self.contains(&value) {
            return false;
        }

        let mut carry = value;
        loop {
            match chain_insert(
                &mut self.table0,
                &mut self.table1,
                &self.seeds,
                &self.build_hasher,
                self.displacement_limit,
                carry,
            ) {
                Ok(()) => return true,
                Err(evicted) => {
                    carry = evicted;
                    self.grow();
                }
            }
        }
    }

    /// Removes the element equal to `value` from the set.
    ///
    /// Returns `true` if such an element was present.
    pub fn remove<Q>(&mut self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (i0, i1) = self.index_pair(value);
        if slot_eq(&self.table0[i0], value) {
            self.table0[i0] = None;
            true
        } else if slot_eq(&self.table1[i1], value) {
            self.table1[i1] = None;
            true
        } else {
            false
        }
    }

    /// Returns the number of elements in the set.
    pub fn len(&self) -> usize {
        occupied(&self.table0) + occupied(&self.table1)
    }

    /// Returns `true` if the set holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current number of buckets per table. The count doubles on
    /// every resize and never shrinks.
    pub fn capacity(&self) -> usize {
        self.table0.len()
    }

    /// Returns the displacement limit this set was built with.
    pub fn displacement_limit(&self) -> usize {
        self.displacement_limit
    }
}

impl<S> CuckooSet<u64, S>
where
    S: BuildHasher,
{
    /// Inserts `n` distinct elements drawn uniformly from `[0, 8n)`,
    /// redrawing whenever a draw is already present.
    pub fn populate(&mut self, n: usize) {
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
    #[inline]
    fn index_pair<Q>(&self, value: &Q) -> (usize, usize)
    where
        Q: Hash + ?Sized,
    {
        self.seeds
            .index_pair(&self.build_hasher, value, self.capacity())
    }

    /// Doubles the tables, reseeds the hash functions and reinserts every
    /// element. A reinsertion chain that overflows doubles the tables again
    /// and starts the reinsertion over.
    fn grow(&mut self) {
        let old_capacity = self.capacity();
        let mut pending: Vec<T> = self
            .table0
            .iter_mut()
            .chain(self.table1.iter_mut())
            .filter_map(Option::take)
            .collect();

        let mut new_capacity = old_capacity * 2;
        loop {
            let seeds = SeedPair::random();
            let mut table0 = empty_table(new_capacity);
            let mut table1 = empty_table(new_capacity);

            let mut overflow = None;
            while let Some(value) = pending.pop() {
                if let Err(evicted) = chain_insert(
                    &mut table0,
                    &mut table1,
                    &seeds,
                    &self.build_hasher,
                    self.displacement_limit,
                    value,
                ) {
                    overflow = Some(evicted);
                    break;
                }
            }

            match overflow {
                None => {
                    log::debug!(
                        "grew cuckoo set from {} to {} buckets per table",
                        old_capacity,
                        new_capacity
                    );
                    self.table0 = table0;
                    self.table1 = table1;
                    self.seeds = seeds;
                    return;
                }
                Some(evicted) => {
                    pending.push(evicted);
                    pending.extend(
                        table0
                            .iter_mut()
                            .chain(table1.iter_mut())
                            .filter_map(Option::take),
                    );
                    new_capacity *= 2;
                }
            }
        }
    }
}

impl<T, S> fmt::Debug for CuckooSet<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CuckooSet")
            .field("capacity", &self.table0.len())
            .field("len", &(occupied(&self.table0) + occupied(&self.table1)))
            .finish()
    }
}

fn empty_table<T>(capacity: usize) -> Vec<Option<T>> {
    std::iter::repeat_with(|| None).take(capacity).collect()
}

fn occupied<T>(table: &[Option<T>]) -> usize {
    table.iter().filter(|slot| slot.is_some()).count()
}

/// Runs the displacement chain for `value`: swap into its home in table 0,
/// move the evicted element to its home in table 1, and keep alternating with
/// whatever was displaced, for at most `limit` rounds. Returns the element
/// left without a slot when the bound is hit.
fn chain_insert<T, S>(
    table0: &mut [Option<T>],
    table1: &mut [Option<T>],
    seeds: &SeedPair,
    build_hasher: &S,
    limit: usize,
    value: T,
) -> Result<(), T>
where
    T: Hash,
    S: BuildHasher,
{
    let capacity = table0.len();
    let mut carry = value;

    for _ in 0..limit {
        let (i0, _) = seeds.index_pair(build_hasher, &carry, capacity);
        carry = match table0[i0].replace(carry) {
            None => return Ok(()),
            Some(evicted) => evicted,
        };

        let (_, i1) = seeds.index_pair(build_hasher, &carry, capacity);
        carry = match table1[i1].replace(carry) {
            None => return Ok(()),
            Some(evicted) => evicted,
        };
    }

    Err(carry)
}

#[cfg(test)]
mod tests {
    use super::CuckooSet;

    use std::hash::{BuildHasher, Hasher};

    /// Hashes every value to the same bucket pair, forcing collisions and
    /// displacement on every insert.
    #[derive(Clone, Default)]
    struct ConstantState;

    struct ConstantHasher;

    impl BuildHasher for ConstantState {
        type Hasher = ConstantHasher;

        fn build_hasher(&self) -> Self::Hasher {
            ConstantHasher
        }
    }

    impl Hasher for ConstantHasher {
        fn finish(&self) -> u64 {
            0
        }

        fn write(&mut self, _bytes: &[u8]) {}
    }

    #[test]
    fn basic_single_element_lifecycle() {
        let mut set = CuckooSet::new(8, 100);

        assert!(set.insert(5));
        assert!(!set.insert(5));
        assert!(set.contains(&5));
        assert!(set.remove(&5));
        assert!(!set.contains(&5));
        assert_eq!(set.len(), 0);
        assert!(set.is_empty());
    }

    #[test]
    fn inserts_survive_growth() {
        let mut set = CuckooSet::new(4, 10);

        for i in 1..=5 {
            assert!(set.insert(i));
        }

        assert_eq!(set.len(), 5);
        for i in 1..=5 {
            assert!(set.contains(&i));
        }
        assert!(set.capacity() >= 4);
    }

    #[test]
    fn tiny_table_grows_to_fit() {
        let mut set = CuckooSet::new(2, 3);

        for i in 0..8 {
            assert!(set.insert(i * 31));
        }

        // Two tables of two buckets hold at most four elements, so the
        // capacity must have at least doubled to take all eight.
        assert!(set.capacity() >= 4);
        assert_eq!(set.len(), 8);
        for i in 0..8 {
            assert!(set.contains(&(i * 31)));
        }
    }

    #[test]
    fn remove_of_absent_element_is_a_no_op() {
        let mut set = CuckooSet::new(8, 100);
        set.insert(1);

        assert!(!set.remove(&2));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn insert_then_remove_round_trip() {
        let mut set = CuckooSet::new(16, 100);
        for i in 0..10 {
            set.insert(i);
        }
        let len_before = set.len();

        assert!(set.insert(99));
        assert!(set.remove(&99));
        assert_eq!(set.len(), len_before);
        for i in 0..10 {
            assert!(set.contains(&i));
        }
    }

    #[test]
    fn colliding_elements_share_a_bucket_pair() {
        // All elements map to a single bucket in each table; the second
        // insert must displace the first into table 1.
        let mut set = CuckooSet::builder(4)
            .displacement_limit(8)
            .build_with_hasher(ConstantState);

        assert!(set.insert("left"));
        assert!(set.insert("right"));
        assert!(set.contains(&"left"));
        assert!(set.contains(&"right"));
        assert_eq!(set.len(), 2);

        assert!(set.remove(&"left"));
        assert!(set.contains(&"right"));
    }

    #[test]
    fn populate_inserts_exactly_n_distinct_elements() {
        let mut set = CuckooSet::new(64, 100);
        set.populate(100);

        assert_eq!(set.len(), 100);
    }

    #[test]
    fn debug_reports_capacity_and_len() {
        let mut set = CuckooSet::new(8, 100);
        set.insert(3);

        let rendered = format!("{set:?}");
        assert!(rendered.contains("capacity"));
        assert!(rendered.contains("len"));
    }
}
