use super::{CuckooSet, PhasedCuckooSet};
use crate::common::DEFAULT_DISPLACEMENT_LIMIT;

use std::{
    collections::hash_map::RandomState,
    hash::{BuildHasher, Hash},
    marker::PhantomData,
};

/// Bucket capacity used when `probe_size` is not configured explicitly.
const DEFAULT_PROBE_SIZE: usize = 4;

/// Soft bucket bound used when `threshold` is not configured explicitly.
const DEFAULT_THRESHOLD: usize = 2;

/// Builds a [`CuckooSet`][set-struct] or [`PhasedCuckooSet`][phased-struct]
/// with various configuration knobs.
///
/// [set-struct]: ./struct.CuckooSet.html
/// [phased-struct]: ./struct.PhasedCuckooSet.html
///
/// # Examples
///
/// ```rust
/// use koel::sync::CuckooSet;
///
/// // A striped set with one element per bucket.
/// let set = CuckooSet::builder(1024)
///     .displacement_limit(100)
///     .build();
/// assert!(set.insert("wren"));
///
/// // A phased set holding up to four elements per bucket.
/// let set = CuckooSet::builder(1024)
///     .probe_size(4)
///     .threshold(2)
///     .build();
/// assert!(set.insert("lark"));
/// ```
pub struct SetBuilder<C> {
    initial_capacity: usize,
    displacement_limit: usize,
    probe_size: usize,
    threshold: usize,
    set_type: PhantomData<C>,
}

impl<T> SetBuilder<CuckooSet<T, RandomState>>
where
    T: Hash + Eq,
{
    /// Constructs a new `SetBuilder` that will build a `CuckooSet` or
    /// `PhasedCuckooSet` with `initial_capacity` buckets per table.
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            initial_capacity,
            displacement_limit: DEFAULT_DISPLACEMENT_LIMIT,
            probe_size: DEFAULT_PROBE_SIZE,
            threshold: DEFAULT_THRESHOLD,
            set_type: PhantomData,
        }
    }

    /// Switches to building a [`PhasedCuckooSet`](./struct.PhasedCuckooSet.html)
    /// whose buckets hold up to `probe_size` elements.
    ///
    /// # Panics
    ///
    /// Panics if `probe_size` is zero.
    pub fn probe_size(self, probe_size: usize) -> SetBuilder<PhasedCuckooSet<T, RandomState>> {
        assert!(probe_size > 0, "probe_size must not be zero");

        SetBuilder {
            initial_capacity: self.initial_capacity,
            displacement_limit: self.displacement_limit,
            probe_size,
            threshold: self.threshold,
            set_type: PhantomData,
        }
    }

    /// Builds a `CuckooSet<T>`.
    ///
    /// If you want to build a `PhasedCuckooSet<T>`, call the `probe_size`
    /// method before calling this method.
    ///
    /// # Panics
    ///
    /// Panics if the configured initial capacity or displacement limit is
    /// zero.
    pub fn build(self) -> CuckooSet<T, RandomState> {
        self.build_with_hasher(RandomState::default())
    }

    /// Builds a `CuckooSet<T, S>` with the given `hasher`.
    ///
    /// # Panics
    ///
    /// Panics if the configured initial capacity or displacement limit is
    /// zero.
    pub fn build_with_hasher<S>(self, hasher: S) -> CuckooSet<T, S>
    where
        S: BuildHasher,
    {
        CuckooSet::with_everything(self.initial_capacity, self.displacement_limit, hasher)
    }
}

impl<T> SetBuilder<PhasedCuckooSet<T, RandomState>>
where
    T: Hash + Eq,
{
    /// Sets the bucket length above which an insert schedules a relocation
    /// pass. Must be below the probe size.
    pub fn threshold(self, threshold: usize) -> Self {
        Self { threshold, ..self }
    }

    /// Builds a `PhasedCuckooSet<T>`.
    ///
    /// # Panics
    ///
    /// Panics if the configured initial capacity, displacement limit or
    /// probe size is zero, or if the threshold is not below the probe size.
    pub fn build(self) -> PhasedCuckooSet<T, RandomState> {
        self.build_with_hasher(RandomState::default())
    }

    /// Builds a `PhasedCuckooSet<T, S>` with the given `hasher`.
    ///
    /// # Panics
    ///
    /// Panics if the configured initial capacity, displacement limit or
    /// probe size is zero, or if the threshold is not below the probe size.
    pub fn build_with_hasher<S>(self, hasher: S) -> PhasedCuckooSet<T, S>
    where
        S: BuildHasher,
    {
        PhasedCuckooSet::with_everything(
            self.initial_capacity,
            self.displacement_limit,
            self.probe_size,
            self.threshold,
            hasher,
        )
    }
}

impl<C> SetBuilder<C> {
    /// Sets the maximum length of a displacement or relocation chain before
    /// the tables are grown instead.
    pub fn displacement_limit(self, limit: usize) -> Self {
        Self {
            displacement_limit: limit,
            ..self
        }
    }
}
