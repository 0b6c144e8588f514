use super::CuckooSet;
use crate::common::DEFAULT_DISPLACEMENT_LIMIT;

use std::{
    collections::hash_map::RandomState,
    hash::{BuildHasher, Hash},
    marker::PhantomData,
};

/// Builds a [`CuckooSet`][set-struct] with various configuration knobs.
///
/// [set-struct]: ./struct.CuckooSet.html
///
/// # Examples
///
/// ```rust
/// use koel::unsync::CuckooSet;
///
/// let mut set = CuckooSet::builder(16)
///     // Give up on a displacement chain after 50 swaps.
///     .displacement_limit(50)
///     // Create the set.
///     .build();
///
/// set.insert('a');
/// assert!(set.contains(&'a'));
/// ```
pub struct SetBuilder<C> {
    initial_capacity: usize,
    displacement_limit: usize,
    set_type: PhantomData<C>,
}

impl<T> SetBuilder<CuckooSet<T, RandomState>>
where
    T: Hash + Eq,
{
    /// Constructs a new `SetBuilder` that will build a `CuckooSet` with
    /// `initial_capacity` buckets per table.
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            initial_capacity,
            displacement_limit: DEFAULT_DISPLACEMENT_LIMIT,
            set_type: PhantomData,
        }
    }

    /// Builds a `CuckooSet<T>`.
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

impl<C> SetBuilder<C> {
    /// Sets the maximum length of a displacement chain before the tables are
    /// grown instead.
    pub fn displacement_limit(self, limit: usize) -> Self {
        Self {
            displacement_limit: limit,
            ..self
        }
    }
}
