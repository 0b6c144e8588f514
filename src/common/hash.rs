use std::hash::{BuildHasher, Hash};

use rand::Rng;

/// The pair of seeds diversifying the two hash functions of a cuckoo table.
///
/// Bucket indices are computed as `(hash(x) ^ seed) % capacity`, one seed per
/// table. XOR-ing the seed into the finished hash keeps the full key entropy
/// in play while still letting a reseed remap every element; transforms that
/// multiply the hash before reducing it collapse distinct keys onto the same
/// bucket and must not be used here.
///
/// A fresh pair is drawn on every resize so that elements colliding under the
/// old seeds are unlikely to collide under the new ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SeedPair {
    seed0: u64,
    seed1: u64,
}

impl SeedPair {
    /// Draws a fresh pair from thread-local entropy. The two seeds are always
    /// distinct, otherwise both tables would agree on every index and the
    /// second table could never relieve the first.
    pub(crate) fn random() -> Self {
        let mut rng = rand::thread_rng();
        let seed0 = rng.gen();
        let mut seed1 = rng.gen();
        while seed1 == seed0 {
            seed1 = rng.gen();
        }
        Self { seed0, seed1 }
    }

    #[cfg(test)]
    pub(crate) fn fixed(seed0: u64, seed1: u64) -> Self {
        assert_ne!(seed0, seed1);
        Self { seed0, seed1 }
    }

    /// Returns the bucket indices of `value` in table 0 and table 1 for
    /// tables of `capacity` buckets each.
    ///
    /// Pure for a fixed `(seed0, seed1, capacity)`. The two indices may
    /// coincide; callers must tolerate that.
    #[inline]
    pub(crate) fn index_pair<Q, S>(
        &self,
        build_hasher: &S,
        value: &Q,
        capacity: usize,
    ) -> (usize, usize)
    where
        Q: Hash + ?Sized,
        S: BuildHasher,
    {
        let hash = build_hasher.hash_one(value);
        (
            ((hash ^ self.seed0) % capacity as u64) as usize,
            ((hash ^ self.seed1) % capacity as u64) as usize,
        )
    }
}
