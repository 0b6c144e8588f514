#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! Koel provides set implementations built on [cuckoo hashing]: every element
//! has two candidate home buckets given by two independently seeded hash
//! functions, and insertion displaces incumbents along a bounded chain until
//! each element rests in one of its homes. Lookups and removals therefore
//! touch at most two buckets, regardless of how full the tables are.
//!
//! Three implementations are provided:
//!
//! - [`unsync::CuckooSet`]: a single-threaded set holding one element per
//!   bucket. The smallest and fastest option when no sharing is needed.
//! - [`sync::CuckooSet`]: a thread-safe set with the same one-element
//!   buckets, made concurrent by striping a lock over every bucket and
//!   coordinating table growth through a readers-writer barrier.
//! - [`sync::PhasedCuckooSet`]: a thread-safe set whose buckets hold a small
//!   bounded group of elements. Overfull buckets are rebalanced in place by a
//!   relocation pass instead of immediately growing the table, which keeps
//!   resizes rare under write-heavy workloads.
//!
//! All sets are generic over the element type (`T: Hash + Eq`) and the hash
//! builder (`S: BuildHasher`), defaulting to the standard library's
//! SipHash-backed `RandomState`. Alternate hashers can be supplied through
//! the builders, for example to pin seeds in tests.
//!
//! # Example
//!
//! ```rust
//! use koel::sync::CuckooSet;
//!
//! let set = CuckooSet::new(8, 100);
//!
//! assert!(set.insert("finch"));
//! assert!(!set.insert("finch"));
//! assert!(set.contains(&"finch"));
//! assert!(set.remove(&"finch"));
//! assert!(set.is_empty());
//! ```
//!
//! [cuckoo hashing]: https://en.wikipedia.org/wiki/Cuckoo_hashing

pub(crate) mod common;
pub mod sync;
pub mod unsync;
