//! Provides thread-safe, concurrent cuckoo set implementations.

mod builder;
mod phased;
mod set;
mod stripe;

pub use {builder::SetBuilder, phased::PhasedCuckooSet, set::CuckooSet};
