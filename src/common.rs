use std::borrow::Borrow;

pub(crate) mod hash;
pub(crate) mod probe;

/// Displacement bound used when a set is built without an explicit one.
///
/// Chains longer than a hundred swaps are overwhelmingly a sign that the
/// tables are too full to be useful, so longer bounds only delay the resize.
pub(crate) const DEFAULT_DISPLACEMENT_LIMIT: usize = 100;

/// Returns `true` if the slot holds an element equal to `value`.
#[inline]
pub(crate) fn slot_eq<T, Q>(slot: &Option<T>, value: &Q) -> bool
where
    T: Borrow<Q>,
    Q: Eq + ?Sized,
{
    slot.as_ref().map_or(false, |stored| stored.borrow() == value)
}
