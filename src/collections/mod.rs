// ============================================================================
// spark-tree - Child Collections
// Object and array children, and the phantom registry they share
// ============================================================================
//
// Every container keeps two sets of children:
//
// 1. Attached: owned, in order, materialised into the container's value
// 2. Phantoms: weakly parked, keyed by their last key, claimable on re-attach
// ============================================================================

pub(crate) mod array;
pub(crate) mod object;
pub mod phantom;

pub use phantom::PhantomRegistry;
