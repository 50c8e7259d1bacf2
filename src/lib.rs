// ============================================================================
// spark-tree - An Observable Value Tree for Rust
// ============================================================================
//
// Wraps a JSON-like value in a tree of nodes. Every node can be watched,
// knows whether it differs from its initial value, and keeps its identity
// across detach and re-attach, so form fields and their watchers survive the
// data underneath them coming and going.
// ============================================================================

#[macro_use]
mod macros;

pub mod collections;
pub mod core;
pub mod primitives;
pub mod reactivity;

// Re-export core items at crate root for ergonomic access
pub use crate::core::change::Change;
pub use crate::core::context::{TreeContext, is_mutating, with_context};
pub use crate::core::error::TreeError;
pub use crate::core::types::{IdGenerator, Key, Kind, UnwatchFn, ValidationError, WatchFn};

// Re-export primitives at crate root
pub use crate::primitives::navigation::Lookup;
pub use crate::primitives::node::{Node, NodeOptions, node};

// Re-export reactivity functions
pub use crate::reactivity::batching::{batch, is_batching};
pub use crate::reactivity::equality::{same_value, strict_equals};
pub use crate::reactivity::scheduling::{MAX_FLUSH_ROUNDS, flush};
pub use crate::reactivity::withhold::Withheld;

// Re-export collections
pub use crate::collections::PhantomRegistry;

// =============================================================================
// TESTS
// =============================================================================
