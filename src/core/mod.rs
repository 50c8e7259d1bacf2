// ============================================================================
// spark-tree - Core Module
// Change signals, keys, errors and the thread-local context
// ============================================================================

pub mod change;
pub mod context;
pub mod error;
pub mod types;

// Re-export commonly used items
pub use change::Change;
pub use context::{TreeContext, is_mutating, with_context};
pub use error::TreeError;
pub use types::{IdGenerator, Key, Kind, UnwatchFn, ValidationError, WatchFn};
