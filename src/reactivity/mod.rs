// ============================================================================
// spark-tree - Reactivity Module
// Dispatch scheduling, batching, withholding and value equality
// ============================================================================

pub mod batching;
pub mod equality;
pub mod scheduling;
pub mod withhold;

// Re-export scheduling functions
pub use scheduling::{MAX_FLUSH_ROUNDS, flush};

// Re-export batching functions
pub use batching::{batch, is_batching};

pub use withhold::Withheld;
