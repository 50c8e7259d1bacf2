// ============================================================================
// spark-tree - Primitives Module
// Nodes, their variants, navigation and derived nodes
// ============================================================================

pub mod derived;
pub mod navigation;
pub mod node;
pub(crate) mod variant;

// Re-export for convenience
pub use navigation::Lookup;
pub use node::{Node, NodeInner, NodeOptions, node};
