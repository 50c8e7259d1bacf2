// ============================================================================
// spark-tree - Errors
// Structural invariant violations
// ============================================================================

use thiserror::Error;

use super::types::{Key, Kind};

/// A structural invariant of the tree was violated.
///
/// These signal a sequencing bug in the caller (or in the tree itself) and are
/// never recovered internally. Validation problems are not errors; see
/// [`ValidationError`](crate::ValidationError).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("child `{key}` detached but is not attached to its container")]
    ChildNotAttached { key: Key },

    #[error("child `{key}` attached but is not registered as a phantom of its container")]
    ChildNotRegistered { key: Key },

    #[error("key `{key}` is already held by a different child")]
    KeyOccupied { key: Key },

    #[error("key `{key}` is not a valid array index")]
    InvalidIndex { key: Key },

    #[error("expected an array node, found {kind}")]
    NotAnArray { kind: Kind },
}
