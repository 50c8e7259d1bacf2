// ============================================================================
// spark-tree - Tree Context
// Thread-local state for mutation scopes, batching and dispatch queues
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::change::Change;
use crate::primitives::node::NodeInner;

/// A node waiting for dispatch, with the signal it will receive.
pub type Pending = (Weak<NodeInner>, Change);

// =============================================================================
// TREE CONTEXT
// =============================================================================

/// Thread-local context holding all global state for dispatch ordering.
///
/// Trees never share nodes across threads, so one context per thread is
/// enough.
pub struct TreeContext {
    // =========================================================================
    // SCOPES
    // =========================================================================
    /// Nesting depth of mutation scopes (set, push, insert, ...)
    pub mutation_depth: Cell<u32>,

    /// Nesting depth of `batch()` scopes
    pub batch_depth: Cell<u32>,

    /// Whether dispatch is currently draining the queues
    pub flushing: Cell<bool>,

    // =========================================================================
    // QUEUES
    // =========================================================================
    /// Synchronous dispatches, one entry per trigger, in trigger order
    pub sync_queue: RefCell<Vec<Pending>>,

    /// Batched dispatches, coalesced per node (keyed by allocation address)
    pub batched_queue: RefCell<IndexMap<usize, Pending>>,

    // =========================================================================
    // COUNTERS
    // =========================================================================
    /// Next default node id
    pub next_node_id: Cell<u64>,

    /// Next watcher id
    pub next_watch_id: Cell<u64>,
}

impl TreeContext {
    /// Create a new context with default values
    pub fn new() -> Self {
        Self {
            mutation_depth: Cell::new(0),
            batch_depth: Cell::new(0),
            flushing: Cell::new(false),
            sync_queue: RefCell::new(Vec::new()),
            batched_queue: RefCell::new(IndexMap::new()),
            next_node_id: Cell::new(0),
            next_watch_id: Cell::new(0),
        }
    }

    // =========================================================================
    // MUTATION SCOPES
    // =========================================================================

    /// Increment mutation depth, returns new depth
    pub fn enter_mutation(&self) -> u32 {
        let depth = self.mutation_depth.get() + 1;
        self.mutation_depth.set(depth);
        depth
    }

    /// Decrement mutation depth, returns new depth
    pub fn exit_mutation(&self) -> u32 {
        let depth = self.mutation_depth.get().saturating_sub(1);
        self.mutation_depth.set(depth);
        depth
    }

    /// Check if a mutation is in progress
    pub fn is_mutating(&self) -> bool {
        self.mutation_depth.get() > 0
    }

    // =========================================================================
    // BATCHING
    // =========================================================================

    /// Increment batch depth, returns new depth
    pub fn enter_batch(&self) -> u32 {
        let depth = self.batch_depth.get() + 1;
        self.batch_depth.set(depth);
        depth
    }

    /// Decrement batch depth, returns new depth
    pub fn exit_batch(&self) -> u32 {
        let depth = self.batch_depth.get().saturating_sub(1);
        self.batch_depth.set(depth);
        depth
    }

    /// Get current batch depth
    pub fn get_batch_depth(&self) -> u32 {
        self.batch_depth.get()
    }

    /// Check if currently in a batch
    pub fn is_batching(&self) -> bool {
        self.batch_depth.get() > 0
    }

    /// Set flushing mode, returning previous
    pub fn set_flushing(&self, value: bool) -> bool {
        self.flushing.replace(value)
    }

    /// Check if the queues are being drained
    pub fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    // =========================================================================
    // QUEUES
    // =========================================================================

    /// Queue a node for both dispatch targets
    pub fn enqueue(&self, node: &Rc<NodeInner>, signal: Change) {
        let weak = Rc::downgrade(node);
        self.sync_queue.borrow_mut().push((weak.clone(), signal));

        let address = Rc::as_ptr(node) as usize;
        let mut batched = self.batched_queue.borrow_mut();
        match batched.get_mut(&address) {
            Some((_, pending)) => *pending = pending.coalesce(signal),
            None => {
                batched.insert(address, (weak, signal));
            }
        }
    }

    /// Take all synchronous dispatches
    pub fn take_sync(&self) -> Vec<Pending> {
        self.sync_queue.replace(Vec::new())
    }

    /// Take all batched dispatches
    pub fn take_batched(&self) -> Vec<Pending> {
        self.batched_queue
            .replace(IndexMap::new())
            .into_values()
            .collect()
    }

    /// Whether anything is waiting for dispatch
    pub fn has_pending(&self) -> bool {
        !self.sync_queue.borrow().is_empty() || !self.batched_queue.borrow().is_empty()
    }

    // =========================================================================
    // COUNTERS
    // =========================================================================

    /// Produce the next default node id
    pub fn next_node_id(&self) -> String {
        let n = self.next_node_id.get() + 1;
        self.next_node_id.set(n);
        format!("node-{n}")
    }

    /// Produce the next watcher id
    pub fn next_watch_id(&self) -> u64 {
        let n = self.next_watch_id.get() + 1;
        self.next_watch_id.set(n);
        n
    }
}

impl Default for TreeContext {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    /// The thread-local tree context
    static CONTEXT: TreeContext = TreeContext::new();
}

/// Access the thread-local tree context.
pub fn with_context<R>(f: impl FnOnce(&TreeContext) -> R) -> R {
    CONTEXT.with(f)
}

// =============================================================================
// CONVENIENCE FUNCTIONS
// =============================================================================

/// Check if a mutation scope is open
pub fn is_mutating() -> bool {
    with_context(|ctx| ctx.is_mutating())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_creation() {
        let ctx = TreeContext::new();
        assert_eq!(ctx.get_batch_depth(), 0);
        assert!(!ctx.is_mutating());
        assert!(!ctx.is_flushing());
        assert!(!ctx.has_pending());
    }

    #[test]
    fn batch_depth() {
        let ctx = TreeContext::new();
        assert_eq!(ctx.enter_batch(), 1);
        assert!(ctx.is_batching());
        assert_eq!(ctx.enter_batch(), 2);
        assert_eq!(ctx.exit_batch(), 1);
        assert!(ctx.is_batching());
        assert_eq!(ctx.exit_batch(), 0);
        assert!(!ctx.is_batching());
        assert_eq!(ctx.exit_batch(), 0);
    }

    #[test]
    fn mutation_depth() {
        let ctx = TreeContext::new();
        assert_eq!(ctx.enter_mutation(), 1);
        assert_eq!(ctx.enter_mutation(), 2);
        assert!(ctx.is_mutating());
        assert_eq!(ctx.exit_mutation(), 1);
        assert_eq!(ctx.exit_mutation(), 0);
        assert!(!ctx.is_mutating());
    }

    #[test]
    fn node_ids_are_unique() {
        let ctx = TreeContext::new();
        let a = ctx.next_node_id();
        let b = ctx.next_node_id();
        assert_ne!(a, b);
        assert!(a.starts_with("node-"));
    }

    #[test]
    fn flushing_flag() {
        let ctx = TreeContext::new();
        assert!(!ctx.set_flushing(true));
        assert!(ctx.is_flushing());
        assert!(ctx.set_flushing(false));
    }

    #[test]
    fn convenience_functions() {
        assert!(!is_mutating());
    }
}
