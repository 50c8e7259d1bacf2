// ============================================================================
// spark-tree - Batching
// Mutation scopes and batched dispatch
// ============================================================================

use crate::core::context::with_context;
use crate::reactivity::scheduling::flush;

// =============================================================================
// MUTATION SCOPE
// =============================================================================

/// Run `f` as one mutation. Dispatch is deferred until the outermost scope
/// ends, so nothing is delivered while a node is borrowed.
pub(crate) fn mutate<T>(f: impl FnOnce() -> T) -> T {
    with_context(|ctx| ctx.enter_mutation());

    struct MutationGuard;

    impl Drop for MutationGuard {
        fn drop(&mut self) {
            let depth = with_context(|ctx| ctx.exit_mutation());
            // A panic mid-mutation leaves the tree half-updated; delivering
            // would only run watchers against it.
            if depth == 0 && !std::thread::panicking() {
                flush();
            }
        }
    }

    let _guard = MutationGuard;
    f()
}

// =============================================================================
// BATCH
// =============================================================================

/// Hold back batched watchers until `f` returns.
///
/// Sync watchers still fire once per change. Batched watchers fire once per
/// node afterwards, with every signal they missed coalesced into one.
///
/// # Example
///
/// ```
/// use spark_tree::{Node, batch};
/// use serde_json::json;
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let node = Node::new(json!(0));
/// let calls = Rc::new(Cell::new(0));
///
/// let seen = calls.clone();
/// let _unwatch = node.watch(move |_, _| seen.set(seen.get() + 1));
///
/// batch(|| {
///     node.set(json!(1));
///     node.set(json!(2));
///     node.set(json!(3));
/// });
///
/// assert_eq!(calls.get(), 1);
/// assert_eq!(node.value(), Some(json!(3)));
/// ```
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    with_context(|ctx| ctx.enter_batch());

    struct BatchGuard;

    impl Drop for BatchGuard {
        fn drop(&mut self) {
            let depth = with_context(|ctx| ctx.exit_batch());

            // When outermost batch completes, deliver what it held back
            if depth == 0 && !with_context(|ctx| ctx.is_mutating()) {
                flush();
            }
        }
    }

    let _guard = BatchGuard;
    f()
}

/// Check if currently inside a batch.
///
/// # Example
///
/// ```
/// use spark_tree::{batch, is_batching};
///
/// assert!(!is_batching());
///
/// batch(|| {
///     assert!(is_batching());
/// });
///
/// assert!(!is_batching());
/// ```
pub fn is_batching() -> bool {
    with_context(|ctx| ctx.is_batching())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Change, Node};
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn nested_batches_flush_once() {
        let node = Node::new(json!(0));
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        let _unwatch = node.watch(move |_, _| seen.set(seen.get() + 1));

        batch(|| {
            node.set(json!(1));
            batch(|| {
                node.set(json!(2));
            });
            assert_eq!(calls.get(), 0);
        });
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn sync_watchers_ignore_batches() {
        let node = Node::new(json!(0));
        let signals = Rc::new(RefCell::new(Vec::new()));
        let seen = signals.clone();
        let _unwatch = node.watch_sync(move |_, change| seen.borrow_mut().push(change));

        batch(|| {
            node.set(json!(1));
            node.set(json!("one"));
        });

        assert_eq!(
            *signals.borrow(),
            vec![Change::VALUE, Change::TYPE | Change::SHAPE]
        );
    }

    #[test]
    fn batched_signals_coalesce() {
        let node = Node::new(json!(0));
        let last = Rc::new(Cell::new(Change::empty()));
        let seen = last.clone();
        let _unwatch = node.watch(move |_, change| seen.set(change));

        batch(|| {
            node.set(json!(1));
            node.set(json!("one"));
        });

        assert_eq!(last.get(), Change::VALUE | Change::TYPE | Change::SHAPE);
    }

    #[test]
    fn batch_returns_value() {
        assert_eq!(batch(|| 42), 42);
    }

    #[test]
    fn mutate_defers_until_outermost_scope() {
        let node = Node::new(json!(0));
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        let _unwatch = node.watch_sync(move |_, _| seen.set(seen.get() + 1));

        mutate(|| {
            node.set(json!(1));
            assert_eq!(calls.get(), 0);
        });
        assert_eq!(calls.get(), 1);
    }
}
