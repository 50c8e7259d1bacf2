// ============================================================================
// spark-tree - Ergonomic Macros
// ============================================================================

/// Helper macro to clone variables into a move closure.
///
/// Watchers are `'static`, so anything they capture (nodes, counters,
/// logs) has to be cloned in first.
///
/// # Usage
///
/// ```rust
/// use spark_tree::{cloned, Node};
/// use serde_json::json;
///
/// let source = Node::new(json!(1));
/// let mirror = Node::new(json!(1));
///
/// let _unwatch = source.watch_sync(cloned!(mirror => move |value, _| {
///     mirror.set(value.cloned());
/// }));
///
/// source.set(json!(2));
/// assert_eq!(mirror.value(), Some(json!(2)));
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}

/// Register a batched watcher with automatic variable capturing.
///
/// Wraps `node.watch(cloned!(... => ...))`.
///
/// # Usage
///
/// ```rust
/// use spark_tree::{watch, Node};
/// use serde_json::json;
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let node = Node::new(json!("draft"));
/// let saves = Rc::new(Cell::new(0));
///
/// let _unwatch = watch!(node, saves => move |_, _| saves.set(saves.get() + 1));
///
/// node.set(json!("final"));
/// assert_eq!(saves.get(), 1);
/// ```
#[macro_export]
macro_rules! watch {
    // Case 1: With captures
    ($node:expr, $($deps:ident),+ => $body:expr) => {
        $node.watch($crate::cloned!($($deps),+ => $body))
    };
    // Case 2: Nothing to capture
    ($node:expr => $body:expr) => {
        $node.watch($body)
    };
}
