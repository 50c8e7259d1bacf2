// ============================================================================
// spark-tree - Scheduling
// Watcher registration and dispatch of queued change signals
// ============================================================================
//
// Mutations never call watchers directly. `trigger` queues the node and the
// outermost mutation scope drains the queues once every borrow is released,
// so a watcher is free to read or write any node of any tree.
// ============================================================================

use std::cell::RefCell;
use std::rc::Weak;

use crate::core::change::Change;
use crate::core::context::{Pending, with_context};
use crate::core::types::WatchFn;
use crate::primitives::node::{Node, NodeInner};

/// Maximum drain rounds before dispatch gives up on a feedback loop.
pub const MAX_FLUSH_ROUNDS: u32 = 1000;

// =============================================================================
// SUBSCRIBERS
// =============================================================================

/// Which queue a watcher listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Once per trigger, in trigger order
    Sync,
    /// Once per flush, with every signal since the last one coalesced
    Batched,
}

/// Per-node watcher lists.
#[derive(Default)]
pub struct Subscribers {
    sync: RefCell<Vec<(u64, WatchFn)>>,
    batched: RefCell<Vec<(u64, WatchFn)>>,
}

impl Subscribers {
    fn list(&self, target: Target) -> &RefCell<Vec<(u64, WatchFn)>> {
        match target {
            Target::Sync => &self.sync,
            Target::Batched => &self.batched,
        }
    }

    /// Register a watcher, returning its id.
    pub fn add(&self, callback: WatchFn, target: Target) -> u64 {
        let id = with_context(|ctx| ctx.next_watch_id());
        self.list(target).borrow_mut().push((id, callback));
        id
    }

    /// Remove the watcher with `id`. Other watchers sharing the same
    /// callback stay registered.
    pub fn remove(&self, id: u64) -> bool {
        [Target::Sync, Target::Batched].into_iter().any(|target| {
            let mut list = self.list(target).borrow_mut();
            let before = list.len();
            list.retain(|(existing, _)| *existing != id);
            list.len() != before
        })
    }

    /// Callbacks to run for one dispatch. Cloned out so a callback may
    /// subscribe or unsubscribe while the dispatch is running.
    pub fn snapshot(&self, target: Target) -> Vec<WatchFn> {
        self.list(target)
            .borrow()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sync.borrow().len() + self.batched.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// SCHEDULE
// =============================================================================

/// Queue `signal` for dispatch to the node's watchers.
///
/// Outside any mutation scope the queues are drained right away.
pub fn schedule(node: &std::rc::Rc<NodeInner>, signal: Change) {
    if signal.is_empty() {
        return;
    }
    let drain_now = with_context(|ctx| {
        ctx.enqueue(node, signal);
        !ctx.is_mutating()
    });
    if drain_now {
        flush();
    }
}

// =============================================================================
// FLUSH
// =============================================================================

/// Drain the dispatch queues.
///
/// Sync watchers receive one call per queued trigger. Batched watchers
/// receive one call per node with the coalesced signal, unless a `batch()`
/// scope is open, in which case they keep waiting. Re-entrant calls (from a
/// watcher that mutates) return immediately and the outer drain picks up
/// whatever they queued.
pub fn flush() {
    if with_context(|ctx| ctx.set_flushing(true)) {
        return;
    }

    struct FlushGuard;

    impl Drop for FlushGuard {
        fn drop(&mut self) {
            with_context(|ctx| ctx.set_flushing(false));
        }
    }

    let _guard = FlushGuard;
    let mut rounds = 0u32;

    loop {
        let (sync, batched) = with_context(|ctx| {
            let sync = ctx.take_sync();
            let batched = if ctx.is_batching() {
                Vec::new()
            } else {
                ctx.take_batched()
            };
            (sync, batched)
        });

        if sync.is_empty() && batched.is_empty() {
            break;
        }

        rounds += 1;
        if rounds > MAX_FLUSH_ROUNDS {
            let dropped = with_context(|ctx| ctx.take_sync().len() + ctx.take_batched().len());
            tracing::error!(
                rounds,
                dropped,
                "watchers keep re-triggering each other, dropping queued dispatches"
            );
            break;
        }

        tracing::trace!(sync = sync.len(), batched = batched.len(), "dispatching");
        deliver_all(sync, Target::Sync);
        deliver_all(batched, Target::Batched);
    }
}

fn deliver_all(queue: Vec<Pending>, target: Target) {
    for (node, signal) in queue {
        deliver(&node, signal, target);
    }
}

fn deliver(node: &Weak<NodeInner>, signal: Change, target: Target) {
    if signal.is_empty() {
        return;
    }
    let Some(inner) = node.upgrade() else {
        return;
    };
    let watchers = inner.subscribers.snapshot(target);
    if watchers.is_empty() {
        return;
    }
    let value = Node::from_inner(inner).value();
    for watcher in watchers {
        watcher(value.as_ref(), signal);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::cell::Cell;
    use std::rc::Rc;

    fn counter() -> (Rc<Cell<u32>>, WatchFn) {
        let count = Rc::new(Cell::new(0));
        let seen = count.clone();
        let callback: WatchFn = Rc::new(move |_: Option<&Value>, _: Change| seen.set(seen.get() + 1));
        (count, callback)
    }

    #[test]
    fn subscribers_add_and_remove() {
        let subscribers = Subscribers::default();
        let (_, callback) = counter();
        let first = subscribers.add(callback.clone(), Target::Sync);
        let second = subscribers.add(callback, Target::Batched);

        assert_eq!(subscribers.len(), 2);
        assert!(subscribers.remove(first));
        assert!(!subscribers.remove(first));
        assert_eq!(subscribers.snapshot(Target::Batched).len(), 1);
        assert!(subscribers.remove(second));
        assert!(subscribers.is_empty());
    }

    #[test]
    fn schedule_outside_mutation_dispatches_immediately() {
        let node = Node::new(json!(1));
        let (count, callback) = counter();
        node.inner.subscribers.add(callback, Target::Sync);

        schedule(&node.inner, Change::VALUE);
        assert_eq!(count.get(), 1);

        schedule(&node.inner, Change::empty());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn dropped_nodes_are_skipped() {
        let (count, callback) = counter();
        {
            let node = Node::new(json!(1));
            node.inner.subscribers.add(callback, Target::Sync);
            with_context(|ctx| {
                ctx.enter_mutation();
                ctx.enqueue(&node.inner, Change::VALUE);
                ctx.exit_mutation();
            });
        }
        flush();
        assert_eq!(count.get(), 0);
    }
}
