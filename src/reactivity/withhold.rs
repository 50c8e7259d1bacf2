// ============================================================================
// spark-tree - Withholding
// Suspend dispatch for a subtree and replay one coalesced signal per node
// ============================================================================
//
// While withheld, sets still update values and reconcile structure right
// away; only the signals are held back. On release every node that changed
// dispatches once, and then bubbles its pending signal, deepest first.
// ============================================================================

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::primitives::node::{Node, NodeInner};
use crate::reactivity::batching::mutate;

/// Members of one withhold window, in the order they joined. Nodes created
/// under a member while the window is open join it too.
pub(crate) type WithholdScope = Rc<RefCell<Vec<Weak<NodeInner>>>>;

/// Guard returned by [`Node::withhold`]. Dropping it (or calling
/// [`Withheld::unleash`]) releases the subtree.
#[must_use = "dropping the guard releases the subtree immediately"]
pub struct Withheld {
    nodes: Vec<Node>,
    scope: WithholdScope,
}

impl Withheld {
    /// Release now.
    pub fn unleash(self) {
        drop(self);
    }

    /// Number of live nodes this guard holds, late joiners included.
    pub fn len(&self) -> usize {
        self.scope
            .borrow()
            .iter()
            .filter(|member| member.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for Withheld {
    fn drop(&mut self) {
        // Keep the original members alive until they have been released.
        let _nodes = std::mem::take(&mut self.nodes);
        let members: Vec<Node> = self
            .scope
            .take()
            .iter()
            .filter_map(Weak::upgrade)
            .map(Node::from_inner)
            .collect();
        mutate(|| {
            // Reverse join order: children release before their containers, so
            // a container's replay already includes what its children bubbled.
            for node in members.iter().rev() {
                if let Err(err) = node.release_withhold(&self.scope) {
                    tracing::error!(node = %node.inner.id, %err, "replaying withheld signal failed");
                }
            }
        });
        tracing::debug!(nodes = members.len(), "subtree unleashed");
    }
}

impl Node {
    /// Hold back signals for this node and everything below it, parked
    /// children included. Nodes created beneath it before the guard drops
    /// are held back as well.
    ///
    /// # Example
    ///
    /// ```
    /// use spark_tree::{Change, Node};
    /// use serde_json::json;
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// let counter = Node::new(json!(0));
    /// let seen = Rc::new(RefCell::new(Vec::new()));
    /// let sink = seen.clone();
    /// let _unwatch = counter.watch_sync(move |_, change| sink.borrow_mut().push(change));
    ///
    /// let guard = counter.withhold();
    /// counter.set(json!(1));
    /// counter.set(json!(2));
    /// assert!(seen.borrow().is_empty());
    ///
    /// guard.unleash();
    /// assert_eq!(*seen.borrow(), vec![Change::VALUE]);
    /// ```
    pub fn withhold(&self) -> Withheld {
        let mut nodes = Vec::new();
        collect_subtree(self, &mut nodes);
        let scope = WithholdScope::default();
        for node in &nodes {
            node.enter_withhold(&scope);
        }
        tracing::debug!(node = %self.inner.id, nodes = nodes.len(), "subtree withheld");
        Withheld { nodes, scope }
    }

    /// Run `f` with this subtree withheld.
    pub fn withholding<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.withhold();
        f()
    }
}

/// Pre-order: the node, then attached children, then live phantoms.
fn collect_subtree(node: &Node, out: &mut Vec<Node>) {
    out.push(node.clone());
    let (attached, parked) = {
        let variant = node.inner.variant.borrow();
        (variant.attached(), variant.phantoms().live())
    };
    for (_, child) in attached.into_iter().chain(parked) {
        collect_subtree(&child, out);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::{Change, Node};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<(&'static str, Change)>>>;

    fn record(node: &Node, name: &'static str, log: &Log) -> crate::UnwatchFn {
        let log = log.clone();
        node.watch_sync(move |_, change| log.borrow_mut().push((name, change)))
    }

    #[test]
    fn coalesces_per_node() {
        let root = Node::new(json!({"a": 1, "b": 1}));
        let log = Log::default();
        let _r = record(&root, "root", &log);
        let _a = record(&root.at("a"), "a", &log);

        root.withholding(|| {
            root.at("a").set(json!(2));
            root.at("a").set(json!(3));
            root.at("b").set(json!("b"));
            assert!(log.borrow().is_empty());
        });

        assert_eq!(
            *log.borrow(),
            vec![
                ("a", Change::VALUE),
                ("root", Change::CHILD | Change::CHILD_TYPE),
            ]
        );
    }

    #[test]
    fn values_and_structure_update_while_withheld() {
        let root = Node::new(json!({"a": 1}));
        let guard = root.withhold();
        root.at("b").set(json!(2));
        root.at("a").set(None);

        assert_eq!(root.value(), Some(json!({"b": 2})));
        assert!(root.is_withheld());
        drop(guard);
        assert!(!root.is_withheld());
    }

    #[test]
    fn structural_changes_replay_with_shape() {
        let root = Node::new(json!({"a": 1}));
        let log = Log::default();
        let _r = record(&root, "root", &log);

        let guard = root.withhold();
        root.at("b").set(json!(2));
        guard.unleash();

        assert_eq!(*log.borrow(), vec![("root", Change::CHILD_ATTACH | Change::SHAPE)]);
    }

    #[test]
    fn nested_guards_release_at_outermost() {
        let node = Node::new(json!(0));
        let log = Log::default();
        let _n = record(&node, "node", &log);

        let outer = node.withhold();
        let inner = node.withhold();
        node.set(json!(1));
        drop(inner);
        assert!(log.borrow().is_empty());
        drop(outer);
        assert_eq!(*log.borrow(), vec![("node", Change::VALUE)]);
    }

    #[test]
    fn withheld_validation_nets_out() {
        let node = Node::new(json!(""));
        let log = Log::default();
        let _n = record(&node, "node", &log);
        node.set_errors(vec![crate::ValidationError::new("required")]);
        log.borrow_mut().clear();

        node.withholding(|| {
            node.clear_errors();
            node.set_errors(vec![crate::ValidationError::new("too short")]);
        });
        assert_eq!(*log.borrow(), vec![("node", Change::INVALID)]);
    }

    #[test]
    fn nodes_created_inside_the_window_are_held() {
        let root = Node::new(json!({"a": 1}));
        let log = Log::default();
        let _r = record(&root, "root", &log);

        let guard = root.withhold();
        let x = root.at("x");
        let _x = record(&x, "x", &log);
        x.set(json!(1));
        x.set(json!(2));
        x.set(json!(3));
        assert!(x.is_withheld());
        assert!(log.borrow().is_empty());
        assert_eq!(guard.len(), 3);

        guard.unleash();
        assert!(!x.is_withheld());
        assert_eq!(
            *log.borrow(),
            vec![
                ("x", Change::ATTACH | Change::VALUE | Change::SHAPE),
                ("root", Change::CHILD_ATTACH | Change::CHILD | Change::SHAPE),
            ]
        );
    }

    #[test]
    fn children_spawned_by_set_join_the_window() {
        let root = Node::new(json!({}));
        let log = Log::default();

        let guard = root.withhold();
        root.set(json!({"list": [1, 2]}));
        let second = root.at("list").at(1);
        let _s = record(&second, "second", &log);
        second.set(json!(20));
        second.set(json!(30));
        assert!(second.is_withheld());
        assert!(log.borrow().is_empty());

        drop(guard);
        assert_eq!(*log.borrow(), vec![("second", Change::VALUE)]);
    }

    #[test]
    fn guard_counts_phantoms() {
        let root = Node::new(json!({"a": 1}));
        let _ghost = root.at("ghost");
        let guard = root.withhold();
        assert_eq!(guard.len(), 3);
    }
}
