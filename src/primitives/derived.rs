// ============================================================================
// spark-tree - Derived and Frozen Nodes
// Stand-ins that share a source's identity, and immutable snapshots
// ============================================================================
//
// A derived node holds its own value and watchers but reports the id, key,
// path, parent and root of its source. It is not attached anywhere, so its
// changes never bubble. Useful for computed views (formatted values, parsed
// input) that should look like the field they came from.
// ============================================================================

use serde_json::Value;

use crate::core::change::Change;
use crate::primitives::node::{Node, NodeOptions, Parent};

impl Node {
    /// Create a node that stands in for `source`.
    ///
    /// # Example
    ///
    /// ```
    /// use spark_tree::Node;
    /// use serde_json::json;
    ///
    /// let form = Node::new(json!({"price": 1250}));
    /// let price = form.at("price");
    /// let display = Node::derived(&price, json!("12.50"));
    ///
    /// assert_eq!(display.id(), price.id());
    /// assert_eq!(display.path_string(), "price");
    /// assert_eq!(display.value(), Some(json!("12.50")));
    /// ```
    pub fn derived(source: &Node, value: impl Into<Option<Value>>) -> Node {
        let id = format!("{}~derived", source.inner.id);
        let node = Node::allocate(
            id,
            Parent::Source(source.clone()),
            value.into(),
            source.inner.id_generator.clone(),
        );
        node.install();
        tracing::trace!(source = %source.inner.id, "derived node created");
        node
    }

    /// The node this one stands in for.
    pub fn source(&self) -> Option<Node> {
        match &*self.inner.parent.borrow() {
            Parent::Source(source) => Some(source.clone()),
            _ => None,
        }
    }

    pub fn is_derived(&self) -> bool {
        self.source().is_some()
    }

    // =========================================================================
    // FROZEN
    // =========================================================================

    /// Immutable root holding `value`, reporting `last_change` as the change
    /// that produced it.
    pub fn frozen(value: impl Into<Option<Value>>, last_change: Change) -> Node {
        let node = Node::with_options(value, NodeOptions::new().frozen(true));
        node.inner.last_change.set(last_change);
        node
    }

    /// Ignore every future set on this node and its current children.
    pub fn freeze(&self) {
        self.inner.frozen.set(true);
        for child in self.children() {
            child.freeze();
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.get()
    }

    /// Signal of the most recent change, empty if none yet.
    pub fn last_change(&self) -> Change {
        self.inner.last_change.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Key;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn derived_delegates_position() {
        let root = Node::new(json!({"user": {"age": 30}}));
        let age = root.at("user").at("age");
        let label = Node::derived(&age, json!("thirty"));

        assert_eq!(label.key(), Some(Key::from("age")));
        assert_eq!(label.path(), age.path());
        assert!(label.parent().unwrap().ptr_eq(&root.at("user")));
        assert!(label.root().ptr_eq(&root));
        assert!(label.source().unwrap().ptr_eq(&age));
        assert!(label.is_derived());
        assert!(!age.is_derived());
    }

    #[test]
    fn derived_changes_do_not_bubble() {
        let root = Node::new(json!({"a": 1}));
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        let _unwatch = root.watch_sync(move |_, _| seen.set(seen.get() + 1));

        let view = Node::derived(&root.at("a"), json!("one"));
        assert_eq!(view.set(json!("uno")), Change::VALUE);
        assert_eq!(calls.get(), 0);
        assert_eq!(root.value(), Some(json!({"a": 1})));
    }

    #[test]
    fn derived_children_extend_source_path() {
        let root = Node::new(json!({"range": [1, 5]}));
        let view = Node::derived(&root.at("range"), json!({"min": 1, "max": 5}));
        assert_eq!(view.at("min").path_string(), "range.min");
    }

    #[test]
    fn frozen_ignores_sets() {
        let snapshot = Node::frozen(json!({"a": 1}), Change::CHILD);
        assert!(snapshot.is_frozen());
        assert_eq!(snapshot.last_change(), Change::CHILD);

        assert_eq!(snapshot.set(json!(2)), Change::empty());
        assert_eq!(snapshot.at("a").set(json!(2)), Change::empty());
        assert_eq!(snapshot.push(json!(1)), Ok(Change::empty()));
        assert_eq!(snapshot.value(), Some(json!({"a": 1})));
    }

    #[test]
    fn freeze_is_recursive() {
        let root = Node::new(json!({"a": {"b": 1}}));
        let b = root.at("a").at("b");
        root.freeze();
        assert!(b.is_frozen());
        assert_eq!(b.set(json!(2)), Change::empty());
    }
}
