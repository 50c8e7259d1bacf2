// ============================================================================
// spark-tree - Navigation
// Child lookup, iteration and phantom access
// ============================================================================

use crate::core::types::{Key, Kind};
use crate::primitives::node::Node;

/// Result of [`Node::try_at`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// An attached child holding a non-null value
    Node(Node),
    /// An attached child holding `null`
    Null,
    /// No attached child under that key
    Absent,
}

impl Lookup {
    pub fn node(self) -> Option<Node> {
        match self {
            Lookup::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn is_nullish(&self) -> bool {
        !matches!(self, Lookup::Node(_))
    }
}

impl Node {
    /// Child under `key`, created as an absent phantom if it does not exist.
    ///
    /// Repeated calls return the same node as long as some handle to it is
    /// alive, so watchers can be registered on paths that have no value yet.
    ///
    /// # Example
    ///
    /// ```
    /// use spark_tree::Node;
    /// use serde_json::json;
    ///
    /// let form = Node::new(json!({}));
    /// let email = form.at("email");
    /// assert_eq!(email.value(), None);
    ///
    /// email.set(json!("ada@example.com"));
    /// assert_eq!(form.value(), Some(json!({"email": "ada@example.com"})));
    /// assert!(form.at("email").ptr_eq(&email));
    /// ```
    pub fn at(&self, key: impl Into<Key>) -> Node {
        let mut variant = self.inner.variant.borrow_mut();
        let key = variant.normalise_key(&key.into());
        if let Some(child) = variant.child(&key) {
            return child;
        }
        variant.phantoms_mut().ensure(key.clone(), || {
            tracing::trace!(node = %self.inner.id, %key, "phantom created by navigation");
            self.spawn(key.clone(), None)
        })
    }

    /// Walk `path` with [`Node::at`].
    pub fn at_path<K: Into<Key>>(&self, path: impl IntoIterator<Item = K>) -> Node {
        path.into_iter().fold(self.clone(), |node, key| node.at(key))
    }

    /// Attached child under `key`; never creates anything.
    pub fn child(&self, key: impl Into<Key>) -> Option<Node> {
        let variant = self.inner.variant.borrow();
        variant.child(&variant.normalise_key(&key.into()))
    }

    /// Attached child under `key`, distinguishing `null` from missing.
    pub fn try_at(&self, key: impl Into<Key>) -> Lookup {
        match self.child(key) {
            Some(child) => match child.kind() {
                Kind::Null => Lookup::Null,
                Kind::Absent => Lookup::Absent,
                _ => Lookup::Node(child),
            },
            None => Lookup::Absent,
        }
    }

    /// Number of child slots. Zero for primitives.
    pub fn len(&self) -> usize {
        self.inner.variant.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of the attached children, in order.
    pub fn keys(&self) -> Vec<Key> {
        self.entries().into_iter().map(|(key, _)| key).collect()
    }

    /// Attached children, in order.
    pub fn children(&self) -> Vec<Node> {
        self.entries().into_iter().map(|(_, child)| child).collect()
    }

    /// Attached children with their keys. Collected first, so the callbacks
    /// below may freely mutate the tree.
    pub fn entries(&self) -> Vec<(Key, Node)> {
        self.inner.variant.borrow().attached()
    }

    pub fn for_each(&self, mut f: impl FnMut(&Key, &Node)) {
        for (key, child) in self.entries() {
            f(&key, &child);
        }
    }

    pub fn map<T>(&self, mut f: impl FnMut(&Key, &Node) -> T) -> Vec<T> {
        self.entries()
            .iter()
            .map(|(key, child)| f(key, child))
            .collect()
    }

    pub fn find(&self, mut predicate: impl FnMut(&Key, &Node) -> bool) -> Option<Node> {
        self.entries()
            .into_iter()
            .find(|(key, child)| predicate(key, child))
            .map(|(_, child)| child)
    }

    pub fn filter(&self, mut predicate: impl FnMut(&Key, &Node) -> bool) -> Vec<Node> {
        self.entries()
            .into_iter()
            .filter(|(key, child)| predicate(key, child))
            .map(|(_, child)| child)
            .collect()
    }

    // =========================================================================
    // PHANTOMS
    // =========================================================================

    /// Parked (detached or not yet attached) child under `key`, if alive.
    /// With several parked under one key, the most recent one.
    pub fn phantom(&self, key: impl Into<Key>) -> Option<Node> {
        let variant = self.inner.variant.borrow();
        variant.phantoms().get(&variant.normalise_key(&key.into()))
    }

    /// Number of live parked children.
    pub fn phantom_count(&self) -> usize {
        self.inner.variant.borrow().phantoms().len()
    }

    /// Every live parked child with the key it is parked under.
    pub fn phantoms(&self) -> Vec<(Key, Node)> {
        self.inner.variant.borrow().phantoms().live()
    }

    /// Forget the parked children under `key`. A later [`Node::at`] creates a
    /// fresh node; existing handles to the old one keep working but are no
    /// longer reachable from this container.
    pub fn release_phantom(&self, key: impl Into<Key>) -> bool {
        let mut variant = self.inner.variant.borrow_mut();
        let key = variant.normalise_key(&key.into());
        variant.phantoms_mut().release(&key)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn at_is_stable_while_held() {
        let root = Node::new(json!({}));
        let first = root.at("missing");
        let second = root.at("missing");
        assert!(first.ptr_eq(&second));
        assert_eq!(root.phantom_count(), 1);
    }

    #[test]
    fn at_path_walks_nested_phantoms() {
        let root = Node::new(json!({}));
        let deep = root.at_path(["a", "b", "c"]);
        assert_eq!(deep.path_string(), "a.b.c");

        deep.set(json!(1));
        assert_eq!(root.value(), Some(json!({"a": {"b": {"c": 1}}})));
    }

    #[test]
    fn keys_are_normalised_per_container() {
        let list = Node::new(json!([10, 20]));
        assert!(list.at("1").ptr_eq(&list.at(1)));

        let object = Node::new(json!({"0": "zero"}));
        assert!(object.at(0).ptr_eq(&object.at("0")));
    }

    #[test]
    fn try_at_distinguishes_null() {
        let root = Node::new(json!({"a": null, "b": 1}));
        assert_eq!(root.try_at("a"), Lookup::Null);
        assert_eq!(root.try_at("missing"), Lookup::Absent);
        assert!(root.try_at("b").node().is_some());
        assert!(root.try_at("a").is_nullish());
    }

    #[test]
    fn child_never_creates() {
        let root = Node::new(json!({}));
        assert!(root.child("x").is_none());
        assert_eq!(root.phantom_count(), 0);
    }

    #[test]
    fn iteration_helpers() {
        let root = Node::new(json!({"a": 1, "b": 2, "c": 3}));
        assert_eq!(root.len(), 3);
        assert_eq!(root.keys(), vec![Key::from("a"), Key::from("b"), Key::from("c")]);

        let odd = root.filter(|_, child| child.value().and_then(|v| v.as_i64()).is_some_and(|n| n % 2 == 1));
        assert_eq!(odd.len(), 2);

        let found = root.find(|key, _| *key == Key::from("b")).unwrap();
        assert_eq!(found.value(), Some(json!(2)));

        let doubled = root.map(|_, child| child.value().and_then(|v| v.as_i64()).unwrap_or(0) * 2);
        assert_eq!(doubled, vec![2, 4, 6]);

        let mut visited = 0;
        root.for_each(|_, _| visited += 1);
        assert_eq!(visited, 3);
        assert!(Node::new(json!(1)).is_empty());
    }

    #[test]
    fn release_phantom_forgets_entry() {
        let root = Node::new(json!({}));
        let old = root.at("x");
        assert!(root.release_phantom("x"));
        assert!(!root.at("x").ptr_eq(&old));
        assert!(!root.release_phantom("nothing"));
    }
}
