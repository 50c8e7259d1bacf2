// ============================================================================
// spark-tree - Array Children
// Indexed children of an array node, plus the array editing operations
// ============================================================================
//
// Slots may be empty (holes) after an attach past the end. Holes read back
// as `null`, and setting `null` over a hole leaves it in place. Children are
// renamed, without a signal, whenever a splice moves them to a new index.
// ============================================================================

use serde_json::Value;

use crate::collections::phantom::PhantomRegistry;
use crate::core::change::Change;
use crate::core::error::TreeError;
use crate::core::types::{Key, Kind};
use crate::primitives::node::Node;
use crate::primitives::variant::Variant;
use crate::reactivity::batching::mutate;
use crate::reactivity::equality::same_value;

/// Children of an array node.
#[derive(Debug, Default)]
pub(crate) struct ArrayChildren {
    items: Vec<Option<Node>>,
    pub(crate) phantoms: PhantomRegistry,
}

impl ArrayChildren {
    pub(crate) fn with_phantoms(phantoms: PhantomRegistry) -> Self {
        Self {
            items: Vec::new(),
            phantoms,
        }
    }

    pub(crate) fn fresh(node: &Node, items: Vec<Value>) -> Self {
        let items = items
            .into_iter()
            .enumerate()
            .map(|(index, value)| Some(node.spawn(Key::Index(index), Some(value))))
            .collect();
        Self {
            items,
            phantoms: PhantomRegistry::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&Node> {
        self.items.get(index).and_then(Option::as_ref)
    }

    pub(crate) fn entries(&self) -> Vec<(Key, Node)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|child| (Key::Index(index), child.clone())))
            .collect()
    }

    pub(crate) fn into_parts(self) -> (PhantomRegistry, Vec<(Key, Node)>) {
        let attached = self
            .items
            .into_iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.map(|child| (Key::Index(index), child)))
            .collect();
        (self.phantoms, attached)
    }

    // =========================================================================
    // SLOTS
    // =========================================================================

    /// Put `child` at `index`, filling a hole or padding past the end.
    pub(crate) fn place(&mut self, index: usize, child: Node) {
        if index >= self.items.len() {
            self.items.resize_with(index, || None);
            self.items.push(Some(child));
        } else {
            self.items[index] = Some(child);
        }
    }

    /// Insert `child` at `index`, shifting later children right.
    fn splice_in(&mut self, index: usize, child: Node) {
        if index >= self.items.len() {
            self.place(index, child);
            return;
        }
        self.items.insert(index, Some(child));
        self.rename_from(index + 1);
    }

    /// Remove the slot at `index`, shifting later children left.
    fn splice_out(&mut self, index: usize) -> Option<Node> {
        if index >= self.items.len() {
            return None;
        }
        let removed = self.items.remove(index);
        self.rename_from(index);
        removed
    }

    fn rename_from(&self, start: usize) {
        for (index, slot) in self.items.iter().enumerate().skip(start) {
            if let Some(child) = slot {
                child.rename(Key::Index(index));
            }
        }
    }

    /// A parked child for `index` re-initialised with `value`, or a new one.
    fn claim_or_spawn(&mut self, node: &Node, index: usize, value: Value) -> Result<Node, TreeError> {
        let key = Key::Index(index);
        match self.phantoms.claim(&key) {
            Some(parked) => {
                parked.rename(key);
                parked.set_inner(Some(value), false)?;
                Ok(parked)
            }
            None => Ok(node.spawn(key, Some(value))),
        }
    }

    // =========================================================================
    // SET
    // =========================================================================

    /// Reconcile with a new array value, position by position.
    pub(crate) fn set(&mut self, node: &Node, items: Vec<Value>) -> Result<Change, TreeError> {
        let mut signal = Change::empty();

        while self.items.len() > items.len() {
            let index = self.items.len() - 1;
            if let Some(child) = self.items.pop().flatten() {
                child.set_inner(None, false)?;
                self.phantoms.register(Key::Index(index), &child);
            }
            signal |= Change::CHILD_DETACH;
        }

        for (index, value) in items.into_iter().enumerate() {
            match self.get(index).cloned() {
                Some(child) => signal |= child.set_inner(Some(value), false)?.bubble(),
                // A hole already reads as null.
                None if index < self.items.len() && value.is_null() => {}
                None => {
                    let child = self.claim_or_spawn(node, index, value)?;
                    self.place(index, child);
                    signal |= Change::CHILD_ATTACH;
                }
            }
        }

        Ok(signal.with_shape())
    }

    pub(crate) fn push(&mut self, node: &Node, value: Value) -> Result<Change, TreeError> {
        let child = self.claim_or_spawn(node, self.items.len(), value)?;
        self.items.push(Some(child));
        Ok(Change::CHILD_ATTACH.with_shape())
    }

    pub(crate) fn insert(&mut self, node: &Node, index: usize, value: Value) -> Result<Change, TreeError> {
        let child = self.claim_or_spawn(node, index, value)?;
        self.splice_in(index, child);
        Ok(Change::CHILD_ATTACH.with_shape())
    }

    /// Splice out the hole at `index`. Empty if the slot holds a child.
    pub(crate) fn remove_hole(&mut self, index: usize) -> Change {
        if !matches!(self.items.get(index), Some(None)) {
            return Change::empty();
        }
        self.splice_out(index);
        Change::CHILD_DETACH.with_shape()
    }

    // =========================================================================
    // CHILD UPDATES
    // =========================================================================

    /// Reconcile after a child attached or detached itself.
    ///
    /// A detach splices the child out. An attach fills a hole or extends the
    /// array; at an occupied index the child is spliced in and the occupant
    /// and everything after it shift right.
    pub(crate) fn child_update(&mut self, child: &Node, signal: Change, key: &Key) -> Result<(), TreeError> {
        let &Key::Index(index) = key else {
            return Err(TreeError::InvalidIndex { key: key.clone() });
        };

        if signal.contains(Change::DETACH) {
            if !self.get(index).is_some_and(|attached| attached.ptr_eq(child)) {
                return Err(TreeError::ChildNotAttached { key: key.clone() });
            }
            self.splice_out(index);
            self.phantoms.register(key.clone(), child);
        } else if signal.contains(Change::ATTACH) {
            if self.get(index).is_some_and(|attached| attached.ptr_eq(child)) {
                return Ok(());
            }
            if !self.phantoms.claim_node(key, child) {
                return Err(TreeError::ChildNotRegistered { key: key.clone() });
            }
            if self.get(index).is_some() {
                tracing::debug!(index, "attach at occupied index, shifting later children");
                self.splice_in(index, child.clone());
            } else {
                self.place(index, child.clone());
            }
            child.rename(key.clone());
        }
        Ok(())
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub(crate) fn materialize(&self) -> Value {
        let items = self
            .items
            .iter()
            .map(|slot| {
                slot.as_ref()
                    .and_then(Node::value)
                    .unwrap_or(Value::Null)
            })
            .collect();
        Value::Array(items)
    }

    pub(crate) fn is_dirty(&self, initial: Option<&Value>) -> bool {
        let Some(Value::Array(initial)) = initial else {
            return true;
        };
        initial.len() != self.items.len()
            || self.items.iter().enumerate().any(|(index, slot)| match slot {
                Some(child) => !same_value(initial.get(index), child.initial()) || child.is_dirty(),
                None => true,
            })
    }
}

// =============================================================================
// NODE API
// =============================================================================

impl Node {
    /// Run `edit` against this node's array children, or fail if the node
    /// is not an array.
    fn edit_array(
        &self,
        edit: impl FnOnce(&mut ArrayChildren, &Node) -> Result<Change, TreeError>,
    ) -> Result<Change, TreeError> {
        if self.inner.frozen.get() {
            tracing::debug!(node = %self.inner.id, "array edit ignored on frozen node");
            return Ok(Change::empty());
        }
        mutate(|| {
            let signal = {
                let mut variant = self.inner.variant.borrow_mut();
                let kind = variant.kind();
                let Variant::Array(array) = &mut *variant else {
                    return Err(TreeError::NotAnArray { kind });
                };
                edit(array, self)?
            };
            self.trigger(signal, true)?;
            Ok(signal)
        })
        .inspect_err(|err| tracing::warn!(node = %self.inner.id, %err, "array edit rejected"))
    }

    /// Append `value` as a new last child.
    ///
    /// # Example
    ///
    /// ```
    /// use spark_tree::{Change, Node};
    /// use serde_json::json;
    ///
    /// let list = Node::new(json!(["a"]));
    /// let signal = list.push(json!("b")).unwrap();
    ///
    /// assert_eq!(signal, Change::CHILD_ATTACH | Change::SHAPE);
    /// assert_eq!(list.value(), Some(json!(["a", "b"])));
    /// ```
    pub fn push(&self, value: Value) -> Result<Change, TreeError> {
        let change = self.edit_array(|array, node| array.push(node, value))?;
        tracing::trace!(node = %self.inner.id, len = self.len(), "pushed");
        Ok(change)
    }

    /// Insert `value` at `index`, shifting later children right.
    ///
    /// Shifted children keep their identity and watchers; only their key
    /// changes, and they are not signalled. Past the end the array is padded
    /// with holes.
    pub fn insert(&self, index: usize, value: Value) -> Result<Change, TreeError> {
        self.edit_array(|array, node| array.insert(node, index, value))
    }

    /// Detach the child under `key` from an object or array.
    ///
    /// Array children after it shift left; a hole is spliced out the same
    /// way. Returns the signal this node observed, or an empty one if there
    /// was no such child.
    pub fn remove(&self, key: impl Into<Key>) -> Result<Change, TreeError> {
        let key = key.into();
        if let Some(child) = self.child(&key) {
            let signal = child.try_set(None, true)?;
            return Ok(signal.bubble());
        }
        match key.as_index() {
            Some(index) if self.kind() == Kind::Array => {
                self.edit_array(|array, _| Ok(array.remove_hole(index)))
            }
            _ => Ok(Change::empty()),
        }
    }

    /// Detach the last child of an array.
    pub fn pop(&self) -> Result<Change, TreeError> {
        let (kind, len) = {
            let variant = self.inner.variant.borrow();
            (variant.kind(), variant.len())
        };
        if kind != Kind::Array {
            return Err(TreeError::NotAnArray { kind });
        }
        match len.checked_sub(1) {
            Some(last) => self.remove(last),
            None => Ok(Change::empty()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
