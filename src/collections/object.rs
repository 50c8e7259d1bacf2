// ============================================================================
// spark-tree - Object Children
// Ordered field -> child map of an object node
// ============================================================================

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::collections::phantom::PhantomRegistry;
use crate::core::change::Change;
use crate::core::error::TreeError;
use crate::core::types::Key;
use crate::primitives::node::Node;
use crate::reactivity::equality::same_value;

/// Children of an object node, in insertion order.
#[derive(Debug, Default)]
pub(crate) struct ObjectChildren {
    children: IndexMap<String, Node>,
    pub(crate) phantoms: PhantomRegistry,
}

impl ObjectChildren {
    pub(crate) fn with_phantoms(phantoms: PhantomRegistry) -> Self {
        Self {
            children: IndexMap::new(),
            phantoms,
        }
    }

    pub(crate) fn fresh(node: &Node, map: Map<String, Value>) -> Self {
        let children = map
            .into_iter()
            .map(|(name, value)| {
                let child = node.spawn(Key::Field(name.clone()), Some(value));
                (name, child)
            })
            .collect();
        Self {
            children,
            phantoms: PhantomRegistry::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.children.len()
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Node> {
        self.children.get(name)
    }

    pub(crate) fn insert(&mut self, name: String, child: Node) {
        self.children.insert(name, child);
    }

    pub(crate) fn entries(&self) -> Vec<(Key, Node)> {
        self.children
            .iter()
            .map(|(name, child)| (Key::Field(name.clone()), child.clone()))
            .collect()
    }

    pub(crate) fn into_parts(self) -> (PhantomRegistry, Vec<(Key, Node)>) {
        let attached = self
            .children
            .into_iter()
            .map(|(name, child)| (Key::Field(name), child))
            .collect();
        (self.phantoms, attached)
    }

    /// Reconcile with a new object value.
    ///
    /// Fields missing from `map` are detached and parked. Fields present on
    /// both sides are set in place. New fields claim a parked child when one
    /// is alive, otherwise a fresh child is created.
    pub(crate) fn set(&mut self, node: &Node, map: Map<String, Value>) -> Result<Change, TreeError> {
        let mut signal = Change::empty();

        let stale: Vec<String> = self
            .children
            .keys()
            .filter(|name| !map.contains_key(name.as_str()))
            .cloned()
            .collect();
        for name in stale {
            if let Some(child) = self.children.shift_remove(&name) {
                child.set_inner(None, false)?;
                self.phantoms.register(Key::Field(name), &child);
                signal |= Change::CHILD_DETACH;
            }
        }

        for (name, value) in map {
            if let Some(child) = self.children.get(&name).cloned() {
                signal |= child.set_inner(Some(value), false)?.bubble();
                continue;
            }

            let key = Key::Field(name.clone());
            let child = match self.phantoms.claim(&key) {
                Some(parked) => {
                    parked.rename(key);
                    parked.set_inner(Some(value), false)?;
                    parked
                }
                None => node.spawn(key, Some(value)),
            };
            self.children.insert(name, child);
            signal |= Change::CHILD_ATTACH;
        }

        Ok(signal.with_shape())
    }

    /// Reconcile after a child attached or detached itself.
    pub(crate) fn child_update(&mut self, child: &Node, signal: Change, key: &Key) -> Result<(), TreeError> {
        let name = key.to_field();

        if signal.contains(Change::DETACH) {
            if !self.children.get(&name).is_some_and(|attached| attached.ptr_eq(child)) {
                return Err(TreeError::ChildNotAttached { key: key.clone() });
            }
            self.children.shift_remove(&name);
            self.phantoms.register(key.clone(), child);
        } else if signal.contains(Change::ATTACH) {
            if let Some(attached) = self.children.get(&name) {
                if attached.ptr_eq(child) {
                    return Ok(());
                }
                return Err(TreeError::KeyOccupied { key: key.clone() });
            }
            if !self.phantoms.claim_node(key, child) {
                return Err(TreeError::ChildNotRegistered { key: key.clone() });
            }
            child.rename(key.clone());
            self.children.insert(name, child.clone());
        }
        Ok(())
    }

    pub(crate) fn materialize(&self) -> Value {
        let map: Map<String, Value> = self
            .children
            .iter()
            .filter_map(|(name, child)| child.value().map(|value| (name.clone(), value)))
            .collect();
        Value::Object(map)
    }

    pub(crate) fn is_dirty(&self, initial: Option<&Value>) -> bool {
        let Some(Value::Object(initial)) = initial else {
            return true;
        };
        initial.len() != self.children.len()
            || self.children.iter().any(|(name, child)| {
                !same_value(initial.get(name), child.initial()) || child.is_dirty()
            })
    }
}
