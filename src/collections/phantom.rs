// ============================================================================
// spark-tree - Phantom Registry
// Weakly-held pool of detached children, keyed by their last key
// ============================================================================
//
// A container parks every child it detaches here, holding only Weak
// handles. Re-attaching the same key claims the parked node back so watchers
// keep working and identity is preserved. Navigating to a key that does not
// exist yet parks an absent node here as well. A parked node owns its link
// to the container, so a chain of phantoms stays alive through its tip.
//
// Finalisation: `Drop for NodeInner` removes its own dead entry when the
// container is not borrowed at that moment. Anything it misses is pruned
// lazily on the next registration.
// ============================================================================

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::core::types::Key;
use crate::primitives::node::{Node, NodeInner};

/// Per-container pool of detached-but-possibly-alive children.
///
/// Several nodes can be parked under one key, e.g. after removing the same
/// index twice. Each key holds them oldest first; lookups by key see the
/// most recently parked one, and any of them can still re-attach itself.
#[derive(Default)]
pub struct PhantomRegistry {
    entries: HashMap<Key, Vec<Weak<NodeInner>>>,
}

impl PhantomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `node` under `key`, on top of any node already parked there.
    pub fn register(&mut self, key: Key, node: &Node) {
        self.prune();
        tracing::trace!(node = %node.inner.id, %key, "phantom registered");
        node.set_parked(true);
        let stack = self.entries.entry(key).or_default();
        stack.retain(|weak| !std::ptr::eq(weak.as_ptr(), Rc::as_ptr(&node.inner)));
        stack.push(Rc::downgrade(&node.inner));
    }

    /// Take the most recently parked live node under `key`, if any.
    pub fn claim(&mut self, key: &Key) -> Option<Node> {
        let stack = self.entries.get_mut(key)?;
        let mut claimed = None;
        while let Some(weak) = stack.pop() {
            if let Some(inner) = weak.upgrade() {
                claimed = Some(inner);
                break;
            }
        }
        if stack.is_empty() {
            self.entries.remove(key);
        }
        let inner = claimed?;
        tracing::trace!(node = %inner.id, %key, "phantom claimed");
        let node = Node::from_inner(inner);
        node.set_parked(false);
        Some(node)
    }

    /// Take `node` out of the registry, checking it is parked under `key`.
    /// Returns false (and changes nothing) if it is not.
    pub fn claim_node(&mut self, key: &Key, node: &Node) -> bool {
        let Some(stack) = self.entries.get_mut(key) else {
            return false;
        };
        let Some(position) = stack
            .iter()
            .position(|weak| std::ptr::eq(weak.as_ptr(), Rc::as_ptr(&node.inner)))
        else {
            return false;
        };
        stack.remove(position);
        if stack.is_empty() {
            self.entries.remove(key);
        }
        node.set_parked(false);
        tracing::trace!(node = %node.inner.id, %key, "phantom claimed");
        true
    }

    /// Return the live node under `key`, creating and parking one if needed.
    pub fn ensure(&mut self, key: Key, create: impl FnOnce() -> Node) -> Node {
        if let Some(node) = self.get(&key) {
            return node;
        }
        let node = create();
        self.register(key, &node);
        node
    }

    /// Peek at the most recently parked live node under `key`.
    pub fn get(&self, key: &Key) -> Option<Node> {
        self.entries
            .get(key)?
            .iter()
            .rev()
            .find_map(Weak::upgrade)
            .map(Node::from_inner)
    }

    /// Forget every node parked under `key`. The nodes stay usable but can
    /// no longer re-attach.
    pub fn release(&mut self, key: &Key) -> bool {
        let Some(stack) = self.entries.remove(key) else {
            return false;
        };
        for inner in stack.iter().filter_map(Weak::upgrade) {
            Node::from_inner(inner).set_parked(false);
        }
        true
    }

    /// Remove dead entries under `key`.
    pub(crate) fn forget_dead(&mut self, key: &Key) {
        if let Some(stack) = self.entries.get_mut(key) {
            stack.retain(|weak| weak.strong_count() > 0);
            if stack.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    /// Drop entries whose node has been dropped. Returns how many went.
    pub fn prune(&mut self) -> usize {
        let mut pruned = 0;
        self.entries.retain(|_, stack| {
            let before = stack.len();
            stack.retain(|weak| weak.strong_count() > 0);
            pruned += before - stack.len();
            !stack.is_empty()
        });
        if pruned > 0 {
            tracing::trace!(pruned, "phantom registry pruned");
        }
        pruned
    }

    /// Number of live parked nodes.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .flatten()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every live parked node, in no particular order across keys.
    pub fn live(&self) -> Vec<(Key, Node)> {
        self.entries
            .iter()
            .flat_map(|(key, stack)| {
                stack
                    .iter()
                    .filter_map(Weak::upgrade)
                    .map(move |inner| (key.clone(), Node::from_inner(inner)))
            })
            .collect()
    }

    /// Move every live entry of `other` into `self`, re-keying each node.
    ///
    /// Used when a node's variant is replaced and the new container keys its
    /// children differently. Absorbed entries sit below existing ones.
    pub(crate) fn absorb(&mut self, other: PhantomRegistry, normalise: impl Fn(&Key) -> Key) {
        for (key, stack) in other.entries {
            let key = normalise(&key);
            let live: Vec<_> = stack
                .into_iter()
                .filter(|weak| weak.strong_count() > 0)
                .collect();
            for inner in live.iter().filter_map(Weak::upgrade) {
                Node::from_inner(inner).rename(key.clone());
            }
            if live.is_empty() {
                continue;
            }
            let target = self.entries.entry(key).or_default();
            let newer = std::mem::replace(target, live);
            target.extend(newer);
        }
    }
}

impl std::fmt::Debug for PhantomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhantomRegistry")
            .field("entries", &self.entries.len())
            .field("live", &self.len())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
