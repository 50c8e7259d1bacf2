// ============================================================================
// spark-tree - Node
// A single position in an observable value tree
// ============================================================================
//
// Ownership: a container holds its attached children strongly, a child holds
// its container weakly. Detached children are parked in the container's
// phantom registry, also weakly. Handles are cheap `Rc` clones.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::core::change::Change;
use crate::core::context::with_context;
use crate::core::error::TreeError;
use crate::core::types::{IdGenerator, Key, Kind, UnwatchFn, ValidationError};
use crate::primitives::variant::Variant;
use crate::reactivity::batching::mutate;
use crate::reactivity::scheduling::{Subscribers, Target, schedule};
use crate::reactivity::withhold::WithholdScope;

// =============================================================================
// OPTIONS
// =============================================================================

/// Construction options for a root node.
#[derive(Clone, Default)]
pub struct NodeOptions {
    /// Explicit id for the root. Children always get generated ids.
    pub id: Option<String>,
    /// Id source for this node and every node spawned beneath it.
    /// Falls back to a thread-local counter.
    pub id_generator: Option<IdGenerator>,
    /// Start frozen: every set is ignored.
    pub frozen: bool,
}

impl NodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn id_generator(mut self, generator: impl Fn() -> String + 'static) -> Self {
        self.id_generator = Some(Rc::new(generator));
        self
    }

    pub fn frozen(mut self, frozen: bool) -> Self {
        self.frozen = frozen;
        self
    }
}

impl fmt::Debug for NodeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeOptions")
            .field("id", &self.id)
            .field("id_generator", &self.id_generator.is_some())
            .field("frozen", &self.frozen)
            .finish()
    }
}

fn generate_id(generator: Option<&IdGenerator>) -> String {
    match generator {
        Some(generate) => generate(),
        None => with_context(|ctx| ctx.next_node_id()),
    }
}

// =============================================================================
// NODE INNER
// =============================================================================

/// Link from a child to its container.
///
/// Attached children are owned by the container, so they point back weakly.
/// Parked children are only weakly held by the container's registry, so they
/// keep the container alive instead. Either way there is no cycle.
pub(crate) enum Link {
    Attached(Weak<NodeInner>),
    Parked(Rc<NodeInner>),
}

impl Link {
    pub(crate) fn upgrade(&self) -> Option<Rc<NodeInner>> {
        match self {
            Link::Attached(container) => container.upgrade(),
            Link::Parked(container) => Some(container.clone()),
        }
    }
}

/// Where a node hangs.
pub(crate) enum Parent {
    /// Tree root
    Root,
    /// Attached to (or parked under) a container
    Child { container: Link, key: Key },
    /// Derived node: identity and position are borrowed from the source
    Source(Node),
}

/// Shared state behind a [`Node`] handle.
///
/// Opaque outside the crate; reach it through `Node`.
pub struct NodeInner {
    pub(crate) id: String,
    pub(crate) parent: RefCell<Parent>,
    pub(crate) variant: RefCell<Variant>,
    pub(crate) initial: Option<Value>,

    /// Materialised value, `None` when stale
    pub(crate) value_cache: RefCell<Option<Option<Value>>>,
    pub(crate) dirty_cache: Cell<Option<bool>>,

    pub(crate) subscribers: Subscribers,
    pub(crate) last_change: Cell<Change>,
    pub(crate) frozen: Cell<bool>,
    pub(crate) errors: RefCell<Vec<ValidationError>>,
    pub(crate) id_generator: Option<IdGenerator>,

    // Withholding: one entry per open window covering this node
    pub(crate) withheld: RefCell<Vec<WithholdScope>>,
    pub(crate) pending: Cell<Change>,
    pub(crate) pending_notify: Cell<bool>,
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        // Finaliser: drop our own phantom entry. Skipped if the container is
        // mid-mutation; its next registration prunes the entry instead.
        if let Parent::Child { container, key } = self.parent.get_mut()
            && let Some(container) = container.upgrade()
            && let Ok(mut variant) = container.variant.try_borrow_mut()
        {
            variant.phantoms_mut().forget_dead(key);
        }
    }
}

// =============================================================================
// NODE
// =============================================================================

/// Handle to one position of an observable value tree.
///
/// Cloning a `Node` clones the handle, not the subtree. Two handles are equal
/// when they point at the same position.
///
/// # Example
///
/// ```
/// use spark_tree::{Change, Node};
/// use serde_json::json;
///
/// let form = Node::new(json!({"name": {"first": "Ada", "last": "Lovelace"}}));
/// let first = form.at("name").at("first");
///
/// assert_eq!(first.set(json!("Grace")), Change::VALUE);
/// assert_eq!(form.value(), Some(json!({"name": {"first": "Grace", "last": "Lovelace"}})));
/// assert!(form.is_dirty());
/// ```
#[derive(Clone)]
pub struct Node {
    pub(crate) inner: Rc<NodeInner>,
}

/// Create a root node. Shorthand for [`Node::new`].
pub fn node(value: impl Into<Option<Value>>) -> Node {
    Node::new(value)
}

impl Node {
    // =========================================================================
    // CONSTRUCTION
    // =========================================================================

    /// Create a root node holding `value`. Pass `None` for an absent root.
    pub fn new(value: impl Into<Option<Value>>) -> Self {
        Self::with_options(value, NodeOptions::default())
    }

    pub fn with_options(value: impl Into<Option<Value>>, options: NodeOptions) -> Self {
        let NodeOptions {
            id,
            id_generator,
            frozen,
        } = options;
        let id = id.unwrap_or_else(|| generate_id(id_generator.as_ref()));
        let node = Self::allocate(id, Parent::Root, value.into(), id_generator);
        node.install();
        if frozen {
            node.freeze();
        }
        tracing::trace!(node = %node.inner.id, kind = %node.kind(), "root created");
        node
    }

    pub(crate) fn from_inner(inner: Rc<NodeInner>) -> Self {
        Self { inner }
    }

    /// Allocate a node with an absent placeholder variant.
    pub(crate) fn allocate(
        id: String,
        parent: Parent,
        initial: Option<Value>,
        id_generator: Option<IdGenerator>,
    ) -> Self {
        Self {
            inner: Rc::new(NodeInner {
                id,
                parent: RefCell::new(parent),
                variant: RefCell::new(Variant::absent()),
                initial,
                value_cache: RefCell::new(None),
                dirty_cache: Cell::new(None),
                subscribers: Subscribers::default(),
                last_change: Cell::new(Change::empty()),
                frozen: Cell::new(false),
                errors: RefCell::new(Vec::new()),
                id_generator,
                withheld: RefCell::new(Vec::new()),
                pending: Cell::new(Change::empty()),
                pending_notify: Cell::new(false),
            }),
        }
    }

    /// Build the variant (and children) from the initial value.
    pub(crate) fn install(&self) {
        let variant = Variant::fresh(self, self.inner.initial.clone());
        *self.inner.variant.borrow_mut() = variant;
    }

    /// Create a child of this node under `key`, holding `value` as both its
    /// initial and current value.
    pub(crate) fn spawn(&self, key: Key, value: Option<Value>) -> Node {
        let generator = self.inner.id_generator.clone();
        let id = generate_id(generator.as_ref());
        let parent = Parent::Child {
            container: Link::Attached(Rc::downgrade(&self.inner)),
            key,
        };
        let child = Self::allocate(id, parent, value, generator);
        // Join open withhold windows before building grandchildren.
        for scope in self.inner.withheld.borrow().iter() {
            child.enter_withhold(scope);
        }
        child.install();
        if self.inner.frozen.get() {
            child.freeze();
        }
        child
    }

    // =========================================================================
    // IDENTITY
    // =========================================================================

    /// Stable id. Derived nodes report their source's id.
    pub fn id(&self) -> String {
        match &*self.inner.parent.borrow() {
            Parent::Source(source) => source.id(),
            _ => self.inner.id.clone(),
        }
    }

    /// Key under the container, `None` for a root.
    pub fn key(&self) -> Option<Key> {
        match &*self.inner.parent.borrow() {
            Parent::Root => None,
            Parent::Child { key, .. } => Some(key.clone()),
            Parent::Source(source) => source.key(),
        }
    }

    /// The container, if it is still alive.
    pub fn parent(&self) -> Option<Node> {
        match &*self.inner.parent.borrow() {
            Parent::Root => None,
            Parent::Child { container, .. } => container.upgrade().map(Node::from_inner),
            Parent::Source(source) => source.parent(),
        }
    }

    /// Real container and key, the ones signals bubble into.
    /// Derived nodes have none.
    pub(crate) fn container(&self) -> Option<(Node, Key)> {
        match &*self.inner.parent.borrow() {
            Parent::Child { container, key } => container
                .upgrade()
                .map(|inner| (Node::from_inner(inner), key.clone())),
            _ => None,
        }
    }

    /// Keys from the root down to this node.
    pub fn path(&self) -> Vec<Key> {
        let mut keys = Vec::new();
        let mut current = self.clone();
        loop {
            let next = match &*current.inner.parent.borrow() {
                Parent::Root => None,
                Parent::Child { container, key } => {
                    keys.push(key.clone());
                    container.upgrade()
                }
                Parent::Source(source) => {
                    let mut path = source.path();
                    path.extend(keys.drain(..).rev());
                    return path;
                }
            };
            match next {
                Some(inner) => current = Node::from_inner(inner),
                None => break,
            }
        }
        keys.reverse();
        keys
    }

    /// Path joined with dots, e.g. `"items.2.name"`. Empty for a root.
    pub fn path_string(&self) -> String {
        self.path()
            .iter()
            .map(Key::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Topmost reachable ancestor.
    pub fn root(&self) -> Node {
        if let Parent::Source(source) = &*self.inner.parent.borrow() {
            return source.root();
        }
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Rewrite the key after an array shift. Watchers are not told.
    pub(crate) fn rename(&self, key: Key) {
        if let Parent::Child { key: current, .. } = &mut *self.inner.parent.borrow_mut() {
            *current = key;
        }
    }

    /// Switch the container link between owning (parked) and weak (attached).
    pub(crate) fn set_parked(&self, parked: bool) {
        if let Parent::Child { container, .. } = &mut *self.inner.parent.borrow_mut() {
            let relinked = match (&*container, parked) {
                (Link::Attached(weak), true) => weak.upgrade().map(Link::Parked),
                (Link::Parked(strong), false) => Some(Link::Attached(Rc::downgrade(strong))),
                _ => None,
            };
            if let Some(link) = relinked {
                *container = link;
            }
        }
    }

    // =========================================================================
    // VALUES
    // =========================================================================

    /// Value captured when the node was created.
    pub fn initial(&self) -> Option<&Value> {
        self.inner.initial.as_ref()
    }

    /// Current kind.
    pub fn kind(&self) -> Kind {
        self.inner.variant.borrow().kind()
    }

    /// Current value, materialised from the children for containers.
    /// Cached until the next change.
    pub fn value(&self) -> Option<Value> {
        if let Some(cached) = &*self.inner.value_cache.borrow() {
            return cached.clone();
        }
        let value = self.inner.variant.borrow().materialize();
        *self.inner.value_cache.borrow_mut() = Some(value.clone());
        value
    }

    /// Run `f` against the current value without handing out a clone.
    pub fn with_value<R>(&self, f: impl FnOnce(Option<&Value>) -> R) -> R {
        let value = self.value();
        f(value.as_ref())
    }

    /// Whether the value differs from the initial one, anywhere below.
    pub fn is_dirty(&self) -> bool {
        if let Some(dirty) = self.inner.dirty_cache.get() {
            return dirty;
        }
        let dirty = self
            .inner
            .variant
            .borrow()
            .is_dirty(self.inner.initial.as_ref());
        self.inner.dirty_cache.set(Some(dirty));
        dirty
    }

    fn invalidate(&self) {
        *self.inner.value_cache.borrow_mut() = None;
        self.inner.dirty_cache.set(None);
    }

    /// Invalidate every ancestor without signalling them.
    fn invalidate_ancestors(&self) {
        let mut current = self.container();
        while let Some((parent, _)) = current {
            parent.invalidate();
            current = parent.container();
        }
    }

    // =========================================================================
    // MUTATION
    // =========================================================================

    /// Replace the value and tell watchers and ancestors.
    ///
    /// Returns what changed on this node; empty if nothing did.
    ///
    /// # Panics
    ///
    /// Panics if the tree's structure is corrupted by an out-of-order
    /// attach or detach. Use [`Node::try_set`] to get the error instead.
    pub fn set(&self, value: impl Into<Option<Value>>) -> Change {
        self.set_with(value, true)
    }

    /// Like [`Node::set`], optionally without notifying ancestors.
    ///
    /// # Panics
    ///
    /// See [`Node::set`].
    pub fn set_with(&self, value: impl Into<Option<Value>>, notify_parents: bool) -> Change {
        match self.try_set(value, notify_parents) {
            Ok(signal) => signal,
            Err(err) => panic!("tree structure violated at `{}`: {err}", self.path_string()),
        }
    }

    pub fn try_set(
        &self,
        value: impl Into<Option<Value>>,
        notify_parents: bool,
    ) -> Result<Change, TreeError> {
        let value = value.into();
        mutate(|| self.set_inner(value, notify_parents)).inspect_err(|err| {
            tracing::warn!(node = %self.inner.id, path = %self.path_string(), %err, "structural violation");
        })
    }

    /// Set back to the initial value.
    pub fn reset(&self) -> Change {
        self.set(self.inner.initial.clone())
    }

    pub(crate) fn set_inner(
        &self,
        value: Option<Value>,
        notify_parents: bool,
    ) -> Result<Change, TreeError> {
        if self.inner.frozen.get() {
            tracing::debug!(node = %self.inner.id, "set ignored on frozen node");
            return Ok(Change::empty());
        }
        let signal = self.inner.variant.borrow_mut().set(self, value)?;
        self.trigger(signal, notify_parents)?;
        Ok(signal)
    }

    // =========================================================================
    // PROPAGATION
    // =========================================================================

    /// Record `signal` on this node and queue it for dispatch, or fold it
    /// into the pending signal while withheld. Returns false if withheld.
    fn record(&self, signal: Change, notify_parents: bool) -> bool {
        self.invalidate();
        self.inner.last_change.set(signal);

        if self.is_withheld() {
            let pending = self.inner.pending.get().coalesce(signal);
            self.inner.pending.set(pending);
            if notify_parents {
                self.inner.pending_notify.set(true);
            }
            return false;
        }

        schedule(&self.inner, signal);
        true
    }

    /// Tell this node's watchers and (optionally) its container.
    pub(crate) fn trigger(&self, signal: Change, notify_parents: bool) -> Result<(), TreeError> {
        if signal.is_empty() {
            return Ok(());
        }
        let dispatched = self.record(signal, notify_parents);
        if !notify_parents {
            // Ancestors are not told, but their materialised values are stale.
            self.invalidate_ancestors();
            return Ok(());
        }
        let Some((parent, key)) = self.bubble_target() else {
            return Ok(());
        };

        if dispatched {
            return parent.child_trigger(self, signal, &key);
        }

        // Withheld: reconcile the structure now, deliver the bubble on release.
        self.invalidate_ancestors();
        let own = parent.child_update(self, signal, &key)?;
        parent.trigger(own.with_shape(), true)
    }

    /// A child changed: reconcile the structure, then trigger with the
    /// bubbled signal plus whatever that did to this node.
    pub(crate) fn child_trigger(
        &self,
        child: &Node,
        signal: Change,
        key: &Key,
    ) -> Result<(), TreeError> {
        let own = self.child_update(child, signal, key)?;
        self.trigger((signal.bubble() | own).with_shape(), true)
    }

    /// Container that takes this node's signals. A stranded node (a field
    /// parked under what is now an array) has none, so its writes stay local.
    fn bubble_target(&self) -> Option<(Node, Key)> {
        let (parent, key) = self.container()?;
        let addressed = match parent.inner.variant.try_borrow() {
            Ok(variant) => variant.addresses(&key),
            Err(_) => true,
        };
        addressed.then_some((parent, key))
    }

    /// Keep this container's children in step with a child that attached
    /// or detached itself.
    fn child_update(&self, child: &Node, signal: Change, key: &Key) -> Result<Change, TreeError> {
        if !signal.is_structural() {
            return Ok(Change::empty());
        }
        self.inner
            .variant
            .borrow_mut()
            .child_update(self, child, signal, key)
    }

    /// Join the withhold window `scope`.
    pub(crate) fn enter_withhold(&self, scope: &WithholdScope) {
        self.inner.withheld.borrow_mut().push(scope.clone());
        scope.borrow_mut().push(Rc::downgrade(&self.inner));
    }

    /// Leave the window `scope` and, once no window covers this node any
    /// more, replay what was held back.
    pub(crate) fn release_withhold(&self, scope: &WithholdScope) -> Result<(), TreeError> {
        let still_withheld = {
            let mut scopes = self.inner.withheld.borrow_mut();
            if let Some(position) = scopes.iter().position(|open| Rc::ptr_eq(open, scope)) {
                scopes.remove(position);
            }
            !scopes.is_empty()
        };
        if still_withheld {
            return Ok(());
        }

        let pending = self.inner.pending.replace(Change::empty());
        let notify = self.inner.pending_notify.replace(false);
        if pending.is_empty() {
            return Ok(());
        }

        schedule(&self.inner, pending);
        if notify && let Some((parent, _)) = self.bubble_target() {
            parent.trigger(pending.bubble(), true)?;
        }
        Ok(())
    }

    pub fn is_withheld(&self) -> bool {
        !self.inner.withheld.borrow().is_empty()
    }

    // =========================================================================
    // WATCHERS
    // =========================================================================

    /// Watch this node with batched delivery.
    ///
    /// The callback gets the current value and the signal. Call the returned
    /// function to stop watching.
    pub fn watch(&self, callback: impl Fn(Option<&Value>, Change) + 'static) -> UnwatchFn {
        self.watch_with(callback, false)
    }

    /// Watch this node with one call per change, even inside `batch()`.
    pub fn watch_sync(&self, callback: impl Fn(Option<&Value>, Change) + 'static) -> UnwatchFn {
        self.watch_with(callback, true)
    }

    pub fn watch_with(
        &self,
        callback: impl Fn(Option<&Value>, Change) + 'static,
        sync: bool,
    ) -> UnwatchFn {
        let target = if sync { Target::Sync } else { Target::Batched };
        let id = self.inner.subscribers.add(Rc::new(callback), target);
        let node = Rc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = node.upgrade() {
                inner.subscribers.remove(id);
            }
        })
    }

    /// Number of registered watchers.
    pub fn watcher_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Replace this node's validation errors.
    ///
    /// Signals `INVALID` when the new list is non-empty, `VALID` when it
    /// clears a non-empty one, nothing when the list is unchanged. Validity
    /// does not bubble.
    pub fn set_errors(&self, errors: Vec<ValidationError>) -> Change {
        mutate(|| {
            let signal = {
                let mut current = self.inner.errors.borrow_mut();
                if *current == errors {
                    return Change::empty();
                }
                *current = errors;
                if current.is_empty() {
                    Change::VALID
                } else {
                    Change::INVALID
                }
            };
            self.record(signal, false);
            signal
        })
    }

    pub fn clear_errors(&self) -> Change {
        self.set_errors(Vec::new())
    }

    pub fn errors(&self) -> Vec<ValidationError> {
        self.inner.errors.borrow().clone()
    }

    /// No errors here or on any attached descendant.
    pub fn is_valid(&self) -> bool {
        self.inner.errors.borrow().is_empty()
            && self.children().iter().all(Node::is_valid)
    }
}

// =============================================================================
// TRAIT IMPLS
// =============================================================================

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("path", &self.path_string())
            .field("kind", &self.kind())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
