// ============================================================================
// spark-tree - Variant
// The kind-specific part of a node: primitive value, object or array children
// ============================================================================
//
// Every variant owns the node's phantom registry. When the kind changes the
// registry moves into the new variant so detached children survive a
// round-trip through another kind.
// ============================================================================

use serde_json::Value;

use crate::collections::array::ArrayChildren;
use crate::collections::object::ObjectChildren;
use crate::collections::phantom::PhantomRegistry;
use crate::core::change::Change;
use crate::core::error::TreeError;
use crate::core::types::{Key, Kind};
use crate::primitives::node::Node;
use crate::reactivity::equality::{same_value, strict_equals};

// =============================================================================
// PRIMITIVE
// =============================================================================

/// Scalar (or absent) value of a leaf node.
#[derive(Debug, Default)]
pub(crate) struct PrimitiveValue {
    value: Option<Value>,
    pub(crate) phantoms: PhantomRegistry,
}

impl PrimitiveValue {
    pub(crate) fn new(value: Option<Value>, phantoms: PhantomRegistry) -> Self {
        Self { value, phantoms }
    }

    pub(crate) fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Store `next` and report what changed. Equal values are not stored.
    pub(crate) fn set(&mut self, next: Option<Value>) -> Change {
        let signal = classify(self.value.as_ref(), next.as_ref());
        if !signal.is_empty() {
            self.value = next;
        }
        signal
    }
}

/// Field-level signal for a primitive going from `prev` to `next`.
pub(crate) fn classify(prev: Option<&Value>, next: Option<&Value>) -> Change {
    match (prev, next) {
        (None, None) => Change::empty(),
        (None, Some(_)) => Change::ATTACH,
        (Some(_), None) => Change::DETACH,
        (Some(prev), Some(next)) if strict_equals(prev, next) => Change::empty(),
        (Some(prev), Some(next)) => {
            if Kind::of(Some(prev)) == Kind::of(Some(next)) {
                Change::VALUE
            } else {
                Change::TYPE
            }
        }
    }
}

// =============================================================================
// VARIANT
// =============================================================================

#[derive(Debug)]
pub(crate) enum Variant {
    Primitive(PrimitiveValue),
    Object(ObjectChildren),
    Array(ArrayChildren),
}

impl Variant {
    pub(crate) fn absent() -> Self {
        Variant::Primitive(PrimitiveValue::default())
    }

    /// Variant for a freshly created node: every child is new.
    pub(crate) fn fresh(node: &Node, value: Option<Value>) -> Self {
        match value {
            Some(Value::Object(map)) => Variant::Object(ObjectChildren::fresh(node, map)),
            Some(Value::Array(items)) => Variant::Array(ArrayChildren::fresh(node, items)),
            other => Variant::Primitive(PrimitiveValue::new(other, PhantomRegistry::new())),
        }
    }

    pub(crate) fn kind(&self) -> Kind {
        match self {
            Variant::Primitive(primitive) => Kind::of(primitive.value()),
            Variant::Object(_) => Kind::Object,
            Variant::Array(_) => Kind::Array,
        }
    }

    pub(crate) fn phantoms(&self) -> &PhantomRegistry {
        match self {
            Variant::Primitive(primitive) => &primitive.phantoms,
            Variant::Object(object) => &object.phantoms,
            Variant::Array(array) => &array.phantoms,
        }
    }

    pub(crate) fn phantoms_mut(&mut self) -> &mut PhantomRegistry {
        match self {
            Variant::Primitive(primitive) => &mut primitive.phantoms,
            Variant::Object(object) => &mut object.phantoms,
            Variant::Array(array) => &mut array.phantoms,
        }
    }

    /// Rewrite `key` the way this container stores it.
    pub(crate) fn normalise_key(&self, key: &Key) -> Key {
        match self {
            Variant::Primitive(_) => key.clone(),
            Variant::Object(_) => key.for_object(),
            Variant::Array(_) => key.for_array(),
        }
    }

    /// Whether a child under `key` can live in this container. Arrays only
    /// hold index keys; a field parked under an array is stranded until the
    /// node turns back into an object.
    pub(crate) fn addresses(&self, key: &Key) -> bool {
        match self {
            Variant::Array(_) => key.as_index().is_some(),
            _ => true,
        }
    }

    /// Attached child under an already normalised key.
    pub(crate) fn child(&self, key: &Key) -> Option<Node> {
        match (self, key) {
            (Variant::Object(object), Key::Field(name)) => object.get(name).cloned(),
            (Variant::Array(array), Key::Index(index)) => array.get(*index).cloned(),
            _ => None,
        }
    }

    /// Attached children in order. Array holes are skipped.
    pub(crate) fn attached(&self) -> Vec<(Key, Node)> {
        match self {
            Variant::Primitive(_) => Vec::new(),
            Variant::Object(object) => object.entries(),
            Variant::Array(array) => array.entries(),
        }
    }

    /// Number of child slots (array holes included).
    pub(crate) fn len(&self) -> usize {
        match self {
            Variant::Primitive(_) => 0,
            Variant::Object(object) => object.len(),
            Variant::Array(array) => array.len(),
        }
    }

    pub(crate) fn materialize(&self) -> Option<Value> {
        match self {
            Variant::Primitive(primitive) => primitive.value.clone(),
            Variant::Object(object) => Some(object.materialize()),
            Variant::Array(array) => Some(array.materialize()),
        }
    }

    pub(crate) fn is_dirty(&self, initial: Option<&Value>) -> bool {
        match self {
            Variant::Primitive(primitive) => !same_value(primitive.value(), initial),
            Variant::Object(object) => object.is_dirty(initial),
            Variant::Array(array) => array.is_dirty(initial),
        }
    }

    // =========================================================================
    // SET
    // =========================================================================

    /// Apply a new value, reusing children where the kind allows.
    pub(crate) fn set(&mut self, node: &Node, value: Option<Value>) -> Result<Change, TreeError> {
        match (self, value) {
            (Variant::Object(object), Some(Value::Object(map))) => object.set(node, map),
            (Variant::Array(array), Some(Value::Array(items))) => array.set(node, items),
            (Variant::Primitive(primitive), value) if !Kind::of(value.as_ref()).is_container() => {
                Ok(primitive.set(value).with_shape())
            }
            (variant, value) => variant.replace(node, value),
        }
    }

    /// Swap in a variant of another kind. Attached children are detached
    /// and parked, then the new variant claims them back where keys match.
    fn replace(&mut self, node: &Node, value: Option<Value>) -> Result<Change, TreeError> {
        let from = self.kind();
        let to = Kind::of(value.as_ref());
        let (mut phantoms, attached) = std::mem::replace(self, Variant::absent()).into_parts();

        let mut signal = match (from, to) {
            (Kind::Absent, _) => Change::ATTACH,
            (_, Kind::Absent) => Change::DETACH,
            _ => Change::TYPE,
        };

        for (key, child) in attached {
            child.set_inner(None, false)?;
            phantoms.register(key, &child);
            signal |= Change::CHILD_DETACH;
        }

        tracing::debug!(node = %node.inner.id, %from, %to, "variant replaced");

        let (variant, built) = Variant::build(node, value, phantoms)?;
        *self = variant;
        Ok((signal | built).with_shape())
    }

    /// Build a variant for `value` on top of an inherited registry.
    fn build(
        node: &Node,
        value: Option<Value>,
        phantoms: PhantomRegistry,
    ) -> Result<(Variant, Change), TreeError> {
        match value {
            Some(Value::Object(map)) => {
                let mut object = ObjectChildren::with_phantoms(normalised(phantoms, Key::for_object));
                let signal = object.set(node, map)?;
                Ok((Variant::Object(object), signal))
            }
            Some(Value::Array(items)) => {
                let mut array = ArrayChildren::with_phantoms(normalised(phantoms, Key::for_array));
                let signal = array.set(node, items)?;
                Ok((Variant::Array(array), signal))
            }
            other => Ok((
                Variant::Primitive(PrimitiveValue::new(other, phantoms)),
                Change::empty(),
            )),
        }
    }

    fn into_parts(self) -> (PhantomRegistry, Vec<(Key, Node)>) {
        match self {
            Variant::Primitive(primitive) => (primitive.phantoms, Vec::new()),
            Variant::Object(object) => object.into_parts(),
            Variant::Array(array) => array.into_parts(),
        }
    }

    // =========================================================================
    // CHILD UPDATES
    // =========================================================================

    /// Reconcile after `child` attached or detached itself under `key`.
    ///
    /// Returns the signal this node picks up on its own field range, which
    /// is only non-empty when a primitive turns into a container.
    pub(crate) fn child_update(
        &mut self,
        node: &Node,
        child: &Node,
        signal: Change,
        key: &Key,
    ) -> Result<Change, TreeError> {
        let key = self.normalise_key(key);
        match self {
            Variant::Object(object) => object.child_update(child, signal, &key)?,
            Variant::Array(array) => array.child_update(child, signal, &key)?,
            Variant::Primitive(_) if signal.contains(Change::DETACH) => {
                return Err(TreeError::ChildNotAttached { key });
            }
            Variant::Primitive(primitive) => {
                if !primitive.phantoms.claim_node(&key, child) {
                    return Err(TreeError::ChildNotRegistered { key });
                }
                let from = Kind::of(primitive.value());
                let phantoms = std::mem::take(&mut primitive.phantoms);
                *self = promote(phantoms, child, &key);
                tracing::debug!(node = %node.inner.id, %from, to = %self.kind(), "promoted by child attach");
                return Ok(if from == Kind::Absent {
                    Change::ATTACH
                } else {
                    Change::TYPE
                });
            }
        }
        Ok(Change::empty())
    }
}

/// Container holding just `child`: an array for index keys, an object
/// otherwise.
fn promote(phantoms: PhantomRegistry, child: &Node, key: &Key) -> Variant {
    match key {
        Key::Index(index) => {
            let mut array = ArrayChildren::with_phantoms(normalised(phantoms, Key::for_array));
            array.place(*index, child.clone());
            Variant::Array(array)
        }
        Key::Field(name) => {
            let mut object = ObjectChildren::with_phantoms(normalised(phantoms, Key::for_object));
            object.insert(name.clone(), child.clone());
            Variant::Object(object)
        }
    }
}

fn normalised(phantoms: PhantomRegistry, normalise: impl Fn(&Key) -> Key) -> PhantomRegistry {
    let mut registry = PhantomRegistry::new();
    registry.absorb(phantoms, normalise);
    registry
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_primitives() {
        assert_eq!(classify(None, None), Change::empty());
        assert_eq!(classify(None, Some(&json!(0))), Change::ATTACH);
        assert_eq!(classify(Some(&json!(0)), None), Change::DETACH);
        assert_eq!(classify(Some(&json!(1)), Some(&json!(1.0))), Change::empty());
        assert_eq!(classify(Some(&json!(1)), Some(&json!(2))), Change::VALUE);
        assert_eq!(classify(Some(&json!(1)), Some(&json!("1"))), Change::TYPE);
        assert_eq!(classify(Some(&json!(null)), Some(&json!(false))), Change::TYPE);
    }

    #[test]
    fn object_to_array_swaps_variant() {
        let node = Node::new(json!({"a": 1}));
        let a = node.at("a");

        let signal = node.set(json!([1, 2]));
        assert!(signal.contains(Change::TYPE | Change::CHILD_DETACH | Change::CHILD_ATTACH | Change::SHAPE));
        assert_eq!(node.kind(), Kind::Array);
        assert_eq!(a.value(), None);
        assert_eq!(node.value(), Some(json!([1, 2])));
    }

    #[test]
    fn primitive_to_object_attaches() {
        let node = Node::new(None);
        let signal = node.set(json!({"x": 1}));
        assert_eq!(signal, Change::ATTACH | Change::CHILD_ATTACH | Change::SHAPE);
        assert_eq!(node.at("x").value(), Some(json!(1)));
    }

    #[test]
    fn container_to_absent_detaches() {
        let node = Node::new(json!([1]));
        let signal = node.set(None);
        assert_eq!(signal, Change::DETACH | Change::CHILD_DETACH | Change::SHAPE);
        assert_eq!(node.kind(), Kind::Absent);
    }

    #[test]
    fn phantoms_survive_kind_round_trip() {
        let node = Node::new(json!({"a": 1}));
        let a = node.at("a");

        node.set(json!("flat"));
        node.set(json!({"a": 2}));

        assert!(node.at("a").ptr_eq(&a));
        assert_eq!(a.value(), Some(json!(2)));
    }

    #[test]
    fn field_parked_under_array_writes_locally() {
        let node = Node::new(json!({"a": 1}));
        let a = node.at("a");
        node.set(json!([1]));

        let calls = std::rc::Rc::new(std::cell::Cell::new(0));
        let seen = calls.clone();
        let _unwatch = node.watch_sync(move |_, _| seen.set(seen.get() + 1));

        assert_eq!(a.try_set(json!(5), true), Ok(Change::ATTACH | Change::SHAPE));
        assert_eq!(a.value(), Some(json!(5)));
        assert_eq!(node.value(), Some(json!([1])));
        assert_eq!(calls.get(), 0);

        // Back to an object: the parked field is claimed with its identity.
        node.set(json!({"a": 7}));
        assert!(node.at("a").ptr_eq(&a));
        assert_eq!(a.value(), Some(json!(7)));
    }

    #[test]
    fn numeric_fields_are_rekeyed_for_arrays() {
        let node = Node::new(json!({"0": "zero"}));
        let zero = node.at("0");
        node.set(json!([]));
        assert_eq!(zero.key(), Some(Key::Index(0)));

        zero.set(json!("back"));
        assert_eq!(node.value(), Some(json!(["back"])));
    }

    #[test]
    fn child_attach_promotes_primitive() {
        let node = Node::new(json!(5));
        let field = node.at("x");
        let signal = field.set(json!(1));

        assert_eq!(signal, Change::ATTACH | Change::SHAPE);
        assert_eq!(node.kind(), Kind::Object);
        assert_eq!(node.value(), Some(json!({"x": 1})));
        assert_eq!(node.last_change(), Change::TYPE | Change::CHILD_ATTACH | Change::SHAPE);

        let list = Node::new(None);
        list.at(0).set(json!("first"));
        assert_eq!(list.value(), Some(json!(["first"])));
        assert_eq!(list.last_change(), Change::ATTACH | Change::CHILD_ATTACH | Change::SHAPE);
    }
}
