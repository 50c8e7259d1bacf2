// ============================================================================
// spark-tree - Type Definitions
// Keys, runtime kinds, validation records and callback aliases
// ============================================================================

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use super::change::Change;

// =============================================================================
// KEY
// =============================================================================

/// Address of a child inside its container.
///
/// Objects are keyed by [`Key::Field`], arrays by [`Key::Index`]. Keys are
/// normalised when they reach a container, so `Key::Index(2)` on an object
/// means the field `"2"`, and `Key::Field("2")` on an array means index 2.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Field(String),
    Index(usize),
}

impl Key {
    /// The key as an array index, parsing numeric field names.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(index) => Some(*index),
            Key::Field(name) => name.parse().ok(),
        }
    }

    /// The key as an object field name.
    pub fn to_field(&self) -> String {
        match self {
            Key::Field(name) => name.clone(),
            Key::Index(index) => index.to_string(),
        }
    }

    /// Normalise for an object container.
    pub(crate) fn for_object(&self) -> Key {
        Key::Field(self.to_field())
    }

    /// Normalise for an array container. Non-numeric fields stay fields.
    pub(crate) fn for_array(&self) -> Key {
        match self.as_index() {
            Some(index) => Key::Index(index),
            None => self.clone(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => f.write_str(name),
            Key::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Field(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Field(name)
    }
}

impl From<&String> for Key {
    fn from(name: &String) -> Self {
        Key::Field(name.clone())
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

// =============================================================================
// KIND
// =============================================================================

/// Runtime kind of a node's value. `Absent` is "no value at all".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Absent,
    Null,
    Bool,
    Number,
    String,
    Object,
    Array,
}

impl Kind {
    /// Classify an optional JSON value.
    pub fn of(value: Option<&Value>) -> Kind {
        match value {
            None => Kind::Absent,
            Some(Value::Null) => Kind::Null,
            Some(Value::Bool(_)) => Kind::Bool,
            Some(Value::Number(_)) => Kind::Number,
            Some(Value::String(_)) => Kind::String,
            Some(Value::Object(_)) => Kind::Object,
            Some(Value::Array(_)) => Kind::Array,
        }
    }

    /// Objects and arrays hold child nodes, everything else is a primitive.
    pub fn is_container(self) -> bool {
        matches!(self, Kind::Object | Kind::Array)
    }

    /// `null` or absent.
    pub fn is_nullish(self) -> bool {
        matches!(self, Kind::Absent | Kind::Null)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Absent => "absent",
            Kind::Null => "null",
            Kind::Bool => "bool",
            Kind::Number => "number",
            Kind::String => "string",
            Kind::Object => "object",
            Kind::Array => "array",
        };
        f.write_str(name)
    }
}

// =============================================================================
// VALIDATION ERRORS
// =============================================================================

/// A validation problem attached to a node. Plain data, not a Rust error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Optional category, e.g. `"required"`
    pub kind: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: None,
            message: message.into(),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

// =============================================================================
// CALLBACKS
// =============================================================================

/// Watcher callback: receives the node's current value and the change.
pub type WatchFn = Rc<dyn Fn(Option<&Value>, Change)>;

/// Returned by `watch`; call it to remove exactly that watcher.
pub type UnwatchFn = Box<dyn FnOnce()>;

/// Produces node ids. Shared by every node of one tree.
pub type IdGenerator = Rc<dyn Fn() -> String>;

// =============================================================================
// TESTS
// =============================================================================
