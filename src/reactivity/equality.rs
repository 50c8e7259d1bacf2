// ============================================================================
// spark-tree - Equality Functions
// Strict value comparison used by primitive sets and dirty checks
// ============================================================================

use serde_json::{Number, Value};

// =============================================================================
// NUMBERS
// =============================================================================

/// Numeric equality across integer and float representations.
///
/// `serde_json` keeps `1` and `1.0` apart; a value tree compares them as the
/// same number.
///
/// # Example
/// ```
/// use spark_tree::reactivity::equality::numbers_equal;
/// use serde_json::Number;
///
/// assert!(numbers_equal(&Number::from(1), &Number::from_f64(1.0).unwrap()));
/// assert!(!numbers_equal(&Number::from(1), &Number::from(2)));
/// ```
pub fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

// =============================================================================
// STRICT EQUALITY
// =============================================================================

/// Strict equality of two JSON values.
///
/// Scalars compare by kind and value. Objects and arrays compare
/// structurally; object key order is ignored.
///
/// # Example
/// ```
/// use spark_tree::reactivity::equality::strict_equals;
/// use serde_json::json;
///
/// assert!(strict_equals(&json!({"a": 1, "b": [2]}), &json!({"b": [2.0], "a": 1})));
/// assert!(!strict_equals(&json!("1"), &json!(1)));
/// ```
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| strict_equals(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| strict_equals(x, y)))
        }
        _ => false,
    }
}

/// Strict equality where `None` stands for an absent value.
pub fn same_value(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => strict_equals(a, b),
        _ => false,
    }
}

// =============================================================================
// TESTS
// =============================================================================
