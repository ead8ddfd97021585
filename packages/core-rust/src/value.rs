//! Document value model.
//!
//! Every document stored or queried by Drove is a map of named [`Value`]s.
//! The crate's range engine, index bounds, and sort merging all rest on one
//! property of this type: a *total* cross-type ordering. Values are ordered
//! first by a type rank (`MinKey < Null < Bool < numbers < String < Bytes <
//! Array < Map < MaxKey`) and then by value within the rank. `Int` and
//! `Float` share a rank and compare numerically across the two
//! representations.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A document: named fields in deterministic (sorted) order.
pub type Document = BTreeMap<String, Value>;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single document value.
///
/// `MinKey` and `MaxKey` are the ordering sentinels: they compare below and
/// above every other value and bound the "full range" of the query engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    MinKey,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    MaxKey,
}

impl Value {
    /// Rank of the value's type in the cross-type ordering. `Int` and
    /// `Float` share a rank so that numbers compare numerically.
    fn type_rank(&self) -> u8 {
        match self {
            Value::MinKey => 0,
            Value::Null => 1,
            Value::Bool(_) => 2,
            Value::Int(_) | Value::Float(_) => 3,
            Value::String(_) => 4,
            Value::Bytes(_) => 5,
            Value::Array(_) => 6,
            Value::Map(_) => 7,
            Value::MaxKey => 8,
        }
    }

    /// Returns `true` for the `MinKey` sentinel.
    #[must_use]
    pub fn is_min_key(&self) -> bool {
        matches!(self, Value::MinKey)
    }

    /// Returns `true` for the `MaxKey` sentinel.
    #[must_use]
    pub fn is_max_key(&self) -> bool {
        matches!(self, Value::MaxKey)
    }

    /// Returns the string slice if this is a `String` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an `i64` if it is numeric and representable.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            #[allow(clippy::cast_possible_truncation)]
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Returns the value as a bool if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Numeric comparison across `Int` and `Float`.
///
/// `NaN` uses `total_cmp` semantics (positive `NaN` above `+inf`, negative
/// below `-inf`), keeping the ordering total. Very large `i64` values lose
/// precision when compared against floats; exact integer comparison applies
/// only when both sides are `Int`.
fn cmp_number(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.total_cmp(y),
        #[allow(clippy::cast_precision_loss)]
        (Value::Int(x), Value::Float(y)) => (*x as f64).total_cmp(y),
        #[allow(clippy::cast_precision_loss)]
        (Value::Float(x), Value::Int(y)) => x.total_cmp(&(*y as f64)),
        _ => unreachable!("cmp_number called on non-numeric values"),
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (Value::MinKey, Value::MinKey)
            | (Value::Null, Value::Null)
            | (Value::MaxKey, Value::MaxKey) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                cmp_number(self, other)
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            _ => unreachable!("equal type ranks with mismatched variants"),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality must agree with `cmp` (Int(0) == Float(0.0)), so it cannot be
// derived.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

// ---------------------------------------------------------------------------
// serde_json interop (test/tooling convenience)
// ---------------------------------------------------------------------------

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_i64().map_or_else(
                || Value::Float(n.as_f64().unwrap_or(f64::NAN)),
                Value::Int,
            ),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(m) => Value::Map(
                m.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::MinKey => serde_json::json!({"$minKey": 1}),
            Value::MaxKey => serde_json::json!({"$maxKey": 1}),
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Value::from(f),
            Value::String(s) => serde_json::Value::String(s),
            // JSON has no binary type; bytes become a number array.
            Value::Bytes(b) => serde_json::Value::Array(
                b.into_iter().map(serde_json::Value::from).collect(),
            ),
            Value::Array(a) => {
                serde_json::Value::Array(a.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Map(m) => serde_json::Value::Object(
                m.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Builds a [`Document`] from a JSON object value. Panics on non-objects;
/// intended for tests and fixtures.
///
/// # Panics
///
/// Panics if `v` is not a JSON object.
#[must_use]
pub fn doc_from_json(v: serde_json::Value) -> Document {
    match Value::from(v) {
        Value::Map(m) => m,
        other => panic!("expected a JSON object, got {other:?}"),
    }
}

/// Converts a [`Document`] back into a JSON object.
#[must_use]
pub fn doc_to_json(doc: &Document) -> serde_json::Value {
    serde_json::Value::from(Value::Map(doc.clone()))
}

// ---------------------------------------------------------------------------
// DocumentExt
// ---------------------------------------------------------------------------

/// Typed field access on a [`Document`].
pub trait DocumentExt {
    fn get_str(&self, key: &str) -> Option<&str>;
    fn get_i64(&self, key: &str) -> Option<i64>;
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn get_doc(&self, key: &str) -> Option<&BTreeMap<String, Value>>;
    fn get_array(&self, key: &str) -> Option<&[Value]>;
}

impl DocumentExt for Document {
    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    fn get_doc(&self, key: &str) -> Option<&BTreeMap<String, Value>> {
        match self.get(key) {
            Some(Value::Map(m)) => Some(m),
            _ => None,
        }
    }

    fn get_array(&self, key: &str) -> Option<&[Value]> {
        match self.get(key) {
            Some(Value::Array(a)) => Some(a),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -- ordering --

    #[test]
    fn type_ranks_order_across_types() {
        let ordered = [
            Value::MinKey,
            Value::Null,
            Value::Bool(false),
            Value::Int(0),
            Value::String(String::new()),
            Value::Bytes(vec![]),
            Value::Array(vec![]),
            Value::Map(BTreeMap::new()),
            Value::MaxKey,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1], "{:?} should be < {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn numbers_compare_across_int_and_float() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert!(Value::Int(2) < Value::Float(2.5));
        assert!(Value::Float(1.9) < Value::Int(2));
    }

    #[test]
    fn nan_has_a_total_order_position() {
        // total_cmp: positive NaN sits above +inf, negative NaN below -inf.
        assert!(Value::Float(f64::NAN) > Value::Float(f64::INFINITY));
        assert!(Value::Float(-f64::NAN) < Value::Float(f64::NEG_INFINITY));
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }

    #[test]
    fn strings_order_lexicographically() {
        assert!(Value::from("abc") < Value::from("abd"));
        assert!(Value::from("ab") < Value::from("abc"));
    }

    #[test]
    fn sentinels_bound_everything() {
        for v in [Value::Null, Value::Int(i64::MAX), Value::from("zzz")] {
            assert!(Value::MinKey < v);
            assert!(v < Value::MaxKey);
        }
    }

    // -- json interop --

    #[test]
    fn doc_from_json_builds_nested_document() {
        let doc = doc_from_json(json!({"a": 1, "b": {"c": [1, 2.5, "x", null, true]}}));
        assert_eq!(doc.get_i64("a"), Some(1));
        let b = doc.get_doc("b").unwrap();
        let c = match b.get("c").unwrap() {
            Value::Array(a) => a,
            other => panic!("expected array, got {other:?}"),
        };
        assert_eq!(c.len(), 5);
        assert_eq!(c[0], Value::Int(1));
        assert_eq!(c[1], Value::Float(2.5));
    }

    // -- serde --

    #[test]
    fn value_msgpack_roundtrip() {
        let doc = doc_from_json(json!({
            "s": "text", "i": 7, "f": 1.25, "b": true, "n": null,
            "a": [1, 2], "m": {"x": "y"}
        }));
        let bytes = rmp_serde::to_vec_named(&doc).expect("serialize");
        let decoded: Document = rmp_serde::from_slice(&bytes).expect("deserialize");
        assert_eq!(doc, decoded);
    }

    #[test]
    fn bytes_variant_roundtrips() {
        let v = Value::Bytes(vec![0, 1, 254, 255]);
        let bytes = rmp_serde::to_vec_named(&v).expect("serialize");
        let decoded: Value = rmp_serde::from_slice(&bytes).expect("deserialize");
        assert_eq!(v, decoded);
    }

    // -- accessors --

    #[test]
    fn document_ext_typed_access() {
        let doc = doc_from_json(json!({"s": "x", "i": 3, "t": true, "a": [1]}));
        assert_eq!(doc.get_str("s"), Some("x"));
        assert_eq!(doc.get_i64("i"), Some(3));
        assert_eq!(doc.get_bool("t"), Some(true));
        assert_eq!(doc.get_array("a").map(<[Value]>::len), Some(1));
        assert_eq!(doc.get_str("missing"), None);
        assert_eq!(doc.get_str("i"), None);
    }
}
