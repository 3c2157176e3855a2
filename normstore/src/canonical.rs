//! Canonical (stable) JSON serialization.
//!
//! Byte-for-byte checkpoint round-tripping (`load(save(state)) == state`)
//! requires that equal states always serialize to the same
//! bytes. `serde_json::Value`'s default `Map` is insertion-ordered, which is
//! *not* stable across two independently-constructed-but-equal states. This
//! module re-serializes any `Serialize` value through a `BTreeMap`-backed
//! value tree so object keys are always emitted in sorted order, and arrays
//! keep their (already deterministic) element order.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;

/// A JSON-like value whose objects are `BTreeMap`s, guaranteeing sorted key
/// order on serialization regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
enum CanonicalValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<CanonicalValue>),
    Object(BTreeMap<String, CanonicalValue>),
}

impl From<Value> for CanonicalValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => CanonicalValue::Null,
            Value::Bool(b) => CanonicalValue::Bool(b),
            Value::Number(n) => CanonicalValue::Number(n),
            Value::String(s) => CanonicalValue::String(s),
            Value::Array(a) => CanonicalValue::Array(a.into_iter().map(CanonicalValue::from).collect()),
            Value::Object(o) => {
                CanonicalValue::Object(o.into_iter().map(|(k, v)| (k, CanonicalValue::from(v))).collect())
            }
        }
    }
}

/// Serialize `value` to a canonical JSON string: sorted object keys, no
/// incidental whitespace, stable across equal inputs.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let raw = serde_json::to_value(value)?;
    let canonical = CanonicalValue::from(raw);
    Ok(serde_json::to_string(&canonical)?)
}

/// Parse canonical JSON back into a concrete type.
pub fn from_canonical_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T> {
    Ok(serde_json::from_str(s)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys() {
        let a = json!({"b": 1, "a": 2, "c": {"z": 1, "y": 2}});
        let s = to_canonical_json(&a).unwrap();
        assert_eq!(s, r#"{"a":2,"b":1,"c":{"y":2,"z":1}}"#);
    }

    #[test]
    fn equal_values_produce_identical_bytes() {
        let a = json!({"x": 1, "y": [1,2,3], "z": {"q": true}});
        let b = json!({"z": {"q": true}, "y": [1,2,3], "x": 1});
        assert_eq!(to_canonical_json(&a).unwrap(), to_canonical_json(&b).unwrap());
    }

    #[test]
    fn round_trips() {
        let a = json!({"nested": {"list": [1, "two", 3.0, null, false]}});
        let s = to_canonical_json(&a).unwrap();
        let back: Value = from_canonical_json(&s).unwrap();
        assert_eq!(a, back);
    }
}
