//! Element values
//!
//! Elements cross the data plane as JSON, so the enum is externally tagged to
//! keep `Kv`, `Bytes` and `Array` distinguishable after a round trip.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A pipeline element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Kv(Box<Value>, Box<Value>),
}

impl Value {
    pub fn kv(key: impl Into<Value>, value: impl Into<Value>) -> Self {
        Value::Kv(Box::new(key.into()), Box::new(value.into()))
    }

    /// Borrow the key and value of a `Kv`
    pub fn as_kv(&self) -> Option<(&Value, &Value)> {
        match self {
            Value::Kv(k, v) => Some((k, v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Array(values)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Kv(k, v) => write!(f, "{}={}", k, v),
        }
    }
}

/// Key identity by encoded form: two keys are equal iff their encodings are.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StructuralKey(String);

impl StructuralKey {
    pub fn of(key: &Value) -> Result<Self> {
        Ok(StructuralKey(serde_json::to_string(key)?))
    }

    /// Decode the key value back
    pub fn value(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.0)?)
    }

    pub fn encoded(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StructuralKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_accessors() {
        let kv = Value::kv("a", 1i64);
        let (k, v) = kv.as_kv().unwrap();
        assert_eq!(k.as_str(), Some("a"));
        assert_eq!(v.as_int(), Some(1));
        assert!(Value::Null.as_kv().is_none());
    }

    #[test]
    fn test_kv_and_array_stay_distinct() {
        let kv = Value::kv("a", "b");
        let array = Value::Array(vec![Value::from("a"), Value::from("b")]);
        let kv_json = serde_json::to_string(&kv).unwrap();
        let array_json = serde_json::to_string(&array).unwrap();
        assert_ne!(kv_json, array_json);
        assert_eq!(serde_json::from_str::<Value>(&kv_json).unwrap(), kv);
    }

    #[test]
    fn test_structural_key_equality() {
        let a = StructuralKey::of(&Value::from("k")).unwrap();
        let b = StructuralKey::of(&Value::from("k")).unwrap();
        let c = StructuralKey::of(&Value::Int(1)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.value().unwrap(), Value::from("k"));
    }

    #[test]
    fn test_display() {
        let v = Value::kv("k", Value::Array(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(v.to_string(), "k=[1, 2]");
    }
}
