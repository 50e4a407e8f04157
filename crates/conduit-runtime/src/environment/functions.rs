//! Functions a worker can run, registered by name
//!
//! A `PAR_DO` transform names its function in the payload:
//! `{ "function": "explode" }`.

use conduit_core::{PTransform, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Element-wise function
pub type MapFn = Arc<dyn Fn(&Value) -> anyhow::Result<Vec<Value>> + Send + Sync>;

/// Function over an element and the state stored under the element's key.
/// Returns the outputs and the values to append to that state.
pub type StatefulFn =
    Arc<dyn Fn(&Value, &[Value]) -> anyhow::Result<(Vec<Value>, Vec<Value>)> + Send + Sync>;

#[derive(Clone)]
pub enum UserFunction {
    Map(MapFn),
    Stateful(StatefulFn),
}

impl fmt::Debug for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserFunction::Map(_) => write!(f, "UserFunction::Map"),
            UserFunction::Stateful(_) => write!(f, "UserFunction::Stateful"),
        }
    }
}

/// Name of the function a transform runs, if its payload names one
pub fn function_name(transform: &PTransform) -> Option<&str> {
    transform
        .spec
        .as_ref()
        .and_then(|spec| spec.payload.get("function"))
        .and_then(serde_json::Value::as_str)
}

#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, UserFunction>,
}

impl FunctionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `identity`, `to_kv`, `explode` and `distinct`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_map("identity", |value| Ok(vec![value.clone()]));
        registry.register_map("to_kv", to_kv);
        registry.register_map("explode", |value| {
            Ok(match value {
                Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            })
        });
        registry.register_stateful("distinct", |value, seen| {
            if seen.contains(value) {
                Ok((Vec::new(), Vec::new()))
            } else {
                Ok((vec![value.clone()], vec![value.clone()]))
            }
        });
        registry
    }

    pub fn register_map<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Value) -> anyhow::Result<Vec<Value>> + Send + Sync + 'static,
    {
        self.functions
            .insert(name.into(), UserFunction::Map(Arc::new(f)));
        self
    }

    pub fn register_stateful<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Value, &[Value]) -> anyhow::Result<(Vec<Value>, Vec<Value>)> + Send + Sync + 'static,
    {
        self.functions
            .insert(name.into(), UserFunction::Stateful(Arc::new(f)));
        self
    }

    pub fn get(&self, name: &str) -> Option<&UserFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

/// `[k, v]` and `Kv(k, v)` become `Kv(k, v)`
fn to_kv(value: &Value) -> anyhow::Result<Vec<Value>> {
    match value {
        Value::Kv(_, _) => Ok(vec![value.clone()]),
        Value::Array(items) if items.len() == 2 => {
            Ok(vec![Value::kv(items[0].clone(), items[1].clone())])
        }
        other => anyhow::bail!("to_kv expects a two-element array, got {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::urns;

    fn map(registry: &FunctionRegistry, name: &str, value: Value) -> anyhow::Result<Vec<Value>> {
        match registry.get(name) {
            Some(UserFunction::Map(f)) => f(&value),
            other => panic!("expected map function, got {:?}", other),
        }
    }

    #[test]
    fn test_builtins() {
        let registry = FunctionRegistry::with_builtins();
        let pair = Value::Array(vec![Value::from("k"), Value::Int(1)]);

        assert_eq!(map(&registry, "identity", Value::Int(3)).unwrap(), vec![Value::Int(3)]);
        assert_eq!(
            map(&registry, "to_kv", pair.clone()).unwrap(),
            vec![Value::kv("k", 1i64)]
        );
        assert_eq!(map(&registry, "explode", pair).unwrap().len(), 2);
        assert!(map(&registry, "to_kv", Value::Int(1)).is_err());
    }

    #[test]
    fn test_distinct_uses_state() {
        let registry = FunctionRegistry::with_builtins();
        let Some(UserFunction::Stateful(distinct)) = registry.get("distinct") else {
            panic!("distinct is stateful");
        };
        let (out, append) = distinct(&Value::Int(1), &[]).unwrap();
        assert_eq!(out, vec![Value::Int(1)]);
        assert_eq!(append, vec![Value::Int(1)]);

        let (out, append) = distinct(&Value::Int(1), &[Value::Int(1)]).unwrap();
        assert!(out.is_empty());
        assert!(append.is_empty());
    }

    #[test]
    fn test_function_name_from_payload() {
        let transform = PTransform::new("Split", urns::PAR_DO)
            .with_payload(serde_json::json!({ "function": "explode" }));
        assert_eq!(function_name(&transform), Some("explode"));
        assert_eq!(function_name(&PTransform::new("Bare", urns::PAR_DO)), None);
    }
}
