//! Pipeline and stage variables

use serde_json::Value;
use std::collections::BTreeMap;

/// Arbitrary-typed variables as declared on a pipeline or a stage.
pub type Vars = BTreeMap<String, Value>;

/// Flattens variable layers into a single string map.
///
/// Later layers override earlier ones on key collision, so callers pass the
/// pipeline layer first and the stage layer last.
pub fn flatten(layers: &[&Vars]) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    for layer in layers {
        for (key, value) in layer.iter() {
            flat.insert(key.clone(), coerce(value));
        }
    }
    flat
}

/// String form of a variable value.
///
/// Strings are taken verbatim, null becomes empty, and composite values keep
/// their JSON text.
pub fn coerce(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
