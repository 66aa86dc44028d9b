//! Deep merge of configuration mappings.
//!
//! Mappings merge key by key, recursively. Any other value (scalar, sequence,
//! or a mapping facing a non-mapping) is replaced wholesale by the override.
//! Sequences are never concatenated or merged element-wise.

use serde_json::{Map, Value};

/// Merge `overrides` into `base` in place and return it for chaining.
///
/// # Examples
///
/// ```rust
/// use krateoctl::config::merge::merge_maps;
/// use serde_json::json;
///
/// let mut base = json!({"a": {"x": 1, "y": 2}, "list": [1, 2]});
/// let overrides = json!({"a": {"y": 3}, "list": [9]});
/// merge_maps(base.as_object_mut().unwrap(), overrides.as_object().unwrap());
///
/// assert_eq!(base, json!({"a": {"x": 1, "y": 3}, "list": [9]}));
/// ```
pub fn merge_maps<'a>(
    base: &'a mut Map<String, Value>,
    overrides: &Map<String, Value>,
) -> &'a mut Map<String, Value> {
    for (key, value) in overrides {
        match (base.get_mut(key), value) {
            (Some(Value::Object(base_map)), Value::Object(override_map)) => {
                merge_maps(base_map, override_map);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
    base
}

/// Merge two values: mappings merge recursively, anything else is replaced.
pub fn merge_values(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            merge_maps(base_map, override_map);
        }
        (base, overrides) => *base = overrides.clone(),
    }
}
