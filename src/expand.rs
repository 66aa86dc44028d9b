//! `$NAME` / `${NAME}` token expansion.
//!
//! Tokens are resolved through a lookup function, usually backed by the
//! [`Environment`](crate::workflow::handlers::Environment) of a run. A token
//! the lookup does not know is left in place verbatim, so `$UNKNOWN` expands
//! to `$UNKNOWN`. A doubled `$$` is not an escape and is kept as written.

use serde_json::Value;

/// Expand every token in `input`.
pub fn expand<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains('$') {
        return input.to_string();
    }
    input
        .split("$$")
        .map(|part| shellexpand::env_with_context_no_errors(part, |name: &str| lookup(name)))
        .collect::<Vec<_>>()
        .join("$$")
}

/// Expand every string leaf of a JSON value. Keys are left untouched.
pub fn expand_value<F>(value: &Value, lookup: &F) -> Value
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(s) => Value::String(expand(s, lookup)),
        Value::Array(items) => Value::Array(items.iter().map(|v| expand_value(v, lookup)).collect()),
        Value::Object(map) => {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), expand_value(v, lookup))).collect())
        }
        other => other.clone(),
    }
}
