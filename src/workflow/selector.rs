//! Path selectors over fetched objects.
//!
//! Supports the path subset of jq used by `valueFrom.selector`:
//!
//! | Form | Meaning |
//! |---|---|
//! | `.` | the whole object |
//! | `.metadata.name` | nested keys |
//! | `.items[0]`, `.items[-1]` | array index, negative counts from the end |
//! | `.data["tls.crt"]`, `.data."tls.crt"` | keys containing dots |

use anyhow::{Result, bail};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(i64),
}

/// Parse a selector into path segments.
fn parse(selector: &str) -> Result<Vec<Segment>> {
    let selector = selector.trim();
    let Some(mut rest) = selector.strip_prefix('.') else {
        bail!("selector '{selector}' must start with '.'");
    };

    let mut segments = Vec::new();
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('[') {
            let Some(end) = after.find(']') else {
                bail!("selector '{selector}': unclosed '['");
            };
            let inner = after[..end].trim();
            segments.push(if let Some(key) = quoted(inner) {
                Segment::Key(key.to_string())
            } else {
                Segment::Index(inner.parse().map_err(|_| {
                    anyhow::anyhow!("selector '{selector}': invalid index '{inner}'")
                })?)
            });
            rest = &after[end + 1..];
        } else if let Some(after) = rest.strip_prefix('"') {
            let Some(end) = after.find('"') else {
                bail!("selector '{selector}': unclosed quote");
            };
            segments.push(Segment::Key(after[..end].to_string()));
            rest = &after[end + 1..];
        } else {
            let end = rest.find(['.', '[']).unwrap_or(rest.len());
            let key = &rest[..end];
            if key.is_empty() {
                bail!("selector '{selector}': empty key");
            }
            segments.push(Segment::Key(key.to_string()));
            rest = &rest[end..];
        }

        // segments are separated by '.', except before '['
        if let Some(after) = rest.strip_prefix('.') {
            if after.is_empty() {
                bail!("selector '{selector}': trailing '.'");
            }
            rest = after;
        }
    }
    Ok(segments)
}

fn quoted(s: &str) -> Option<&str> {
    s.strip_prefix('"').and_then(|s| s.strip_suffix('"'))
}

/// Evaluate `selector` against `object`.
///
/// # Errors
///
/// Returns an error for a malformed selector or a path that does not exist.
pub fn select<'a>(object: &'a Value, selector: &str) -> Result<&'a Value> {
    let mut current = object;
    for segment in parse(selector)? {
        current = match (&segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key),
            (Segment::Index(idx), Value::Array(items)) => {
                let len = items.len() as i64;
                let idx = if *idx < 0 { len + idx } else { *idx };
                usize::try_from(idx).ok().and_then(|i| items.get(i))
            }
            _ => None,
        }
        .ok_or_else(|| anyhow::anyhow!("selector '{selector}' matched nothing"))?;
    }
    Ok(current)
}

/// Evaluate `selector` and render the match as a string: strings verbatim,
/// other scalars in their JSON form, mappings and sequences as JSON.
///
/// # Errors
///
/// Returns an error when the selector fails or selects `null`.
pub fn select_string(object: &Value, selector: &str) -> Result<String> {
    match select(object, selector)? {
        Value::Null => bail!("selector '{selector}' selected null"),
        Value::String(s) => Ok(s.clone()),
        other => Ok(other.to_string()),
    }
}
