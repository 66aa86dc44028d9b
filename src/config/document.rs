//! Typed view of the merged configuration document.
//!
//! ```yaml
//! modules:
//!   core:
//!     enabled: true
//!     depends: [crds]
//!     chart: { repository: https://charts.krateo.io, name: core, namespace: krateo-system }
//! components:
//!   finops:
//!     enabled: false
//!     steps: [install-finops]
//!     helmDefaults:
//!       with: { wait: true }
//!       replicaCount: 1
//!     stepConfig:
//!       install-finops:
//!         helmValues: { env: { DEBUG: "true" } }
//!         with: { version: 0.2.0 }
//! steps:
//!   - id: install-finops
//!     type: chart
//!     with: { repository: https://charts.krateo.io, name: finops }
//! ```
//!
//! Step payloads (`with`) stay untyped here; each handler validates its own
//! payload when the step runs.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::RawDocument;
use crate::core::KrateoError;
use crate::workflow::types::StepType;

/// The decoded configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Installable modules keyed by name.
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleConfig>,
    /// Logical step groups keyed by name.
    #[serde(default)]
    pub components: BTreeMap<String, ComponentConfig>,
    /// Step definitions in declaration order.
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

/// A module entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Absent means enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Modules this module depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<ModuleChart>,
}

impl ModuleConfig {
    /// Whether the module is enabled (absent `enabled` means true).
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// Chart coordinates of a module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleChart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Alternative spelling of `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// A component: a set of owned steps that is enabled, disabled and
/// overridden as a unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Ids of the steps this component owns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    /// Values applied to every chart step of the component; the nested
    /// `with` block is merged into the step payload itself.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub helm_defaults: Map<String, Value>,
    /// Per-step overrides keyed by step id (`helmValues` and `with`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub step_config: BTreeMap<String, Map<String, Value>>,
}

impl ComponentConfig {
    /// Whether the component is enabled (absent `enabled` means true).
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// A step as written in the configuration file.
///
/// `id` and `type` default to empty so that missing fields are reported by
/// the step resolver with the step's position instead of a serde error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub step_type: Option<StepType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with: Option<Value>,
}

/// Decode the raw document into its typed form.
///
/// # Errors
///
/// [`KrateoError::ConfigValidation`] when a section has the wrong shape.
pub fn decode_document(raw: &RawDocument) -> Result<Document> {
    serde_json::from_value(Value::Object(raw.clone())).map_err(|e| {
        KrateoError::ConfigValidation {
            reason: format!("failed to decode config document: {e}"),
        }
        .into()
    })
}

/// Look up a value by path segments. Empty segments are ignored.
#[must_use]
pub fn get_path<'a>(raw: &'a RawDocument, path: &[&str]) -> Option<&'a Value> {
    let mut segments = path.iter().filter(|s| !s.is_empty());
    let first = segments.next()?;
    let mut current = raw.get(*first)?;
    for segment in segments {
        current = current.as_object()?.get(*segment)?;
    }
    Some(current)
}

/// Set a value by path segments, creating intermediate mappings.
///
/// # Errors
///
/// [`KrateoError::ConfigValidation`] when the path is empty or crosses a
/// value that is not a mapping.
pub fn set_path(raw: &mut RawDocument, path: &[&str], value: Value) -> Result<()> {
    let segments: Vec<&str> = path.iter().copied().filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        return Err(KrateoError::ConfigValidation {
            reason: "path cannot be empty".to_string(),
        }
        .into());
    };

    let mut current = raw;
    for (i, segment) in parents.iter().enumerate() {
        let entry =
            current.entry((*segment).to_string()).or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            other => {
                return Err(KrateoError::ConfigValidation {
                    reason: format!(
                        "cannot set '{}': '{}' is a {}, not a mapping",
                        segments.join("."),
                        segments[..=i].join("."),
                        super::loader::type_name(other)
                    ),
                }
                .into());
            }
        };
    }
    current.insert((*last).to_string(), value);
    Ok(())
}

/// Parse a `path.to.key=value` assignment. The value is read as a YAML
/// scalar so `true`, `3` and `null` keep their types.
///
/// # Errors
///
/// [`KrateoError::ConfigValidation`] when the assignment has no `=` or an
/// empty key.
pub fn parse_assignment(assignment: &str) -> Result<(Vec<String>, Value)> {
    let Some((key, raw_value)) = assignment.split_once('=') else {
        return Err(KrateoError::ConfigValidation {
            reason: format!("invalid --set '{assignment}': expected path.to.key=value"),
        }
        .into());
    };
    let path: Vec<String> =
        key.trim().split('.').filter(|s| !s.is_empty()).map(str::to_string).collect();
    if path.is_empty() {
        return Err(KrateoError::ConfigValidation {
            reason: format!("invalid --set '{assignment}': empty key"),
        }
        .into());
    }
    let value = serde_yaml::from_str::<Value>(raw_value)
        .unwrap_or_else(|_| Value::String(raw_value.to_string()));
    Ok((path, value))
}
