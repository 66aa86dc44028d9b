//! Active step resolution.
//!
//! Turns the step definitions of a [`Document`] into runtime [`Step`]s:
//!
//! 1. every definition must carry an `id` and a `type`, ids are unique
//! 2. a step owned by a disabled component is marked `skip`
//! 3. chart steps owned by a component receive the component overrides
//!
//! Ownership is found by scanning each component's `steps` list in component
//! name order; the first match wins. Unowned steps are never skipped and
//! never overridden.
//!
//! For an owned chart step the payload is rebuilt from, lowest to highest
//! precedence:
//!
//! | Layer | Merged into |
//! |---|---|
//! | the step's own `with` | - |
//! | `helmDefaults` (all keys except `with`) | `with.values` |
//! | `helmDefaults.with` | `with` |
//! | `stepConfig.<id>.helmValues` | `with.values` |
//! | `stepConfig.<id>.with` | `with` |
//!
//! Resolution is pure: it performs no I/O and leaves the document untouched.

use anyhow::Result;
use serde_json::{Map, Value};
use std::collections::HashSet;

use super::document::{ComponentConfig, Document};
use super::loader::type_name;
use super::merge::merge_maps;
use crate::core::KrateoError;
use crate::workflow::types::{Step, StepType};

const VALUES_KEY: &str = "values";
const WITH_KEY: &str = "with";
const HELM_VALUES_KEY: &str = "helmValues";

/// Resolve the runtime steps of a document, in declaration order.
///
/// # Errors
///
/// [`KrateoError::StepResolution`] for a missing or duplicated id, a missing
/// type, or a malformed override block.
pub fn get_active_steps(document: &Document) -> Result<Vec<Step>> {
    let mut steps = decode_steps(document)?;

    for step in &mut steps {
        if let Some((name, component)) = owning_component(document, &step.id)
            && !component.is_enabled()
        {
            tracing::debug!(target: "config", "Step '{}' skipped: component '{}' is disabled", step.id, name);
            step.skip = true;
        }
    }

    apply_component_overrides(document, &mut steps)?;
    Ok(steps)
}

/// Decode step definitions without applying components.
///
/// # Errors
///
/// [`KrateoError::StepResolution`] for a missing or duplicated id or a
/// missing type.
pub fn decode_steps(document: &Document) -> Result<Vec<Step>> {
    let mut seen = HashSet::new();
    let mut steps = Vec::with_capacity(document.steps.len());

    for (index, def) in document.steps.iter().enumerate() {
        let id = def.id.trim();
        if id.is_empty() {
            return Err(resolution(format!("#{index}"), format!("step at index {index} missing id")));
        }
        if !seen.insert(id.to_string()) {
            return Err(resolution(id, "duplicate step id"));
        }
        let step_type = match &def.step_type {
            Some(StepType::Unknown(tag)) if tag.trim().is_empty() => None,
            other => other.clone(),
        };
        let Some(step_type) = step_type else {
            return Err(resolution(id, "missing type"));
        };

        steps.push(Step {
            id: id.to_string(),
            step_type,
            with: def.with.clone(),
            skip: false,
        });
    }

    Ok(steps)
}

/// Name and configuration of the component that owns `step_id`, if any.
#[must_use]
pub fn owning_component<'a>(
    document: &'a Document,
    step_id: &str,
) -> Option<(&'a str, &'a ComponentConfig)> {
    document
        .components
        .iter()
        .find(|(_, component)| component.steps.iter().any(|s| s == step_id))
        .map(|(name, component)| (name.as_str(), component))
}

fn apply_component_overrides(document: &Document, steps: &mut [Step]) -> Result<()> {
    for step in steps.iter_mut().filter(|s| s.step_type == StepType::Chart) {
        let Some((name, component)) = owning_component(document, &step.id) else {
            continue;
        };

        let (default_values, default_with) = split_defaults(component, name, &step.id)?;
        let (step_values, step_with) = step_overrides(component, name, &step.id)?;

        let layers_empty = default_values.is_empty()
            && default_with.is_empty()
            && step_values.is_empty()
            && step_with.is_empty();
        if layers_empty {
            continue;
        }

        let mut with = match step.with.take() {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(resolution(
                    &step.id,
                    format!("chart configuration must be a mapping, got {}", type_name(&other)),
                ));
            }
        };

        merge_into_values(&mut with, &default_values);
        merge_maps(&mut with, &default_with);
        merge_into_values(&mut with, &step_values);
        merge_maps(&mut with, &step_with);

        tracing::debug!(target: "config", "Applied overrides of component '{}' to step '{}'", name, step.id);
        step.with = Some(Value::Object(with));
    }

    Ok(())
}

fn merge_into_values(with: &mut Map<String, Value>, layer: &Map<String, Value>) {
    if layer.is_empty() {
        return;
    }
    let values = with.entry(VALUES_KEY.to_string()).or_insert_with(|| Value::Object(Map::new()));
    if !values.is_object() {
        *values = Value::Object(Map::new());
    }
    if let Value::Object(values) = values {
        merge_maps(values, layer);
    }
}

/// Split `helmDefaults` into chart values and the nested `with` block.
fn split_defaults(
    component: &ComponentConfig,
    name: &str,
    step_id: &str,
) -> Result<(Map<String, Value>, Map<String, Value>)> {
    let mut values = Map::new();
    let mut with = Map::new();

    for (key, value) in &component.helm_defaults {
        if key != WITH_KEY {
            values.insert(key.clone(), value.clone());
            continue;
        }
        match value {
            Value::Null => {}
            Value::Object(map) => with = map.clone(),
            other => {
                return Err(resolution(
                    step_id,
                    format!(
                        "component {name} helmDefaults.with must be a mapping, got {}",
                        type_name(other)
                    ),
                ));
            }
        }
    }

    Ok((values, with))
}

/// The `helmValues` and `with` blocks of `stepConfig.<step_id>`.
fn step_overrides(
    component: &ComponentConfig,
    name: &str,
    step_id: &str,
) -> Result<(Map<String, Value>, Map<String, Value>)> {
    let Some(entry) = component.step_config.get(step_id) else {
        return Ok((Map::new(), Map::new()));
    };

    let block = |key: &str| -> Result<Map<String, Value>> {
        match entry.get(key) {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(other) => Err(resolution(
                step_id,
                format!(
                    "component {name} stepConfig.{step_id}.{key} must be a mapping, got {}",
                    type_name(other)
                ),
            )),
        }
    };

    Ok((block(HELM_VALUES_KEY)?, block(WITH_KEY)?))
}

fn resolution(step: impl Into<String>, reason: impl Into<String>) -> anyhow::Error {
    KrateoError::StepResolution {
        step: step.into(),
        reason: reason.into(),
    }
    .into()
}
