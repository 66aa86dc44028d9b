//! Step handlers.
//!
//! One handler exists per [`StepType`](crate::workflow::types::StepType).
//! Before each invocation the engine sets the target namespace and the
//! [`Operation`]; the handler then decodes the step payload itself, so
//! payload errors surface as failures of that step only.
//!
//! Handlers of one run share an [`Environment`]: `var` steps write to it and
//! every handler expands `$NAME` tokens against it.

pub mod chart;
pub mod object;
pub mod var;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::expand;
use crate::workflow::types::{Operation, StepOutput};

pub use chart::ChartHandler;
pub use object::ObjectHandler;
pub use var::VarHandler;

/// Substitution table of a single run.
///
/// Clones share the same table. Each [`Workflow`](crate::workflow::Workflow)
/// creates its own, so independent runs never see each other's variables.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: Arc<DashMap<String, String>>,
}

impl Environment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).map(|v| v.value().clone())
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Expand `$NAME` tokens in a string. Unknown names stay literal.
    #[must_use]
    pub fn expand(&self, input: &str) -> String {
        expand::expand(input, |name| self.get(name))
    }

    /// Expand every string leaf of a payload.
    #[must_use]
    pub fn expand_value(&self, value: &Value) -> Value {
        expand::expand_value(value, &|name: &str| self.get(name))
    }
}

/// The protocol every step handler implements.
#[async_trait]
pub trait StepHandler: Send {
    /// Namespace used when the payload does not name one.
    fn set_namespace(&mut self, namespace: &str);

    fn set_operation(&mut self, operation: Operation);

    /// Run one step. `payload` is the step's untyped `with` block.
    async fn handle(&mut self, id: &str, payload: Option<&Value>) -> Result<StepOutput>;
}

/// Decode a required payload into `T`.
pub(crate) fn decode_payload<T: serde::de::DeserializeOwned>(
    step_type: &str,
    payload: Option<&Value>,
) -> Result<T> {
    let Some(payload) = payload.filter(|p| !p.is_null()) else {
        return Err(crate::core::KrateoError::handler(step_type, "missing 'with' payload").into());
    };
    serde_json::from_value(payload.clone()).map_err(|e| {
        crate::core::KrateoError::handler(step_type, format!("failed to decode payload: {e}")).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_environment_is_shared_between_clones() {
        let env = Environment::new();
        let other = env.clone();
        other.set("HOST", "x.com");
        assert_eq!(env.get("HOST").as_deref(), Some("x.com"));
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn test_fresh_environments_are_isolated() {
        let a = Environment::new();
        let b = Environment::new();
        a.set("HOST", "x.com");
        assert!(b.is_empty());
    }

    #[test]
    fn test_environment_expansion() {
        let env = Environment::new();
        env.set("HOST", "x.com");
        env.set("PORT", "8080");
        assert_eq!(env.expand("https://$HOST:$PORT"), "https://x.com:8080");
        assert_eq!(env.expand("$UNKNOWN"), "$UNKNOWN");
        assert_eq!(env.expand_value(&json!({"url": "${HOST}"})), json!({"url": "x.com"}));
    }

    #[test]
    fn test_decode_payload_requires_payload() {
        let err = decode_payload::<serde_json::Map<String, Value>>("var", None).unwrap_err();
        assert!(err.to_string().contains("var step failed: missing 'with' payload"));
    }
}
