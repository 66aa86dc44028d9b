//! `var` steps: define a substitution variable.
//!
//! ```yaml
//! - id: gateway-host
//!   type: var
//!   with:
//!     name: GATEWAY_HOST
//!     value: gateway.$DOMAIN
//!     valueFrom:
//!       apiVersion: v1
//!       kind: Service
//!       metadata: { name: krateo-gateway }
//!       selector: .spec.clusterIP
//! ```
//!
//! `value` is expanded and stored first; a successful `valueFrom` lookup is
//! evaluated afterwards and overwrites it.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::{Environment, StepHandler, decode_payload};
use crate::cluster::{Getter, GroupVersionKind, ObjectRef};
use crate::core::KrateoError;
use crate::workflow::selector;
use crate::workflow::types::{Operation, StepOutput, ValueFromSource, VarResult, VarSpec};

const STEP_TYPE: &str = "var";

pub struct VarHandler {
    getter: Arc<dyn Getter>,
    env: Environment,
    namespace: String,
}

impl VarHandler {
    pub fn new(getter: Arc<dyn Getter>, env: Environment) -> Self {
        Self {
            getter,
            env,
            namespace: String::new(),
        }
    }

    async fn lookup(&self, id: &str, source: &ValueFromSource) -> Result<String> {
        let gvk = GroupVersionKind::parse(&source.api_version, &source.kind)
            .map_err(|e| KrateoError::handler(STEP_TYPE, format!("invalid valueFrom: {e}")))?;
        let namespace = source
            .metadata
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(&self.namespace);
        let reference = ObjectRef::new(gvk, namespace, source.metadata.name.as_str());

        tracing::debug!(target: "workflow", "[var:{}] fetching {}", id, reference);
        let object = self
            .getter
            .get(&reference)
            .await
            .map_err(|e| KrateoError::handler(STEP_TYPE, format!("failed to get {reference}: {e:#}")))?;

        selector::select_string(&object, &source.selector)
            .map_err(|e| KrateoError::handler(STEP_TYPE, e).into())
    }
}

#[async_trait]
impl StepHandler for VarHandler {
    fn set_namespace(&mut self, namespace: &str) {
        self.namespace = namespace.to_string();
    }

    /// Variables resolve the same way for every operation, including
    /// delete, so later steps can still reference them.
    fn set_operation(&mut self, _operation: Operation) {}

    async fn handle(&mut self, id: &str, payload: Option<&Value>) -> Result<StepOutput> {
        let spec: VarSpec = decode_payload(STEP_TYPE, payload)?;
        if spec.name.trim().is_empty() {
            return Err(KrateoError::handler(STEP_TYPE, "missing variable name").into());
        }

        let mut result = VarResult {
            name: spec.name.clone(),
            value: String::new(),
        };

        if let Some(value) = spec.value.as_deref().filter(|v| !v.is_empty()) {
            let expanded = self.env.expand(value);
            tracing::debug!(target: "workflow", "[var:{}] {} = {}", id, spec.name, expanded);
            self.env.set(&spec.name, &expanded);
            result.value = expanded;
        }

        if let Some(source) = &spec.value_from {
            let value = self.lookup(id, source).await?;
            tracing::debug!(target: "workflow", "[var:{}] {} = {} (from object)", id, spec.name, value);
            self.env.set(&spec.name, &value);
            result.value = value;
        }

        Ok(StepOutput::Var(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeCluster;
    use serde_json::json;

    fn handler(cluster: &Arc<FakeCluster>, env: &Environment) -> VarHandler {
        let mut handler = VarHandler::new(cluster.clone(), env.clone());
        handler.set_namespace("krateo-system");
        handler.set_operation(Operation::Create);
        handler
    }

    fn value_of(output: StepOutput) -> String {
        match output {
            StepOutput::Var(result) => result.value,
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_value_is_expanded_and_stored() {
        let cluster = Arc::new(FakeCluster::new());
        let env = Environment::new();
        env.set("DOMAIN", "krateo.io");

        let output = handler(&cluster, &env)
            .handle("v", Some(&json!({"name": "HOST", "value": "api.$DOMAIN:$PORT"})))
            .await
            .unwrap();

        assert_eq!(value_of(output), "api.krateo.io:$PORT");
        assert_eq!(env.get("HOST").as_deref(), Some("api.krateo.io:$PORT"));
    }

    #[tokio::test]
    async fn test_value_from_overrides_value() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.insert_object(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {"name": "gateway", "namespace": "krateo-system"},
            "spec": {"clusterIP": "10.0.0.7"},
        }));
        let env = Environment::new();

        let output = handler(&cluster, &env)
            .handle(
                "v",
                Some(&json!({
                    "name": "GATEWAY",
                    "value": "fallback",
                    "valueFrom": {
                        "apiVersion": "v1",
                        "kind": "Service",
                        "metadata": {"name": "gateway"},
                        "selector": ".spec.clusterIP",
                    },
                })),
            )
            .await
            .unwrap();

        assert_eq!(value_of(output), "10.0.0.7");
        assert_eq!(env.get("GATEWAY").as_deref(), Some("10.0.0.7"));
    }

    #[tokio::test]
    async fn test_value_from_missing_object_is_fatal() {
        let cluster = Arc::new(FakeCluster::new());
        let env = Environment::new();

        let err = handler(&cluster, &env)
            .handle(
                "v",
                Some(&json!({
                    "name": "GATEWAY",
                    "valueFrom": {"apiVersion": "v1", "kind": "Service", "metadata": {"name": "nope"}, "selector": ".spec"},
                })),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("var step failed"));
        assert!(env.get("GATEWAY").is_none());
    }

    #[tokio::test]
    async fn test_selector_failure_is_fatal() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.insert_object(json!({
            "apiVersion": "v1", "kind": "Secret", "metadata": {"name": "s", "namespace": "other"}, "data": {}
        }));
        let env = Environment::new();

        let err = handler(&cluster, &env)
            .handle(
                "v",
                Some(&json!({
                    "name": "TOKEN",
                    "valueFrom": {"apiVersion": "v1", "kind": "Secret", "metadata": {"name": "s", "namespace": "other"}, "selector": ".data.token"},
                })),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("matched nothing"));
    }

    #[tokio::test]
    async fn test_name_is_required() {
        let cluster = Arc::new(FakeCluster::new());
        let err = handler(&cluster, &Environment::new())
            .handle("v", Some(&json!({"value": "x"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing variable name"));
    }
}
