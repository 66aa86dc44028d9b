//! `object` steps: apply or delete a single manifest.
//!
//! The applied manifest is a skeleton built from `apiVersion`, `kind` and
//! `metadata` (with the namespace defaulted to the run's namespace), with
//! every other top-level field of the payload merged onto it.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::{Environment, StepHandler};
use crate::cluster::{Applier, Deletor, GroupVersionKind, ObjectRef, is_not_found};
use crate::config::merge_maps;
use crate::core::KrateoError;
use crate::workflow::types::{ObjectResult, ObjectSpec, Operation, StepOutput};

const STEP_TYPE: &str = "object";

pub struct ObjectHandler {
    applier: Arc<dyn Applier>,
    deletor: Arc<dyn Deletor>,
    env: Environment,
    namespace: String,
    operation: Operation,
}

impl ObjectHandler {
    pub fn new(applier: Arc<dyn Applier>, deletor: Arc<dyn Deletor>, env: Environment) -> Self {
        Self {
            applier,
            deletor,
            env,
            namespace: String::new(),
            operation: Operation::default(),
        }
    }
}

/// Skeleton from identity fields, then the body merged on top.
fn build_manifest(spec: &ObjectSpec, namespace: &str) -> Value {
    let mut metadata = spec.metadata.clone();
    metadata.insert("name".to_string(), Value::String(spec.name.clone()));
    metadata.insert("namespace".to_string(), Value::String(namespace.to_string()));

    let mut manifest = Map::new();
    manifest.insert("apiVersion".to_string(), Value::String(spec.api_version.clone()));
    manifest.insert("kind".to_string(), Value::String(spec.kind.clone()));
    manifest.insert("metadata".to_string(), Value::Object(metadata));
    merge_maps(&mut manifest, &spec.body);
    Value::Object(manifest)
}

#[async_trait]
impl StepHandler for ObjectHandler {
    fn set_namespace(&mut self, namespace: &str) {
        self.namespace = namespace.to_string();
    }

    fn set_operation(&mut self, operation: Operation) {
        self.operation = operation;
    }

    async fn handle(&mut self, id: &str, payload: Option<&Value>) -> Result<StepOutput> {
        let Some(payload) = payload.filter(|p| !p.is_null()) else {
            return Err(KrateoError::handler(STEP_TYPE, "missing 'with' payload").into());
        };
        let expanded = self.env.expand_value(payload);
        let spec = ObjectSpec::from_value(&expanded).map_err(|e| KrateoError::handler(STEP_TYPE, e))?;

        let namespace = spec.namespace.clone().unwrap_or_else(|| self.namespace.clone());
        let gvk = GroupVersionKind::parse(&spec.api_version, &spec.kind)
            .map_err(|e| KrateoError::handler(STEP_TYPE, e))?;
        let reference = ObjectRef::new(gvk, namespace.as_str(), spec.name.as_str());

        let mut result = ObjectResult {
            api_version: spec.api_version.clone(),
            kind: spec.kind.clone(),
            name: spec.name.clone(),
            namespace: namespace.clone(),
            operation: String::new(),
        };

        if self.operation.is_delete() {
            result.operation = "delete".to_string();
            match self.deletor.delete(&reference).await {
                Ok(()) => {}
                Err(e) if is_not_found(&e) => {
                    tracing::debug!(target: "workflow", "[object:{}] {} already absent", id, reference);
                }
                Err(e) => {
                    return Err(KrateoError::handler(STEP_TYPE, format!("failed to delete {reference}: {e:#}")).into());
                }
            }
            return Ok(StepOutput::Object(result));
        }

        result.operation = "apply".to_string();
        let manifest = build_manifest(&spec, &namespace);
        tracing::debug!(target: "workflow", "[object:{}] applying {}", id, reference);
        self.applier
            .apply(&manifest, &reference)
            .await
            .map_err(|e| KrateoError::handler(STEP_TYPE, format!("failed to apply {reference}: {e:#}")))?;

        Ok(StepOutput::Object(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeCluster;
    use serde_json::json;

    fn handler(cluster: &Arc<FakeCluster>, env: Environment, operation: Operation) -> ObjectHandler {
        let mut handler = ObjectHandler::new(cluster.clone(), cluster.clone(), env);
        handler.set_namespace("krateo-system");
        handler.set_operation(operation);
        handler
    }

    fn config_map() -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "settings", "labels": {"team": "platform"}},
            "data": {"url": "https://$HOST"},
        })
    }

    #[tokio::test]
    async fn test_apply_defaults_namespace_and_expands() {
        let cluster = Arc::new(FakeCluster::new());
        let env = Environment::new();
        env.set("HOST", "x.com");

        let output = handler(&cluster, env, Operation::Create).handle("o", Some(&config_map())).await.unwrap();

        let StepOutput::Object(result) = output else {
            panic!("expected object output");
        };
        assert_eq!(result.namespace, "krateo-system");
        assert_eq!(result.operation, "apply");

        let applied = cluster.applied();
        assert_eq!(applied.len(), 1);
        assert_eq!(
            applied[0],
            json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": "settings", "namespace": "krateo-system", "labels": {"team": "platform"}},
                "data": {"url": "https://x.com"},
            })
        );
    }

    #[tokio::test]
    async fn test_explicit_namespace_wins() {
        let cluster = Arc::new(FakeCluster::new());
        let mut payload = config_map();
        payload["metadata"]["namespace"] = json!("custom");

        handler(&cluster, Environment::new(), Operation::Update).handle("o", Some(&payload)).await.unwrap();
        assert_eq!(cluster.applied()[0]["metadata"]["namespace"], json!("custom"));
    }

    #[tokio::test]
    async fn test_body_merges_over_existing_fields() {
        let cluster = Arc::new(FakeCluster::new());
        let mut payload = config_map();
        payload["data"] = json!({"a": "1"});
        payload["binaryData"] = json!({"b": "Mg=="});

        handler(&cluster, Environment::new(), Operation::Create).handle("o", Some(&payload)).await.unwrap();
        let applied = &cluster.applied()[0];
        assert_eq!(applied["data"], json!({"a": "1"}));
        assert_eq!(applied["binaryData"], json!({"b": "Mg=="}));
    }

    #[tokio::test]
    async fn test_delete_tolerates_absent_object() {
        let cluster = Arc::new(FakeCluster::new());
        let output = handler(&cluster, Environment::new(), Operation::Delete)
            .handle("o", Some(&config_map()))
            .await
            .unwrap();

        let StepOutput::Object(result) = output else {
            panic!("expected object output");
        };
        assert_eq!(result.operation, "delete");
        assert_eq!(cluster.deleted().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_existing_object() {
        let cluster = Arc::new(FakeCluster::new());
        let mut existing = config_map();
        existing["metadata"]["namespace"] = json!("krateo-system");
        cluster.insert_object(existing);

        handler(&cluster, Environment::new(), Operation::Delete).handle("o", Some(&config_map())).await.unwrap();
        assert_eq!(cluster.object_count(), 0);
    }

    #[tokio::test]
    async fn test_apply_failure_is_reported() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.fail_on("settings");

        let err = handler(&cluster, Environment::new(), Operation::Create)
            .handle("o", Some(&config_map()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("object step failed"));
    }

    #[tokio::test]
    async fn test_invalid_payload() {
        let cluster = Arc::new(FakeCluster::new());
        let err = handler(&cluster, Environment::new(), Operation::Create)
            .handle("o", Some(&json!({"kind": "ConfigMap"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing apiVersion"));
    }
}
