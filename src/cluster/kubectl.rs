//! [`Getter`], [`Applier`] and [`Deletor`] backed by the `kubectl` binary.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

use super::command_builder::{ToolCommand, command_stderr};
use super::{Applier, Deletor, Getter, ObjectRef};
use crate::constants::{FIELD_MANAGER, KUBECTL_TIMEOUT};

const KUBECTL: &str = "kubectl";

/// Talks to the cluster selected by the kubeconfig and context.
#[derive(Debug, Clone)]
pub struct KubectlClient {
    kubeconfig: Option<PathBuf>,
    context: Option<String>,
    timeout: Duration,
}

impl Default for KubectlClient {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            context: None,
            timeout: KUBECTL_TIMEOUT,
        }
    }
}

impl KubectlClient {
    #[must_use]
    pub fn new(kubeconfig: Option<PathBuf>, context: Option<String>) -> Self {
        Self {
            kubeconfig,
            context,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `kubectl <verb>` with the connection flags of this client.
    fn command(&self, verb: &str) -> ToolCommand {
        let kubeconfig = self.kubeconfig.as_ref().map(|p| p.display().to_string());
        ToolCommand::new(KUBECTL)
            .with_timeout(Some(self.timeout))
            .arg(verb)
            .opt_arg("--kubeconfig", kubeconfig.as_deref())
            .opt_arg("--context", self.context.as_deref())
    }

    fn get_command(&self, reference: &ObjectRef) -> ToolCommand {
        self.command("get")
            .arg(resource_arg(reference))
            .arg(reference.name.as_str())
            .args(namespace_args(reference))
            .args(["-o", "json"])
    }

    fn apply_command(&self, object: &Value) -> Result<ToolCommand> {
        let manifest = serde_json::to_vec(object).context("Failed to serialize manifest")?;
        Ok(self
            .command("apply")
            .args(["--server-side", "--force-conflicts"])
            .arg(format!("--field-manager={FIELD_MANAGER}"))
            .args(["-f", "-"])
            .stdin(manifest))
    }

    fn delete_command(&self, reference: &ObjectRef) -> ToolCommand {
        self.command("delete")
            .arg(resource_arg(reference))
            .arg(reference.name.as_str())
            .args(namespace_args(reference))
            .args(["--cascade=foreground", "--wait"])
    }
}

#[async_trait]
impl Getter for KubectlClient {
    async fn get(&self, reference: &ObjectRef) -> Result<Value> {
        let stdout = self
            .get_command(reference)
            .with_context(reference.name.clone())
            .execute_stdout()
            .await
            .map_err(|e| map_not_found(e, reference))?;
        serde_json::from_str(&stdout).with_context(|| format!("Invalid JSON returned for {reference}"))
    }
}

#[async_trait]
impl Applier for KubectlClient {
    async fn apply(&self, object: &Value, reference: &ObjectRef) -> Result<()> {
        tracing::debug!(target: "kubectl", "Applying {}", reference);
        self.apply_command(object)?.with_context(reference.name.clone()).execute_success().await
    }
}

#[async_trait]
impl Deletor for KubectlClient {
    async fn delete(&self, reference: &ObjectRef) -> Result<()> {
        tracing::debug!(target: "kubectl", "Deleting {}", reference);
        self.delete_command(reference)
            .with_context(reference.name.clone())
            .execute_success()
            .await
            .map_err(|e| map_not_found(e, reference))
    }
}

/// `kind.version.group` for named groups, the lowercase kind for the core group.
fn resource_arg(reference: &ObjectRef) -> String {
    let kind = reference.gvk.kind.to_lowercase();
    if reference.gvk.group.is_empty() {
        kind
    } else {
        format!("{kind}.{}.{}", reference.gvk.version, reference.gvk.group)
    }
}

fn namespace_args(reference: &ObjectRef) -> Vec<String> {
    if reference.namespace.is_empty() {
        Vec::new()
    } else {
        vec!["-n".to_string(), reference.namespace.clone()]
    }
}

fn is_not_found_output(stderr: &str) -> bool {
    stderr.contains("NotFound") || stderr.contains(" not found")
}

fn map_not_found(err: anyhow::Error, reference: &ObjectRef) -> anyhow::Error {
    if command_stderr(&err).is_some_and(is_not_found_output) {
        reference.not_found()
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::GroupVersionKind;
    use crate::core::KrateoError;

    fn reference(api_version: &str, kind: &str, namespace: &str) -> ObjectRef {
        ObjectRef::new(GroupVersionKind::parse(api_version, kind).unwrap(), namespace, "demo")
    }

    #[test]
    fn test_resource_arg() {
        assert_eq!(resource_arg(&reference("v1", "ConfigMap", "ns")), "configmap");
        assert_eq!(resource_arg(&reference("apps/v1", "Deployment", "ns")), "deployment.v1.apps");
    }

    #[test]
    fn test_get_command() {
        let client = KubectlClient::new(Some(PathBuf::from("/tmp/kubeconfig")), Some("kind".to_string()));
        let cmd = client.get_command(&reference("v1", "Secret", "krateo-system"));
        assert_eq!(
            cmd.arguments(),
            [
                "get",
                "--kubeconfig",
                "/tmp/kubeconfig",
                "--context",
                "kind",
                "secret",
                "demo",
                "-n",
                "krateo-system",
                "-o",
                "json"
            ]
        );
    }

    #[test]
    fn test_cluster_scoped_delete_command() {
        let cmd = KubectlClient::default().delete_command(&reference("v1", "Namespace", ""));
        assert_eq!(cmd.arguments(), ["delete", "namespace", "demo", "--cascade=foreground", "--wait"]);
    }

    #[test]
    fn test_apply_command_uses_server_side_apply() {
        let cmd = KubectlClient::default().apply_command(&serde_json::json!({"kind": "ConfigMap"})).unwrap();
        assert!(cmd.arguments().contains(&"--server-side".to_string()));
        assert!(cmd.arguments().contains(&"--field-manager=krateoctl".to_string()));
        assert_eq!(cmd.arguments().last().map(String::as_str), Some("-"));
    }

    #[test]
    fn test_not_found_mapping() {
        let reference = reference("v1", "Secret", "ns");
        let err: anyhow::Error = KrateoError::ToolCommand {
            tool: KUBECTL.to_string(),
            operation: "get".to_string(),
            stderr: "Error from server (NotFound): secrets \"demo\" not found".to_string(),
        }
        .into();
        let mapped = map_not_found(err, &reference);
        assert!(crate::cluster::is_not_found(&mapped));

        let err: anyhow::Error = KrateoError::ToolCommand {
            tool: KUBECTL.to_string(),
            operation: "get".to_string(),
            stderr: "Unable to connect to the server".to_string(),
        }
        .into();
        assert!(!crate::cluster::is_not_found(&map_not_found(err, &reference)));
    }
}
