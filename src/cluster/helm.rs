//! [`ChartReleaseManager`] backed by the `helm` binary.
//!
//! Values are handed to helm through a temporary YAML file so that nested
//! structures survive without `--set` escaping. Release metadata is read
//! from helm's `-o json` output.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::command_builder::{ToolCommand, command_stderr};
use super::{ChartReleaseManager, Release, ReleaseRequest};
use crate::constants::{HELM_TIMEOUT_GRACE, KUBECTL_TIMEOUT};

const HELM: &str = "helm";

/// Manages releases in the cluster selected by the kubeconfig and context.
#[derive(Debug, Clone, Default)]
pub struct HelmClient {
    kubeconfig: Option<PathBuf>,
    kube_context: Option<String>,
}

impl HelmClient {
    #[must_use]
    pub const fn new(kubeconfig: Option<PathBuf>, kube_context: Option<String>) -> Self {
        Self {
            kubeconfig,
            kube_context,
        }
    }

    /// `helm <verb>` with the connection flags of this client.
    fn command(&self, verb: &str, namespace: &str) -> ToolCommand {
        let kubeconfig = self.kubeconfig.as_ref().map(|p| p.display().to_string());
        ToolCommand::new(HELM)
            .arg(verb)
            .opt_arg("--kubeconfig", kubeconfig.as_deref())
            .opt_arg("--kube-context", self.kube_context.as_deref())
            .args(["--namespace", namespace])
            .with_timeout(Some(KUBECTL_TIMEOUT))
    }

    fn release_command(&self, verb: &str, request: &ReleaseRequest, values_file: &Path) -> ToolCommand {
        let mut cmd = self
            .command(verb, &request.namespace)
            .arg(request.release_name.as_str())
            .arg(request.chart.as_str())
            .arg("--values")
            .arg(values_file.display().to_string())
            .opt_arg("--repo", request.repository.as_deref())
            .opt_arg("--version", request.version.as_deref())
            .arg("--timeout")
            .arg(format!("{}s", request.timeout.as_secs().max(1)))
            .args(["-o", "json"])
            .with_timeout(Some(request.timeout.saturating_add(HELM_TIMEOUT_GRACE)));

        if request.wait {
            cmd = cmd.arg("--wait");
        }
        if request.insecure_skip_tls_verify {
            cmd = cmd.arg("--insecure-skip-tls-verify");
        }
        if verb == "install" && request.create_namespace {
            cmd = cmd.arg("--create-namespace");
        }
        if verb == "upgrade" {
            cmd = cmd.arg("--history-max").arg(request.max_history.to_string());
        }
        cmd
    }

    async fn run_release(&self, verb: &str, request: &ReleaseRequest) -> Result<Release> {
        let values_file = write_values(request)?;
        tracing::debug!(
            target: "helm",
            "{} release '{}' from '{}' in namespace '{}'",
            verb,
            request.release_name,
            request.chart,
            request.namespace
        );

        let stdout = self
            .release_command(verb, request, values_file.path())
            .with_context(request.release_name.clone())
            .execute_stdout()
            .await?;
        parse_release(&stdout)
            .with_context(|| format!("Invalid helm {verb} output for '{}'", request.release_name))
    }
}

#[async_trait]
impl ChartReleaseManager for HelmClient {
    async fn get_release(&self, name: &str, namespace: &str) -> Result<Option<Release>> {
        let result = self
            .command("status", namespace)
            .arg(name)
            .args(["-o", "json"])
            .with_context(name)
            .execute_stdout()
            .await;

        match result {
            Ok(stdout) => parse_release(&stdout)
                .map(Some)
                .with_context(|| format!("Invalid helm status output for '{name}'")),
            Err(e) if command_stderr(&e).is_some_and(is_release_not_found) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn install(&self, request: &ReleaseRequest) -> Result<Release> {
        self.run_release("install", request).await
    }

    async fn upgrade(&self, request: &ReleaseRequest) -> Result<Release> {
        self.run_release("upgrade", request).await
    }

    async fn uninstall(&self, name: &str, namespace: &str) -> Result<()> {
        let result = self
            .command("uninstall", namespace)
            .arg(name)
            .arg("--wait")
            .with_context(name)
            .execute_success()
            .await;

        match result {
            Err(e) if command_stderr(&e).is_some_and(is_release_not_found) => {
                tracing::debug!(target: "helm", "Release '{}' already absent", name);
                Ok(())
            }
            other => other,
        }
    }
}

fn write_values(request: &ReleaseRequest) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("krateoctl-values-")
        .suffix(".yaml")
        .tempfile()
        .context("Failed to create values file")?;
    let yaml = serde_yaml::to_string(&request.values).context("Failed to serialize chart values")?;
    file.write_all(yaml.as_bytes()).context("Failed to write values file")?;
    file.flush()?;
    Ok(file)
}

fn is_release_not_found(stderr: &str) -> bool {
    stderr.contains("not found")
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HelmRelease {
    #[serde(default)]
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    version: u32,
    #[serde(default)]
    info: HelmInfo,
    #[serde(default)]
    chart: HelmChart,
}

#[derive(Debug, Default, Deserialize)]
struct HelmInfo {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Default, Deserialize)]
struct HelmChart {
    #[serde(default)]
    metadata: HelmChartMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HelmChartMetadata {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    app_version: String,
}

fn parse_release(output: &str) -> Result<Release> {
    let raw: HelmRelease = serde_json::from_str(output.trim())?;
    Ok(Release {
        name: raw.name,
        namespace: raw.namespace,
        chart_name: raw.chart.metadata.name,
        chart_version: raw.chart.metadata.version,
        app_version: raw.chart.metadata.app_version,
        status: raw.info.status,
        revision: raw.version,
    })
}
