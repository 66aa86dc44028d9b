//! `chart` steps: install, upgrade or uninstall a release.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::{Environment, StepHandler, decode_payload};
use crate::cluster::{ChartReleaseManager, Release, ReleaseRequest};
use crate::constants::{DEFAULT_CHART_TIMEOUT, DEFAULT_MAX_HISTORY};
use crate::core::KrateoError;
use crate::workflow::types::{ChartResult, ChartSpec, Operation, StepOutput};

const STEP_TYPE: &str = "chart";

pub struct ChartHandler {
    charts: Arc<dyn ChartReleaseManager>,
    env: Environment,
    namespace: String,
    operation: Operation,
}

impl ChartHandler {
    pub fn new(charts: Arc<dyn ChartReleaseManager>, env: Environment) -> Self {
        Self {
            charts,
            env,
            namespace: String::new(),
            operation: Operation::default(),
        }
    }

    fn request(&self, spec: &ChartSpec, release_name: &str, namespace: &str) -> Result<ReleaseRequest> {
        let Some((chart, repository)) = spec.chart_reference() else {
            return Err(KrateoError::handler(STEP_TYPE, "chart must have url or name").into());
        };
        Ok(ReleaseRequest {
            release_name: release_name.to_string(),
            namespace: namespace.to_string(),
            chart,
            repository,
            version: spec.version.clone().filter(|v| !v.trim().is_empty()),
            values: spec.values.clone().unwrap_or_default(),
            wait: spec.wait,
            timeout: spec.timeout.unwrap_or(DEFAULT_CHART_TIMEOUT),
            insecure_skip_tls_verify: spec.insecure_skip_tls_verify,
            create_namespace: !spec.skip_create_namespace,
            max_history: spec.max_history.unwrap_or(DEFAULT_MAX_HISTORY),
        })
    }
}

fn fill_from_release(result: &mut ChartResult, release: &Release) {
    result.chart_name = release.chart_name.clone();
    result.chart_version = release.chart_version.clone();
    result.app_version = release.app_version.clone();
    result.status = release.status.clone();
    result.revision = Some(release.revision);
}

#[async_trait]
impl StepHandler for ChartHandler {
    fn set_namespace(&mut self, namespace: &str) {
        self.namespace = namespace.to_string();
    }

    fn set_operation(&mut self, operation: Operation) {
        self.operation = operation;
    }

    async fn handle(&mut self, id: &str, payload: Option<&Value>) -> Result<StepOutput> {
        let expanded = payload.map(|p| self.env.expand_value(p));
        let mut spec: ChartSpec = decode_payload(STEP_TYPE, expanded.as_ref())?;
        spec.set_defaults();

        let namespace = spec
            .namespace
            .clone()
            .filter(|ns| !ns.trim().is_empty())
            .unwrap_or_else(|| self.namespace.clone());
        let Some(release_name) = spec.resolved_release_name() else {
            return Err(KrateoError::handler(STEP_TYPE, "cannot determine release name").into());
        };

        let mut result = ChartResult {
            release_name: release_name.clone(),
            namespace: namespace.clone(),
            ..ChartResult::default()
        };

        if self.operation.is_delete() {
            result.operation = "uninstall".to_string();
            self.charts.uninstall(&release_name, &namespace).await.map_err(|e| {
                KrateoError::handler(STEP_TYPE, format!("failed to uninstall release {release_name}: {e:#}"))
            })?;
            result.status = "uninstalled".to_string();
            tracing::debug!(target: "workflow", "[chart:{}] release '{}' uninstalled", id, release_name);
            return Ok(StepOutput::Chart(result));
        }

        result.operation = "install/upgrade".to_string();
        let request = self.request(&spec, &release_name, &namespace)?;

        let existing = self.charts.get_release(&release_name, &namespace).await.map_err(|e| {
            KrateoError::handler(STEP_TYPE, format!("failed to get release {release_name}: {e:#}"))
        })?;

        let release = if existing.is_none() {
            tracing::debug!(target: "workflow", "[chart:{}] installing release '{}'", id, release_name);
            self.charts.install(&request).await.map_err(|e| {
                KrateoError::handler(STEP_TYPE, format!("failed to install chart: {e:#}"))
            })?
        } else {
            tracing::debug!(target: "workflow", "[chart:{}] upgrading release '{}'", id, release_name);
            self.charts.upgrade(&request).await.map_err(|e| {
                KrateoError::handler(STEP_TYPE, format!("failed to upgrade chart: {e:#}"))
            })?
        };

        fill_from_release(&mut result, &release);
        Ok(StepOutput::Chart(result))
    }
}
