//! Arguments and helpers shared by the commands.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::cluster::command_builder::tool_available;
use crate::cluster::{helm::HelmClient, kubectl::KubectlClient};
use crate::config::{LoadOptions, LoadResult, load_config_and_steps};
use crate::constants::{DEFAULT_CONFIG_FILE, DEFAULT_NAMESPACE, DEFAULT_OVERRIDES_FILE};
use crate::core::KrateoError;
use crate::utils::progress::ProgressBar;
use crate::workflow::types::{Operation, Step, StepType};
use crate::workflow::{Collaborators, StepResult, Workflow, WorkflowObserver, first_error};

use super::CliConfig;

/// Where the configuration comes from.
#[derive(Args, Debug, Clone)]
pub struct LoadArgs {
    /// Main configuration file
    #[arg(long, env = "KRATEOCTL_CONFIG", value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// User overrides file; a missing file is ignored
    #[arg(long, env = "KRATEOCTL_OVERRIDES", value_name = "FILE", default_value = DEFAULT_OVERRIDES_FILE)]
    pub overrides: PathBuf,

    /// Comma-separated profiles to layer, in order
    #[arg(long, env = "KRATEOCTL_PROFILE")]
    pub profile: Option<String>,

    /// Set a value in the merged configuration (repeatable)
    #[arg(long = "set", value_name = "PATH=VALUE")]
    pub set: Vec<String>,
}

impl LoadArgs {
    #[must_use]
    pub fn options(&self) -> LoadOptions {
        let opts = LoadOptions::new(&self.config).with_overrides(&self.overrides);
        match &self.profile {
            Some(profile) => opts.with_profile(profile),
            None => opts,
        }
    }

    /// Load, validate and resolve the configured steps.
    pub fn load(&self) -> Result<LoadResult> {
        load_config_and_steps(self.options(), &self.set)
    }
}

/// Which cluster to talk to.
#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    /// Namespace for steps that do not declare one
    #[arg(short, long, env = "KRATEOCTL_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Path to the kubeconfig file
    #[arg(long, value_name = "FILE")]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long)]
    pub kube_context: Option<String>,
}

impl ClusterArgs {
    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        let kubectl = KubectlClient::new(self.kubeconfig.clone(), self.kube_context.clone());
        let helm = HelmClient::new(self.kubeconfig.clone(), self.kube_context.clone());
        Collaborators::from_cluster(Arc::new(kubectl), Arc::new(helm))
    }
}

/// The binaries the active steps will invoke.
fn required_tools(steps: &[Step]) -> Vec<&'static str> {
    let active = || steps.iter().filter(|s| !s.skip);
    let mut tools = Vec::new();
    if active().any(needs_kubectl) {
        tools.push("kubectl");
    }
    if active().any(|s| s.step_type == StepType::Chart) {
        tools.push("helm");
    }
    tools
}

/// Objects always go through kubectl; variables only when read with `valueFrom`.
fn needs_kubectl(step: &Step) -> bool {
    match step.step_type {
        StepType::Object => true,
        StepType::Var => step
            .with
            .as_ref()
            .and_then(|with| with.get("valueFrom"))
            .is_some_and(|source| !source.is_null()),
        _ => false,
    }
}

fn ensure_tools(steps: &[Step]) -> Result<()> {
    for tool in required_tools(steps) {
        if !tool_available(tool) {
            return Err(KrateoError::ToolNotFound {
                tool: tool.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// Completes on Ctrl-C. Never completes if the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Per-step spinner and summary lines.
struct StepProgress {
    no_progress: bool,
    current: Mutex<Option<ProgressBar>>,
}

impl StepProgress {
    fn new(no_progress: bool) -> Self {
        Self {
            no_progress,
            current: Mutex::new(None),
        }
    }

    fn take_current(&self) -> Option<ProgressBar> {
        self.current.lock().ok().and_then(|mut current| current.take())
    }
}

impl WorkflowObserver for StepProgress {
    fn step_started(&self, step: &Step) {
        let spinner = if self.no_progress {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        spinner.set_message(format!("{} {}", step.step_type, step.id));
        if let Ok(mut current) = self.current.lock() {
            *current = Some(spinner);
        }
    }

    fn step_skipped(&self, step: &Step) {
        println!("  {} {} {} (skipped)", "-".dimmed(), step.step_type, step.id.dimmed());
    }

    fn step_finished(&self, step: &Step, result: &StepResult) {
        if let Some(spinner) = self.take_current() {
            spinner.finish_and_clear();
        }
        if result.is_success() {
            println!("  {} {} {}", "✓".green(), step.step_type, step.id);
        } else {
            println!("  {} {} {}", "✗".red(), step.step_type, step.id.bold());
        }
    }
}

/// Resolve the configured steps and run them with `operation`.
pub async fn run_workflow(
    operation: Operation,
    load: &LoadArgs,
    cluster: &ClusterArgs,
    config: &CliConfig,
) -> Result<()> {
    let LoadResult {
        steps,
        ..
    } = load.load()?;

    let active = steps.iter().filter(|s| !s.skip).count();
    if active == 0 {
        println!("{} No steps configured", "ℹ".blue());
        return Ok(());
    }

    ensure_tools(&steps)?;

    let verb = if operation.is_delete() {
        "Uninstalling"
    } else {
        "Applying"
    };
    println!("{} {} {} steps to namespace {}", "⚡".yellow(), verb, active, cluster.namespace.bold());

    let observer = Arc::new(StepProgress::new(config.no_progress));
    let mut workflow = Workflow::new(cluster.namespace.as_str(), operation, cluster.collaborators())
        .with_observer(observer);
    let results = workflow.run_until(&steps, |s| s.skip, shutdown_signal()).await;

    if let Err(e) = first_error(&results) {
        let completed = results.iter().flatten().filter(|r| r.is_success()).count();
        println!("{} Workflow failed after {} of {} steps", "✗".red(), completed, active);
        return Err(e);
    }

    let past = if operation.is_delete() {
        "uninstalled"
    } else {
        "applied"
    };
    println!("{} Successfully {} {} steps", "✓".green(), past, active);
    Ok(())
}
