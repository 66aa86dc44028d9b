//! Workflow engine.
//!
//! Runs resolved [`Step`]s one at a time against the cluster collaborators.
//!
//! # Execution rules
//!
//! - Steps run in declaration order; with [`Operation::Delete`] they run in
//!   reverse, so the last installed piece is removed first.
//! - A step for which the skip predicate returns true is not executed and
//!   its result slot stays `None`.
//! - Each result is stored at the step's original index.
//! - The first failing step stops the run. Later slots stay `None`; nothing
//!   is rolled back or retried.
//! - A step whose type has no handler fails with
//!   [`KrateoError::UnknownStepType`].
//!
//! Every [`Workflow`] owns a fresh [`Environment`], shared by its handlers
//! and never by two workflows.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use krateoctl::cluster::{helm::HelmClient, kubectl::KubectlClient};
//! use krateoctl::workflow::{Collaborators, Workflow, first_error};
//! use krateoctl::workflow::types::{Operation, Step};
//!
//! # async fn example(steps: Vec<Step>) -> anyhow::Result<()> {
//! let collaborators = Collaborators::from_cluster(
//!     Arc::new(KubectlClient::default()),
//!     Arc::new(HelmClient::default()),
//! );
//! let mut workflow = Workflow::new("krateo-system", Operation::Create, collaborators);
//! let results = workflow.run(&steps, |step| step.skip).await;
//! first_error(&results)?;
//! # Ok(())
//! # }
//! ```

pub mod handlers;
pub mod selector;
pub mod types;

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;

use crate::cluster::{Applier, ChartReleaseManager, Deletor, Getter};
use crate::core::KrateoError;
use handlers::{ChartHandler, Environment, ObjectHandler, StepHandler, VarHandler};
use types::{Operation, Step, StepOutput, StepType};

/// Outcome of one executed step.
#[derive(Debug)]
pub struct StepResult {
    pub id: String,
    /// Payload digest, see [`Step::digest`].
    pub digest: String,
    pub output: Option<StepOutput>,
    pub error: Option<anyhow::Error>,
}

impl StepResult {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// The cluster collaborators handlers are built from.
#[derive(Clone)]
pub struct Collaborators {
    pub getter: Arc<dyn Getter>,
    pub applier: Arc<dyn Applier>,
    pub deletor: Arc<dyn Deletor>,
    pub charts: Arc<dyn ChartReleaseManager>,
}

impl Collaborators {
    /// Use one object client for reads, applies and deletes.
    pub fn from_cluster<C>(cluster: Arc<C>, charts: Arc<dyn ChartReleaseManager>) -> Self
    where
        C: Getter + Applier + Deletor + 'static,
    {
        Self {
            getter: cluster.clone(),
            applier: cluster.clone(),
            deletor: cluster,
            charts,
        }
    }
}

/// Receives step lifecycle notifications, e.g. to drive progress output.
pub trait WorkflowObserver: Send + Sync {
    fn step_started(&self, _step: &Step) {}

    fn step_skipped(&self, _step: &Step) {}

    fn step_finished(&self, _step: &Step, _result: &StepResult) {}
}

/// Sequential step executor for one namespace and operation.
pub struct Workflow {
    namespace: String,
    operation: Operation,
    env: Environment,
    var_handler: Box<dyn StepHandler>,
    object_handler: Box<dyn StepHandler>,
    chart_handler: Box<dyn StepHandler>,
    observer: Option<Arc<dyn WorkflowObserver>>,
}

impl Workflow {
    pub fn new(namespace: impl Into<String>, operation: Operation, collaborators: Collaborators) -> Self {
        let env = Environment::new();
        Self {
            namespace: namespace.into(),
            operation,
            var_handler: Box::new(VarHandler::new(collaborators.getter, env.clone())),
            object_handler: Box::new(ObjectHandler::new(
                collaborators.applier,
                collaborators.deletor,
                env.clone(),
            )),
            chart_handler: Box::new(ChartHandler::new(collaborators.charts, env.clone())),
            env,
            observer: None,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn WorkflowObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Variables defined by the steps run so far.
    #[must_use]
    pub const fn environment(&self) -> &Environment {
        &self.env
    }

    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// Run `steps` to completion or to the first failure.
    pub async fn run<F>(&mut self, steps: &[Step], skip: F) -> Vec<Option<StepResult>>
    where
        F: Fn(&Step) -> bool,
    {
        self.run_until(steps, skip, std::future::pending::<()>()).await
    }

    /// Like [`run`](Self::run), but the in-flight step fails with
    /// [`KrateoError::Cancelled`] once `shutdown` completes, which stops the
    /// run like any other failure.
    pub async fn run_until<F, S>(&mut self, steps: &[Step], skip: F, shutdown: S) -> Vec<Option<StepResult>>
    where
        F: Fn(&Step) -> bool,
        S: Future<Output = ()>,
    {
        let mut results: Vec<Option<StepResult>> = steps.iter().map(|_| None).collect();

        let mut order: Vec<usize> = (0..steps.len()).collect();
        if self.operation.is_delete() {
            order.reverse();
        }

        tokio::pin!(shutdown);

        for index in order {
            let step = &steps[index];
            if skip(step) {
                tracing::debug!(target: "workflow", "Skipping step '{}' ({})", step.id, step.step_type);
                if let Some(observer) = &self.observer {
                    observer.step_skipped(step);
                }
                continue;
            }

            tracing::debug!(target: "workflow", "Executing step '{}' ({})", step.id, step.step_type);
            if let Some(observer) = &self.observer {
                observer.step_started(step);
            }

            let outcome = tokio::select! {
                outcome = self.dispatch(step) => outcome,
                () = &mut shutdown => {
                    tracing::warn!(target: "workflow", "Step '{}' interrupted", step.id);
                    Err(KrateoError::Cancelled.into())
                }
            };

            let (output, error) = match outcome {
                Ok(output) => (Some(output), None),
                Err(e) => (None, Some(e)),
            };
            let result = StepResult {
                id: step.id.clone(),
                digest: step.digest(),
                output,
                error,
            };

            if let Some(observer) = &self.observer {
                observer.step_finished(step, &result);
            }

            let failed = !result.is_success();
            results[index] = Some(result);
            if failed {
                tracing::debug!(target: "workflow", "Step '{}' failed, stopping", step.id);
                break;
            }
        }

        results
    }

    async fn dispatch(&mut self, step: &Step) -> Result<StepOutput> {
        let handler = match &step.step_type {
            StepType::Var => &mut self.var_handler,
            StepType::Object => &mut self.object_handler,
            StepType::Chart => &mut self.chart_handler,
            StepType::Unknown(tag) => {
                return Err(KrateoError::UnknownStepType {
                    step: step.id.clone(),
                    step_type: tag.clone(),
                }
                .into());
            }
        };

        handler.set_namespace(&self.namespace);
        handler.set_operation(self.operation);
        handler.handle(&step.id, step.with.as_ref()).await
    }
}

/// The first failure of a run as [`KrateoError::StepFailed`], or `Ok`.
///
/// # Errors
///
/// Returns the failing step's id together with its rendered error chain.
pub fn first_error(results: &[Option<StepResult>]) -> Result<()> {
    for result in results.iter().flatten() {
        if let Some(error) = &result.error {
            return Err(KrateoError::StepFailed {
                id: result.id.clone(),
                reason: format!("{error:#}"),
            }
            .into());
        }
    }
    Ok(())
}
