//! krateoctl - declarative installer for the Krateo platform
//!
//! Resolves a layered configuration document into an ordered list of typed
//! steps and runs them against a cluster with defined ordering, skip and
//! failure semantics.
//!
//! # Architecture Overview
//!
//! ```text
//! krateo.yaml ─┐
//! overrides ───┼─> Loader ─> merged document ─> Validator ─> Active-Step Resolver
//! profiles ────┘                                                   │
//!                                                                  v
//!                 per-step results <─ Workflow Engine <─ ordered runtime steps
//!                                          │
//!                          Var / Object / Chart handlers ─> kubectl, helm
//! ```
//!
//! # Core Modules
//!
//! - [`config`] - Layered loading, deep merge, validation and step resolution
//! - [`workflow`] - The engine, step handlers and the runtime step model
//! - [`expand`] - `$NAME` token expansion
//! - [`cluster`] - Collaborator traits and their `kubectl`/`helm` implementations
//! - [`cli`] - The `plan`, `apply` and `uninstall` commands
//! - [`core`] - Error types and user-facing error rendering
//! - [`utils`] - Progress spinners
//!
//! # Configuration Format
//!
//! ```yaml
//! modules:
//!   frontend:
//!     enabled: true
//!     chart:
//!       repository: https://charts.krateo.io
//!       name: frontend
//! components:
//!   composable-portal:
//!     enabled: true
//!     steps: [portal]
//!     helmDefaults:
//!       replicas: 2
//! steps:
//!   - id: domain
//!     type: var
//!     with: { name: DOMAIN, value: krateo.example.com }
//!   - id: portal
//!     type: chart
//!     with:
//!       repository: https://charts.krateo.io
//!       name: portal
//!       values:
//!         host: portal.$DOMAIN
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use krateoctl::config::{LoadOptions, load_config_and_steps};
//!
//! let result = load_config_and_steps(
//!     LoadOptions::new("krateo.yaml").with_overrides("krateo-overrides.yaml"),
//!     &["components.extras.enabled=false"],
//! )?;
//! for step in &result.steps {
//!     println!("{} {} skip={}", step.id, step.step_type, step.skip);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod cli;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod core;
pub mod expand;
pub mod utils;
pub mod workflow;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
