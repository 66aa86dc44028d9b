//! Command-line interface for krateoctl.
//!
//! # Commands
//!
//! - `plan` - Print the resolved steps without touching the cluster
//! - `apply` - Install or upgrade every active step
//! - `uninstall` - Remove every active step in reverse order
//!
//! # Global Options
//!
//! - `--verbose` / `-v` - Debug logging
//! - `--quiet` / `-q` - Errors only
//! - `--no-progress` - Disable spinners (`KRATEOCTL_NO_PROGRESS`)
//!
//! `RUST_LOG` overrides the level chosen by the flags. Logs go to stderr so
//! `plan` output on stdout stays machine-readable.
//!
//! # Example
//!
//! ```bash
//! krateoctl plan --profile dev
//! krateoctl apply --namespace krateo-system --set components.extras.enabled=false
//! krateoctl uninstall --kube-context kind-krateo
//! ```

mod apply;
pub mod common;
mod plan;
mod uninstall;

use anyhow::Result;
use clap::builder::FalseyValueParser;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::constants::NO_PROGRESS_ENV;

/// Runtime settings derived from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Default log filter, used when `RUST_LOG` is unset.
    pub log_level: String,

    pub no_progress: bool,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the global tracing subscriber, writing to stderr.
    pub fn init_logging(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

#[derive(Parser)]
#[command(
    name = "krateoctl",
    about = "Declarative installer for the Krateo platform",
    version,
    long_about = "krateoctl resolves a layered configuration into ordered chart, manifest and variable steps and runs them against a cluster."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Disable progress spinners
    #[arg(long, global = true, env = NO_PROGRESS_ENV, value_parser = FalseyValueParser::new())]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved steps as YAML documents
    Plan(plan::PlanCommand),

    /// Install or upgrade every active step
    Apply(apply::ApplyCommand),

    /// Remove every active step in reverse order
    Uninstall(uninstall::UninstallCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        };

        CliConfig {
            log_level: log_level.to_string(),
            no_progress: self.no_progress,
        }
    }

    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        match self.command {
            Commands::Plan(cmd) => cmd.execute(),
            Commands::Apply(cmd) => cmd.execute(&config).await,
            Commands::Uninstall(cmd) => cmd.execute(&config).await,
        }
    }
}
