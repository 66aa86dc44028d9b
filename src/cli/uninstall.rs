//! Remove the configured platform, last step first.

use anyhow::Result;
use clap::Args;

use super::CliConfig;
use super::common::{ClusterArgs, LoadArgs, run_workflow};
use crate::workflow::types::Operation;

#[derive(Args, Debug)]
pub struct UninstallCommand {
    #[command(flatten)]
    pub load: LoadArgs,

    #[command(flatten)]
    pub cluster: ClusterArgs,
}

impl UninstallCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        run_workflow(Operation::Delete, &self.load, &self.cluster, config).await
    }
}
