//! Install or upgrade the configured platform.

use anyhow::Result;
use clap::Args;

use super::CliConfig;
use super::common::{ClusterArgs, LoadArgs, run_workflow};
use crate::workflow::types::Operation;

#[derive(Args, Debug)]
pub struct ApplyCommand {
    #[command(flatten)]
    pub load: LoadArgs,

    #[command(flatten)]
    pub cluster: ClusterArgs,
}

impl ApplyCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        run_workflow(Operation::Create, &self.load, &self.cluster, config).await
    }
}
