//! Print the resolved steps without contacting the cluster.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::fmt::Write as _;

use super::common::LoadArgs;
use crate::workflow::types::Step;

#[derive(Args, Debug)]
pub struct PlanCommand {
    #[command(flatten)]
    pub load: LoadArgs,

    /// Annotate each step with its payload digest
    #[arg(long)]
    pub digest: bool,

    /// Leave out steps disabled by their component
    #[arg(long)]
    pub active_only: bool,
}

impl PlanCommand {
    pub fn execute(self) -> Result<()> {
        let result = self.load.load()?;
        let steps: Vec<&Step> = result
            .steps
            .iter()
            .filter(|s| !(self.active_only && s.skip))
            .collect();

        if steps.is_empty() {
            eprintln!("{} No steps configured", "ℹ".blue());
            return Ok(());
        }

        print!("{}", render_plan(&steps, self.digest)?);
        Ok(())
    }
}

/// Steps as a multi-document YAML stream.
fn render_plan(steps: &[&Step], digest: bool) -> Result<String> {
    let mut out = String::new();
    for step in steps {
        out.push_str("---\n");
        if digest {
            let value = step.digest();
            if !value.is_empty() {
                writeln!(out, "# digest: {value}")?;
            }
        }
        out.push_str(&serde_yaml::to_string(step)?);
    }
    Ok(out)
}
