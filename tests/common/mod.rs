//! Common test utilities for krateoctl integration tests
//!
//! A throwaway project directory that runs the real binary. Cluster
//! stand-ins come from `krateoctl::test_utils`.

// Not every helper is used by every test module
#![allow(dead_code)]

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use krateoctl::cluster::ReleaseRequest;
use krateoctl::test_utils::{ChartCall, FakeCharts};

/// A temporary directory holding configuration files.
pub struct TestProject {
    _temp_dir: TempDir,
    dir: PathBuf,
}

/// Captured output of one binary invocation.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path().to_path_buf();
        Ok(Self {
            _temp_dir: temp_dir,
            dir,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.dir.join(name);
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn write_config(&self, content: &str) -> Result<PathBuf> {
        self.write("krateo.yaml", content)
    }

    pub fn write_overrides(&self, content: &str) -> Result<PathBuf> {
        self.write("krateo-overrides.yaml", content)
    }

    /// Run krateoctl in the project directory with a clean environment.
    pub fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        self.run_with_env(args, &[("KRATEOCTL_NO_PROGRESS", "1")])
    }

    /// Like [`run`](Self::run), with `envs` set instead of the defaults.
    pub fn run_with_env(&self, args: &[&str], envs: &[(&str, &str)]) -> Result<CommandOutput> {
        let output = Command::new(env!("CARGO_BIN_EXE_krateoctl"))
            .args(args)
            .current_dir(&self.dir)
            .env_remove("KRATEOCTL_CONFIG")
            .env_remove("KRATEOCTL_OVERRIDES")
            .env_remove("KRATEOCTL_PROFILE")
            .env_remove("KRATEOCTL_NAMESPACE")
            .env_remove("KRATEOCTL_NO_PROGRESS")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1")
            .envs(envs.iter().copied())
            .output()
            .context("Failed to run krateoctl")?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

/// Release changes as `verb namespace/name` lines, lookups left out.
pub fn release_log(charts: &FakeCharts) -> Vec<String> {
    charts
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            ChartCall::Install(r) => Some(format!("install {}/{}", r.namespace, r.release_name)),
            ChartCall::Upgrade(r) => Some(format!("upgrade {}/{}", r.namespace, r.release_name)),
            ChartCall::Uninstall { name, namespace } => Some(format!("uninstall {namespace}/{name}")),
            ChartCall::GetRelease { .. } => None,
        })
        .collect()
}

/// Install and upgrade requests in call order.
pub fn release_requests(charts: &FakeCharts) -> Vec<ReleaseRequest> {
    charts
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            ChartCall::Install(r) | ChartCall::Upgrade(r) => Some(r),
            _ => None,
        })
        .collect()
}
