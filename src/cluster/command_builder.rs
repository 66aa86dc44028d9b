//! Type-safe command builder for the external cluster tools
//!
//! `kubectl` and `helm` are driven through [`ToolCommand`], which gives every
//! invocation the same timeout handling, stdin support, logging and error
//! mapping:
//!
//! - a missing executable becomes [`KrateoError::ToolNotFound`]
//! - a non-zero exit becomes [`KrateoError::ToolCommand`] carrying stderr
//! - an expired timeout kills the process and reports a `ToolCommand` error

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::core::KrateoError;

/// Builder for one invocation of an external tool.
///
/// # Examples
///
/// ```rust,no_run
/// use krateoctl::cluster::command_builder::ToolCommand;
///
/// # async fn example() -> anyhow::Result<()> {
/// let output = ToolCommand::new("kubectl")
///     .args(["get", "namespaces", "-o", "json"])
///     .with_context("list-namespaces")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    /// Executable name, resolved through PATH
    program: String,

    /// Arguments in order
    args: Vec<String>,

    /// Extra environment variables for the child process
    env_vars: Vec<(String, String)>,

    /// Bytes written to the child's stdin, which is closed afterwards
    stdin: Option<Vec<u8>>,

    /// Maximum duration to wait for completion (None = no timeout)
    timeout_duration: Option<Duration>,

    /// Identifier included in log lines (usually a step id)
    context: Option<String>,
}

impl ToolCommand {
    /// A command for `program` with a five minute timeout.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env_vars: Vec::new(),
            stdin: None,
            timeout_duration: Some(Duration::from_secs(300)),
            context: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add `flag value` when `value` is present.
    pub fn opt_arg(self, flag: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.arg(flag).arg(value),
            None => self,
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Feed `input` to the process on stdin.
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Set a custom timeout for the command (None for no timeout)
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Set a context for logging (e.g., step id)
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments added so far.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout_duration
    }

    /// First argument, used as the operation name in errors.
    fn operation(&self) -> String {
        self.args.first().cloned().unwrap_or_else(|| "unknown".to_string())
    }

    fn prefix(&self) -> String {
        self.context.as_ref().map(|ctx| format!("({ctx}) ")).unwrap_or_default()
    }

    /// Execute the command and return its output.
    ///
    /// # Errors
    ///
    /// [`KrateoError::ToolNotFound`] when the executable is missing,
    /// [`KrateoError::ToolCommand`] on a non-zero exit or timeout.
    pub async fn execute(self) -> Result<ToolOutput> {
        let start = Instant::now();
        let prefix = self.prefix();
        let command_line = format!("{} {}", self.program, self.args.join(" "));
        tracing::debug!(target: "tool", "{}Executing command: {}", prefix, command_line);

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(if self.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.env_vars {
            tracing::trace!(target: "tool", "Setting env var: {}={}", key, value);
            cmd.env(key, value);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(KrateoError::ToolNotFound {
                    tool: self.program.clone(),
                }
                .into());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to execute {command_line}"));
            }
        };

        if let Some(input) = &self.stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(input)
                .await
                .with_context(|| format!("Failed to write stdin of {}", self.program))?;
            // closing stdin signals end of input
            drop(pipe);
        }

        let output_future = child.wait_with_output();
        let output = if let Some(duration) = self.timeout_duration {
            if let Ok(result) = timeout(duration, output_future).await {
                result.with_context(|| format!("Failed to execute {command_line}"))?
            } else {
                tracing::warn!(
                    target: "tool",
                    "{}Command timed out after {} seconds: {}",
                    prefix,
                    duration.as_secs(),
                    command_line
                );
                return Err(KrateoError::ToolCommand {
                    tool: self.program.clone(),
                    operation: self.operation(),
                    stderr: format!(
                        "command timed out after {} seconds; check that the cluster is reachable",
                        duration.as_secs()
                    ),
                }
                .into());
            }
        } else {
            output_future.await.with_context(|| format!("Failed to execute {command_line}"))?
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            tracing::debug!(
                target: "tool",
                "{}Command failed with exit code: {:?}",
                prefix,
                output.status.code()
            );
            if !stderr.is_empty() {
                tracing::debug!(target: "tool", "{}Error: {}", prefix, stderr.trim());
            }
            return Err(KrateoError::ToolCommand {
                tool: self.program.clone(),
                operation: self.operation(),
                stderr: if stderr.trim().is_empty() { stdout } else { stderr },
            }
            .into());
        }

        if !stderr.trim().is_empty() {
            tracing::debug!(target: "tool", "{}{}", prefix, stderr.trim());
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(
                target: "tool::perf",
                "{}{} {} took {:.2}s",
                prefix,
                self.program,
                self.operation(),
                elapsed.as_secs_f64()
            );
        }

        Ok(ToolOutput {
            stdout,
            stderr,
        })
    }

    /// Execute the command and return only stdout.
    pub async fn execute_stdout(self) -> Result<String> {
        Ok(self.execute().await?.stdout)
    }

    /// Execute the command, discarding its output.
    pub async fn execute_success(self) -> Result<()> {
        self.execute().await?;
        Ok(())
    }
}

/// Output of a successful command
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Whether `tool` can be found on PATH.
#[must_use]
pub fn tool_available(tool: &str) -> bool {
    which::which(tool).is_ok()
}

/// Stderr of a failed tool invocation, if `err` is one.
#[must_use]
pub fn command_stderr(err: &anyhow::Error) -> Option<&str> {
    err.chain().find_map(|cause| match cause.downcast_ref::<KrateoError>() {
        Some(KrateoError::ToolCommand {
            stderr,
            ..
        }) => Some(stderr.as_str()),
        _ => None,
    })
}
