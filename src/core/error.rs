//! Error handling for krateoctl
//!
//! This module provides the error taxonomy used across configuration loading,
//! step resolution and workflow execution, together with user-friendly error
//! reporting for the CLI. The error system follows two principles:
//! 1. **Strongly-typed errors** so callers can branch on failure kinds
//!    (for example, "not found" during delete is recovered locally)
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Error Categories
//!
//! - **Configuration**: [`KrateoError::ConfigLoad`], [`KrateoError::ProfileNotFound`],
//!   [`KrateoError::ConfigValidation`]
//! - **Step resolution**: [`KrateoError::StepResolution`]
//! - **Execution**: [`KrateoError::Handler`], [`KrateoError::UnknownStepType`],
//!   [`KrateoError::StepFailed`], [`KrateoError::Cancelled`]
//! - **Cluster tooling**: [`KrateoError::ResourceNotFound`], [`KrateoError::ToolNotFound`],
//!   [`KrateoError::ToolCommand`]
//!
//! Loading, validation and resolution errors are raised before any cluster
//! contact happens. Workflow errors stop the run at the failing step.
//!
//! # Examples
//!
//! ```rust,no_run
//! use krateoctl::core::{KrateoError, user_friendly_error};
//!
//! let error = KrateoError::ProfileNotFound { profile: "dev".to_string() };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display(); // Shows colored error with suggestions
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for krateoctl operations.
///
/// Each variant describes one failure mode of the installer. Variants carry
/// owned strings rather than source errors so that they can be cloned into
/// user-facing reports and aggregated step results.
#[derive(Error, Debug)]
pub enum KrateoError {
    /// A configuration file is missing, unreadable or not valid YAML
    #[error("Failed to load configuration from {path}: {reason}")]
    ConfigLoad {
        /// Path of the offending file
        path: String,
        /// Underlying read or parse failure
        reason: String,
    },

    /// A selected profile is not defined in the overrides document
    #[error("Profile '{profile}' not found in overrides")]
    ProfileNotFound {
        /// Name of the missing profile
        profile: String,
    },

    /// The merged configuration is structurally invalid
    ///
    /// Covers malformed module chart references, modules depending on unknown
    /// modules and circular module dependencies.
    #[error("Configuration validation failed: {reason}")]
    ConfigValidation {
        /// Human readable reason
        reason: String,
    },

    /// A step definition or one of its override blocks is malformed
    #[error("Failed to resolve step '{step}': {reason}")]
    StepResolution {
        /// Step id, or the positional index when the id is missing
        step: String,
        /// Human readable reason
        reason: String,
    },

    /// A step handler failed while executing a step
    #[error("{step_type} step failed: {reason}")]
    Handler {
        /// Step type of the failing handler (`var`, `object`, `chart`)
        step_type: String,
        /// Human readable reason
        reason: String,
    },

    /// No handler exists for the step's declared type
    #[error("Handler for step '{step}' of type '{step_type}' not found")]
    UnknownStepType {
        /// Step id
        step: String,
        /// The unrecognised type tag
        step_type: String,
    },

    /// The first failing step of a workflow run
    #[error("{id}: {reason}")]
    StepFailed {
        /// Id of the step that failed
        id: String,
        /// Rendered error chain of the failure
        reason: String,
    },

    /// The in-flight step was interrupted by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// A cluster object does not exist
    #[error("{kind} '{name}' not found in namespace '{namespace}'")]
    ResourceNotFound {
        /// Kind of the object
        kind: String,
        /// Namespace that was searched
        namespace: String,
        /// Object name
        name: String,
    },

    /// An external tool (kubectl, helm) is not installed
    #[error("{tool} is not installed or not found in PATH")]
    ToolNotFound {
        /// Name of the missing executable
        tool: String,
    },

    /// An external tool returned a non-zero exit status
    #[error("{tool} {operation} failed: {}", stderr.trim())]
    ToolCommand {
        /// Executable name
        tool: String,
        /// Sub-command that failed (e.g. "apply", "upgrade")
        operation: String,
        /// Captured standard error
        stderr: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing or serialization error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl KrateoError {
    /// Returns true for collaborator "not found" failures.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ResourceNotFound { .. })
    }

    /// Builds a handler failure for the given step type.
    pub fn handler(step_type: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Handler {
            step_type: step_type.into(),
            reason: reason.to_string(),
        }
    }
}

impl Clone for KrateoError {
    fn clone(&self) -> Self {
        match self {
            Self::ConfigLoad {
                path,
                reason,
            } => Self::ConfigLoad {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::ProfileNotFound {
                profile,
            } => Self::ProfileNotFound {
                profile: profile.clone(),
            },
            Self::ConfigValidation {
                reason,
            } => Self::ConfigValidation {
                reason: reason.clone(),
            },
            Self::StepResolution {
                step,
                reason,
            } => Self::StepResolution {
                step: step.clone(),
                reason: reason.clone(),
            },
            Self::Handler {
                step_type,
                reason,
            } => Self::Handler {
                step_type: step_type.clone(),
                reason: reason.clone(),
            },
            Self::UnknownStepType {
                step,
                step_type,
            } => Self::UnknownStepType {
                step: step.clone(),
                step_type: step_type.clone(),
            },
            Self::StepFailed {
                id,
                reason,
            } => Self::StepFailed {
                id: id.clone(),
                reason: reason.clone(),
            },
            Self::Cancelled => Self::Cancelled,
            Self::ResourceNotFound {
                kind,
                namespace,
                name,
            } => Self::ResourceNotFound {
                kind: kind.clone(),
                namespace: namespace.clone(),
                name: name.clone(),
            },
            Self::ToolNotFound {
                tool,
            } => Self::ToolNotFound {
                tool: tool.clone(),
            },
            Self::ToolCommand {
                tool,
                operation,
                stderr,
            } => Self::ToolCommand {
                tool: tool.clone(),
                operation: operation.clone(),
                stderr: stderr.clone(),
            },
            // Source errors are not Clone; keep their message
            Self::IoError(e) => Self::IoError(std::io::Error::new(e.kind(), e.to_string())),
            Self::YamlError(e) => Self::Other {
                message: format!("YAML error: {e}"),
            },
            Self::JsonError(e) => Self::Other {
                message: format!("JSON error: {e}"),
            },
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Error wrapper carrying a suggestion and extra details for CLI display.
///
/// ```rust,no_run
/// use krateoctl::core::{ErrorContext, KrateoError};
///
/// let context = ErrorContext::new(KrateoError::ToolNotFound { tool: "helm".into() })
///     .with_suggestion("Install helm from https://helm.sh/docs/intro/install/")
///     .with_details("Chart steps are executed through the helm binary");
/// context.display();
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: KrateoError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: KrateoError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error (shown in green).
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error (shown in yellow).
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error, details and suggestion to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions.
///
/// Recognises [`KrateoError`] anywhere in the error chain, then IO errors,
/// and falls back to the rendered chain for anything else.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(krateo_error) = error.chain().find_map(|e| e.downcast_ref::<KrateoError>()) {
        let mut ctx = create_error_context(krateo_error.clone());
        // Outer context messages explain where the typed error surfaced
        if ctx.details.is_none() && error.downcast_ref::<KrateoError>().is_none() {
            ctx.details = Some(error.to_string());
        }
        return ctx;
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        return match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => ErrorContext::new(KrateoError::Other {
                message: format!("Permission denied: {io_error}"),
            })
            .with_suggestion("Check file ownership and permissions of the configuration files"),
            std::io::ErrorKind::NotFound => ErrorContext::new(KrateoError::Other {
                message: format!("File not found: {io_error}"),
            })
            .with_suggestion("Check that the file exists and the path is correct"),
            _ => ErrorContext::new(KrateoError::Other {
                message: io_error.to_string(),
            }),
        };
    }

    ErrorContext::new(KrateoError::Other {
        message: format!("{error:#}"),
    })
}

fn create_error_context(error: KrateoError) -> ErrorContext {
    match &error {
        KrateoError::ConfigLoad {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check that the file exists and contains valid YAML (use --config to point to another file)"),
        KrateoError::ProfileNotFound {
            profile,
        } => {
            let suggestion = format!(
                "Define '{profile}' under the 'profiles' key of the overrides file or drop it from --profile"
            );
            ErrorContext::new(error).with_suggestion(suggestion)
        }
        KrateoError::ConfigValidation {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Fix the module definitions reported above and run 'krateoctl plan' again"),
        KrateoError::StepResolution {
            ..
        } => ErrorContext::new(error).with_details(
            "Every step needs an 'id' and a 'type'; component overrides must be mappings",
        ),
        KrateoError::ToolNotFound {
            tool,
        } => {
            let suggestion = match tool.as_str() {
                "helm" => "Install helm from https://helm.sh/docs/intro/install/",
                _ => "Install kubectl from https://kubernetes.io/docs/tasks/tools/",
            };
            ErrorContext::new(error)
                .with_suggestion(suggestion)
                .with_details("krateoctl talks to the cluster through the kubectl and helm binaries")
        }
        KrateoError::ToolCommand {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Make sure your kubeconfig points to a reachable cluster (KUBECONFIG or --kubeconfig)"),
        KrateoError::StepFailed {
            ..
        } => ErrorContext::new(error)
            .with_details("Remaining steps were not executed; completed steps were not rolled back"),
        _ => ErrorContext::new(error),
    }
}
