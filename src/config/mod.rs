//! Configuration loading and step resolution for krateoctl
//!
//! A run starts from a base configuration file (`krateo.yaml` by default)
//! and layers optional overrides on top of it:
//!
//! 1. **Base** - the configuration file itself
//! 2. **Profiles** - `<overrides>.<profile><ext>` files and `profiles.<name>`
//!    entries inside the overrides file, applied in the order requested
//! 3. **Overrides** - the overrides file (`krateo-overrides.yaml`)
//! 4. **`--set`** - command line path assignments
//!
//! The merged result is kept twice: as a [`RawDocument`] for path queries and
//! `--set`, and as a typed [`Document`] for validation and step resolution.
//!
//! # Modules
//!
//! - `merge` - recursive map merge used by every layer
//! - `loader` - file and profile layering
//! - `document` - typed document and raw path helpers
//! - `validator` - chart reference checks and module cycle detection
//! - `steps` - active step resolution with component overrides
//!
//! # Example
//!
//! ```rust,no_run
//! use krateoctl::config::{LoadOptions, load_config_and_steps};
//!
//! # fn example() -> anyhow::Result<()> {
//! let result = load_config_and_steps(LoadOptions::new("krateo.yaml"), &[] as &[&str])?;
//! for step in &result.steps {
//!     println!("{} ({})", step.id, step.step_type);
//! }
//! # Ok(())
//! # }
//! ```

pub mod document;
pub mod loader;
pub mod merge;
pub mod steps;
pub mod validator;

use anyhow::Result;
use serde_json::Value;

pub use document::{ComponentConfig, Document, ModuleChart, ModuleConfig, StepDefinition};
pub use loader::{LoadOptions, Loader};
pub use merge::{merge_maps, merge_values};
pub use steps::get_active_steps;
pub use validator::Validator;

use crate::workflow::types::Step;

/// Untyped merged configuration.
pub type RawDocument = serde_json::Map<String, Value>;

/// Merged configuration in raw and typed form.
#[derive(Debug, Clone, Default)]
pub struct Config {
    raw: RawDocument,
    document: Document,
}

impl Config {
    /// Build a configuration from a merged raw document.
    ///
    /// # Errors
    ///
    /// Returns an error when a section of the document has the wrong shape.
    pub fn from_raw(raw: RawDocument) -> Result<Self> {
        let document = document::decode_document(&raw)?;
        Ok(Self {
            raw,
            document,
        })
    }

    /// Apply `path.to.key=value` assignments, then re-decode the document.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed assignment, a path crossing a
    /// non-mapping value, or a result that no longer decodes.
    pub fn apply_sets<S: AsRef<str>>(&mut self, assignments: &[S]) -> Result<()> {
        if assignments.is_empty() {
            return Ok(());
        }
        for assignment in assignments {
            let (path, value) = document::parse_assignment(assignment.as_ref())?;
            let segments: Vec<&str> = path.iter().map(String::as_str).collect();
            tracing::debug!(target: "config", "Setting {}", path.join("."));
            document::set_path(&mut self.raw, &segments, value)?;
        }
        self.document = document::decode_document(&self.raw)?;
        Ok(())
    }

    #[must_use]
    pub const fn raw(&self) -> &RawDocument {
        &self.raw
    }

    #[must_use]
    pub const fn document(&self) -> &Document {
        &self.document
    }

    /// Raw value at a dotted path (`modules.frontend.enabled`).
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments: Vec<&str> = path.split('.').collect();
        document::get_path(&self.raw, &segments)
    }

    /// Boolean at `path`, or `default` when absent or not a boolean.
    #[must_use]
    pub fn get_bool(&self, path: &str, default: bool) -> bool {
        self.get(path).and_then(Value::as_bool).unwrap_or(default)
    }

    /// String at `path`, or `default` when absent or not a string.
    #[must_use]
    pub fn get_string(&self, path: &str, default: &str) -> String {
        self.get(path).and_then(Value::as_str).unwrap_or(default).to_string()
    }

    /// Validate modules and their dependency graph.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigValidation` error for the first failed check.
    pub fn validate(&self) -> Result<()> {
        Validator::new(&self.document).validate()
    }

    /// Resolve the runtime steps.
    ///
    /// # Errors
    ///
    /// Returns a `StepResolution` error for malformed step definitions.
    pub fn active_steps(&self) -> Result<Vec<Step>> {
        get_active_steps(&self.document)
    }
}

/// A loaded, validated configuration with its resolved steps.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub config: Config,
    pub steps: Vec<Step>,
}

/// Load, layer, apply `--set`, validate and resolve steps.
///
/// Every failure here happens before any cluster contact.
///
/// # Errors
///
/// Returns `ConfigLoad`, `ProfileNotFound`, `ConfigValidation` or
/// `StepResolution` errors.
pub fn load_config_and_steps<S: AsRef<str>>(
    opts: LoadOptions,
    assignments: &[S],
) -> Result<LoadResult> {
    let raw = Loader::new(opts).load()?;
    let mut config = Config::from_raw(raw)?;
    config.apply_sets(assignments)?;
    config.validate()?;
    let steps = config.active_steps()?;

    tracing::debug!(
        target: "config",
        "Resolved {} steps ({} skipped)",
        steps.len(),
        steps.iter().filter(|s| s.skip).count()
    );

    Ok(LoadResult {
        config,
        steps,
    })
}
