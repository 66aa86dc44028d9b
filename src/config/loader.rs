//! Layered configuration loading.
//!
//! The loader reads the main configuration file and, optionally, a user
//! overrides file plus any number of named profiles. Layers are merged with
//! [`merge_maps`] in ascending precedence:
//!
//! 1. the main configuration (`krateo.yaml`)
//! 2. profile overrides, in the order the profiles were selected; for each
//!    profile the sibling file `krateo-overrides.<profile>.yaml` is applied
//!    first, then the matching entry of the in-document `profiles` map
//! 3. the overrides document itself (`krateo-overrides.yaml`)
//!
//! The overrides document always has the last word. Its `profile` and
//! `profiles` keys only drive selection and never reach the merged result.
//!
//! ```yaml
//! # krateo-overrides.yaml
//! profile: dev            # used when --profile is not given
//! profiles:
//!   dev:
//!     components:
//!       finops:
//!         enabled: false
//! modules:
//!   frontend:
//!     enabled: true
//! ```

use anyhow::Result;
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::RawDocument;
use super::merge::merge_maps;
use crate::core::KrateoError;

const PROFILE_KEY: &str = "profile";
const PROFILES_KEY: &str = "profiles";

/// Options controlling which files are layered.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Main configuration file; must exist.
    pub config_path: PathBuf,
    /// Overrides file; optional, a missing file is tolerated.
    pub overrides_path: Option<PathBuf>,
    /// Comma separated profile list; falls back to the `profile` key of the
    /// overrides document when absent or blank.
    pub profile: Option<String>,
}

impl LoadOptions {
    /// Options for a single configuration file without overrides.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides_path: impl Into<PathBuf>) -> Self {
        self.overrides_path = Some(overrides_path.into());
        self
    }

    #[must_use]
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }
}

/// Reads and merges configuration layers into one raw document.
#[derive(Debug, Clone)]
pub struct Loader {
    opts: LoadOptions,
}

impl Loader {
    /// Create a loader for the given options.
    #[must_use]
    pub const fn new(opts: LoadOptions) -> Self {
        Self {
            opts,
        }
    }

    /// Load the main configuration and apply overrides and profiles.
    ///
    /// # Errors
    ///
    /// - [`KrateoError::ConfigLoad`] when a present file cannot be read or parsed
    /// - [`KrateoError::ProfileNotFound`] when the overrides carry a `profiles`
    ///   map without an entry for a selected profile
    pub fn load(&self) -> Result<RawDocument> {
        let mut config = load_file(&self.opts.config_path)?;

        let Some(overrides_path) = self.opts.overrides_path.as_deref() else {
            return Ok(config);
        };

        let mut base_overrides = load_optional_file(overrides_path)?.unwrap_or_default();

        let selected = self
            .opts
            .profile
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .or_else(|| base_overrides.get(PROFILE_KEY).and_then(Value::as_str).map(str::to_string))
            .unwrap_or_default();
        let profiles = parse_profiles(&selected);

        let mut profile_overrides = Map::new();
        if !profiles.is_empty() {
            for profile in &profiles {
                let profile_path = profile_file_path(overrides_path, profile);
                if let Some(data) = load_optional_file(&profile_path)? {
                    tracing::debug!(
                        target: "config",
                        "Applying profile '{}' from {}",
                        profile,
                        profile_path.display()
                    );
                    merge_maps(&mut profile_overrides, &data);
                }
            }

            // Without a `profiles` map, files are the only source and may be absent.
            if let Some(in_document) = in_document_profiles(&base_overrides, overrides_path)? {
                for profile in &profiles {
                    match in_document.get(profile.as_str()) {
                        Some(Value::Object(entry)) => {
                            tracing::debug!(target: "config", "Applying in-document profile '{}'", profile);
                            merge_maps(&mut profile_overrides, entry);
                        }
                        Some(other) => {
                            return Err(KrateoError::ConfigLoad {
                                path: overrides_path.display().to_string(),
                                reason: format!(
                                    "profile '{profile}' must be a mapping, got {}",
                                    type_name(other)
                                ),
                            }
                            .into());
                        }
                        None => {
                            return Err(KrateoError::ProfileNotFound {
                                profile: profile.clone(),
                            }
                            .into());
                        }
                    }
                }
            }
        }

        base_overrides.remove(PROFILES_KEY);
        base_overrides.remove(PROFILE_KEY);

        if !profile_overrides.is_empty() {
            merge_maps(&mut config, &profile_overrides);
        }
        if !base_overrides.is_empty() {
            merge_maps(&mut config, &base_overrides);
        }

        Ok(config)
    }
}

/// Split a comma separated profile list, trimming blanks and keeping order.
#[must_use]
pub fn parse_profiles(s: &str) -> Vec<String> {
    s.split(',').map(str::trim).filter(|p| !p.is_empty()).map(str::to_string).collect()
}

/// Path of the profile file next to the overrides file:
/// `dir/krateo-overrides.yaml` + `dev` gives `dir/krateo-overrides.dev.yaml`.
#[must_use]
pub fn profile_file_path(overrides_path: &Path, profile: &str) -> PathBuf {
    let stem = overrides_path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let file_name = match overrides_path.extension() {
        Some(ext) => format!("{stem}.{profile}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{profile}"),
    };
    overrides_path.with_file_name(file_name)
}

fn in_document_profiles<'a>(
    overrides: &'a RawDocument,
    overrides_path: &Path,
) -> Result<Option<&'a Map<String, Value>>> {
    match overrides.get(PROFILES_KEY) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(KrateoError::ConfigLoad {
            path: overrides_path.display().to_string(),
            reason: format!("profiles must be a mapping, got {}", type_name(other)),
        }
        .into()),
    }
}

/// Read and parse a YAML file into a raw document. Empty files yield an
/// empty document.
pub fn load_file(path: &Path) -> Result<RawDocument> {
    let content = fs::read_to_string(path).map_err(|e| KrateoError::ConfigLoad {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_document(&content, path)
}

/// Like [`load_file`] but a missing file (or a directory) yields `None`.
pub fn load_optional_file(path: &Path) -> Result<Option<RawDocument>> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => load_file(path).map(Some),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(KrateoError::ConfigLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
        .into()),
    }
}

fn parse_document(content: &str, path: &Path) -> Result<RawDocument> {
    let value: Value = serde_yaml::from_str(content).map_err(|e| KrateoError::ConfigLoad {
        path: path.display().to_string(),
        reason: format!("invalid YAML: {e}"),
    })?;

    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(KrateoError::ConfigLoad {
            path: path.display().to_string(),
            reason: format!("top-level document must be a mapping, got {}", type_name(&other)),
        }
        .into()),
    }
}

pub(crate) const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
