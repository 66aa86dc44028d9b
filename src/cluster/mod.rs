//! Cluster collaborators.
//!
//! The workflow core talks to the cluster only through the traits in this
//! module. [`kubectl::KubectlClient`] and [`helm::HelmClient`] implement them
//! by driving the `kubectl` and `helm` binaries; tests substitute in-memory
//! fakes.
//!
//! Not-found conditions are reported as
//! [`KrateoError::ResourceNotFound`](crate::core::KrateoError::ResourceNotFound)
//! so callers can recognize them with [`is_not_found`].

pub mod command_builder;
pub mod helm;
pub mod kubectl;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

use crate::core::KrateoError;

/// API group, version and kind of a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    /// Build from an `apiVersion` (`v1` or `group/version`) and a kind.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty or malformed `apiVersion` or an empty kind.
    pub fn parse(api_version: &str, kind: &str) -> Result<Self> {
        let api_version = api_version.trim();
        let kind = kind.trim();
        if kind.is_empty() {
            anyhow::bail!("kind cannot be empty");
        }

        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version),
        };
        if version.is_empty() || version.contains('/') || (api_version.contains('/') && group.is_empty()) {
            anyhow::bail!("invalid apiVersion '{api_version}'");
        }

        Ok(Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        })
    }

    /// `apiVersion` string: `version` for the core group, else `group/version`.
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// A namespaced object reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub gvk: GroupVersionKind,
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(gvk: GroupVersionKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            gvk,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// The not-found error for this reference.
    #[must_use]
    pub fn not_found(&self) -> anyhow::Error {
        KrateoError::ResourceNotFound {
            kind: self.gvk.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
        .into()
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.gvk.kind, self.namespace, self.name)
    }
}

/// A deployed chart release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub name: String,
    pub namespace: String,
    pub chart_name: String,
    pub chart_version: String,
    pub app_version: String,
    pub status: String,
    pub revision: u32,
}

/// Everything needed to install or upgrade a release.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseRequest {
    pub release_name: String,
    pub namespace: String,
    /// Chart name, `oci://` reference, or package URL.
    pub chart: String,
    /// Repository to search for `chart`, when `chart` is a plain name.
    pub repository: Option<String>,
    pub version: Option<String>,
    pub values: Map<String, Value>,
    pub wait: bool,
    pub timeout: Duration,
    pub insecure_skip_tls_verify: bool,
    pub create_namespace: bool,
    pub max_history: u32,
}

/// Reads objects.
#[async_trait]
pub trait Getter: Send + Sync {
    /// Fetch an object, or fail with `ResourceNotFound`.
    async fn get(&self, reference: &ObjectRef) -> Result<Value>;
}

/// Creates or updates objects.
#[async_trait]
pub trait Applier: Send + Sync {
    async fn apply(&self, object: &Value, reference: &ObjectRef) -> Result<()>;
}

/// Deletes objects with foreground propagation.
#[async_trait]
pub trait Deletor: Send + Sync {
    /// Delete an object, or fail with `ResourceNotFound` when it is absent.
    async fn delete(&self, reference: &ObjectRef) -> Result<()>;
}

/// Manages chart releases. Every operation is namespace-scoped.
#[async_trait]
pub trait ChartReleaseManager: Send + Sync {
    /// The release with `name`, or `None` when it does not exist.
    async fn get_release(&self, name: &str, namespace: &str) -> Result<Option<Release>>;

    async fn install(&self, request: &ReleaseRequest) -> Result<Release>;

    async fn upgrade(&self, request: &ReleaseRequest) -> Result<Release>;

    /// Remove a release. An absent release is not an error.
    async fn uninstall(&self, name: &str, namespace: &str) -> Result<()>;
}

/// Whether an error chain carries a not-found condition.
#[must_use]
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<KrateoError>().is_some_and(KrateoError::is_not_found))
}
