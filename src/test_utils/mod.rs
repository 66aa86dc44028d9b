//! Test utilities for krateoctl
//!
//! In-memory stand-ins for the cluster collaborators, so handlers and the
//! workflow engine can be exercised without `kubectl` or `helm`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use krateoctl::test_utils::{FakeCharts, FakeCluster};
//! use krateoctl::workflow::{Collaborators, Workflow};
//! use krateoctl::workflow::types::Operation;
//!
//! let cluster = Arc::new(FakeCluster::new());
//! let charts = Arc::new(FakeCharts::new());
//! let workflow = Workflow::new(
//!     "krateo-system",
//!     Operation::Create,
//!     Collaborators::from_cluster(cluster.clone(), charts.clone()),
//! );
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, Once};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::cluster::{Applier, ChartReleaseManager, Deletor, Getter, ObjectRef, Release, ReleaseRequest};

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; with neither, logging
/// stays off. Safe to call from every test.
///
/// ```bash
/// RUST_LOG=workflow=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

type ObjectKey = (String, String, String, String);

fn key_of(reference: &ObjectRef) -> ObjectKey {
    (
        reference.gvk.api_version(),
        reference.gvk.kind.clone(),
        reference.namespace.clone(),
        reference.name.clone(),
    )
}

fn key_of_object(object: &Value) -> ObjectKey {
    let field = |v: &Value| v.as_str().unwrap_or_default().to_string();
    (
        field(&object["apiVersion"]),
        field(&object["kind"]),
        field(&object["metadata"]["namespace"]),
        field(&object["metadata"]["name"]),
    )
}

/// An in-memory object store implementing [`Getter`], [`Applier`] and
/// [`Deletor`].
///
/// Objects are keyed by apiVersion, kind, namespace and name. Every apply
/// and delete attempt is recorded in call order.
#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<BTreeMap<ObjectKey, Value>>,
    applied: Mutex<Vec<Value>>,
    deleted: Mutex<Vec<ObjectRef>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing object. It must carry `metadata.namespace`.
    pub fn insert_object(&self, object: Value) {
        lock(&self.objects).insert(key_of_object(&object), object);
    }

    /// Make apply and delete fail for objects named `name`.
    pub fn fail_on(&self, name: &str) {
        lock(&self.failing).insert(name.to_string());
    }

    /// Delay every call, to keep a step in flight.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    #[must_use]
    pub fn applied(&self) -> Vec<Value> {
        lock(&self.applied).clone()
    }

    /// `metadata.name` of every applied manifest.
    #[must_use]
    pub fn applied_names(&self) -> Vec<String> {
        self.applied()
            .iter()
            .map(|object| object["metadata"]["name"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[must_use]
    pub fn deleted(&self) -> Vec<ObjectRef> {
        lock(&self.deleted).clone()
    }

    #[must_use]
    pub fn object_count(&self) -> usize {
        lock(&self.objects).len()
    }

    #[must_use]
    pub fn object(&self, reference: &ObjectRef) -> Option<Value> {
        lock(&self.objects).get(&key_of(reference)).cloned()
    }

    async fn pause(&self) {
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_failure(&self, verb: &str, reference: &ObjectRef) -> Result<()> {
        if lock(&self.failing).contains(&reference.name) {
            anyhow::bail!("injected {verb} failure for {reference}");
        }
        Ok(())
    }
}

#[async_trait]
impl Getter for FakeCluster {
    async fn get(&self, reference: &ObjectRef) -> Result<Value> {
        self.pause().await;
        self.object(reference).ok_or_else(|| reference.not_found())
    }
}

#[async_trait]
impl Applier for FakeCluster {
    async fn apply(&self, object: &Value, reference: &ObjectRef) -> Result<()> {
        self.pause().await;
        self.check_failure("apply", reference)?;
        lock(&self.applied).push(object.clone());
        lock(&self.objects).insert(key_of(reference), object.clone());
        Ok(())
    }
}

#[async_trait]
impl Deletor for FakeCluster {
    async fn delete(&self, reference: &ObjectRef) -> Result<()> {
        self.pause().await;
        self.check_failure("delete", reference)?;
        lock(&self.deleted).push(reference.clone());
        match lock(&self.objects).remove(&key_of(reference)) {
            Some(_) => Ok(()),
            None => Err(reference.not_found()),
        }
    }
}

/// A call received by [`FakeCharts`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChartCall {
    GetRelease { name: String, namespace: String },
    Install(ReleaseRequest),
    Upgrade(ReleaseRequest),
    Uninstall { name: String, namespace: String },
}

/// An in-memory [`ChartReleaseManager`] recording every call.
///
/// Installs produce revision 1 with status `deployed`; upgrades bump the
/// stored revision.
#[derive(Default)]
pub struct FakeCharts {
    releases: Mutex<HashMap<(String, String), Release>>,
    calls: Mutex<Vec<ChartCall>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeCharts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a deployed release at revision 1.
    pub fn insert_release(&self, name: &str, namespace: &str) {
        let release = Release {
            name: name.to_string(),
            namespace: namespace.to_string(),
            chart_name: name.to_string(),
            status: "deployed".to_string(),
            revision: 1,
            ..Release::default()
        };
        lock(&self.releases).insert((name.to_string(), namespace.to_string()), release);
    }

    /// Make install, upgrade and uninstall fail for release `name`.
    pub fn fail_on(&self, name: &str) {
        lock(&self.failing).insert(name.to_string());
    }

    #[must_use]
    pub fn calls(&self) -> Vec<ChartCall> {
        lock(&self.calls).clone()
    }

    #[must_use]
    pub fn release(&self, name: &str, namespace: &str) -> Option<Release> {
        lock(&self.releases).get(&(name.to_string(), namespace.to_string())).cloned()
    }

    fn check_failure(&self, verb: &str, name: &str) -> Result<()> {
        if lock(&self.failing).contains(name) {
            anyhow::bail!("injected {verb} failure for release {name}");
        }
        Ok(())
    }

    fn store(&self, request: &ReleaseRequest, revision: u32) -> Release {
        let release = Release {
            name: request.release_name.clone(),
            namespace: request.namespace.clone(),
            chart_name: request.chart.clone(),
            chart_version: request.version.clone().unwrap_or_default(),
            app_version: String::new(),
            status: "deployed".to_string(),
            revision,
        };
        lock(&self.releases).insert(
            (request.release_name.clone(), request.namespace.clone()),
            release.clone(),
        );
        release
    }
}

#[async_trait]
impl ChartReleaseManager for FakeCharts {
    async fn get_release(&self, name: &str, namespace: &str) -> Result<Option<Release>> {
        lock(&self.calls).push(ChartCall::GetRelease {
            name: name.to_string(),
            namespace: namespace.to_string(),
        });
        Ok(self.release(name, namespace))
    }

    async fn install(&self, request: &ReleaseRequest) -> Result<Release> {
        lock(&self.calls).push(ChartCall::Install(request.clone()));
        self.check_failure("install", &request.release_name)?;
        Ok(self.store(request, 1))
    }

    async fn upgrade(&self, request: &ReleaseRequest) -> Result<Release> {
        lock(&self.calls).push(ChartCall::Upgrade(request.clone()));
        self.check_failure("upgrade", &request.release_name)?;
        let revision = self
            .release(&request.release_name, &request.namespace)
            .map_or(1, |existing| existing.revision + 1);
        Ok(self.store(request, revision))
    }

    async fn uninstall(&self, name: &str, namespace: &str) -> Result<()> {
        lock(&self.calls).push(ChartCall::Uninstall {
            name: name.to_string(),
            namespace: namespace.to_string(),
        });
        self.check_failure("uninstall", name)?;
        lock(&self.releases).remove(&(name.to_string(), namespace.to_string()));
        Ok(())
    }
}
