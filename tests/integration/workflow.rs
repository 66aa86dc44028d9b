use serde_json::json;
use std::sync::Arc;

use krateoctl::cluster::{GroupVersionKind, ObjectRef};
use krateoctl::config::{LoadOptions, load_config_and_steps};
use krateoctl::core::KrateoError;
use krateoctl::test_utils::{FakeCharts, FakeCluster, init_test_logging};
use krateoctl::workflow::types::{Operation, StepOutput};
use krateoctl::workflow::{Collaborators, Workflow, first_error};

use crate::common::{TestProject, release_log, release_requests};

const CONFIG: &str = r"
components:
  gateway:
    steps: [gateway]
    helmDefaults:
      replicas: 1
      with:
        wait: true
    stepConfig:
      gateway:
        helmValues:
          replicas: 2
        with:
          version: 0.2.0
  finops:
    enabled: false
    steps: [finops]
steps:
  - id: domain
    type: var
    with:
      name: DOMAIN
      value: krateo.example.com
  - id: cluster-ip
    type: var
    with:
      name: CLUSTER_IP
      valueFrom:
        apiVersion: v1
        kind: Service
        metadata:
          name: ingress
          namespace: ingress-system
        selector: .spec.clusterIP
  - id: settings
    type: object
    with:
      apiVersion: v1
      kind: ConfigMap
      metadata:
        name: settings
      data:
        host: api.$DOMAIN
        ip: $CLUSTER_IP
  - id: gateway
    type: chart
    with:
      url: https://charts.krateo.io/krateo-gateway-0.1.0.tgz
      values:
        host: gateway.$DOMAIN
  - id: finops
    type: chart
    with:
      repository: https://charts.krateo.io
      name: finops
";

fn settings() -> ObjectRef {
    ObjectRef::new(GroupVersionKind::parse("v1", "ConfigMap").unwrap(), "krateo-system", "settings")
}

fn fakes() -> (Arc<FakeCluster>, Arc<FakeCharts>) {
    let cluster = Arc::new(FakeCluster::new());
    cluster.insert_object(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {"name": "ingress", "namespace": "ingress-system"},
        "spec": {"clusterIP": "10.96.0.10"},
    }));
    (cluster, Arc::new(FakeCharts::new()))
}

fn load(project: &TestProject) -> Vec<krateoctl::workflow::types::Step> {
    init_test_logging(None);
    let config = project.write_config(CONFIG).unwrap();
    load_config_and_steps(LoadOptions::new(config), &[] as &[&str]).unwrap().steps
}

#[tokio::test]
async fn test_apply_end_to_end() {
    let project = TestProject::new().unwrap();
    let steps = load(&project);
    let (cluster, charts) = fakes();

    let mut workflow = Workflow::new(
        "krateo-system",
        Operation::Create,
        Collaborators::from_cluster(cluster.clone(), charts.clone()),
    );
    let results = workflow.run(&steps, |s| s.skip).await;
    first_error(&results).unwrap();

    // the disabled component's step never ran
    assert!(results[4].is_none());
    assert_eq!(release_log(&charts), vec!["install krateo-system/krateo-gateway"]);

    let applied = cluster.object(&settings()).unwrap();
    assert_eq!(applied["data"], json!({"host": "api.krateo.example.com", "ip": "10.96.0.10"}));
    assert_eq!(applied["metadata"]["namespace"], json!("krateo-system"));

    let request = &release_requests(&charts)[0];
    assert_eq!(request.chart, "https://charts.krateo.io/krateo-gateway-0.1.0.tgz");
    assert_eq!(request.version.as_deref(), Some("0.2.0"));
    assert!(request.wait);
    assert_eq!(request.values["replicas"], json!(2));
    assert_eq!(request.values["host"], json!("gateway.krateo.example.com"));

    match results[1].as_ref().and_then(|r| r.output.as_ref()) {
        Some(StepOutput::Var(var)) => assert_eq!(var.value, "10.96.0.10"),
        other => panic!("unexpected output {other:?}"),
    }
}

#[tokio::test]
async fn test_second_apply_upgrades() {
    let project = TestProject::new().unwrap();
    let steps = load(&project);
    let (cluster, charts) = fakes();
    let collaborators = Collaborators::from_cluster(cluster.clone(), charts.clone());

    for _ in 0..2 {
        let mut workflow = Workflow::new("krateo-system", Operation::Update, collaborators.clone());
        let results = workflow.run(&steps, |s| s.skip).await;
        first_error(&results).unwrap();
    }

    assert_eq!(
        release_log(&charts),
        vec!["install krateo-system/krateo-gateway", "upgrade krateo-system/krateo-gateway"]
    );
}

#[tokio::test]
async fn test_uninstall_reverses_order() {
    let project = TestProject::new().unwrap();
    let steps = load(&project);
    let (cluster, charts) = fakes();
    let collaborators = Collaborators::from_cluster(cluster.clone(), charts.clone());

    let mut apply = Workflow::new("krateo-system", Operation::Create, collaborators.clone());
    first_error(&apply.run(&steps, |s| s.skip).await).unwrap();

    let mut uninstall = Workflow::new("krateo-system", Operation::Delete, collaborators);
    let results = uninstall.run(&steps, |s| s.skip).await;
    first_error(&results).unwrap();

    assert_eq!(
        release_log(&charts),
        vec!["install krateo-system/krateo-gateway", "uninstall krateo-system/krateo-gateway"]
    );
    assert!(cluster.object(&settings()).is_none());
    assert_eq!(cluster.deleted(), vec![settings()]);
}

#[tokio::test]
async fn test_uninstall_starts_from_the_last_step() {
    let project = TestProject::new().unwrap();
    let steps = load(&project);
    let (cluster, charts) = fakes();
    let collaborators = Collaborators::from_cluster(cluster.clone(), charts.clone());

    let mut apply = Workflow::new("krateo-system", Operation::Create, collaborators.clone());
    first_error(&apply.run(&steps, |s| s.skip).await).unwrap();

    charts.fail_on("krateo-gateway");
    let mut uninstall = Workflow::new("krateo-system", Operation::Delete, collaborators);
    let results = uninstall.run(&steps, |s| s.skip).await;

    // the chart is the last active step, so its failure stops the manifest delete
    assert!(results[3].as_ref().unwrap().error.is_some());
    assert!(results[..3].iter().all(Option::is_none));
    assert!(cluster.deleted().is_empty());
    assert!(cluster.object(&settings()).is_some());
}

#[tokio::test]
async fn test_failure_stops_the_run() {
    let project = TestProject::new().unwrap();
    let steps = load(&project);
    // no ingress service: the valueFrom lookup fails
    let cluster = Arc::new(FakeCluster::new());
    let charts = Arc::new(FakeCharts::new());

    let mut workflow = Workflow::new(
        "krateo-system",
        Operation::Create,
        Collaborators::from_cluster(cluster.clone(), charts.clone()),
    );
    let results = workflow.run(&steps, |s| s.skip).await;

    assert!(results[0].as_ref().unwrap().is_success());
    assert!(results[1].as_ref().unwrap().error.is_some());
    assert!(results[2..].iter().all(Option::is_none));
    assert!(release_log(&charts).is_empty());

    let err = first_error(&results).unwrap_err();
    match err.downcast_ref::<KrateoError>() {
        Some(KrateoError::StepFailed { id, reason }) => {
            assert_eq!(id, "cluster-ip");
            assert!(reason.contains("not found"), "reason: {reason}");
        }
        other => panic!("unexpected error {other:?}"),
    }
}
