use assert_cmd::Command;
use predicates::prelude::*;

use crate::common::TestProject;

const CONFIG: &str = r"
modules:
  core:
    chart:
      repository: https://charts.krateo.io
      name: krateo-core
  frontend:
    depends: [core]
components:
  portal:
    steps: [portal]
    helmDefaults:
      replicas: 1
  extras:
    enabled: false
    steps: [extras]
steps:
  - id: domain
    type: var
    with:
      name: DOMAIN
      value: krateo.example.com
  - id: portal
    type: chart
    with:
      repository: https://charts.krateo.io
      name: portal
      values:
        host: portal.$DOMAIN
  - id: extras
    type: object
    with:
      apiVersion: v1
      kind: ConfigMap
      metadata:
        name: extras
";

fn project() -> TestProject {
    let project = TestProject::new().unwrap();
    project.write_config(CONFIG).unwrap();
    project
}

#[test]
fn test_plan_prints_resolved_steps() {
    let project = project();
    let output = project.run(&["plan"]).unwrap();

    assert!(output.success, "plan failed: {}", output.stderr);
    assert_eq!(output.stdout.matches("---\n").count(), 3);
    assert!(output.stdout.contains("id: domain\ntype: var\n"));
    assert!(output.stdout.contains("replicas: 1"));
    // tokens are expanded at run time, not by plan
    assert!(output.stdout.contains("host: portal.$DOMAIN"));
    assert!(output.stdout.contains("id: extras\ntype: object\nskip: true\n"));
}

#[test]
fn test_plan_active_only_hides_disabled_components() {
    let project = project();
    let output = project.run(&["plan", "--active-only"]).unwrap();

    assert!(output.success, "plan failed: {}", output.stderr);
    assert_eq!(output.stdout.matches("---\n").count(), 2);
    assert!(!output.stdout.contains("id: extras"));
}

#[test]
fn test_overrides_and_profiles_are_layered() {
    let project = project();
    project
        .write_overrides(
            r"
profile: dev
components:
  portal:
    stepConfig:
      portal:
        helmValues:
          replicas: 3
profiles:
  dev:
    components:
      extras:
        enabled: true
",
        )
        .unwrap();

    let output = project.run(&["plan"]).unwrap();

    assert!(output.success, "plan failed: {}", output.stderr);
    assert!(output.stdout.contains("replicas: 3"));
    assert!(!output.stdout.contains("skip: true"));
    assert!(!output.stdout.contains("profiles"));
}

#[test]
fn test_profile_file_next_to_overrides() {
    let project = project();
    project
        .write(
            "krateo-overrides.prod.yaml",
            "components:\n  portal:\n    helmDefaults:\n      replicas: 5\n",
        )
        .unwrap();

    let output = project.run(&["plan", "--profile", "prod"]).unwrap();

    assert!(output.success, "plan failed: {}", output.stderr);
    assert!(output.stdout.contains("replicas: 5"));
}

#[test]
fn test_set_flag_overrides_merged_document() {
    let project = project();
    let output = project
        .run(&["plan", "--set", "components.portal.enabled=false", "--active-only"])
        .unwrap();

    assert!(output.success, "plan failed: {}", output.stderr);
    assert!(!output.stdout.contains("id: portal"));
    assert!(output.stdout.contains("id: domain"));
}

#[test]
fn test_no_progress_env_accepts_common_values() {
    let project = project();
    for value in ["1", "true", "0", "off", ""] {
        let output = project.run_with_env(&["plan"], &[("KRATEOCTL_NO_PROGRESS", value)]).unwrap();
        assert!(output.success, "KRATEOCTL_NO_PROGRESS={value}: {}", output.stderr);
        assert_eq!(output.stdout.matches("---\n").count(), 3);
    }
}

#[test]
fn test_plan_digest() {
    let project = project();
    Command::cargo_bin("krateoctl")
        .unwrap()
        .current_dir(project.path())
        .args(["plan", "--digest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# digest: sha256:"));
}

#[test]
fn test_undefined_profile_fails() {
    let project = project();
    project
        .write_overrides("profiles:\n  dev:\n    components: {}\n")
        .unwrap();
    let output = project.run(&["plan", "--profile", "nope"]).unwrap();

    assert!(!output.success);
    assert_eq!(output.code, Some(1));
    assert!(output.stderr.contains("Profile 'nope' not found"));
}

#[test]
fn test_missing_config_fails() {
    let project = TestProject::new().unwrap();
    let output = project.run(&["plan"]).unwrap();

    assert!(!output.success);
    assert!(output.stderr.contains("Failed to load configuration from"));
}

#[test]
fn test_circular_module_dependency_fails() {
    let project = TestProject::new().unwrap();
    project
        .write_config("modules:\n  a:\n    depends: [b]\n  b:\n    depends: [a]\nsteps: []\n")
        .unwrap();

    Command::cargo_bin("krateoctl")
        .unwrap()
        .current_dir(project.path())
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("circular dependency detected"));
}

#[test]
fn test_step_without_type_fails() {
    let project = TestProject::new().unwrap();
    project.write_config("steps:\n  - id: broken\n").unwrap();

    let output = project.run(&["plan"]).unwrap();

    assert!(!output.success);
    assert!(output.stderr.contains("broken"));
}

#[test]
fn test_no_steps() {
    let project = TestProject::new().unwrap();
    project.write_config("steps: []\n").unwrap();

    let output = project.run(&["plan"]).unwrap();
    assert!(output.success);
    assert!(output.stdout.is_empty(), "stdout: {}", output.stdout);
    assert!(output.stderr.contains("No steps configured"));
}

#[test]
fn test_apply_without_active_steps_needs_no_cluster() {
    let project = TestProject::new().unwrap();
    project
        .write_config(
            "components:\n  all:\n    enabled: false\n    steps: [a]\nsteps:\n  - id: a\n    type: chart\n    with: {url: https://x/a-1.0.0.tgz}\n",
        )
        .unwrap();

    let output = project.run(&["apply", "--namespace", "test"]).unwrap();
    assert!(output.success, "apply failed: {}", output.stderr);
    assert!(output.stdout.contains("No steps configured"));
}
