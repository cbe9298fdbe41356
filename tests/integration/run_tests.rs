//! Full run integration tests.
//!
//! Tests for complete runs, including result aggregation, cancellation,
//! timeouts, and parallel execution.

use crate::fixtures::{fast_config, profile, run_yaml, version_params};
use container_audit::engine::cancel::CancellationToken;
use container_audit::engine::result::{Actual, ControlReport, Outcome};
use container_audit::engine::runner::{RunObserver, RunState, Runner, RunnerConfig};
use container_audit::{run, AuditConfig, AuditError, ExitStatus, ParameterSet, ProfileDocument};
use std::time::{Duration, Instant};

const VERSION_PROFILE: &str = r#"
name: reference
controls:
  - name: tool-version
    impact: 1.0
    checks:
      - command: echo 1.2.3
        exit_status: 0
        stdout: '%version%'
"#;

#[test]
fn test_matching_command_passes() {
    let report = run_yaml(VERSION_PROFILE, &version_params());

    assert!(report.passed());
    assert_eq!(report.exit_status(), ExitStatus::Passed);
    let result = report.results().next().unwrap();
    assert_eq!(result.outcome, Outcome::Passed);
    assert!(matches!(
        &result.actual,
        Some(Actual::Command { exit_code: Some(0), stdout }) if stdout.trim() == "1.2.3"
    ));
}

#[test]
fn test_wrong_exit_status_fails() {
    let yaml = r#"
controls:
  - name: falsy
    checks:
      - command: "false"
        exit_status: 0
"#;
    let report = run_yaml(yaml, &ParameterSet::new());

    assert!(!report.passed());
    assert_eq!(report.exit_status().code(), 1);
    let result = report.results().next().unwrap();
    assert_eq!(result.outcome, Outcome::AssertionFailed);
    assert!(matches!(result.actual, Some(Actual::Command { exit_code: Some(1), .. })));
}

#[test]
fn test_stdout_mismatch_fails() {
    let yaml = r#"
controls:
  - name: tool-version
    checks:
      - command: echo 2.0.0
        stdout: '%version%'
"#;
    let report = run_yaml(yaml, &version_params());
    let result = report.results().next().unwrap();
    assert_eq!(result.outcome, Outcome::AssertionFailed);
    assert!(result.message.as_deref().unwrap_or("").contains("stdout did not match"));
}

#[test]
fn test_missing_directory_fails() {
    let yaml = r#"
controls:
  - name: dirs
    checks:
      - directory: /nonexistent-xyz
      - directory: /
"#;
    let report = run_yaml(yaml, &ParameterSet::new());

    let results: Vec<_> = report.results().collect();
    assert_eq!(results[0].outcome, Outcome::AssertionFailed);
    assert_eq!(results[0].actual, Some(Actual::Directory { exists: false }));
    assert_eq!(results[1].outcome, Outcome::Passed);
    assert!(!report.passed());
}

#[test]
fn test_regular_file_is_not_a_directory() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let params = ParameterSet::new()
        .with_scalar("file", file.path().display().to_string())
        .unwrap();
    let yaml = r#"
controls:
  - name: dirs
    checks:
      - directory: '%file%'
"#;
    let report = run_yaml(yaml, &params);

    let result = report.results().next().unwrap();
    assert_eq!(result.outcome, Outcome::AssertionFailed);
    assert_eq!(result.actual, Some(Actual::Directory { exists: false }));
    assert!(result.message.as_deref().unwrap_or("").ends_with("exists but is not a directory"));
}

#[test]
fn test_unset_environment_variable_fails() {
    let yaml = r#"
controls:
  - name: env
    checks:
      - env: CONTAINER_AUDIT_TEST_SURELY_UNSET_VAR
        equals: "true"
"#;
    let report = run_yaml(yaml, &ParameterSet::new());
    let result = report.results().next().unwrap();
    assert_eq!(result.outcome, Outcome::AssertionFailed);
    assert_eq!(result.actual, Some(Actual::Env { value: None }));
}

#[test]
fn test_environment_variable_exact_match() {
    // PATH is set for every test process
    let path = std::env::var("PATH").unwrap();
    let params = ParameterSet::new().with_scalar("path", path).unwrap();
    let yaml = r#"
controls:
  - name: env
    checks:
      - env: PATH
        equals: '%path%'
"#;
    let report = run_yaml(yaml, &params);
    assert!(report.passed());
}

#[test]
fn test_missing_parameter_runs_nothing() {
    let doc = ProfileDocument::parse(VERSION_PROFILE, "inline").unwrap();
    let err = run(&doc, &ParameterSet::new(), &AuditConfig::default()).unwrap_err();

    assert!(matches!(err, AuditError::Configuration(_)));
    assert_eq!(err.exit_status().code(), 2);
}

#[test]
fn test_no_short_circuit_within_control() {
    let yaml = r#"
controls:
  - name: mixed
    checks:
      - command: "false"
      - directory: /nonexistent-xyz
      - command: "true"
"#;
    let report = run_yaml(yaml, &ParameterSet::new());
    let outcomes: Vec<_> = report.results().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        [Outcome::AssertionFailed, Outcome::AssertionFailed, Outcome::Passed]
    );
    assert!(!report.controls()[0].passed());
}

#[test]
fn test_control_without_checks_passes() {
    let report = run_yaml("controls:\n  - name: empty\n", &ParameterSet::new());
    assert!(report.passed());
    assert!(report.controls()[0].passed());
    assert_eq!(report.summary().checks_total, 0);
}

#[test]
fn test_empty_profile_passes() {
    let report = run_yaml("controls: []\n", &ParameterSet::new());
    assert!(report.passed());
    assert!(report.controls().is_empty());
}

#[test]
fn test_repeated_runs_agree() {
    let yaml = r#"
controls:
  - name: a
    checks:
      - command: echo 1.2.3
        stdout: '%version%'
      - directory: /nonexistent-xyz
"#;
    let first = run_yaml(yaml, &version_params());
    let second = run_yaml(yaml, &version_params());

    let outcomes = |r: &container_audit::engine::result::Report| r.results().map(|c| c.outcome).collect::<Vec<_>>();
    assert_eq!(outcomes(&first), outcomes(&second));
    assert_eq!(first.passed(), second.passed());
}

#[test]
fn test_results_follow_declaration_order() {
    let yaml = r#"
controls:
  - name: first
    checks:
      - command: "true"
      - directory: /
  - name: second
    checks:
      - command: "true"
"#;
    let report = run_yaml(yaml, &ParameterSet::new());
    let order: Vec<(&str, usize)> = report.results().map(|r| (r.control.as_str(), r.index)).collect();
    assert_eq!(order, [("first", 0), ("first", 1), ("second", 0)]);
}

#[test]
fn test_relaxed_version_matches_any_release() {
    let yaml = r#"
strict_versions: false
controls:
  - name: ruby
    checks:
      - command: echo ruby 3.4.7
        stdout: '^ruby %~ruby_version%'
"#;
    let params = ParameterSet::new().with_scalar("ruby_version", "3.1").unwrap();
    let report = run_yaml(yaml, &params);
    assert!(report.passed());

    let strict = run_yaml(&yaml.replace("strict_versions: false", "strict_versions: true"), &params);
    assert_eq!(strict.results().next().unwrap().outcome, Outcome::AssertionFailed);
}

#[test]
fn test_command_timeout_is_execution_failure() {
    let yaml = r#"
controls:
  - name: slow
    checks:
      - command: sleep 30
        timeout_secs: 1
"#;
    let start = Instant::now();
    let report = run_yaml(yaml, &ParameterSet::new());

    assert!(start.elapsed() < Duration::from_secs(10));
    let result = report.results().next().unwrap();
    assert_eq!(result.outcome, Outcome::ExecutionFailed);
    assert!(result.message.as_deref().unwrap_or("").contains("timed out"));
}

#[test]
fn test_background_job_does_not_outlive_check() {
    let yaml = r#"
controls:
  - name: detached
    checks:
      - command: sleep 5 & echo hi
        stdout: '^hi'
        timeout_secs: 1
"#;
    let start = Instant::now();
    let report = run_yaml(yaml, &ParameterSet::new());

    assert!(start.elapsed() < Duration::from_secs(4), "took {:?}", start.elapsed());
    assert!(report.passed());
}

#[test]
fn test_largest_timeout_still_runs() {
    let yaml = r#"
controls:
  - name: patient
    checks:
      - command: echo done
        timeout_secs: 18446744073709551615
"#;
    let report = run_yaml(yaml, &ParameterSet::new());
    assert!(report.passed());
}

#[test]
fn test_spawn_failure_is_not_fatal() {
    let yaml = r#"
controls:
  - name: missing-binary
    checks:
      - command: definitely-not-a-real-binary-xyz
      - command: "true"
"#;
    let report = run_yaml(yaml, &ParameterSet::new());
    let results: Vec<_> = report.results().collect();
    // The shell reports a missing binary as exit status 127
    assert!(!results[0].passed);
    assert_eq!(results[1].outcome, Outcome::Passed);
}

struct CancelAfterFirst {
    token: CancellationToken,
}

impl RunObserver for CancelAfterFirst {
    fn control_finished(&mut self, _report: &ControlReport) {
        self.token.cancel();
    }
}

#[test]
fn test_cancellation_marks_remaining_checks() {
    let yaml = r#"
controls:
  - name: one
    checks:
      - command: "true"
  - name: two
    checks:
      - command: "true"
      - directory: /
"#;
    let built = profile(yaml, &ParameterSet::new()).unwrap();
    let runner = Runner::new(fast_config());
    assert_eq!(runner.state(), RunState::NotStarted);
    let token = runner.cancellation();
    let report = runner.with_observer(CancelAfterFirst { token }).run(&built);

    assert!(report.cancelled());
    assert!(!report.passed());
    assert_eq!(report.exit_status(), ExitStatus::Failed);

    let outcomes: Vec<_> = report.results().map(|r| r.outcome).collect();
    assert_eq!(outcomes, [Outcome::Passed, Outcome::Cancelled, Outcome::Cancelled]);
    assert!(report.results().filter(|r| r.outcome == Outcome::Cancelled).all(|r| r.actual.is_none()));
    assert_eq!(report.summary().checks_cancelled, 2);
}

#[test]
fn test_deadline_terminates_running_command() {
    let yaml = r#"
controls:
  - name: slow
    checks:
      - command: sleep 30
  - name: after
    checks:
      - directory: /
"#;
    let built = profile(yaml, &ParameterSet::new()).unwrap();
    let config = RunnerConfig {
        cancel: CancellationToken::new().with_deadline(Instant::now() + Duration::from_millis(300)),
        ..fast_config()
    };

    let start = Instant::now();
    let report = Runner::new(config).run(&built);

    assert!(start.elapsed() < Duration::from_secs(10));
    let outcomes: Vec<_> = report.results().map(|r| r.outcome).collect();
    assert_eq!(outcomes, [Outcome::Cancelled, Outcome::Cancelled]);
}

#[test]
fn test_parallel_run_keeps_declaration_order() {
    let yaml = r#"
controls:
  - name: a
    checks:
      - command: sleep 0.3
  - name: b
    checks:
      - command: "true"
  - name: c
    checks:
      - command: sleep 0.1
  - name: d
    checks:
      - directory: /nonexistent-xyz
"#;
    let built = profile(yaml, &ParameterSet::new()).unwrap();
    let config = RunnerConfig {
        parallel: true,
        max_parallel: 4,
        ..fast_config()
    };
    let report = Runner::new(config).run(&built);

    let names: Vec<&str> = report.controls().iter().map(|c| c.name()).collect();
    assert_eq!(names, ["a", "b", "c", "d"]);
    assert!(report.controls()[..3].iter().all(|c| c.passed()));
    assert!(!report.controls()[3].passed());
}

#[test]
fn test_run_entry_point_applies_config() {
    let doc = ProfileDocument::parse(VERSION_PROFILE, "inline").unwrap();
    let config = AuditConfig {
        parallel: true,
        max_parallel: 2,
        ..AuditConfig::default()
    };
    let report = run(&doc, &version_params(), &config).unwrap();
    assert!(report.passed());
    assert_eq!(report.profile(), "reference");
}

#[test]
fn test_run_entry_point_with_unbounded_deadline() {
    let doc = ProfileDocument::parse(VERSION_PROFILE, "inline").unwrap();
    let config = AuditConfig {
        deadline: Some(Duration::from_secs(u64::MAX)),
        ..AuditConfig::default()
    };
    let report = run(&doc, &version_params(), &config).unwrap();
    assert!(report.passed());
    assert!(!report.cancelled());
}
