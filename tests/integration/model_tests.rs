//! Profile construction tests.
//!
//! Every error here must surface before a single check executes.

use crate::fixtures::{profile, version_params};
use container_audit::{BuildOptions, Check, ConfigurationError, ParamValue, ParameterSet, Profile, ProfileDocument};

fn command_of(check: &Check) -> &str {
    match check {
        Check::Command(c) => c.command(),
        other => panic!("expected command check, got {}", other),
    }
}

#[test]
fn test_missing_parameter_is_configuration_error() {
    let yaml = r#"
controls:
  - name: tool
    checks:
      - command: tool --version
        stdout: '%version%'
"#;
    let err = profile(yaml, &ParameterSet::new()).unwrap_err();
    assert!(matches!(err.root(), ConfigurationError::UnknownParameter { name } if name == "version"));
    assert!(err.to_string().contains("control 'tool' check #1"));
}

#[test]
fn test_for_each_expands_in_list_order() {
    let yaml = r#"
controls:
  - name: plugins
    checks:
      - command: plugin show %plugin%
        for_each: plugins
        as: plugin
      - directory: /tmp
"#;
    let params = ParameterSet::new()
        .with_list("plugins", ["train-k8s-container", "inspec-reporter-json-min"])
        .unwrap();
    let built = profile(yaml, &params).unwrap();
    let checks = built.controls()[0].checks();

    assert_eq!(checks.len(), 3);
    assert_eq!(command_of(&checks[0]), "plugin show train-k8s-container");
    assert_eq!(command_of(&checks[1]), "plugin show inspec-reporter-json-min");
    assert!(matches!(checks[2], Check::DirectoryExists(_)));
}

#[test]
fn test_for_each_default_binding_and_empty_list() {
    let yaml = r#"
controls:
  - name: items
    checks:
      - command: echo %item%
        for_each: things
"#;
    let one = ParameterSet::new().with_list("things", ["a"]).unwrap();
    let built = profile(yaml, &one).unwrap();
    assert_eq!(command_of(&built.controls()[0].checks()[0]), "echo a");

    let none = ParameterSet::new().with_list("things", Vec::<String>::new()).unwrap();
    let built = profile(yaml, &none).unwrap();
    assert!(built.controls()[0].checks().is_empty());
}

#[test]
fn test_for_each_over_scalar_is_rejected() {
    let yaml = r#"
controls:
  - name: items
    checks:
      - command: echo %item%
        for_each: version
"#;
    let err = profile(yaml, &version_params()).unwrap_err();
    assert!(matches!(err.root(), ConfigurationError::NotAList { .. }));
}

#[test]
fn test_list_used_as_scalar_is_rejected() {
    let yaml = r#"
controls:
  - name: items
    checks:
      - command: echo %things%
"#;
    let params = ParameterSet::new().with_list("things", ["a", "b"]).unwrap();
    let err = profile(yaml, &params).unwrap_err();
    assert!(matches!(err.root(), ConfigurationError::ListAsScalar { .. }));
}

#[test]
fn test_invalid_pattern_is_rejected() {
    let yaml = r#"
controls:
  - name: bad
    checks:
      - command: "true"
        stdout: 'unclosed('
"#;
    let err = profile(yaml, &ParameterSet::new()).unwrap_err();
    assert!(matches!(err.root(), ConfigurationError::InvalidPattern { .. }));
}

#[test]
fn test_shell_percent_survives_substitution() {
    let yaml = r#"
controls:
  - name: date
    checks:
      - command: date +%Y-%m && echo 100%%
"#;
    let built = profile(yaml, &ParameterSet::new()).unwrap();
    assert_eq!(command_of(&built.controls()[0].checks()[0]), "date +%Y-%m && echo 100%");
}

#[test]
fn test_structural_errors() {
    let cases = [
        // no kind
        "controls:\n  - name: a\n    checks:\n      - exit_status: 0\n",
        // two kinds
        "controls:\n  - name: a\n    checks:\n      - command: 'true'\n        directory: /tmp\n",
        // field from another kind
        "controls:\n  - name: a\n    checks:\n      - directory: /tmp\n        stdout: x\n",
        // env without equals
        "controls:\n  - name: a\n    checks:\n      - env: HOME\n",
        // as without for_each
        "controls:\n  - name: a\n    checks:\n      - command: 'true'\n        as: x\n",
        // impact out of range
        "controls:\n  - name: a\n    impact: 1.5\n",
        // empty command
        "controls:\n  - name: a\n    checks:\n      - command: ''\n",
    ];

    for yaml in cases {
        assert!(profile(yaml, &ParameterSet::new()).is_err(), "accepted: {}", yaml);
    }
}

#[test]
fn test_unknown_fields_fail_to_parse() {
    let err = ProfileDocument::parse("controls:\n  - name: a\n    severity: high\n", "inline").unwrap_err();
    assert!(matches!(err, ConfigurationError::Parse { .. }));
}

#[test]
fn test_duplicate_control_names() {
    let yaml = "controls:\n  - name: same\n  - name: same\n";
    let err = profile(yaml, &ParameterSet::new()).unwrap_err();
    assert!(matches!(err, ConfigurationError::DuplicateControl { ref name } if name == "same"));
}

#[test]
fn test_version_mode_override() {
    let yaml = r#"
strict_versions: true
controls:
  - name: ruby
    checks:
      - command: ruby --version
        stdout: 'ruby %~ruby_version%'
"#;
    let doc = ProfileDocument::parse(yaml, "inline").unwrap();
    let params = ParameterSet::new().with_scalar("ruby_version", "3.1").unwrap();

    let strict = Profile::build(&doc, &params, &BuildOptions::default()).unwrap();
    let relaxed = Profile::build(&doc, &params, &BuildOptions { strict_versions: Some(false) }).unwrap();

    let pattern = |p: &Profile| match &p.controls()[0].checks()[0] {
        Check::Command(c) => c.stdout_pattern().map(|r| r.as_str().to_string()),
        _ => None,
    };
    assert_eq!(pattern(&strict).as_deref(), Some(r"ruby 3\.1"));
    assert_eq!(pattern(&relaxed).as_deref(), Some(r"ruby \d+(?:\.\d+)*"));
    assert!(strict.strict_versions());
    assert!(!relaxed.strict_versions());
}

#[test]
fn test_inputs_file_parsing_and_overrides() {
    let inputs = r#"
ruby_version: 3.1
session_mode: true
expected_plugins:
  - train-k8s-container
  - inspec-reporter-json-min
"#;
    let params = ParameterSet::parse(inputs, "inputs.yml")
        .unwrap()
        .with_override("ruby_version=3.2")
        .and_then(|p| p.with_override("extra=[a, b]"))
        .unwrap();

    assert_eq!(params.get("ruby_version"), Some(&ParamValue::Scalar("3.2".to_string())));
    assert_eq!(params.get("session_mode"), Some(&ParamValue::Scalar("true".to_string())));
    assert_eq!(
        params.get("extra"),
        Some(&ParamValue::List(vec!["a".to_string(), "b".to_string()]))
    );
    assert_eq!(params.len(), 4);

    assert!(ParameterSet::new().with_override("no-equals-sign").is_err());
    assert!(ParameterSet::new().with_override("bad-name=1").is_err());
}

#[test]
fn test_control_metadata_defaults() {
    let yaml = "controls:\n  - name: bare\n";
    let built = profile(yaml, &ParameterSet::new()).unwrap();
    let control = &built.controls()[0];
    assert_eq!(control.title(), "bare");
    assert_eq!(control.impact(), 1.0);
    assert!(control.description().is_none());
    assert!(control.checks().is_empty());
    assert_eq!(built.name(), "profile");
}

#[test]
fn test_bundled_profile_builds() {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("profiles/cinc-auditor-alpine");
    let doc = container_audit::load_profile(&dir.join("controls.yml")).unwrap();
    let params = container_audit::load_parameters(&[dir.join("inputs-v6.yml")], &[]).unwrap();
    let built = Profile::build(&doc, &params, &BuildOptions::default()).unwrap();

    assert_eq!(built.name(), "cinc-auditor-alpine");
    assert_eq!(built.controls().len(), 7);
    // two plugins expanded from one entry
    assert_eq!(built.controls()[1].checks().len(), 2);
    assert_eq!(built.check_count(), 11);
    assert_eq!(built.controls()[3].description(), Some("Verify Ruby 3.1.x is installed"));
}
