//! Shared helpers for building profiles and runners in tests.

#![allow(dead_code)]

use container_audit::engine::cancel::CancellationToken;
use container_audit::engine::result::Report;
use container_audit::engine::runner::{Runner, RunnerConfig};
use container_audit::{BuildOptions, ConfigurationError, ParameterSet, Profile, ProfileDocument};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Build a profile from inline YAML with default options.
pub fn profile(yaml: &str, params: &ParameterSet) -> Result<Profile, ConfigurationError> {
    let doc = ProfileDocument::parse(yaml, "inline")?;
    Profile::build(&doc, params, &BuildOptions::default())
}

/// Runner configuration with short limits so failing tests do not hang.
pub fn fast_config() -> RunnerConfig {
    RunnerConfig {
        default_timeout: Duration::from_secs(10),
        kill_grace: Duration::from_millis(500),
        parallel: false,
        max_parallel: 4,
        cancel: CancellationToken::new(),
    }
}

/// Build and run an inline profile sequentially.
pub fn run_yaml(yaml: &str, params: &ParameterSet) -> Report {
    let profile = profile(yaml, params).expect("profile builds");
    Runner::new(fast_config()).run(&profile)
}

/// The parameter set from the reference scenarios.
pub fn version_params() -> ParameterSet {
    ParameterSet::new().with_scalar("version", "1.2.3").expect("valid parameter")
}

/// Temporary directory holding profile and input files.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Workspace {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    /// Write `contents` to `name` inside the workspace and return its path.
    pub fn file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut file = std::fs::File::create(&path).expect("create file");
        file.write_all(contents.as_bytes()).expect("write file");
        path
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }
}
