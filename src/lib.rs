//! container-audit library
//!
//! Declarative assertion harness that validates the internal state of a
//! container image from inside the container.
//!
//! A profile is an ordered list of controls. Each control groups checks of
//! three kinds:
//! - Command checks: run a command, assert its exit status and stdout
//! - Directory checks: assert a directory exists
//! - Environment checks: assert an environment variable has an exact value
//!
//! Profiles are parameterized by an externally supplied [`ParameterSet`]
//! (the "inputs" file). Placeholders are resolved when the profile is built,
//! so a missing input aborts the run before any check executes.
//!
//! # Example
//!
//! ```no_run
//! use container_audit::{run, AuditConfig, ParameterSet, ProfileDocument};
//!
//! let doc = ProfileDocument::parse(
//!     "controls:\n  - name: shell\n    checks:\n      - command: sh -c 'exit 0'\n",
//!     "inline",
//! )
//! .expect("valid profile");
//! let report = run(&doc, &ParameterSet::new(), &AuditConfig::default()).expect("configured");
//! println!("passed: {}", report.passed());
//! ```

pub mod cli;
pub mod engine;
pub mod model;
pub mod platform;
pub mod version;

use engine::cancel::CancellationToken;
use engine::result::Report;
use engine::runner::{Runner, RunnerConfig};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub use model::check::{Check, CommandCheck, DirectoryExistsCheck, EnvVarCheck};
pub use model::control::Control;
pub use model::params::{ParamValue, ParameterSet};
pub use model::profile::{BuildOptions, Profile, ProfileDocument};

/// Default per-command timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace period between SIGTERM and SIGKILL when a command must be stopped.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Errors raised while constructing a profile.
///
/// Any of these aborts the run before a single check executes.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// Profile or input document could not be parsed
    #[error("Parse error in {origin}: {message}")]
    Parse { origin: String, message: String },

    /// Input parameter is malformed
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Placeholder refers to a parameter nobody supplied
    #[error("Unresolved parameter '{name}'")]
    UnknownParameter { name: String },

    /// List parameter used where a single value is required
    #[error("Parameter '{name}' is a list and cannot be used as a single value")]
    ListAsScalar { name: String },

    /// Scalar parameter used where a list is required
    #[error("Parameter '{name}' is not a list")]
    NotAList { name: String },

    /// Stdout pattern does not compile
    #[error("Invalid pattern /{pattern}/: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Check entry is structurally malformed
    #[error("Invalid check: {reason}")]
    InvalidCheck { reason: String },

    /// Control metadata is malformed
    #[error("Invalid control: {reason}")]
    InvalidControl { reason: String },

    /// Two controls share a name
    #[error("Duplicate control name '{name}'")]
    DuplicateControl { name: String },

    /// Error located inside a specific control (and check entry)
    #[error("{}: {source}", locate(.control, .check))]
    InControl {
        control: String,
        check: Option<usize>,
        #[source]
        source: Box<ConfigurationError>,
    },
}

fn locate(control: &str, check: &Option<usize>) -> String {
    match check {
        Some(index) => format!("control '{}' check #{}", control, index + 1),
        None => format!("control '{}'", control),
    }
}

impl ConfigurationError {
    /// Attach control/check location to an error
    pub fn within(self, control: &str, check: Option<usize>) -> Self {
        ConfigurationError::InControl {
            control: control.to_string(),
            check,
            source: Box::new(self),
        }
    }

    /// The innermost error, with location wrappers removed
    pub fn root(&self) -> &ConfigurationError {
        match self {
            ConfigurationError::InControl { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Top-level error for container-audit operations.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Profile, inputs, or parameters are malformed
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Profile or input file could not be read
    #[error("I/O error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AuditError {
    /// Process exit status for this error
    pub fn exit_status(&self) -> ExitStatus {
        ExitStatus::ConfigurationError
    }
}

/// Process exit status contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Every check passed
    Passed,
    /// At least one check failed or was cancelled
    Failed,
    /// Profile, inputs, or parameters were malformed; nothing ran
    ConfigurationError,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Passed => 0,
            ExitStatus::Failed => 1,
            ExitStatus::ConfigurationError => 2,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            ExitStatus::Passed => "all checks passed",
            ExitStatus::Failed => "failures detected",
            ExitStatus::ConfigurationError => "configuration error",
        }
    }
}

/// Configuration for an audit run.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Override the profile's strict_versions setting
    pub strict_versions: Option<bool>,
    /// Timeout for command checks that do not declare their own
    pub timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL
    pub kill_grace: Duration,
    /// Run controls in parallel
    pub parallel: bool,
    /// Maximum controls in flight when parallel
    pub max_parallel: usize,
    /// Whole-run deadline; checks not started by then are cancelled
    pub deadline: Option<Duration>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            strict_versions: None,
            timeout: DEFAULT_TIMEOUT,
            kill_grace: DEFAULT_KILL_GRACE,
            parallel: false,
            max_parallel: 4,
            deadline: None,
        }
    }
}

impl AuditConfig {
    /// Create configuration from command line arguments
    pub fn from_args(args: &cli::args::ExecArgs) -> Self {
        AuditConfig {
            strict_versions: args.profile.version_mode(),
            timeout: Duration::from_secs(args.timeout),
            kill_grace: DEFAULT_KILL_GRACE,
            parallel: args.parallel,
            max_parallel: args.max_parallel as usize,
            deadline: args.deadline.map(Duration::from_secs),
        }
    }

    /// Options that affect profile construction
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            strict_versions: self.strict_versions,
        }
    }

    /// Runner configuration, with the deadline armed from now
    pub fn runner_config(&self) -> RunnerConfig {
        let mut cancel = CancellationToken::new();
        // a deadline too far out to represent never fires
        if let Some(at) = self.deadline.and_then(|d| Instant::now().checked_add(d)) {
            cancel = cancel.with_deadline(at);
        }

        RunnerConfig {
            default_timeout: self.timeout,
            kill_grace: self.kill_grace,
            parallel: self.parallel,
            max_parallel: self.max_parallel.max(1),
            cancel,
        }
    }
}

/// Read and parse a profile document from disk.
///
/// The profile name defaults to the file stem when the document has none.
pub fn load_profile(path: &Path) -> Result<ProfileDocument, AuditError> {
    let text = std::fs::read_to_string(path).map_err(|source| AuditError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut doc = ProfileDocument::parse(&text, &path.display().to_string())?;
    if doc.name.is_none() {
        doc.name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
    }
    Ok(doc)
}

/// Build a parameter set from input files (later files win) and
/// `key=value` overrides (which win over every file).
pub fn load_parameters(files: &[PathBuf], overrides: &[String]) -> Result<ParameterSet, AuditError> {
    let mut params = ParameterSet::new();

    for path in files {
        let text = std::fs::read_to_string(path).map_err(|source| AuditError::Io {
            path: path.clone(),
            source,
        })?;
        let file_params = ParameterSet::parse(&text, &path.display().to_string())?;
        params = params.merge(file_params);
    }

    for spec in overrides {
        params = params.with_override(spec)?;
    }

    Ok(params)
}

/// Build a profile and run it.
///
/// This is the main entry point. A [`ConfigurationError`] is returned before
/// any check executes. Check failures never surface as errors; they are
/// recorded in the returned [`Report`].
pub fn run(doc: &ProfileDocument, params: &ParameterSet, config: &AuditConfig) -> Result<Report, AuditError> {
    let profile = Profile::build(doc, params, &config.build_options())?;
    Ok(Runner::new(config.runner_config()).run(&profile))
}
