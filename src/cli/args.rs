//! Command line arguments for container-audit.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Declarative assertion harness for container images
#[derive(Parser, Debug)]
#[command(name = "container-audit", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every control of a profile and report the results
    Exec(ExecArgs),
    /// Resolve a profile against its inputs and print the checks without running them
    List(ProfileArgs),
    /// Print version and build information
    Version,
}

/// Profile and input selection shared by `exec` and `list`
#[derive(Args, Debug, Clone)]
pub struct ProfileArgs {
    /// Profile document (YAML or JSON)
    pub profile: PathBuf,

    /// Input file of parameter values (repeatable; later files win)
    #[arg(long = "input-file", value_name = "FILE")]
    pub input_files: Vec<PathBuf>,

    /// Single parameter override, e.g. --input ruby_version=3.1 (repeatable)
    #[arg(long = "input", value_name = "KEY=VALUE")]
    pub inputs: Vec<String>,

    /// Version placeholders must match the supplied version exactly
    #[arg(long, conflicts_with = "relaxed_versions")]
    pub strict_versions: bool,

    /// Version placeholders accept any well-formed version
    #[arg(long)]
    pub relaxed_versions: bool,
}

impl ProfileArgs {
    /// Requested version mode; `None` defers to the profile document
    pub fn version_mode(&self) -> Option<bool> {
        if self.strict_versions {
            Some(true)
        } else if self.relaxed_versions {
            Some(false)
        } else {
            None
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ExecArgs {
    #[command(flatten)]
    pub profile: ProfileArgs,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, env = "CONTAINER_AUDIT_FORMAT")]
    pub format: OutputFormat,

    /// Only show failing controls
    #[arg(long, short)]
    pub quiet: bool,

    /// Include stdout, timings, and progress
    #[arg(long, short)]
    pub verbose: bool,

    /// Disable colored output (also honors NO_COLOR)
    #[arg(long)]
    pub no_color: bool,

    /// Timeout in seconds for each command check
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 30,
        env = "CONTAINER_AUDIT_TIMEOUT",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout: u64,

    /// Cancel checks that have not finished this many seconds after start
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<u64>,

    /// Run controls in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Maximum controls in flight with --parallel
    #[arg(long, value_name = "N", default_value_t = 4, value_parser = clap::value_parser!(u64).range(1..=64))]
    pub max_parallel: u64,
}

impl ExecArgs {
    /// Whether colored output is wanted
    pub fn color(&self) -> bool {
        !self.no_color && std::env::var_os("NO_COLOR").is_none()
    }
}

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable terminal output
    #[default]
    Text,
    /// Machine-readable JSON
    Json,
    /// JUnit XML for CI/CD integration
    Junit,
}
