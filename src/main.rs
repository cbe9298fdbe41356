//! container-audit CLI entry point
//!
//! Validates the internal state of a container image against a declarative
//! profile of controls.

use clap::Parser;
use container_audit::cli::args::{Cli, Command, ExecArgs, ProfileArgs};
use container_audit::cli::output::get_formatter;
use container_audit::cli::ProgressObserver;
use container_audit::engine::runner::Runner;
use container_audit::version::BUILD_INFO;
use container_audit::{load_parameters, load_profile, AuditConfig, AuditError, BuildOptions, ExitStatus, Profile};

use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => {
            // --help and --version
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(ExitStatus::ConfigurationError.code());
        }
    };

    match cli.command {
        Command::Version => {
            println!("{}", BUILD_INFO);
            ExitCode::SUCCESS
        }
        Command::List(args) => list_controls(&args),
        Command::Exec(args) => run_profile(&args),
    }
}

/// Logs go to stderr so stdout carries only the report.
///
/// `RUST_LOG` selects the level (default `warn`); setting
/// `CONTAINER_AUDIT_LOG_JSON` switches to one JSON object per line.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let json = std::env::var_os("CONTAINER_AUDIT_LOG_JSON").is_some();

    if json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init();
    }
}

fn fail(error: AuditError) -> ExitCode {
    eprintln!("Error: {}", error);
    ExitCode::from(error.exit_status().code())
}

fn build_profile(args: &ProfileArgs) -> Result<Profile, AuditError> {
    let doc = load_profile(&args.profile)?;
    let params = load_parameters(&args.input_files, &args.inputs)?;
    let options = BuildOptions {
        strict_versions: args.version_mode(),
    };
    Ok(Profile::build(&doc, &params, &options)?)
}

fn list_controls(args: &ProfileArgs) -> ExitCode {
    let profile = match build_profile(args) {
        Ok(profile) => profile,
        Err(e) => return fail(e),
    };

    let mode = if profile.strict_versions() { "strict" } else { "relaxed" };
    println!("Profile: {} ({} versions)", profile.name(), mode);
    println!();

    for control in profile.controls() {
        println!(
            "{}  impact {:.1} ({})  {}",
            control.name(),
            control.impact(),
            control.severity(),
            control.title()
        );
        for (index, check) in control.checks().iter().enumerate() {
            println!("  {:>3}. {}", index + 1, check);
        }
        println!();
    }

    println!(
        "{} controls, {} checks",
        profile.controls().len(),
        profile.check_count()
    );
    ExitCode::SUCCESS
}

fn run_profile(args: &ExecArgs) -> ExitCode {
    let config = AuditConfig::from_args(args);

    let profile = match build_profile(&args.profile) {
        Ok(profile) => profile,
        Err(e) => return fail(e),
    };

    let mut runner = Runner::new(config.runner_config());
    if args.verbose {
        runner = runner.with_observer(ProgressObserver::new(profile.controls().len()));
    }
    let report = runner.run(&profile);

    let formatter = get_formatter(args.format, args.color(), args.verbose, args.quiet);
    println!("{}", formatter.format(&report));

    ExitCode::from(report.exit_status().code())
}
