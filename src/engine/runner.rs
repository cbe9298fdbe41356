//! Control execution.
//!
//! Runs every check of every control against the live system and produces a
//! finalized [`Report`].
//!
//! # Graceful Degradation
//!
//! This module handles errors gracefully:
//! - Check failure: recorded, and the run continues with the next check
//! - Spawn error, timeout, I/O error: recorded as an execution failure
//! - Check panics: caught via std::panic::catch_unwind, recorded as an
//!   execution failure
//! - Cancellation: checks not yet started are recorded as cancelled; an
//!   in-flight command is terminated gracefully and recorded as cancelled
//! - Empty profile: returns an empty, passing report (not an error)
//!
//! Every check of every control always yields exactly one result. There is
//! no fail-fast mode and no retry. No function in this module will panic.

use crate::engine::cancel::CancellationToken;
use crate::engine::result::{Actual, CheckResult, ControlReport, Outcome, Report, ReportBuilder};
use crate::model::check::{Check, CommandCheck, DirectoryExistsCheck, EnvVarCheck};
use crate::model::control::Control;
use crate::model::profile::Profile;
use crate::platform::linux::{self, PathKind};
use crate::platform::process::{self, ExecError, ExecLimits};
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest stderr excerpt carried into a failure message.
const STDERR_EXCERPT: usize = 200;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Timeout for command checks without their own
    pub default_timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL
    pub kill_grace: Duration,
    /// Run controls concurrently in declaration-ordered batches
    pub parallel: bool,
    pub max_parallel: usize,
    pub cancel: CancellationToken,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            default_timeout: crate::DEFAULT_TIMEOUT,
            kill_grace: crate::DEFAULT_KILL_GRACE,
            parallel: false,
            max_parallel: 4,
            cancel: CancellationToken::new(),
        }
    }
}

/// Lifecycle of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Finalized,
}

/// Hooks invoked on the calling thread as controls progress.
///
/// `state_changed` fires on every lifecycle transition, so an observer sees
/// `Running` before the first control and `Finalized` after the last.
/// In parallel mode `control_started` fires for a whole batch before it
/// runs, and `control_finished` fires in declaration order once the batch
/// completes.
pub trait RunObserver {
    fn state_changed(&mut self, _state: RunState) {}
    fn control_started(&mut self, _control: &Control) {}
    fn control_finished(&mut self, _report: &ControlReport) {}
}

impl RunObserver for () {}

/// Executes a profile once.
///
/// `run` consumes the runner, so a runner can never be reused and a
/// finalized report can never receive more results.
pub struct Runner {
    config: RunnerConfig,
    state: RunState,
    observer: Box<dyn RunObserver>,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Runner {
            config,
            state: RunState::NotStarted,
            observer: Box::new(()),
        }
    }

    pub fn with_observer(mut self, observer: impl RunObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// `run` consumes the runner, so callers only ever see `NotStarted`
    /// here; later states reach the observer.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Token that cancels this run when tripped
    pub fn cancellation(&self) -> CancellationToken {
        self.config.cancel.clone()
    }

    /// Execute every control of `profile` in declaration order.
    pub fn run(mut self, profile: &Profile) -> Report {
        self.transition(RunState::Running);
        info!(
            profile = profile.name(),
            controls = profile.controls().len(),
            checks = profile.check_count(),
            parallel = self.config.parallel,
            "starting run"
        );

        let mut builder = ReportBuilder::new(profile.name());
        if self.config.parallel {
            self.run_parallel(profile.controls(), &mut builder);
        } else {
            self.run_sequential(profile.controls(), &mut builder);
        }

        let report = builder.finalize();
        self.transition(RunState::Finalized);

        if report.cancelled() {
            warn!(profile = profile.name(), "run cancelled");
        }
        info!(
            profile = profile.name(),
            passed = report.passed(),
            duration_ms = report.duration_ms(),
            "run finalized"
        );
        report
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "runner state");
        self.state = next;
        self.observer.state_changed(next);
    }

    fn run_sequential(&mut self, controls: &[Control], builder: &mut ReportBuilder) {
        let executor = Executor::new(&self.config);

        for control in controls {
            self.observer.control_started(control);
            let report = executor.run_control(control);
            self.observer.control_finished(&report);
            builder.push_control(report);
        }
    }

    /// Run controls in batches on scoped threads; each control's report
    /// lands in its declaration slot regardless of completion order.
    fn run_parallel(&mut self, controls: &[Control], builder: &mut ReportBuilder) {
        let executor = Executor::new(&self.config);
        let batch_size = self.config.max_parallel.max(1);

        for batch in controls.chunks(batch_size) {
            for control in batch {
                self.observer.control_started(control);
            }

            let reports: Vec<ControlReport> = thread::scope(|s| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|control| {
                        let executor = &executor;
                        s.spawn(move || executor.run_control(control))
                    })
                    .collect();

                handles
                    .into_iter()
                    .zip(batch)
                    .map(|(handle, control)| {
                        handle
                            .join()
                            .unwrap_or_else(|_| executor.panicked_control(control))
                    })
                    .collect()
            });

            for report in reports {
                self.observer.control_finished(&report);
                builder.push_control(report);
            }
        }
    }
}

/// Stateless per-check execution, shared across worker threads.
struct Executor<'a> {
    config: &'a RunnerConfig,
}

impl<'a> Executor<'a> {
    fn new(config: &'a RunnerConfig) -> Self {
        Executor { config }
    }

    fn run_control(&self, control: &Control) -> ControlReport {
        info!(control = control.name(), checks = control.checks().len(), "running control");

        let results = control
            .checks()
            .iter()
            .enumerate()
            .map(|(index, check)| {
                if self.config.cancel.is_cancelled() {
                    debug!(control = control.name(), index, "check cancelled before start");
                    CheckResult::cancelled(control, index, check)
                } else {
                    self.execute_check(control, index, check)
                }
            })
            .collect();

        let report = ControlReport::new(control, results);
        info!(control = control.name(), passed = report.passed(), "control finished");
        report
    }

    fn panicked_control(&self, control: &Control) -> ControlReport {
        let results = control
            .checks()
            .iter()
            .enumerate()
            .map(|(index, check)| panicked(control, index, check, 0))
            .collect();
        ControlReport::new(control, results)
    }

    /// Execute a single check, converting panics into execution failures
    fn execute_check(&self, control: &Control, index: usize, check: &Check) -> CheckResult {
        let start = Instant::now();

        let result = panic::catch_unwind(AssertUnwindSafe(|| match check {
            Check::Command(c) => self.execute_command(control, index, check, c),
            Check::DirectoryExists(c) => execute_directory(control, index, check, c),
            Check::EnvVar(c) => execute_env(control, index, check, c),
        }));

        let result = result.unwrap_or_else(|_| panicked(control, index, check, elapsed_ms(start)));
        debug!(
            control = control.name(),
            index,
            check = %result.label,
            outcome = ?result.outcome,
            duration_ms = result.duration_ms,
            "check finished"
        );
        result
    }

    fn execute_command(&self, control: &Control, index: usize, check: &Check, spec: &CommandCheck) -> CheckResult {
        let start = Instant::now();
        let limits = ExecLimits {
            timeout: spec.timeout().unwrap_or(self.config.default_timeout),
            kill_grace: self.config.kill_grace,
            cancel: &self.config.cancel,
        };

        let output = match process::run_shell(spec.command(), &limits) {
            Ok(output) => output,
            Err(ExecError::Cancelled) => {
                return CheckResult::new(
                    control,
                    index,
                    check,
                    Outcome::Cancelled,
                    None,
                    Some(ExecError::Cancelled.to_string()),
                    elapsed_ms(start),
                );
            }
            Err(ExecError::TimedOut { timeout, stdout }) => {
                let message = ExecError::TimedOut {
                    timeout,
                    stdout: String::new(),
                }
                .to_string();
                return CheckResult::new(
                    control,
                    index,
                    check,
                    Outcome::ExecutionFailed,
                    Some(Actual::Command { exit_code: None, stdout }),
                    Some(message),
                    elapsed_ms(start),
                );
            }
            Err(e) => {
                return CheckResult::new(
                    control,
                    index,
                    check,
                    Outcome::ExecutionFailed,
                    None,
                    Some(e.to_string()),
                    elapsed_ms(start),
                );
            }
        };

        let mut problems = Vec::new();
        if output.exit_code != Some(spec.expected_exit()) {
            let actual = match output.exit_code {
                Some(code) => code.to_string(),
                None => "none (terminated by signal)".to_string(),
            };
            let mut problem = format!("exit status {} (expected {})", actual, spec.expected_exit());
            let stderr = output.stderr.trim();
            if !stderr.is_empty() {
                problem.push_str(&format!("; stderr: {}", excerpt(stderr, STDERR_EXCERPT)));
            }
            problems.push(problem);
        }
        if let Some(pattern) = spec.stdout_pattern() {
            if !pattern.is_match(&output.stdout) {
                problems.push(format!("stdout did not match /{}/", pattern.as_str()));
            }
        }

        let (outcome, message) = if problems.is_empty() {
            (Outcome::Passed, None)
        } else {
            (Outcome::AssertionFailed, Some(problems.join("; ")))
        };

        CheckResult::new(
            control,
            index,
            check,
            outcome,
            Some(Actual::Command {
                exit_code: output.exit_code,
                stdout: output.stdout,
            }),
            message,
            elapsed_ms(start),
        )
    }
}

fn execute_directory(control: &Control, index: usize, check: &Check, spec: &DirectoryExistsCheck) -> CheckResult {
    let start = Instant::now();

    let (outcome, actual, message) = match linux::path_kind(spec.path()) {
        Ok(PathKind::Directory) => (Outcome::Passed, Some(Actual::Directory { exists: true }), None),
        Ok(PathKind::Missing) => (
            Outcome::AssertionFailed,
            Some(Actual::Directory { exists: false }),
            Some(format!("{} does not exist", spec.path())),
        ),
        Ok(PathKind::Other) => (
            Outcome::AssertionFailed,
            Some(Actual::Directory { exists: false }),
            Some(format!("{} exists but is not a directory", spec.path())),
        ),
        Err(e) => (
            Outcome::ExecutionFailed,
            None,
            Some(format!("cannot stat {}: {}", spec.path(), e)),
        ),
    };

    CheckResult::new(control, index, check, outcome, actual, message, elapsed_ms(start))
}

fn execute_env(control: &Control, index: usize, check: &Check, spec: &EnvVarCheck) -> CheckResult {
    let start = Instant::now();
    let value = linux::get_environment_variable(spec.name());

    let (outcome, message) = match &value {
        Some(v) if v == spec.expected() => (Outcome::Passed, None),
        Some(v) => (
            Outcome::AssertionFailed,
            Some(format!("{} is {:?}, expected {:?}", spec.name(), v, spec.expected())),
        ),
        None => (Outcome::AssertionFailed, Some(format!("{} is not set", spec.name()))),
    };

    CheckResult::new(
        control,
        index,
        check,
        outcome,
        Some(Actual::Env { value }),
        message,
        elapsed_ms(start),
    )
}

fn panicked(control: &Control, index: usize, check: &Check, duration_ms: u64) -> CheckResult {
    CheckResult::new(
        control,
        index,
        check,
        Outcome::ExecutionFailed,
        None,
        Some("check panicked during execution".to_string()),
        duration_ms,
    )
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.chars().count() > max_chars {
        let cut: String = first_line.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        first_line.to_string()
    }
}
