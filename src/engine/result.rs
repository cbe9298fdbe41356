//! Result aggregation and reporting.
//!
//! Check results are appended to a [`ReportBuilder`] as they are produced.
//! Once the last control completes, the builder is consumed into a
//! [`Report`], which has no mutating API.

use crate::model::check::Check;
use crate::model::control::{Control, Severity};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

/// Classification of a single check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Actual value matched expectation
    Passed,
    /// Check ran but the actual value did not match
    AssertionFailed,
    /// Check could not be evaluated (spawn error, timeout, I/O error)
    ExecutionFailed,
    /// Run was cancelled before or while this check executed
    Cancelled,
}

impl Outcome {
    pub fn is_pass(self) -> bool {
        self == Outcome::Passed
    }
}

/// Value observed on the live system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actual {
    Command { exit_code: Option<i32>, stdout: String },
    Directory { exists: bool },
    Env { value: Option<String> },
}

/// Outcome of one executed (or cancelled) check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    /// Owning control name
    pub control: String,
    /// Position within the control, zero-based
    pub index: usize,
    /// "command", "directory", or "env"
    pub kind: &'static str,
    pub label: String,
    pub passed: bool,
    pub outcome: Outcome,
    pub expected: String,
    /// `None` when the check never produced a value
    pub actual: Option<Actual>,
    pub message: Option<String>,
    pub duration_ms: u64,
}

impl CheckResult {
    pub(crate) fn new(
        control: &Control,
        index: usize,
        check: &Check,
        outcome: Outcome,
        actual: Option<Actual>,
        message: Option<String>,
        duration_ms: u64,
    ) -> Self {
        CheckResult {
            control: control.name().to_string(),
            index,
            kind: check.kind(),
            label: check.label(),
            passed: outcome.is_pass(),
            outcome,
            expected: check.expected(),
            actual,
            message,
            duration_ms,
        }
    }

    /// Result for a check that never started because the run was cancelled
    pub(crate) fn cancelled(control: &Control, index: usize, check: &Check) -> Self {
        CheckResult::new(
            control,
            index,
            check,
            Outcome::Cancelled,
            None,
            Some("cancelled before execution".to_string()),
            0,
        )
    }
}

/// Results for one control, in check declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlReport {
    name: String,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    impact: f64,
    severity: Severity,
    passed: bool,
    results: Vec<CheckResult>,
}

impl ControlReport {
    pub(crate) fn new(control: &Control, results: Vec<CheckResult>) -> Self {
        ControlReport {
            name: control.name().to_string(),
            title: control.title().to_string(),
            description: control.description().map(str::to_string),
            impact: control.impact(),
            severity: control.severity(),
            passed: results.iter().all(|r| r.passed),
            results,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn impact(&self) -> f64 {
        self.impact
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// True when every check passed; a control with no checks passes
    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    pub fn duration_ms(&self) -> u64 {
        self.results.iter().map(|r| r.duration_ms).sum()
    }
}

/// Result summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultSummary {
    pub controls_passed: u32,
    pub controls_failed: u32,
    pub checks_passed: u32,
    /// Assertion and execution failures
    pub checks_failed: u32,
    pub checks_cancelled: u32,
    pub checks_total: u32,
}

/// Finalized, read-only report of a run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    profile: String,
    hostname: String,
    started_at: DateTime<Utc>,
    duration_ms: u64,
    passed: bool,
    cancelled: bool,
    controls: Vec<ControlReport>,
}

impl Report {
    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// AND over every check result in every control
    pub fn passed(&self) -> bool {
        self.passed
    }

    /// True when at least one check was cancelled
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn controls(&self) -> &[ControlReport] {
        &self.controls
    }

    /// Every check result, in declaration order
    pub fn results(&self) -> impl Iterator<Item = &CheckResult> {
        self.controls.iter().flat_map(|c| c.results.iter())
    }

    pub fn exit_status(&self) -> crate::ExitStatus {
        if self.passed {
            crate::ExitStatus::Passed
        } else {
            crate::ExitStatus::Failed
        }
    }

    /// Calculate summary statistics
    pub fn summary(&self) -> ResultSummary {
        let mut summary = ResultSummary::default();

        for control in &self.controls {
            if control.passed {
                summary.controls_passed += 1;
            } else {
                summary.controls_failed += 1;
            }

            for result in &control.results {
                summary.checks_total += 1;
                match result.outcome {
                    Outcome::Passed => summary.checks_passed += 1,
                    Outcome::AssertionFailed | Outcome::ExecutionFailed => summary.checks_failed += 1,
                    Outcome::Cancelled => summary.checks_cancelled += 1,
                }
            }
        }

        summary
    }

    /// Failing controls, highest impact first; ties keep declaration order
    pub fn failures_by_impact(&self) -> Vec<&ControlReport> {
        let mut failed: Vec<&ControlReport> = self.controls.iter().filter(|c| !c.passed).collect();
        failed.sort_by(|a, b| b.impact.total_cmp(&a.impact));
        failed
    }
}

/// Append-only collector for control results
pub struct ReportBuilder {
    profile: String,
    hostname: String,
    started_at: DateTime<Utc>,
    started: Instant,
    controls: Vec<ControlReport>,
}

impl ReportBuilder {
    /// Start collecting results for `profile`
    pub fn new(profile: impl Into<String>) -> Self {
        ReportBuilder {
            profile: profile.into(),
            hostname: crate::platform::linux::get_hostname().unwrap_or_else(|| "unknown".to_string()),
            started_at: Utc::now(),
            started: Instant::now(),
            controls: Vec::new(),
        }
    }

    /// Add a completed control
    pub fn push_control(&mut self, control: ControlReport) {
        self.controls.push(control);
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    /// Create final report
    pub fn finalize(self) -> Report {
        let passed = self.controls.iter().all(|c| c.passed);
        let cancelled = self
            .controls
            .iter()
            .flat_map(|c| c.results.iter())
            .any(|r| r.outcome == Outcome::Cancelled);

        Report {
            profile: self.profile,
            hostname: self.hostname,
            started_at: self.started_at,
            duration_ms: self.started.elapsed().as_millis() as u64,
            passed,
            cancelled,
            controls: self.controls,
        }
    }
}
