//! Output formatting for container-audit.
//!
//! Provides terminal, JSON, and JUnit XML output formatters.
//!
//! # Graceful Degradation
//!
//! This module handles errors gracefully:
//! - Non-TTY output: Color disabled via NO_COLOR or --no-color
//! - Empty reports: Produces valid output with zero controls
//! - Checks that never produced a value: rendered as "(none)"
//! - Long stdout: truncated to a single-line excerpt in terminal output
//!
//! All formatters produce valid output for any [`Report`] input.
//! No function in this module will panic.

use crate::cli::args::OutputFormat;
use crate::engine::result::{Actual, CheckResult, ControlReport, Outcome, Report, ResultSummary};
use chrono::SecondsFormat;
use serde::Serialize;

/// Longest stdout excerpt shown next to a failing command check.
const STDOUT_EXCERPT: usize = 120;

const RULE: &str = "--------------------------------------------------------------------------------";

/// Trait for output formatters
pub trait OutputFormatter {
    /// Format a finalized report into a string
    fn format(&self, report: &Report) -> String;
}

/// Terminal (human-readable) formatter
pub struct TerminalFormatter {
    color: bool,
    verbose: bool,
    quiet: bool,
}

impl TerminalFormatter {
    pub fn new(color: bool, verbose: bool, quiet: bool) -> Self {
        TerminalFormatter { color, verbose, quiet }
    }

    fn colorize(&self, text: &str, color_code: &str) -> String {
        if self.color {
            format!("\x1b[{}m{}\x1b[0m", color_code, text)
        } else {
            text.to_string()
        }
    }

    fn green(&self, text: &str) -> String {
        self.colorize(text, "32")
    }

    fn yellow(&self, text: &str) -> String {
        self.colorize(text, "33")
    }

    fn red(&self, text: &str) -> String {
        self.colorize(text, "31")
    }

    fn gray(&self, text: &str) -> String {
        self.colorize(text, "90")
    }

    fn status(&self, outcome: Outcome) -> String {
        match outcome {
            Outcome::Passed => self.green("[PASS]"),
            Outcome::AssertionFailed => self.red("[FAIL]"),
            Outcome::ExecutionFailed => self.red("[ERR ]"),
            Outcome::Cancelled => self.yellow("[CANC]"),
        }
    }

    fn push_control(&self, output: &mut String, control: &ControlReport) {
        let status = if control.passed() {
            self.green("[PASS]")
        } else {
            self.red("[FAIL]")
        };
        output.push_str(&format!(
            "{} {}: {} (impact {:.1}, {})\n",
            status,
            control.name(),
            control.title(),
            control.impact(),
            control.severity()
        ));

        if self.verbose {
            if let Some(description) = control.description() {
                output.push_str(&format!("       {}\n", self.gray(description.trim())));
            }
        }

        for result in control.results() {
            if self.quiet && result.passed {
                continue;
            }
            self.push_result(output, result);
        }
    }

    fn push_result(&self, output: &mut String, result: &CheckResult) {
        let timing = if self.verbose {
            format!(" ({}ms)", result.duration_ms)
        } else {
            String::new()
        };
        output.push_str(&format!("  {} {}{}\n", self.status(result.outcome), result.label, timing));

        if !result.passed {
            output.push_str(&format!("         expected: {}\n", result.expected));
            output.push_str(&format!("         actual:   {}\n", describe_actual(result.actual.as_ref())));
            if let Some(ref message) = result.message {
                output.push_str(&format!("         {}\n", self.gray(message)));
            }
        } else if self.verbose {
            if let Some(Actual::Command { stdout, .. }) = &result.actual {
                let line = excerpt(stdout);
                if !line.is_empty() {
                    output.push_str(&format!("         {}\n", self.gray(&line)));
                }
            }
        }
    }
}

impl OutputFormatter for TerminalFormatter {
    fn format(&self, report: &Report) -> String {
        let mut output = String::new();

        output.push_str(RULE);
        output.push('\n');
        output.push_str(&format!("container-audit report: {}\n", report.profile()));
        output.push_str(&format!("Host: {}\n", report.hostname()));
        output.push_str(&format!(
            "Started: {}\n",
            report.started_at().to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        output.push_str(RULE);
        output.push_str("\n\n");

        for control in report.controls() {
            if self.quiet && control.passed() {
                continue;
            }
            self.push_control(&mut output, control);
            output.push('\n');
        }

        let failures = report.failures_by_impact();
        if !failures.is_empty() && !self.quiet {
            output.push_str("FAILED CONTROLS (by impact)\n");
            for control in failures {
                output.push_str(&format!("  {:.1} {}\n", control.impact(), control.name()));
            }
            output.push('\n');
        }

        let summary = report.summary();
        output.push_str(RULE);
        output.push('\n');
        output.push_str(&format!(
            "SUMMARY: {} controls passed, {} failed; {} checks passed, {} failed, {} cancelled\n",
            summary.controls_passed,
            summary.controls_failed,
            summary.checks_passed,
            summary.checks_failed,
            summary.checks_cancelled
        ));
        output.push_str(&format!("Total time: {:.1}s\n", report.duration_ms() as f64 / 1000.0));

        let status = report.exit_status();
        output.push_str(&format!("Exit code: {} ({})\n", status.code(), status.describe()));
        output.push_str(RULE);

        output
    }
}

/// JSON formatter
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        JsonFormatter { pretty }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    report: &'a Report,
    summary: ResultSummary,
    exit_code: u8,
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, report: &Report) -> String {
        let document = JsonReport {
            report,
            summary: report.summary(),
            exit_code: report.exit_status().code(),
        };

        let rendered = if self.pretty {
            serde_json::to_string_pretty(&document)
        } else {
            serde_json::to_string(&document)
        };

        // Report contains only strings, numbers and enums, so this cannot fail
        rendered.unwrap_or_else(|e| format!("{{\"error\":{:?}}}", e.to_string()))
    }
}

/// JUnit XML formatter
///
/// One `<testsuite>` per control, one `<testcase>` per check.
pub struct JunitFormatter;

impl JunitFormatter {
    pub fn new() -> Self {
        JunitFormatter
    }

    fn escape_xml(s: &str) -> String {
        let mut result = String::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '&' => result.push_str("&amp;"),
                '<' => result.push_str("&lt;"),
                '>' => result.push_str("&gt;"),
                '"' => result.push_str("&quot;"),
                '\'' => result.push_str("&apos;"),
                c if c.is_control() && c != '\n' && c != '\t' => {}
                c => result.push(c),
            }
        }
        result
    }
}

impl Default for JunitFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatter for JunitFormatter {
    fn format(&self, report: &Report) -> String {
        let mut output = String::new();
        output.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

        let summary = report.summary();
        output.push_str(&format!(
            "<testsuites name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"0\" skipped=\"{}\" time=\"{:.3}\" timestamp=\"{}\">\n",
            Self::escape_xml(report.profile()),
            summary.checks_total,
            summary.checks_failed,
            summary.checks_cancelled,
            report.duration_ms() as f64 / 1000.0,
            report.started_at().to_rfc3339_opts(SecondsFormat::Secs, true)
        ));

        for control in report.controls() {
            let failures = control
                .results()
                .iter()
                .filter(|r| matches!(r.outcome, Outcome::AssertionFailed | Outcome::ExecutionFailed))
                .count();
            let skipped = control
                .results()
                .iter()
                .filter(|r| r.outcome == Outcome::Cancelled)
                .count();

            output.push_str(&format!(
                "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"0\" skipped=\"{}\" time=\"{:.3}\">\n",
                Self::escape_xml(control.name()),
                control.results().len(),
                failures,
                skipped,
                control.duration_ms() as f64 / 1000.0
            ));

            for result in control.results() {
                output.push_str(&format!(
                    "    <testcase name=\"{}\" classname=\"{}.{}\" time=\"{:.3}\"",
                    Self::escape_xml(&result.label),
                    Self::escape_xml(report.profile()),
                    Self::escape_xml(control.name()),
                    result.duration_ms as f64 / 1000.0
                ));

                match result.outcome {
                    Outcome::Passed => output.push_str(" />\n"),
                    Outcome::AssertionFailed | Outcome::ExecutionFailed => {
                        let message = result.message.as_deref().unwrap_or("check failed");
                        output.push_str(">\n");
                        output.push_str(&format!(
                            "      <failure message=\"{}\" type=\"{}\">expected: {}\nactual: {}</failure>\n",
                            Self::escape_xml(message),
                            outcome_name(result.outcome),
                            Self::escape_xml(&result.expected),
                            Self::escape_xml(&describe_actual(result.actual.as_ref()))
                        ));
                        output.push_str("    </testcase>\n");
                    }
                    Outcome::Cancelled => {
                        output.push_str(">\n");
                        output.push_str(&format!(
                            "      <skipped message=\"{}\" />\n",
                            Self::escape_xml(result.message.as_deref().unwrap_or("cancelled"))
                        ));
                        output.push_str("    </testcase>\n");
                    }
                }
            }

            output.push_str("  </testsuite>\n");
        }

        output.push_str("</testsuites>");
        output
    }
}

/// Get a formatter based on the output format
pub fn get_formatter(format: OutputFormat, color: bool, verbose: bool, quiet: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Text => Box::new(TerminalFormatter::new(color, verbose, quiet)),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Junit => Box::new(JunitFormatter::new()),
    }
}

fn outcome_name(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Passed => "passed",
        Outcome::AssertionFailed => "assertion_failed",
        Outcome::ExecutionFailed => "execution_failed",
        Outcome::Cancelled => "cancelled",
    }
}

/// Render an observed value for humans
fn describe_actual(actual: Option<&Actual>) -> String {
    match actual {
        None => "(none)".to_string(),
        Some(Actual::Command { exit_code, stdout }) => {
            let code = match exit_code {
                Some(code) => format!("exit {}", code),
                None => "killed by signal".to_string(),
            };
            let line = excerpt(stdout);
            if line.is_empty() {
                code
            } else {
                format!("{}, stdout {:?}", code, line)
            }
        }
        Some(Actual::Directory { exists: true }) => "present".to_string(),
        Some(Actual::Directory { exists: false }) => "missing".to_string(),
        Some(Actual::Env { value: Some(value) }) => format!("{:?}", value),
        Some(Actual::Env { value: None }) => "unset".to_string(),
    }
}

/// First non-empty line of `text`, cut at a character boundary
fn excerpt(text: &str) -> String {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if line.chars().count() <= STDOUT_EXCERPT {
        line.to_string()
    } else {
        let cut: String = line.chars().take(STDOUT_EXCERPT).collect();
        format!("{}...", cut)
    }
}
