//! CLI module for argument parsing, progress, and output formatting.

pub mod args;
pub mod output;

use crate::engine::result::ControlReport;
use crate::engine::runner::{RunObserver, RunState};
use crate::model::control::Control;
use std::io::Write;

/// Writes one line per control to stderr as the run progresses.
///
/// Used with `--verbose` so that stdout carries only the formatted report.
pub struct ProgressObserver {
    total: usize,
    finished: usize,
}

impl ProgressObserver {
    pub fn new(total: usize) -> Self {
        ProgressObserver { total, finished: 0 }
    }
}

impl RunObserver for ProgressObserver {
    fn state_changed(&mut self, state: RunState) {
        if state == RunState::Finalized {
            let _ = writeln!(std::io::stderr(), "finished {} of {} controls", self.finished, self.total);
        }
    }

    fn control_started(&mut self, control: &Control) {
        let _ = writeln!(
            std::io::stderr(),
            "[{}/{}] running {} ({} checks)",
            self.finished + 1,
            self.total,
            control.name(),
            control.checks().len()
        );
    }

    fn control_finished(&mut self, report: &ControlReport) {
        self.finished += 1;
        let verdict = if report.passed() { "passed" } else { "failed" };
        let _ = writeln!(
            std::io::stderr(),
            "[{}/{}] {} {} in {}ms",
            self.finished,
            self.total,
            report.name(),
            verdict,
            report.duration_ms()
        );
    }
}
