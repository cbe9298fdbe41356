//! Controls: named, weighted groups of checks.

use crate::model::check::Check;
use crate::ConfigurationError;
use serde::Serialize;
use std::fmt;

/// Priority label derived from a control's impact.
///
/// Impact only orders reporting; it never changes pass/fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_impact(impact: f64) -> Self {
        if impact >= 0.9 {
            Severity::Critical
        } else if impact >= 0.7 {
            Severity::High
        } else if impact >= 0.4 {
            Severity::Medium
        } else if impact > 0.0 {
            Severity::Low
        } else {
            Severity::None
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::None => write!(f, "none"),
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A named group of related checks.
#[derive(Debug, Clone)]
pub struct Control {
    name: String,
    title: String,
    description: Option<String>,
    impact: f64,
    checks: Vec<Check>,
}

impl Control {
    /// Create a control with no checks. The title defaults to the name.
    pub fn new(name: impl Into<String>, impact: f64) -> Result<Self, ConfigurationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigurationError::InvalidControl {
                reason: "control name must not be empty".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&impact) {
            return Err(ConfigurationError::InvalidControl {
                reason: format!("impact {} is outside 0.0..=1.0", impact),
            });
        }

        Ok(Control {
            title: name.clone(),
            name,
            description: None,
            impact,
            checks: Vec::new(),
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_check(mut self, check: impl Into<Check>) -> Self {
        self.checks.push(check.into());
        self
    }

    pub fn with_checks(mut self, checks: impl IntoIterator<Item = Check>) -> Self {
        self.checks.extend(checks);
        self
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
        Severity::from_impact(self.impact)
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }
}
