//! Profile documents.
//!
//! A profile document is the declarative YAML (or JSON) form of a list of
//! controls. [`Profile::build`] validates it and resolves every placeholder
//! against a [`ParameterSet`], producing immutable [`Control`]s.
//!
//! ```yaml
//! name: cinc-auditor-alpine
//! strict_versions: true
//! controls:
//!   - name: ruby-version
//!     title: Ruby version is installed
//!     impact: 0.7
//!     checks:
//!       - command: ruby --version
//!         exit_status: 0
//!         stdout: 'ruby %~ruby_version%\.\d+'
//!   - name: expected-plugins-installed
//!     checks:
//!       - command: cinc-auditor plugin list
//!         stdout: '%plugin%'
//!         for_each: expected_plugins
//!         as: plugin
//! ```

use crate::model::check::{Check, CommandCheck, DirectoryExistsCheck, EnvVarCheck};
use crate::model::control::Control;
use crate::model::params::{is_identifier, scalar_text, substitute, Context, ParameterSet, Scope};
use crate::ConfigurationError;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use std::collections::HashSet;
use std::time::Duration;

/// Binding name used by `for_each` when `as` is omitted.
pub const DEFAULT_BINDING: &str = "item";

/// Declarative profile as read from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileDocument {
    #[serde(default)]
    pub name: Option<String>,
    /// Whether `%~name%` placeholders must match the exact version
    #[serde(default = "default_strict_versions")]
    pub strict_versions: bool,
    #[serde(default)]
    pub controls: Vec<ControlDocument>,
}

fn default_strict_versions() -> bool {
    true
}

fn default_impact() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlDocument {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "description")]
    pub desc: Option<String>,
    #[serde(default = "default_impact")]
    pub impact: f64,
    #[serde(default)]
    pub checks: Vec<CheckDocument>,
}

/// One check entry. Exactly one of `command`, `directory`, or `env` must be
/// present; the remaining fields must belong to that kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckDocument {
    pub command: Option<String>,
    pub exit_status: Option<i32>,
    pub stdout: Option<String>,
    pub timeout_secs: Option<u64>,
    pub directory: Option<String>,
    pub env: Option<String>,
    pub equals: Option<YamlValue>,
    pub for_each: Option<String>,
    #[serde(rename = "as")]
    pub bind_as: Option<String>,
}

impl ProfileDocument {
    /// Parse a YAML or JSON profile. `origin` names the source in errors.
    pub fn parse(text: &str, origin: &str) -> Result<Self, ConfigurationError> {
        serde_yaml::from_str(text).map_err(|e| ConfigurationError::Parse {
            origin: origin.to_string(),
            message: e.to_string(),
        })
    }
}

/// Options applied while building a profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Overrides the document's `strict_versions` when set
    pub strict_versions: Option<bool>,
}

/// A validated, fully resolved profile.
#[derive(Debug, Clone)]
pub struct Profile {
    name: String,
    strict_versions: bool,
    controls: Vec<Control>,
}

impl Profile {
    /// Assemble a profile from already constructed controls.
    pub fn new(name: impl Into<String>, controls: Vec<Control>) -> Result<Self, ConfigurationError> {
        let mut seen = HashSet::new();
        for control in &controls {
            if !seen.insert(control.name()) {
                return Err(ConfigurationError::DuplicateControl {
                    name: control.name().to_string(),
                });
            }
        }

        Ok(Profile {
            name: name.into(),
            strict_versions: true,
            controls,
        })
    }

    /// Validate a document and resolve it against `params`.
    pub fn build(doc: &ProfileDocument, params: &ParameterSet, options: &BuildOptions) -> Result<Self, ConfigurationError> {
        let strict_versions = options.strict_versions.unwrap_or(doc.strict_versions);

        let controls = doc
            .controls
            .iter()
            .map(|control| {
                build_control(control, params, strict_versions).map_err(|e| match e {
                    e @ ConfigurationError::InControl { .. } => e,
                    e => e.within(&control.name, None),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut profile = Profile::new(doc.name.clone().unwrap_or_else(|| "profile".to_string()), controls)?;
        profile.strict_versions = strict_versions;
        Ok(profile)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strict_versions(&self) -> bool {
        self.strict_versions
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    /// Total number of checks across all controls
    pub fn check_count(&self) -> usize {
        self.controls.iter().map(|c| c.checks().len()).sum()
    }
}

fn build_control(doc: &ControlDocument, params: &ParameterSet, strict_versions: bool) -> Result<Control, ConfigurationError> {
    let scope = Scope::new(params);
    let mut control = Control::new(doc.name.clone(), doc.impact)?;

    if let Some(title) = &doc.title {
        control = control.with_title(substitute(title, &scope, Context::Literal)?);
    }
    if let Some(desc) = &doc.desc {
        control = control.with_description(substitute(desc, &scope, Context::Literal)?);
    }

    for (index, entry) in doc.checks.iter().enumerate() {
        let checks = expand_entry(entry, params, strict_versions).map_err(|e| e.within(&doc.name, Some(index)))?;
        control = control.with_checks(checks);
    }

    Ok(control)
}

/// Expand one entry, honoring `for_each`, into zero or more checks.
fn expand_entry(entry: &CheckDocument, params: &ParameterSet, strict_versions: bool) -> Result<Vec<Check>, ConfigurationError> {
    let scope = Scope::new(params);

    let Some(list_name) = &entry.for_each else {
        if entry.bind_as.is_some() {
            return Err(invalid("'as' requires 'for_each'"));
        }
        return Ok(vec![build_check(entry, &scope, strict_versions)?]);
    };

    let binding = entry.bind_as.as_deref().unwrap_or(DEFAULT_BINDING);
    if !is_identifier(binding) {
        return Err(invalid(&format!("'as' name {:?} is not a valid identifier", binding)));
    }

    scope
        .list(list_name)?
        .iter()
        .map(|item| build_check(entry, &scope.bind(binding, item), strict_versions))
        .collect()
}

fn build_check(entry: &CheckDocument, scope: &Scope<'_>, strict_versions: bool) -> Result<Check, ConfigurationError> {
    let literal = |text: &str| substitute(text, scope, Context::Literal);

    match (&entry.command, &entry.directory, &entry.env) {
        (Some(command), None, None) => {
            reject(entry.equals.is_some(), "equals", "command")?;

            let mut check = CommandCheck::new(literal(command)?, entry.exit_status.unwrap_or(0))?;
            if let Some(pattern) = &entry.stdout {
                let pattern = substitute(pattern, scope, Context::Pattern { strict_versions })?;
                check = check.with_stdout_pattern(&pattern)?;
            }
            if let Some(secs) = entry.timeout_secs {
                check = check.with_timeout(Duration::from_secs(secs))?;
            }
            Ok(check.into())
        }
        (None, Some(path), None) => {
            reject(entry.exit_status.is_some(), "exit_status", "directory")?;
            reject(entry.stdout.is_some(), "stdout", "directory")?;
            reject(entry.timeout_secs.is_some(), "timeout_secs", "directory")?;
            reject(entry.equals.is_some(), "equals", "directory")?;

            Ok(DirectoryExistsCheck::new(literal(path)?)?.into())
        }
        (None, None, Some(name)) => {
            reject(entry.exit_status.is_some(), "exit_status", "env")?;
            reject(entry.stdout.is_some(), "stdout", "env")?;
            reject(entry.timeout_secs.is_some(), "timeout_secs", "env")?;

            let expected = match &entry.equals {
                Some(value) => scalar_text(value).ok_or_else(|| invalid("'equals' must be a string, number, or boolean"))?,
                None => return Err(invalid("env check requires 'equals'")),
            };
            Ok(EnvVarCheck::new(literal(name)?, literal(&expected)?)?.into())
        }
        (None, None, None) => Err(invalid("check must declare one of 'command', 'directory', or 'env'")),
        _ => Err(invalid("check declares more than one of 'command', 'directory', and 'env'")),
    }
}

fn reject(present: bool, field: &str, kind: &str) -> Result<(), ConfigurationError> {
    if present {
        Err(invalid(&format!("'{}' is not valid on a {} check", field, kind)))
    } else {
        Ok(())
    }
}

fn invalid(reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidCheck {
        reason: reason.to_string(),
    }
}
