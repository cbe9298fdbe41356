//! Check definitions.
//!
//! A [`Check`] is a single declarative assertion. Constructors validate
//! structure; once built, a check is immutable and has no side effects
//! until the runner executes it.

use crate::ConfigurationError;
use regex::Regex;
use std::fmt;
use std::time::Duration;

/// A single pass/fail assertion against the live system.
#[derive(Debug, Clone)]
pub enum Check {
    /// Run a command and inspect its exit status and stdout
    Command(CommandCheck),
    /// Assert a directory exists
    DirectoryExists(DirectoryExistsCheck),
    /// Assert an environment variable has an exact value
    EnvVar(EnvVarCheck),
}

impl Check {
    /// Short human identity, e.g. ``command `ruby --version` ``
    pub fn label(&self) -> String {
        match self {
            Check::Command(c) => format!("command `{}`", c.command),
            Check::DirectoryExists(c) => format!("directory `{}`", c.path),
            Check::EnvVar(c) => format!("env `{}`", c.name),
        }
    }

    /// Description of what a passing result looks like
    pub fn expected(&self) -> String {
        match self {
            Check::Command(c) => match &c.stdout_pattern {
                Some(pattern) => format!("exit status {}, stdout matching /{}/", c.expected_exit, pattern.as_str()),
                None => format!("exit status {}", c.expected_exit),
            },
            Check::DirectoryExists(_) => "directory exists".to_string(),
            Check::EnvVar(c) => format!("{:?}", c.expected),
        }
    }

    /// Kind name used in reports ("command", "directory", "env")
    pub fn kind(&self) -> &'static str {
        match self {
            Check::Command(_) => "command",
            Check::DirectoryExists(_) => "directory",
            Check::EnvVar(_) => "env",
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (expect {})", self.label(), self.expected())
    }
}

impl From<CommandCheck> for Check {
    fn from(check: CommandCheck) -> Self {
        Check::Command(check)
    }
}

impl From<DirectoryExistsCheck> for Check {
    fn from(check: DirectoryExistsCheck) -> Self {
        Check::DirectoryExists(check)
    }
}

impl From<EnvVarCheck> for Check {
    fn from(check: EnvVarCheck) -> Self {
        Check::EnvVar(check)
    }
}

/// Command-result check.
#[derive(Debug, Clone)]
pub struct CommandCheck {
    command: String,
    expected_exit: i32,
    stdout_pattern: Option<Regex>,
    timeout: Option<Duration>,
}

impl CommandCheck {
    pub fn new(command: impl Into<String>, expected_exit: i32) -> Result<Self, ConfigurationError> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(ConfigurationError::InvalidCheck {
                reason: "command must not be empty".to_string(),
            });
        }

        Ok(CommandCheck {
            command,
            expected_exit,
            stdout_pattern: None,
            timeout: None,
        })
    }

    /// Require stdout to match `pattern` (unanchored).
    pub fn with_stdout_pattern(mut self, pattern: &str) -> Result<Self, ConfigurationError> {
        let compiled = Regex::new(pattern).map_err(|source| ConfigurationError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        self.stdout_pattern = Some(compiled);
        Ok(self)
    }

    /// Override the run-wide command timeout for this check.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ConfigurationError> {
        if timeout.is_zero() {
            return Err(ConfigurationError::InvalidCheck {
                reason: "timeout must be greater than zero".to_string(),
            });
        }
        self.timeout = Some(timeout);
        Ok(self)
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn expected_exit(&self) -> i32 {
        self.expected_exit
    }

    pub fn stdout_pattern(&self) -> Option<&Regex> {
        self.stdout_pattern.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Filesystem check: the path must exist and be a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryExistsCheck {
    path: String,
}

impl DirectoryExistsCheck {
    pub fn new(path: impl Into<String>) -> Result<Self, ConfigurationError> {
        let path = path.into();
        if path.is_empty() {
            return Err(ConfigurationError::InvalidCheck {
                reason: "directory path must not be empty".to_string(),
            });
        }
        Ok(DirectoryExistsCheck { path })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Environment check: exact string equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVarCheck {
    name: String,
    expected: String,
}

impl EnvVarCheck {
    pub fn new(name: impl Into<String>, expected: impl Into<String>) -> Result<Self, ConfigurationError> {
        let name = name.into();
        if name.is_empty() || name.contains('=') || name.contains('\0') {
            return Err(ConfigurationError::InvalidCheck {
                reason: format!("invalid environment variable name {:?}", name),
            });
        }
        Ok(EnvVarCheck {
            name,
            expected: expected.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }
}
