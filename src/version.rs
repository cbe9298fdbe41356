//! Build metadata reported by `container-audit version`.
//!
//! Everything except the package version and target is optional: `build.rs`
//! leaves a variable unset when it could not find git, `date` or rustc, and
//! the matching line is dropped from the output.

use std::fmt;

/// What was baked into this binary at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub target: &'static str,
    pub git_hash: Option<&'static str>,
    pub built_at: Option<&'static str>,
    pub rustc: Option<&'static str>,
}

pub const BUILD_INFO: BuildInfo = BuildInfo {
    version: env!("CARGO_PKG_VERSION"),
    target: env!("CONTAINER_AUDIT_TARGET"),
    git_hash: option_env!("CONTAINER_AUDIT_GIT_HASH"),
    built_at: option_env!("CONTAINER_AUDIT_BUILD_DATE"),
    rustc: option_env!("CONTAINER_AUDIT_RUSTC_VERSION"),
};

impl BuildInfo {
    /// Known `(label, value)` pairs shown under the version line
    pub fn details(&self) -> impl Iterator<Item = (&'static str, &'static str)> {
        [
            ("target", Some(self.target)),
            ("commit", self.git_hash),
            ("built", self.built_at),
            ("rustc", self.rustc),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.map(|v| (label, v)))
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container-audit {}", self.version)?;
        for (label, value) in self.details() {
            write!(f, "\n  {:<7} {}", label, value)?;
        }
        Ok(())
    }
}
