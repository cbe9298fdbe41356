//! Linux system interface.
//!
//! Read-only queries against the filesystem, the process environment, and
//! host identity.
//!
//! # Graceful Degradation
//!
//! - Missing path: reported as "does not exist", not as an error
//! - Permission denied and other I/O errors: returned to the caller
//! - Non-Unicode environment values: converted lossily
//! - Hostname unavailable: falls back through /etc/hostname, /proc, $HOSTNAME
//!
//! No function in this module will panic.

use std::fs;
use std::io;
use std::path::Path;

/// What a path turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Missing,
    Directory,
    Other,
}

/// Stat `path` without following the caller into error handling for
/// the common "not there" case.
pub fn path_kind(path: &str) -> io::Result<PathKind> {
    match fs::metadata(Path::new(path)) {
        Ok(meta) if meta.is_dir() => Ok(PathKind::Directory),
        Ok(_) => Ok(PathKind::Other),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PathKind::Missing),
        Err(e) => Err(e),
    }
}

/// Get an environment variable, lossily decoded; `None` when unset.
pub fn get_environment_variable(name: &str) -> Option<String> {
    std::env::var_os(name).map(|v| v.to_string_lossy().into_owned())
}

/// Get the system hostname
pub fn get_hostname() -> Option<String> {
    let candidates = ["/etc/hostname", "/proc/sys/kernel/hostname"];

    for path in candidates {
        if let Ok(hostname) = fs::read_to_string(path) {
            let hostname = hostname.trim();
            if !hostname.is_empty() {
                return Some(hostname.to_string());
            }
        }
    }

    get_environment_variable("HOSTNAME").filter(|h| !h.is_empty())
}
