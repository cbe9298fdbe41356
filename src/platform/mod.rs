//! Platform abstraction layer.
//!
//! The read-only oracles checks are evaluated against:
//! - Process execution with timeouts and graceful termination
//! - Filesystem, environment, and host identity on Linux

pub mod linux;
pub mod process;
