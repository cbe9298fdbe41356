//! Integration tests for container-audit.
//!
//! These tests build profiles from YAML and run them against the live
//! system, using commands and paths every POSIX host provides.

pub mod model_tests;
pub mod run_tests;
