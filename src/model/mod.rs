//! Check model.
//!
//! Declarative representation of controls and checks, independent of
//! execution:
//! - Parameters: externally supplied inputs and placeholder substitution
//! - Checks: command, directory, and environment assertions
//! - Controls: named, weighted groups of checks
//! - Profiles: documents that build validated controls from parameters
//!
//! Everything here is a value object. Construction validates structure and
//! resolves parameters; nothing touches the live system.

pub mod check;
pub mod control;
pub mod params;
pub mod profile;
