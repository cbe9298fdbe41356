//! Validation engine module.
//!
//! Executes controls against the live system, handles cancellation, and
//! aggregates results into a finalized report.

pub mod cancel;
pub mod result;
pub mod runner;
