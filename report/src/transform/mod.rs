//! Transformation module.
//!
//! - Operations: input-wide rewrites and regex replacement
//! - Reshape: pivot and datetime conversion of one source
//! - Merge: outer join of a table's sources
//! - Pipeline: a whole report run

pub mod merge;
pub mod operations;
pub mod pipeline;
pub mod reshape;

pub use pipeline::{run_report, ReportOutcome, RunOptions, Stage};
