//! # reportsmith - declarative reports from CSV and XLSX sources
//!
//! A YAML config names the sources of each table, how they are cleaned and
//! merged, and the SQL queries to run over the resulting tables. Query
//! results are exported as CSV or XLSX files.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ report.yaml │────▶│   Tables    │────▶│   Queries   │────▶│   Export    │
//! │ (validated) │     │ (CSV, XLSX) │     │ (SQL + Lua) │     │ (CSV, XLSX) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reportsmith::{run_report, RunLog, RunOptions};
//! use std::path::Path;
//!
//! fn main() {
//!     let mut log = RunLog::new();
//!     let outcome = run_report(Path::new("report.yaml"), RunOptions::default(), &mut log).unwrap();
//!     println!("Built {} tables", outcome.tables.len());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per stage
//! - [`config`] - Typed report configuration
//! - [`validation`] - YAML loading and schema validation
//! - [`parser`] - CSV and XLSX import
//! - [`transform`] - Source transformations and the run pipeline
//! - [`tables`] - Table assembly
//! - [`store`] - Working SQLite store
//! - [`postprocess`] - Lua postprocess functions
//! - [`queries`] - Query runner
//! - [`export`] - Output files

// Core modules
pub mod error;
pub mod logs;
pub mod models;
pub mod settings;

// Configuration
pub mod config;
pub mod validation;

// Import and transformation
pub mod parser;
pub mod tables;
pub mod transform;

// Store and queries
pub mod postprocess;
pub mod queries;
pub mod store;

// Output
pub mod export;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    AssemblyError,
    ConfigError,
    ExportError,
    ImportError,
    PipelineError,
    PostprocessError,
    QueryError,
    StoreError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use logs::{LogEntry, LogLevel, RunLog};
pub use models::{Frame, RowIndex};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{ExportFormat, ReportConfig};
pub use validation::{load_config, validate_config_text, ValidatedReport};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use export::{Exporter, FileExporter};
pub use postprocess::FunctionRegistry;
pub use queries::{run_queries, QueryOutput};
pub use store::{RelationalStore, SqliteStore};
pub use tables::assemble_tables;
pub use transform::pipeline::{run_report, ReportOutcome, RunOptions, Stage};
