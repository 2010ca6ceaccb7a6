//! High-level pipeline API for a report run.
//!
//! A run goes through `Validate → AssembleTables → RunQueries → Export`
//! strictly in order and stops at the first error. The working store is
//! created empty for each run and dropped at the end.
//!
//! # Example
//!
//! ```rust,ignore
//! use reportsmith::{run_report, RunLog, RunOptions};
//! use std::path::Path;
//!
//! let mut log = RunLog::new();
//! let outcome = run_report(Path::new("report.yaml"), RunOptions::default(), &mut log)?;
//! println!("Wrote {} files", outcome.files.len());
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, PipelineResult};
use crate::export::{Exporter, FileExporter};
use crate::logs::RunLog;
use crate::queries::{run_queries, QueryOutput};
use crate::settings;
use crate::store::{RelationalStore, SqliteStore};
use crate::tables::assemble_tables;
use crate::validation::load_config;

/// Options given on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Also write the working database to `<basename>.db`.
    pub database: bool,
    /// Replace existing output files.
    pub force: bool,
}

/// Stage a run is in; see [`PipelineError::stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    AssembleTables,
    RunQueries,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Validate => "validate",
            Stage::AssembleTables => "assemble tables",
            Stage::RunQueries => "run queries",
            Stage::Export => "export",
        })
    }
}

impl PipelineError {
    /// Stage the run was in when it stopped.
    ///
    /// Opening the working store counts as table assembly, and writing
    /// table files as export.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Config(_) => Stage::Validate,
            PipelineError::Store(_) | PipelineError::Assembly(_) => Stage::AssembleTables,
            PipelineError::Query(_) => Stage::RunQueries,
            PipelineError::Export(_) => Stage::Export,
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    /// Tables built, in declared order.
    pub tables: Vec<String>,
    /// Query results, in declared order.
    pub queries: Vec<QueryOutput>,
    /// Every file written.
    pub files: Vec<PathBuf>,
}

/// Run the report described by the config file at `path`.
pub fn run_report(path: &Path, options: RunOptions, log: &mut RunLog) -> PipelineResult<ReportOutcome> {
    tracing::debug!(stage = ?Stage::Validate, config = %path.display());
    let report = load_config(path, log)?;
    let config = &report.config;
    let exporter = FileExporter::new(&config.output, options.force);

    let mut store = SqliteStore::open_in_memory()?;
    let mut files = Vec::new();

    tracing::debug!(stage = ?Stage::AssembleTables, tables = config.tables.len());
    let tables = assemble_tables(config, &mut store, log)?;

    if let Some(format) = config.output.export_tables {
        let written = exporter.export_tables(&store, format)?;
        log_written(log, &written);
        files.extend(written);
    }

    tracing::debug!(stage = ?Stage::RunQueries, queries = config.queries.len());
    let queries = run_queries(&config.queries, &mut store, &report.functions, log)?;
    tracing::trace!(store = %store.table_names().join(", "));

    tracing::debug!(stage = ?Stage::Export);
    if !queries.is_empty() {
        let written = exporter.export_queries(&queries, config.output.query_format())?;
        log_written(log, &written);
        files.extend(written);
    }

    if options.database {
        let written = exporter.export_database(&store)?;
        log_written(log, std::slice::from_ref(&written));
        files.push(written);
    }

    log.success(settings::MSG_SUCCESS_REPORT_COMPLETE);
    Ok(ReportOutcome {
        tables: tables.into_iter().map(|t| t.name).collect(),
        queries,
        files,
    })
}

fn log_written(log: &mut RunLog, files: &[PathBuf]) {
    for file in files {
        log.info_with_data(settings::MSG_EXPORTED, file.display(), 0, 1);
    }
}
