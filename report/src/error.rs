//! Error types for the report pipeline.
//!
//! One enum per stage, mirroring the order a run goes through:
//!
//! - [`ConfigError`] - configuration document and schema errors
//! - [`ImportError`] - reading a single source file
//! - [`AssemblyError`] - building a table from its sources
//! - [`StoreError`] - the working store
//! - [`PostprocessError`] - user-supplied postprocess functions
//! - [`QueryError`] - running queries
//! - [`ExportError`] - writing report files
//! - [`PipelineError`] - top-level orchestration errors
//!
//! Every variant is fatal for the run. Soft conditions are logged as
//! warnings in [`crate::logs::RunLog`] and never reach these types.

use std::path::PathBuf;
use thiserror::Error;

use crate::settings;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors found while validating the configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Could not read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid YAML.
    #[error("This config file has invalid YAML: {message}\nIn file: {}", .path.display())]
    Yaml { path: PathBuf, message: String },

    /// A key does not match its schema.
    #[error("Invalid configuration at '{location}': {message}\nIn file: {}", .path.display())]
    Schema {
        path: PathBuf,
        location: String,
        message: String,
    },

    /// A required key is missing.
    #[error("Missing required key: {0}")]
    MissingKey(String),

    /// Neither queries nor exported tables.
    #[error("{}", settings::MSG_NEED_EXPORT_TABLES_OR_QUERIES)]
    NothingToOutput,

    /// `output.basename` still has the template value.
    #[error("{}\n    output.basename is still set to the default: {0}\n    Please edit your config file, then try running this report again.", settings::MSG_INVALID_CONFIG_NO_EDITS)]
    NotEdited(String),

    /// Paths referenced by the config do not exist.
    #[error("{}:\n{}", settings::MSG_PATH_NOT_FOUND, .0.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join("\n"))]
    PathsNotFound(Vec<PathBuf>),

    /// More than one source of a table sets include_index.
    #[error("More than one include_index in table: {0}\n{}", settings::MSG_INCLUDE_INDEX_TABLE_CONFLICT_PS)]
    IncludeIndexConflict(String),

    /// A query uses postprocess but nothing is imported.
    #[error("Query '{query}' uses postprocess function '{function}' but no modules are imported\n{}", settings::MSG_POSTPROCESS_BUT_NO_IMPORT_PS)]
    PostprocessWithoutImport { query: String, function: String },

    /// A query names a postprocess function no imported module defines.
    #[error("Postprocess function not found in imported modules: {function} (query '{query}')")]
    PostprocessNotFound { query: String, function: String },

    /// An imported module could not be loaded.
    #[error("Could not load module {}: {message}", .path.display())]
    Module { path: PathBuf, message: String },

    /// The output directory cannot be created.
    #[error("Cannot create output directory, a file with that name exists: {}", .0.display())]
    OutputDir(PathBuf),

    /// IO error while preparing the output directory.
    #[error("Output directory error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Import Errors
// =============================================================================

/// Errors while reading one source file.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Failed to read file.
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid delimited text.
    #[error("Invalid CSV in {}: {message}", .path.display())]
    Csv { path: PathBuf, message: String },

    /// File has no header row.
    #[error("No headers found in {}", .path.display())]
    NoHeaders { path: PathBuf },

    /// Workbook could not be opened or parsed.
    #[error("Could not read workbook {}: {message}", .path.display())]
    Workbook { path: PathBuf, message: String },

    /// Requested sheet is not in the workbook.
    #[error("Sheet '{sheet}' not found in {}", .path.display())]
    SheetNotFound { path: PathBuf, sheet: String },
}

// =============================================================================
// Table Assembly Errors
// =============================================================================

/// Errors while building a table from its sources.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// Extension is neither csv nor xlsx.
    #[error("Unsupported file extension (expected csv or xlsx)\nIn file: {}", .path.display())]
    BadFileExtension { path: PathBuf },

    /// Source could not be imported.
    #[error("Table '{table}': {source}")]
    Import {
        table: String,
        #[source]
        source: ImportError,
    },

    /// Pivot names a column the source does not have.
    #[error("Pivot failed, column not found: {column}\nIn file: {}", .path.display())]
    PivotMissingColumn { column: String, path: PathBuf },

    /// Pivot would produce two values for one cell.
    #[error("Pivot failed, duplicate entry for index '{index}' and column '{column}'\nIn file: {}", .path.display())]
    PivotDuplicate {
        index: String,
        column: String,
        path: PathBuf,
    },

    /// Datetime names a column the source does not have.
    #[error("Datetime column not found: {column}\nIn file: {}", .path.display())]
    DatetimeMissingColumn { column: String, path: PathBuf },

    /// A value could not be read as a date or time.
    #[error("Could not convert '{value}' in column '{column}' to a datetime\nIn file: {}", .path.display())]
    DatetimeParse {
        column: String,
        value: String,
        path: PathBuf,
    },

    /// Datetime format string is not valid.
    #[error("Invalid datetime format '{format}' for column '{column}'\nIn file: {}", .path.display())]
    DatetimeFormat {
        column: String,
        format: String,
        path: PathBuf,
    },

    /// Two columns of a source would get the same name.
    #[error("Column '{column}' would appear twice after {step}\nIn file: {}", .path.display())]
    DuplicateColumn {
        column: String,
        step: &'static str,
        path: PathBuf,
    },

    /// The stored row index has the name of a table column.
    #[error("Could not add index column '{column}' to table '{table}': a column has that name\n{}", settings::MSG_INCLUDE_INDEX_CONFLICT_PS)]
    IndexColumnConflict { table: String, column: String },

    /// Sources share no column to merge on.
    #[error("Could not merge into table '{table}': no columns in common\nIn file: {}\n{}", .path.display(), settings::MSG_MERGE_ERROR_PS)]
    NoCommonColumns { table: String, path: PathBuf },

    /// Shared column holds numbers on one side and text on the other.
    #[error("Could not merge into table '{table}': column '{column}' is {left} in the table but {right} in this source\nIn file: {}", .path.display())]
    MergeTypeMismatch {
        table: String,
        column: String,
        left: &'static str,
        right: &'static str,
        path: PathBuf,
    },

    /// Table could not be written to the store.
    #[error("Could not create table '{table}': {source}")]
    Store {
        table: String,
        #[source]
        source: StoreError,
    },
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from the working store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying engine error.
    #[error("Database error: {0}")]
    Engine(#[from] rusqlite::Error),

    /// A table with this name already exists.
    #[error("Table already exists: {0}")]
    Duplicate(String),
}

// =============================================================================
// Postprocess Errors
// =============================================================================

/// Errors from user postprocess functions.
#[derive(Debug, Error)]
pub enum PostprocessError {
    /// Function not in the registry.
    #[error("Postprocess function not found: {0}")]
    NotFound(String),

    /// Function does not take exactly one argument.
    #[error("Postprocess function '{function}' takes {params} argument(s), but 1 was given\n{}", settings::MSG_POSTPROCESS_ARGS_PS)]
    WrongArity { function: String, params: usize },

    /// Function raised an error.
    #[error("Postprocess function '{function}' failed: {message}\n{}", settings::MSG_POSTPROCESS_EXAMINE_CODE)]
    Failed { function: String, message: String },

    /// Function returned something other than a table.
    #[error("Postprocess function '{function}' did not return a table: {message}\n{}", settings::MSG_POSTPROCESS_ARGS_PS)]
    NotTabular { function: String, message: String },

    /// Function returned a table with no rows or no columns.
    #[error("Postprocess function '{0}' returned an empty table")]
    Empty(String),
}

// =============================================================================
// Query Errors
// =============================================================================

/// Errors while running queries.
#[derive(Debug, Error)]
pub enum QueryError {
    /// SQL could not be executed.
    #[error("Could not run query '{name}': {source}")]
    Run {
        name: String,
        #[source]
        source: StoreError,
    },

    /// Query name collides with a table or earlier query.
    #[error("Query name is already in use: {0}\n{}", settings::MSG_QUERY_DUPLICATE_ERROR_PS)]
    Duplicate(String),

    /// Result could not be saved.
    #[error("Could not save query '{name}': {source}")]
    Save {
        name: String,
        #[source]
        source: StoreError,
    },

    /// Postprocess step failed.
    #[error("Query '{name}': {source}")]
    Postprocess {
        name: String,
        #[source]
        source: PostprocessError,
    },
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while writing output files.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Output file exists and overwriting was not forced.
    #[error("Output file already exists (use --force to overwrite): {}", .0.display())]
    Exists(PathBuf),

    /// IO error.
    #[error("Export IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writer error.
    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),

    /// Workbook writer error.
    #[error("XLSX export error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// Store could not be read or copied.
    #[error("Export database error: {0}")]
    Store(#[from] StoreError),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level error returned by [`crate::transform::pipeline::run_report`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Table assembly error.
    #[error("{0}")]
    Assembly(#[from] AssemblyError),

    /// Query error.
    #[error("{0}")]
    Query(#[from] QueryError),

    /// Export error.
    #[error("{0}")]
    Export(#[from] ExportError),

    /// Working store could not be opened.
    #[error("{0}")]
    Store(#[from] StoreError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for configuration validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for source imports.
pub type ImportResult<T> = Result<T, ImportError>;

/// Result type for table assembly.
pub type AssemblyResult<T> = Result<T, AssemblyError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for postprocess calls.
pub type PostprocessResult<T> = Result<T, PostprocessError>;

/// Result type for query runs.
pub type QueryResult<T> = Result<T, QueryError>;

/// Result type for exports.
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for a whole run.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let err = AssemblyError::PivotMissingColumn {
            column: "id_missing".into(),
            path: PathBuf::from("data.csv"),
        };
        let pipeline_err: PipelineError = err.into();
        let msg = pipeline_err.to_string();
        assert!(msg.contains("id_missing"));
        assert!(msg.contains("data.csv"));

        let err = QueryError::Duplicate("totals".into());
        let pipeline_err: PipelineError = err.into();
        assert!(pipeline_err.to_string().contains("rename"));
    }

    #[test]
    fn test_paths_not_found_lists_every_path() {
        let err = ConfigError::PathsNotFound(vec![
            PathBuf::from("a.csv"),
            PathBuf::from("b.xlsx"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("a.csv"));
        assert!(msg.contains("b.xlsx"));
    }

    #[test]
    fn test_wrong_arity_is_distinct() {
        let arity = PostprocessError::WrongArity {
            function: "two_args".into(),
            params: 2,
        };
        let failed = PostprocessError::Failed {
            function: "two_args".into(),
            message: "boom".into(),
        };
        assert!(arity.to_string().contains("but 1 was given"));
        assert!(!failed.to_string().contains("but 1 was given"));
        assert!(failed.to_string().contains(settings::MSG_POSTPROCESS_EXAMINE_CODE));
    }
}
