//! Constants shared across the pipeline.
//!
//! Everything here is immutable. Components take what they need by
//! reference instead of instantiating a settings object.

/// Config file used when `-c` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "report.yaml";

/// Packaged configuration template written by `reportsmith new`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../templates/report.yaml");

/// `output.basename` shipped in the template; a config still using it is rejected.
pub const TEMPLATE_BASENAME: &str = "CHANGE_ME";

/// Output directory used when `output.dir` is not set.
pub const DEFAULT_OUTPUT_DIR: &str = ".";

/// Basename of the workbook holding every exported table.
pub const EXPORT_TABLES_BASENAME: &str = "tables";

/// Suffix for the column that keeps a datetime column's original value.
pub const RAW_COLUMN_SUFFIX: &str = "_raw";

/// Format applied to datetime columns without an explicit format.
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column name for a positional row index when it is kept.
pub const DEFAULT_INDEX_NAME: &str = "index";

/// Excel limits sheet names to 31 characters.
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Highest supported `-v` count.
pub const MAX_VERBOSE: u8 = 3;

/// Delimiters tried when sniffing a delimited source.
pub const CANDIDATE_DELIMITERS: [char; 4] = [',', ';', '\t', '|'];

// =============================================================================
// Messages
// =============================================================================

pub const MSG_SUCCESS_REPORT_COMPLETE: &str = "Report complete";
pub const MSG_INVALID_CONFIG_NO_EDITS: &str =
    "This config file does not appear to have been edited";
pub const MSG_NEED_EXPORT_TABLES_OR_QUERIES: &str =
    "Config needs either 'queries' or 'output.export_tables' to produce any output";
pub const MSG_EXPORT_TABLES_ONLY: &str = "No queries configured; exporting tables only as";
pub const MSG_PATH_NOT_FOUND: &str = "One or more paths in your config could not be found";
pub const MSG_INCLUDE_INDEX_TABLE_CONFLICT_PS: &str =
    "Only one source per table may set include_index";
pub const MSG_INCLUDE_INDEX_CONFLICT_PS: &str =
    "Rename that column, or set include_index: false for this table";
pub const MSG_POSTPROCESS_BUT_NO_IMPORT_PS: &str =
    "Add the module defining this function under 'import'";
pub const MSG_POSTPROCESS_EXAMINE_CODE: &str = "Please examine your custom code";
pub const MSG_POSTPROCESS_ARGS_PS: &str =
    "A postprocess function must accept exactly one argument (the query result) and return a table";
pub const MSG_QUERY_DUPLICATE_ERROR_PS: &str =
    "Each query needs a unique name that is not already used by a table; please rename it";
pub const MSG_MERGE_ERROR_PS: &str =
    "Sources of one table are merged on the columns they share; make sure they share at least one";

pub const MSG_STRIP_WHITESPACE: &str = "Stripping whitespace from all values";
pub const MSG_SLUGIFY_COLUMNS: &str = "Slugifying column names";
pub const MSG_LOWERCASE_COLUMNS: &str = "Lowercasing column names";
pub const MSG_UPPERCASE_ROWS: &str = "Uppercasing all values";
pub const MSG_INCLUDE_INDEX_ALL_TRUE: &str = "Including index in all tables by default";
pub const MSG_INCLUDE_INDEX_ALL_FALSE: &str = "Not including index in tables by default";
pub const MSG_INCLUDE_INDEX_TABLE_PIVOT: &str = "Including index because of pivot in table";
pub const MSG_INCLUDE_INDEX_TABLE_TRUE: &str = "Including index in table";
pub const MSG_INCLUDE_INDEX_TABLE_FALSE: &str = "Not including index in table";
pub const MSG_NO_SHEET_PROVIDED: &str = "No sheet provided, using the first sheet of";
pub const MSG_QUERY_EMPTY: &str = "Query returned no results";
pub const MSG_QUERY_REPLACE_COLUMN_ERROR: &str = "Replace skipped, column not in query results";
pub const MSG_QUERY_REPLACE_MATCH_ERROR: &str = "Replace skipped for match";
pub const MSG_QUERY_REPLACE_NOT_TEXT: &str = "Replace skipped, column holds no text";
pub const MSG_CREATING_TABLE: &str = "Creating table";
pub const MSG_CREATED_TABLE: &str = "Created table";
pub const MSG_IMPORTING_DATA: &str = "Importing data from";
pub const MSG_APPLYING_PIVOT: &str = "Applying pivot to";
pub const MSG_CONVERTING_DATETIME: &str = "Converting to datetime";
pub const MSG_MERGING_PATH: &str = "Merging";
pub const MSG_RUNNING_QUERY: &str = "Running query";
pub const MSG_APPLYING_POSTPROCESS: &str = "Applying postprocess function";
pub const MSG_IMPORTING_MODULE: &str = "Importing module";
pub const MSG_FUNCTION_OVERRIDDEN: &str = "Function redefined by a later module";
pub const MSG_EXPORTED: &str = "Exported";
