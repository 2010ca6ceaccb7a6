//! Typed report configuration.
//!
//! A [`ReportConfig`] is built once, from a document that has already passed
//! schema validation (see [`crate::validation`]), and is read-only from then
//! on. Mappings whose order matters (tables, datetime columns, replace
//! rules) are kept as ordered vectors.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::settings;

/// The whole report definition.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Tables in declared order.
    pub tables: Vec<TableConfig>,
    /// User modules providing postprocess functions.
    pub imports: Vec<PathBuf>,
    /// Options applied to every source.
    pub input: InputOptions,
    pub output: OutputConfig,
    /// Queries in declared order.
    pub queries: Vec<QueryConfig>,
}

/// One named table and its sources.
#[derive(Debug, Clone)]
pub struct TableConfig {
    pub name: String,
    pub sources: Vec<SourceConfig>,
}

impl TableConfig {
    /// Whether any source of this table pivots.
    pub fn has_pivot(&self) -> bool {
        self.sources.iter().any(|s| s.pivot.is_some())
    }

    /// The single explicit `include_index`, if a source sets one.
    pub fn explicit_include_index(&self) -> Option<bool> {
        self.sources.iter().find_map(|s| s.include_index)
    }
}

/// One source file of a table.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub path: PathBuf,
    pub sheet: Option<SheetSelector>,
    /// Columns to convert, with an optional output format.
    pub datetime: Vec<DatetimeColumn>,
    pub pivot: Option<PivotSpec>,
    pub include_index: Option<bool>,
}

/// Which sheet of a workbook to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSelector {
    Name(String),
    Index(usize),
}

impl std::fmt::Display for SheetSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SheetSelector::Name(name) => write!(f, "{}", name),
            SheetSelector::Index(i) => write!(f, "#{}", i),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatetimeColumn {
    pub column: String,
    pub format: Option<String>,
}

/// Long to wide reshape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PivotSpec {
    pub index: String,
    pub columns: String,
    pub values: String,
}

/// Options from the `input` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InputOptions {
    pub strip: bool,
    pub slugify_columns: bool,
    pub lowercase_columns: bool,
    pub uppercase_rows: bool,
    pub include_index: bool,
}

/// Export format for tables or queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Styles {
    pub column_width: u32,
}

/// Options from the `output` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputConfig {
    pub basename: String,
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub export_tables: Option<ExportFormat>,
    #[serde(default)]
    pub export_queries: Option<ExportFormat>,
    #[serde(default)]
    pub styles: Option<Styles>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(settings::DEFAULT_OUTPUT_DIR)
}

impl OutputConfig {
    /// Format for query exports; workbooks unless configured otherwise.
    pub fn query_format(&self) -> ExportFormat {
        self.export_queries.unwrap_or(ExportFormat::Xlsx)
    }
}

/// One entry of `queries`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    pub name: String,
    pub sql: String,
    pub replace: Vec<ReplaceRule>,
    pub postprocess: Option<String>,
}

/// Replacements for one result column, in declared order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceRule {
    pub column: String,
    /// (pattern, replacement) pairs.
    pub patterns: Vec<(String, String)>,
}

// =============================================================================
// Building from a validated document
// =============================================================================

impl ReportConfig {
    /// Build the typed config from a schema-validated document.
    ///
    /// Relative paths are resolved against `base_dir` (the config file's
    /// directory). Returns a message when a section cannot be converted.
    pub fn from_document(doc: &Map<String, Value>, base_dir: &Path) -> Result<Self, String> {
        let tables = match doc.get("tables_config") {
            Some(Value::Object(tables)) => tables
                .iter()
                .map(|(name, sources)| table_from_value(name, sources, base_dir))
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };

        let imports = match doc.get("import") {
            Some(Value::Array(entries)) => entries
                .iter()
                .filter_map(|e| e.get("path").and_then(Value::as_str))
                .map(|p| resolve(base_dir, p))
                .collect(),
            _ => Vec::new(),
        };

        let input = match doc.get("input") {
            Some(v @ Value::Object(_)) => {
                serde_json::from_value(v.clone()).map_err(|e| format!("input: {}", e))?
            }
            _ => InputOptions::default(),
        };

        let mut output: OutputConfig = match doc.get("output") {
            Some(v @ Value::Object(_)) => {
                serde_json::from_value(v.clone()).map_err(|e| format!("output: {}", e))?
            }
            _ => return Err("output: missing".to_string()),
        };
        output.dir = resolve(base_dir, &output.dir.to_string_lossy());

        let queries = match doc.get("queries") {
            Some(Value::Array(queries)) => queries
                .iter()
                .map(query_from_value)
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };

        Ok(Self {
            tables,
            imports,
            input,
            output,
            queries,
        })
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&TableConfig> {
        self.tables.iter().find(|t| t.name == name)
    }
}

fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn table_from_value(name: &str, sources: &Value, base_dir: &Path) -> Result<TableConfig, String> {
    let sources = sources
        .as_array()
        .ok_or_else(|| format!("tables_config.{}: expected a list of sources", name))?
        .iter()
        .map(|source| source_from_value(name, source, base_dir))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TableConfig {
        name: name.to_string(),
        sources,
    })
}

fn source_from_value(table: &str, source: &Value, base_dir: &Path) -> Result<SourceConfig, String> {
    let path = source
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| format!("tables_config.{}: source without path", table))?;

    let sheet = match source.get("sheet") {
        Some(Value::String(name)) => Some(SheetSelector::Name(name.clone())),
        Some(Value::Number(n)) => n.as_u64().map(|i| SheetSelector::Index(i as usize)),
        _ => None,
    };

    let datetime = match source.get("datetime") {
        Some(Value::Object(columns)) => columns
            .iter()
            .map(|(column, format)| DatetimeColumn {
                column: column.clone(),
                format: format.as_str().map(str::to_string),
            })
            .collect(),
        _ => Vec::new(),
    };

    let pivot = match source.get("pivot") {
        Some(v @ Value::Object(_)) => Some(
            serde_json::from_value(v.clone()).map_err(|e| format!("tables_config.{}: pivot: {}", table, e))?,
        ),
        _ => None,
    };

    Ok(SourceConfig {
        path: resolve(base_dir, path),
        sheet,
        datetime,
        pivot,
        include_index: source.get("include_index").and_then(Value::as_bool),
    })
}

fn query_from_value(query: &Value) -> Result<QueryConfig, String> {
    let field = |key: &str| query.get(key).and_then(Value::as_str).map(str::to_string);
    let name = field("name").ok_or("queries: query without name")?;
    let sql = field("sql").ok_or_else(|| format!("queries.{}: missing sql", name))?;

    let replace = match query.get("replace") {
        Some(Value::Object(columns)) => columns
            .iter()
            .map(|(column, patterns)| ReplaceRule {
                column: column.clone(),
                patterns: patterns
                    .as_object()
                    .map(|m| m.iter().map(|(find, repl)| (find.clone(), scalar_text(repl))).collect())
                    .unwrap_or_default(),
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(QueryConfig {
        name,
        sql,
        replace,
        postprocess: field("postprocess"),
    })
}

/// Replacement values may be written as bare numbers or booleans in YAML.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
