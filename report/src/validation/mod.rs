//! Configuration validation.
//!
//! A config file goes through two schema passes (JSON Schema Draft 7):
//!
//! 1. The whole document against `config.json`: only the top-level keys are
//!    checked, every section may be `null`.
//! 2. Every present, non-null section against its own strict schema. Tables
//!    are checked one at a time, queries one at a time, and nested mappings
//!    (`datetime`, `pivot`, `replace`, `styles`) separately, so an error
//!    names the exact place it was found.
//!
//! After the schemas pass, the cross-section checks run (paths, edited
//! basename, include_index, postprocess/import) and the output directory is
//! created. The result is a typed [`ReportConfig`] plus the loaded
//! [`FunctionRegistry`].
//!
//! # Embedded Schemas
//!
//! Schemas are embedded at compile time from the `schemas/` directory.

use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ReportConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::logs::RunLog;
use crate::postprocess::FunctionRegistry;
use crate::settings;

/// Validated configuration, ready to run.
#[derive(Debug)]
pub struct ValidatedReport {
    pub config: ReportConfig,
    pub functions: FunctionRegistry,
}

// =============================================================================
// Schemas
// =============================================================================

struct Schemas {
    config: jsonschema::Validator,
    tables_config: jsonschema::Validator,
    table: jsonschema::Validator,
    datetime: jsonschema::Validator,
    pivot: jsonschema::Validator,
    import: jsonschema::Validator,
    input: jsonschema::Validator,
    output: jsonschema::Validator,
    styles: jsonschema::Validator,
    query: jsonschema::Validator,
    replace: jsonschema::Validator,
    replace_column: jsonschema::Validator,
}

fn compile(source: &str) -> jsonschema::Validator {
    let schema: Value = serde_json::from_str(source).expect("Invalid embedded schema");
    jsonschema::draft7::new(&schema).expect("Invalid embedded schema")
}

static SCHEMAS: Lazy<Schemas> = Lazy::new(|| Schemas {
    config: compile(include_str!("../../schemas/config.json")),
    tables_config: compile(include_str!("../../schemas/tables_config.json")),
    table: compile(include_str!("../../schemas/table.json")),
    datetime: compile(include_str!("../../schemas/datetime.json")),
    pivot: compile(include_str!("../../schemas/pivot.json")),
    import: compile(include_str!("../../schemas/import.json")),
    input: compile(include_str!("../../schemas/input.json")),
    output: compile(include_str!("../../schemas/output.json")),
    styles: compile(include_str!("../../schemas/styles.json")),
    query: compile(include_str!("../../schemas/query.json")),
    replace: compile(include_str!("../../schemas/replace.json")),
    replace_column: compile(include_str!("../../schemas/replace_column.json")),
});

/// Validate a value against a schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with one message per violation
pub fn validate(validator: &jsonschema::Validator, data: &Value) -> Result<(), Vec<String>> {
    let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Runs schema checks for one config file, keeping its path for messages.
struct SchemaCheck<'a> {
    path: &'a Path,
}

impl SchemaCheck<'_> {
    fn check(&self, validator: &jsonschema::Validator, data: &Value, location: &str) -> ConfigResult<()> {
        validate(validator, data).map_err(|errors| ConfigError::Schema {
            path: self.path.to_path_buf(),
            location: location.to_string(),
            message: errors.join("; "),
        })
    }

    /// Check `data` unless it is absent or null.
    fn check_present(
        &self,
        validator: &jsonschema::Validator,
        data: Option<&Value>,
        location: &str,
    ) -> ConfigResult<()> {
        match data {
            None | Some(Value::Null) => Ok(()),
            Some(value) => self.check(validator, value, location),
        }
    }
}

// =============================================================================
// Document loading
// =============================================================================

/// Parse YAML text into an ordered JSON document.
pub fn parse_document(text: &str, path: &Path) -> ConfigResult<Value> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| ConfigError::Yaml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(yaml_to_json(yaml))
}

/// YAML allows non-string keys (`1: one`); they are kept as their text.
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64().map(crate::models::real).unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => Value::Array(items.into_iter().map(yaml_to_json).collect()),
        serde_yaml::Value::Mapping(mapping) => Value::Object(
            mapping
                .into_iter()
                .map(|(k, v)| (key_text(k), yaml_to_json(v)))
                .collect(),
        ),
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn key_text(key: serde_yaml::Value) -> String {
    match yaml_to_json(key) {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Normalize a structural key: `Include Index` and `include-index` both
/// become `include_index`.
pub fn slug_key(key: &str) -> String {
    let mut slug = String::with_capacity(key.len());
    for c in key.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

fn slug_keys(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter().map(|(k, v)| (slug_key(&k), v)).collect()
}

fn slug_object(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(slug_keys(map)),
        other => other,
    }
}

/// Slug the structural keys of a document.
///
/// Table names, datetime column names and replace mappings are user data
/// and are left untouched.
pub fn normalize_keys(doc: Value) -> Value {
    let Value::Object(top) = doc else {
        return doc;
    };

    let top = slug_keys(top)
        .into_iter()
        .map(|(key, value)| {
            let value = match (key.as_str(), value) {
                ("tables_config", Value::Object(tables)) => Value::Object(
                    tables
                        .into_iter()
                        .map(|(name, sources)| (name, normalize_sources(sources)))
                        .collect(),
                ),
                ("import", Value::Array(entries)) => Value::Array(entries.into_iter().map(slug_object).collect()),
                ("output", Value::Object(output)) => Value::Object(
                    slug_keys(output)
                        .into_iter()
                        .map(|(k, v)| if k == "styles" { (k, slug_object(v)) } else { (k, v) })
                        .collect(),
                ),
                ("input", value) => slug_object(value),
                ("queries", Value::Array(queries)) => Value::Array(queries.into_iter().map(slug_object).collect()),
                (_, value) => value,
            };
            (key, value)
        })
        .collect();
    Value::Object(top)
}

fn normalize_sources(sources: Value) -> Value {
    match sources {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|source| match source {
                    Value::Object(map) => Value::Object(
                        slug_keys(map)
                            .into_iter()
                            .map(|(k, v)| if k == "pivot" { (k, slug_object(v)) } else { (k, v) })
                            .collect(),
                    ),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Read, validate and load the config file at `path`.
pub fn load_config(path: &Path, log: &mut RunLog) -> ConfigResult<ValidatedReport> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    validate_config_text(&text, path, log)
}

/// Validate config text as if it were read from `path`.
///
/// Relative paths inside the config resolve against `path`'s directory.
pub fn validate_config_text(text: &str, path: &Path, log: &mut RunLog) -> ConfigResult<ValidatedReport> {
    let doc = normalize_keys(parse_document(text, path)?);
    let check = SchemaCheck { path };

    // Pass 1
    let doc = match doc {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            check.check(&SCHEMAS.config, &other, "(root)")?;
            return Err(ConfigError::Schema {
                path: path.to_path_buf(),
                location: "(root)".to_string(),
                message: "expected a mapping".to_string(),
            });
        }
    };
    check.check(&SCHEMAS.config, &Value::Object(doc.clone()), "(root)")?;

    // Pass 2
    check_sections(&check, &doc)?;

    if !matches!(doc.get("output"), Some(Value::Object(_))) {
        return Err(ConfigError::MissingKey("output.basename".to_string()));
    }

    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let config = ReportConfig::from_document(&doc, &base_dir).map_err(|message| ConfigError::Schema {
        path: path.to_path_buf(),
        location: "(root)".to_string(),
        message,
    })?;

    check_paths(&config)?;
    check_minimum_keys(&doc, &config, log)?;
    check_include_index(&doc)?;
    let functions = check_postprocess(&config, log)?;
    create_output_dir(&config.output.dir)?;

    Ok(ValidatedReport { config, functions })
}

fn check_sections(check: &SchemaCheck<'_>, doc: &Map<String, Value>) -> ConfigResult<()> {
    if let Some(tables @ Value::Object(map)) = doc.get("tables_config") {
        check.check(&SCHEMAS.tables_config, tables, "tables_config")?;
        for (name, sources) in map {
            let location = format!("tables_config.{}", name);
            check.check(&SCHEMAS.table, sources, &location)?;
            for (i, source) in sources.as_array().into_iter().flatten().enumerate() {
                let location = format!("{}[{}]", location, i);
                check.check_present(&SCHEMAS.datetime, source.get("datetime"), &format!("{}.datetime", location))?;
                check.check_present(&SCHEMAS.pivot, source.get("pivot"), &format!("{}.pivot", location))?;
            }
        }
    } else {
        check.check_present(&SCHEMAS.tables_config, doc.get("tables_config"), "tables_config")?;
    }

    check.check_present(&SCHEMAS.import, doc.get("import"), "import")?;
    check.check_present(&SCHEMAS.input, doc.get("input"), "input")?;

    if let Some(output) = doc.get("output").filter(|v| !v.is_null()) {
        check.check(&SCHEMAS.output, output, "output")?;
        check.check_present(&SCHEMAS.styles, output.get("styles"), "output.styles")?;
    }

    if let Some(Value::Array(queries)) = doc.get("queries") {
        for (i, query) in queries.iter().enumerate() {
            let location = format!("queries[{}]", i);
            check.check(&SCHEMAS.query, query, &location)?;
            if let Some(replace @ Value::Object(columns)) = query.get("replace") {
                let location = format!("{}.replace", location);
                check.check(&SCHEMAS.replace, replace, &location)?;
                for (column, patterns) in columns {
                    check.check(&SCHEMAS.replace_column, patterns, &format!("{}.{}", location, column))?;
                }
            } else {
                check.check_present(&SCHEMAS.replace, query.get("replace"), &format!("{}.replace", location))?;
            }
        }
    }

    Ok(())
}

/// Every referenced file must exist. Missing paths of a section are
/// reported together.
fn check_paths(config: &ReportConfig) -> ConfigResult<()> {
    for table in &config.tables {
        let missing: Vec<PathBuf> = table
            .sources
            .iter()
            .filter(|s| !s.path.is_file())
            .map(|s| s.path.clone())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::PathsNotFound(missing));
        }
    }

    let missing: Vec<PathBuf> = config.imports.iter().filter(|p| !p.is_file()).cloned().collect();
    if !missing.is_empty() {
        return Err(ConfigError::PathsNotFound(missing));
    }
    Ok(())
}

fn check_minimum_keys(doc: &Map<String, Value>, config: &ReportConfig, log: &mut RunLog) -> ConfigResult<()> {
    if config.output.basename == settings::TEMPLATE_BASENAME {
        return Err(ConfigError::NotEdited(config.output.basename.clone()));
    }

    let has_queries = matches!(doc.get("queries"), Some(Value::Array(q)) if !q.is_empty());
    match (has_queries, config.output.export_tables) {
        (false, None) => Err(ConfigError::NothingToOutput),
        (false, Some(format)) => {
            log.info_with_data(settings::MSG_EXPORT_TABLES_ONLY, format.extension(), 0, 0);
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_include_index(doc: &Map<String, Value>) -> ConfigResult<()> {
    let Some(Value::Object(tables)) = doc.get("tables_config") else {
        return Ok(());
    };
    for (name, sources) in tables {
        let explicit = sources
            .as_array()
            .into_iter()
            .flatten()
            .filter(|s| s.get("include_index").is_some_and(|v| !v.is_null()))
            .count();
        if explicit > 1 {
            return Err(ConfigError::IncludeIndexConflict(name.clone()));
        }
    }
    Ok(())
}

fn check_postprocess(config: &ReportConfig, log: &mut RunLog) -> ConfigResult<FunctionRegistry> {
    let uses_postprocess = config.queries.iter().filter_map(|q| q.postprocess.as_ref().map(|f| (q, f)));

    if config.imports.is_empty() {
        if let Some((query, function)) = uses_postprocess.clone().next() {
            return Err(ConfigError::PostprocessWithoutImport {
                query: query.name.clone(),
                function: function.clone(),
            });
        }
        return Ok(FunctionRegistry::default());
    }

    let functions = FunctionRegistry::load(&config.imports, log)?;
    for (query, function) in uses_postprocess {
        if !functions.contains(function) {
            return Err(ConfigError::PostprocessNotFound {
                query: query.name.clone(),
                function: function.clone(),
            });
        }
    }
    Ok(functions)
}

fn create_output_dir(dir: &Path) -> ConfigResult<()> {
    if dir.exists() && !dir.is_dir() {
        return Err(ConfigError::OutputDir(dir.to_path_buf()));
    }
    fs::create_dir_all(dir)?;
    Ok(())
}
