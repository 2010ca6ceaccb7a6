//! Query runner.
//!
//! Runs the configured queries in order against the working store. Each
//! result goes through its replace rules and postprocess function, is saved
//! back to the store under the query name (so later queries can select from
//! it) and is returned for export.

use serde_json::Value;

use crate::config::{QueryConfig, ReplaceRule};
use crate::error::{QueryError, QueryResult, StoreError};
use crate::logs::RunLog;
use crate::models::Frame;
use crate::postprocess::FunctionRegistry;
use crate::settings;
use crate::store::RelationalStore;
use crate::transform::operations::Replacement;

/// Result of one query, ready for export.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    pub name: String,
    pub frame: Frame,
}

/// Run every query in declared order.
pub fn run_queries(
    queries: &[QueryConfig],
    store: &mut dyn RelationalStore,
    functions: &FunctionRegistry,
    log: &mut RunLog,
) -> QueryResult<Vec<QueryOutput>> {
    let mut outputs = Vec::with_capacity(queries.len());
    for query in queries {
        let frame = run_query(query, store, functions, log)?;
        outputs.push(QueryOutput {
            name: query.name.clone(),
            frame,
        });
    }
    Ok(outputs)
}

/// Run one query and save its result.
pub fn run_query(
    query: &QueryConfig,
    store: &mut dyn RelationalStore,
    functions: &FunctionRegistry,
    log: &mut RunLog,
) -> QueryResult<Frame> {
    log.info_with_data(settings::MSG_RUNNING_QUERY, &query.name, 1, 0);
    log.info(query.sql.trim(), 3, 1);

    let mut frame = store.execute_sql(&query.sql).map_err(|source| QueryError::Run {
        name: query.name.clone(),
        source,
    })?;
    if frame.row_count() == 0 {
        log.warning(format!("{}: {}", settings::MSG_QUERY_EMPTY, query.name), 1);
    }

    for rule in &query.replace {
        apply_replace(&mut frame, rule, &query.name, log);
    }

    if let Some(function) = &query.postprocess {
        log.info_with_data(settings::MSG_APPLYING_POSTPROCESS, function, 1, 1);
        frame = functions
            .call(function, &frame)
            .map_err(|source| QueryError::Postprocess {
                name: query.name.clone(),
                source,
            })?;
    }

    if store.contains(&query.name) {
        return Err(QueryError::Duplicate(query.name.clone()));
    }
    store.persist_as(&query.name, &frame).map_err(|source| match source {
        StoreError::Duplicate(name) => QueryError::Duplicate(name),
        source => QueryError::Save {
            name: query.name.clone(),
            source,
        },
    })?;

    Ok(frame)
}

/// Apply one column's patterns in order. Problems are logged and skipped.
fn apply_replace(frame: &mut Frame, rule: &ReplaceRule, query: &str, log: &mut RunLog) {
    let Some(position) = frame.column_position(&rule.column) else {
        log.warning(
            format!("{}: {} (query '{}')", settings::MSG_QUERY_REPLACE_COLUMN_ERROR, rule.column, query),
            1,
        );
        return;
    };

    // Patterns only rewrite text cells.
    let no_text = {
        let mut cells = frame.column_values(position).filter(|v| !v.is_null()).peekable();
        cells.peek().is_some() && !cells.any(Value::is_string)
    };
    if no_text {
        log.warning(
            format!("{}: {} (query '{}')", settings::MSG_QUERY_REPLACE_NOT_TEXT, rule.column, query),
            1,
        );
        return;
    }

    for (pattern, replacement) in &rule.patterns {
        match Replacement::compile(pattern, replacement) {
            Ok(replacement) => {
                for row in &mut frame.rows {
                    row[position] = replacement.apply(&row[position]);
                }
            }
            Err(reason) => log.warning(
                format!(
                    "{}: '{}' in column '{}' of query '{}' ({})",
                    settings::MSG_QUERY_REPLACE_MATCH_ERROR,
                    pattern,
                    rule.column,
                    query,
                    reason
                ),
                1,
            ),
        }
    }
}
