//! Per-source reshaping: pivot and datetime conversion.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::path::Path;

use crate::config::{DatetimeColumn, PivotSpec};
use crate::error::{AssemblyError, AssemblyResult};
use crate::models::{cell_key, cell_to_string, compare_cells, Frame, RowIndex};
use crate::settings;

// =============================================================================
// Pivot
// =============================================================================

/// Reshape long data to wide.
///
/// Each distinct value of `spec.index` becomes a row and each distinct
/// value of `spec.columns` a column, both in sorted order; cells come from
/// `spec.values`. The result carries a row index named after `spec.index`.
pub fn pivot(frame: &Frame, spec: &PivotSpec, path: &Path) -> AssemblyResult<Frame> {
    let position = |column: &str| {
        frame.column_position(column).ok_or_else(|| AssemblyError::PivotMissingColumn {
            column: column.to_string(),
            path: path.to_path_buf(),
        })
    };
    let index_pos = position(&spec.index)?;
    let columns_pos = position(&spec.columns)?;
    let values_pos = position(&spec.values)?;

    let labels = sorted_unique(frame.column_values(index_pos));
    let headers = sorted_unique(frame.column_values(columns_pos));

    let row_of: HashMap<String, usize> = labels.iter().enumerate().map(|(i, v)| (cell_key(v), i)).collect();
    let col_of: HashMap<String, usize> = headers.iter().enumerate().map(|(i, v)| (cell_key(v), i)).collect();

    let mut rows: Vec<Vec<Option<Value>>> = vec![vec![None; headers.len()]; labels.len()];
    for source_row in &frame.rows {
        let r = row_of[&cell_key(&source_row[index_pos])];
        let c = col_of[&cell_key(&source_row[columns_pos])];
        if rows[r][c].is_some() {
            return Err(AssemblyError::PivotDuplicate {
                index: cell_to_string(&source_row[index_pos]),
                column: cell_to_string(&source_row[columns_pos]),
                path: path.to_path_buf(),
            });
        }
        rows[r][c] = Some(source_row[values_pos].clone());
    }

    let names: Vec<String> = headers.iter().map(cell_to_string).collect();
    let collision = {
        let mut seen = HashSet::from([spec.index.as_str()]);
        names.iter().find(|name| !seen.insert(name.as_str())).cloned()
    };
    if let Some(column) = collision {
        return Err(AssemblyError::DuplicateColumn {
            column,
            step: "pivot",
            path: path.to_path_buf(),
        });
    }

    let mut wide = Frame::new(
        names,
        rows.into_iter()
            .map(|row| row.into_iter().map(|cell| cell.unwrap_or(Value::Null)).collect())
            .collect(),
    );
    wide.index = Some(RowIndex {
        name: spec.index.clone(),
        labels,
    });
    Ok(wide)
}

fn sorted_unique<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Value> = values.filter(|v| seen.insert(cell_key(v))).cloned().collect();
    unique.sort_by(compare_cells);
    unique
}

// =============================================================================
// Datetime
// =============================================================================

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%d %B %Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m-%d-%Y", "%d %B %Y", "%d %b %Y", "%B %d, %Y", "%b %d, %Y", "%B %d %Y",
    "%b %d %Y",
];

/// Read text as a timestamp, trying common layouts.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.naive_local());
    }
    if let Some(ts) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
    {
        return Some(ts);
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Check a strftime format before any value is formatted with it.
pub fn check_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Convert one column to timestamps.
///
/// The original values are kept in `<column>_raw`, right after the column.
/// Values are formatted with `column.format`, or the default layout.
pub fn convert_datetime(frame: &mut Frame, column: &DatetimeColumn, path: &Path) -> AssemblyResult<()> {
    let position = frame
        .column_position(&column.column)
        .ok_or_else(|| AssemblyError::DatetimeMissingColumn {
            column: column.column.clone(),
            path: path.to_path_buf(),
        })?;

    let raw_name = format!("{}{}", column.column, settings::RAW_COLUMN_SUFFIX);
    if frame.column_position(&raw_name).is_some() {
        return Err(AssemblyError::DuplicateColumn {
            column: raw_name,
            step: "datetime conversion",
            path: path.to_path_buf(),
        });
    }

    let format = column.format.as_deref().unwrap_or(settings::DEFAULT_DATETIME_FORMAT);
    let bad_format = || AssemblyError::DatetimeFormat {
        column: column.column.clone(),
        format: format.to_string(),
        path: path.to_path_buf(),
    };
    if !check_format(format) {
        return Err(bad_format());
    }

    let raw: Vec<Value> = frame.column_values(position).cloned().collect();
    let mut converted = Vec::with_capacity(raw.len());
    for value in &raw {
        let text = match value {
            Value::Null => {
                converted.push(Value::Null);
                continue;
            }
            Value::String(s) if s.trim().is_empty() => {
                converted.push(Value::Null);
                continue;
            }
            other => cell_to_string(other),
        };
        let ts = parse_datetime(&text).ok_or_else(|| AssemblyError::DatetimeParse {
            column: column.column.clone(),
            value: text.clone(),
            path: path.to_path_buf(),
        })?;
        let mut out = String::new();
        write!(out, "{}", ts.format(format)).map_err(|_| bad_format())?;
        converted.push(Value::String(out));
    }

    for (row, value) in frame.rows.iter_mut().zip(converted) {
        row[position] = value;
    }
    frame.insert_column(position + 1, raw_name, raw);
    Ok(())
}
