//! Spreadsheet sources read with calamine.

use calamine::{open_workbook_auto, Data, Reader};
use serde_json::Value;
use std::path::Path;

use super::csv::dedupe_headers;
use crate::config::SheetSelector;
use crate::error::{ImportError, ImportResult};
use crate::models::{real, Frame};

/// A sheet read into a frame.
#[derive(Debug, Clone)]
pub struct SheetSource {
    pub frame: Frame,
    /// Name of the sheet that was read.
    pub sheet: String,
}

/// Names of the sheets of a workbook, in order.
pub fn sheet_names(path: &Path) -> ImportResult<Vec<String>> {
    let workbook = open_workbook_auto(path).map_err(|e| workbook_error(path, e))?;
    Ok(workbook.sheet_names().to_vec())
}

/// Read one sheet; the first sheet when `sheet` is `None`.
///
/// The first row holds the column names.
pub fn read_sheet(path: &Path, sheet: Option<&SheetSelector>) -> ImportResult<SheetSource> {
    let mut workbook = open_workbook_auto(path).map_err(|e| workbook_error(path, e))?;
    let names = workbook.sheet_names().to_vec();

    let not_found = |sheet: &SheetSelector| ImportError::SheetNotFound {
        path: path.to_path_buf(),
        sheet: sheet.to_string(),
    };
    let name = match sheet {
        None => names.first().cloned().ok_or_else(|| ImportError::Workbook {
            path: path.to_path_buf(),
            message: "workbook has no sheets".to_string(),
        })?,
        Some(selector @ SheetSelector::Name(name)) => names
            .iter()
            .find(|n| *n == name)
            .cloned()
            .ok_or_else(|| not_found(selector))?,
        Some(selector @ SheetSelector::Index(i)) => names.get(*i).cloned().ok_or_else(|| not_found(selector))?,
    };

    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| workbook_error(path, e))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(header_text).collect(),
        None => Vec::new(),
    };
    if headers.is_empty() {
        return Err(ImportError::NoHeaders {
            path: path.to_path_buf(),
        });
    }

    let width = headers.len();
    let mut body: Vec<Vec<Value>> = rows
        .filter(|row| row.iter().any(|cell| !matches!(cell, Data::Empty)))
        .map(|row| {
            let mut cells: Vec<Value> = row.iter().take(width).map(cell_value).collect();
            cells.resize(width, Value::Null);
            cells
        })
        .collect();
    narrow_whole_columns(&mut body, width);

    Ok(SheetSource {
        frame: Frame::new(dedupe_headers(headers), body),
        sheet: name,
    })
}

fn workbook_error(path: &Path, err: impl std::fmt::Display) -> ImportError {
    ImportError::Workbook {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn header_text(cell: &Data) -> String {
    match cell_value(cell) {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => real(*f),
        Data::String(s) if s.is_empty() => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ts) => Value::String(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => real(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(e) => Value::String(format!("#{:?}", e)),
    }
}

/// Workbooks store every number as a float; a column whose numbers are all
/// whole is read as integers.
fn narrow_whole_columns(rows: &mut [Vec<Value>], width: usize) {
    for col in 0..width {
        let whole = rows.iter().all(|row| match &row[col] {
            Value::Null => true,
            Value::Number(n) => n.is_i64() || n.as_f64().is_some_and(|f| f.fract() == 0.0 && f.abs() < 9.0e15),
            _ => false,
        });
        if !whole {
            continue;
        }
        for row in rows.iter_mut() {
            if let Value::Number(n) = &row[col] {
                if let Some(f) = n.as_f64().filter(|_| !n.is_i64()) {
                    row[col] = Value::from(f as i64);
                }
            }
        }
    }
}
