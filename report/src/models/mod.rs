//! Tabular data model shared by every stage of the pipeline.
//!
//! - [`Frame`] - ordered columns, rows of cells and an optional row index
//! - [`RowIndex`] - named index produced by a pivot
//! - [`ColumnKind`] - inferred type of a column
//!
//! Cells are [`serde_json::Value`]s: `Null`, `Bool`, `Number` (integer or
//! real) or `String`.

use serde_json::{Number, Value};
use std::cmp::Ordering;

// =============================================================================
// Frame
// =============================================================================

/// An in-memory table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    /// Column names, in order.
    pub columns: Vec<String>,
    /// Rows; every row has one cell per column.
    pub rows: Vec<Vec<Value>>,
    /// Named row index; `None` means rows are numbered from zero.
    pub index: Option<RowIndex>,
}

/// A named row index, one label per row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowIndex {
    pub name: String,
    pub labels: Vec<Value>,
}

/// Inferred type of a column, ignoring nulls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Every cell is null.
    Empty,
    Integer,
    Real,
    Bool,
    Text,
    /// Mix of numbers, booleans and text.
    Mixed,
}

impl ColumnKind {
    /// Human-readable name used in error messages.
    pub fn label(self) -> &'static str {
        match self {
            ColumnKind::Empty => "empty",
            ColumnKind::Integer => "integer",
            ColumnKind::Real => "real",
            ColumnKind::Bool => "boolean",
            ColumnKind::Text => "text",
            ColumnKind::Mixed => "mixed",
        }
    }

    /// Whether the column holds numbers only.
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Real)
    }

    /// SQL type used when the column is stored.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Integer | ColumnKind::Bool => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text => "TEXT",
            ColumnKind::Empty | ColumnKind::Mixed => "",
        }
    }
}

impl Frame {
    /// Create a frame from columns and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            index: None,
        }
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// A frame with no rows or no columns is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }

    /// Position of a column by exact name.
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate over the cells of one column.
    pub fn column_values(&self, position: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().filter_map(move |row| row.get(position))
    }

    /// Insert a column at `position`, one value per row.
    pub fn insert_column(&mut self, position: usize, name: impl Into<String>, values: Vec<Value>) {
        self.columns.insert(position, name.into());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.insert(position, value);
        }
    }

    /// Infer the type of one column.
    pub fn column_kind(&self, position: usize) -> ColumnKind {
        let mut kind = ColumnKind::Empty;
        for value in self.column_values(position) {
            let cell = match value {
                Value::Null => continue,
                Value::Bool(_) => ColumnKind::Bool,
                Value::Number(n) if n.is_i64() || n.is_u64() => ColumnKind::Integer,
                Value::Number(_) => ColumnKind::Real,
                Value::String(_) => ColumnKind::Text,
                _ => ColumnKind::Mixed,
            };
            kind = match (kind, cell) {
                (ColumnKind::Empty, c) => c,
                (k, c) if k == c => k,
                (ColumnKind::Integer, ColumnKind::Real) | (ColumnKind::Real, ColumnKind::Integer) => {
                    ColumnKind::Real
                }
                _ => ColumnKind::Mixed,
            };
        }
        kind
    }

    /// Apply a function to every cell.
    pub fn map_cells(&mut self, f: impl Fn(&Value) -> Value) {
        for row in &mut self.rows {
            for cell in row.iter_mut() {
                *cell = f(cell);
            }
        }
    }

    /// Rename every column.
    pub fn map_columns(&mut self, f: impl Fn(&str) -> String) {
        self.columns = self.columns.iter().map(|c| f(c)).collect();
    }

    /// Materialize the row index as the first column.
    ///
    /// A positional index becomes a column named `default_name` holding
    /// `0..n`.
    pub fn with_index_column(&self, default_name: &str) -> Frame {
        let (name, labels) = match &self.index {
            Some(index) => (index.name.clone(), index.labels.clone()),
            None => (
                default_name.to_string(),
                (0..self.rows.len()).map(|i| Value::from(i as i64)).collect(),
            ),
        };
        let mut frame = Frame::new(self.columns.clone(), self.rows.clone());
        frame.insert_column(0, name, labels);
        frame
    }
}

// =============================================================================
// Cell helpers
// =============================================================================

/// Display a cell the way it appears in exported text.
pub fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Build a number cell from a float, falling back to null for NaN.
pub fn real(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

/// Key used to match cells across frames.
///
/// Integers and reals with the same value match; nulls match each other.
pub fn cell_key(value: &Value) -> String {
    match value {
        Value::Null => "n:".to_string(),
        Value::Bool(b) => format!("b:{}", b),
        Value::Number(n) => match n.as_f64() {
            Some(f) => format!("f:{}", f),
            None => format!("f:{}", n),
        },
        Value::String(s) => format!("s:{}", s),
        other => format!("o:{}", other),
    }
}

/// Total order over cells: nulls first, then booleans, numbers, text.
pub fn compare_cells(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            _ => 4,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
