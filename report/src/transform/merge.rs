//! Outer join of a table's sources.

use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{AssemblyError, AssemblyResult};
use crate::models::{cell_key, compare_cells, ColumnKind, Frame};

/// Merge `right` into `left` with an outer join on every column they share.
///
/// Output columns are `left`'s followed by `right`'s other columns. Rows
/// with equal keys are paired (every combination when keys repeat);
/// unmatched rows from either side are kept with nulls. Rows are sorted by
/// the join keys, and the row index is reset to positions.
pub fn outer_merge(left: &Frame, right: &Frame, table: &str, path: &Path) -> AssemblyResult<Frame> {
    let keys: Vec<(usize, usize)> = left
        .columns
        .iter()
        .enumerate()
        .filter_map(|(l, name)| right.column_position(name).map(|r| (l, r)))
        .collect();

    if keys.is_empty() {
        return Err(AssemblyError::NoCommonColumns {
            table: table.to_string(),
            path: path.to_path_buf(),
        });
    }

    for &(l, r) in &keys {
        let (lk, rk) = (left.column_kind(l), right.column_kind(r));
        if (lk.is_numeric() && rk == ColumnKind::Text) || (lk == ColumnKind::Text && rk.is_numeric()) {
            return Err(AssemblyError::MergeTypeMismatch {
                table: table.to_string(),
                column: left.columns[l].clone(),
                left: lk.label(),
                right: rk.label(),
                path: path.to_path_buf(),
            });
        }
    }

    let extra: Vec<usize> = (0..right.column_count())
        .filter(|r| !keys.iter().any(|&(_, k)| k == *r))
        .collect();

    let mut columns = left.columns.clone();
    columns.extend(extra.iter().map(|&r| right.columns[r].clone()));

    let key_of = |row: &[Value], side: fn(&(usize, usize)) -> usize| -> Vec<String> {
        keys.iter().map(|k| cell_key(&row[side(k)])).collect()
    };

    let mut right_groups: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
    for (i, row) in right.rows.iter().enumerate() {
        right_groups.entry(key_of(row, |k| k.1)).or_default().push(i);
    }

    let mut matched_right = vec![false; right.row_count()];
    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(left.row_count().max(right.row_count()));

    for left_row in &left.rows {
        match right_groups.get(&key_of(left_row, |k| k.0)) {
            Some(partners) => {
                for &r in partners {
                    matched_right[r] = true;
                    let mut row = left_row.clone();
                    row.extend(extra.iter().map(|&c| right.rows[r][c].clone()));
                    rows.push(row);
                }
            }
            None => {
                let mut row = left_row.clone();
                row.extend(extra.iter().map(|_| Value::Null));
                rows.push(row);
            }
        }
    }

    for (r, right_row) in right.rows.iter().enumerate() {
        if matched_right[r] {
            continue;
        }
        let mut row = vec![Value::Null; left.column_count()];
        for &(l, k) in &keys {
            row[l] = right_row[k].clone();
        }
        row.extend(extra.iter().map(|&c| right_row[c].clone()));
        rows.push(row);
    }

    rows.sort_by(|a, b| {
        keys.iter()
            .map(|&(l, _)| compare_cells(&a[l], &b[l]))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });

    Ok(Frame::new(columns, rows))
}
