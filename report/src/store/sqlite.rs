//! SQLite implementation of the working store.
//!
//! The database lives in memory and is dropped with the store. Names of the
//! tables written through the store are tracked in a registry keyed on the
//! lowercased name, since SQLite compares identifiers case-insensitively.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

use super::RelationalStore;
use crate::error::{StoreError, StoreResult};
use crate::models::{real, Frame};
use crate::settings;

pub struct SqliteStore {
    conn: Connection,
    /// Table names in creation order.
    names: Vec<String>,
    /// Lowercased names, for collision checks.
    registry: HashSet<String>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("tables", &self.names).finish()
    }
}

impl SqliteStore {
    /// Open an empty in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            names: Vec::new(),
            registry: HashSet::new(),
        })
    }

    fn register(&mut self, name: &str) {
        if self.registry.insert(name.to_lowercase()) {
            self.names.push(name.to_string());
        }
    }

    /// Create the table and insert every row in one transaction.
    fn write_frame(&mut self, name: &str, frame: &Frame) -> StoreResult<()> {
        let table = quote_identifier(name);
        let columns: Vec<String> = frame
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let sql_type = frame.column_kind(i).sql_type();
                if sql_type.is_empty() {
                    quote_identifier(column)
                } else {
                    format!("{} {}", quote_identifier(column), sql_type)
                }
            })
            .collect();

        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", table))?;
        tx.execute_batch(&format!("CREATE TABLE {} ({})", table, columns.join(", ")))?;

        if !frame.columns.is_empty() {
            let placeholders = vec!["?"; frame.columns.len()].join(", ");
            let mut insert = tx.prepare(&format!("INSERT INTO {} VALUES ({})", table, placeholders))?;
            for row in &frame.rows {
                insert.execute(params_from_iter(row.iter().map(to_sql_value)))?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl RelationalStore for SqliteStore {
    fn create_or_replace_table(&mut self, name: &str, frame: &Frame, keep_index: bool) -> StoreResult<()> {
        if keep_index {
            self.write_frame(name, &frame.with_index_column(settings::DEFAULT_INDEX_NAME))?;
        } else {
            self.write_frame(name, frame)?;
        }
        self.register(name);
        Ok(())
    }

    fn execute_sql(&self, sql: &str) -> StoreResult<Frame> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                cells.push(from_sql_value(row.get_ref(i)?));
            }
            rows.push(cells);
        }
        Ok(Frame::new(columns, rows))
    }

    fn persist_as(&mut self, name: &str, frame: &Frame) -> StoreResult<()> {
        if self.contains(name) {
            return Err(StoreError::Duplicate(name.to_string()));
        }
        self.write_frame(name, frame)?;
        self.register(name);
        Ok(())
    }

    fn contains(&self, name: &str) -> bool {
        self.registry.contains(&name.to_lowercase())
    }

    fn table_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn read_table(&self, name: &str) -> StoreResult<Frame> {
        self.execute_sql(&format!("SELECT * FROM {}", quote_identifier(name)))
    }

    fn export_to(&self, path: &Path) -> StoreResult<()> {
        self.conn
            .execute("VACUUM INTO ?1", [path.to_string_lossy().as_ref()])?;
        Ok(())
    }
}

/// Quote an identifier for SQLite.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => real(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(bytes.iter().map(|b| format!("{:02x}", b)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RowIndex;
    use serde_json::json;
    use tempfile::TempDir;

    fn frame() -> Frame {
        Frame::new(
            vec!["id".into(), "name".into(), "score".into()],
            vec![
                vec![json!(1), json!("Alice"), json!(2.5)],
                vec![json!(2), Value::Null, json!(4)],
            ],
        )
    }

    #[test]
    fn test_create_and_read_back() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.create_or_replace_table("people", &frame(), false).unwrap();

        let read = store.read_table("people").unwrap();
        assert_eq!(read.columns, vec!["id", "name", "score"]);
        assert_eq!(read.rows[0], vec![json!(1), json!("Alice"), json!(2.5)]);
        assert_eq!(read.rows[1][1], Value::Null);
        assert_eq!(read.rows[1][2], json!(4.0));
    }

    #[test]
    fn test_keep_index_uses_index_name() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut pivoted = frame();
        pivoted.index = Some(RowIndex {
            name: "region".into(),
            labels: vec![json!("north"), json!("south")],
        });
        store.create_or_replace_table("wide", &pivoted, true).unwrap();
        store.create_or_replace_table("plain", &frame(), true).unwrap();

        assert_eq!(store.read_table("wide").unwrap().columns[0], "region");
        let plain = store.read_table("plain").unwrap();
        assert_eq!(plain.columns[0], settings::DEFAULT_INDEX_NAME);
        assert_eq!(plain.rows[1][0], json!(1));
    }

    #[test]
    fn test_persist_rejects_duplicate_names() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.create_or_replace_table("Sales", &frame(), false).unwrap();

        let err = store.persist_as("sales", &frame()).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(name) if name == "sales"));

        store.persist_as("totals", &frame()).unwrap();
        assert!(store.persist_as("TOTALS", &frame()).is_err());
        assert_eq!(store.table_names(), vec!["Sales", "totals"]);
    }

    #[test]
    fn test_zero_row_result_keeps_columns() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.create_or_replace_table("people", &frame(), false).unwrap();

        let result = store.execute_sql("SELECT id, name FROM people WHERE id > 10").unwrap();
        assert_eq!(result.columns, vec!["id", "name"]);
        assert_eq!(result.row_count(), 0);
    }

    #[test]
    fn test_sql_error_is_engine_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.execute_sql("SELECT * FROM missing").unwrap_err();
        assert!(matches!(err, StoreError::Engine(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_names_with_spaces_and_quotes() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let odd = Frame::new(vec!["first \"name\"".into()], vec![vec![json!("x")]]);
        store.create_or_replace_table("my table", &odd, false).unwrap();
        let result = store.execute_sql("SELECT * FROM \"my table\"").unwrap();
        assert_eq!(result.columns, vec!["first \"name\""]);
    }

    #[test]
    fn test_export_to_file() {
        let dir = TempDir::new().unwrap();
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.create_or_replace_table("people", &frame(), false).unwrap();

        let path = dir.path().join("report.db");
        store.export_to(&path).unwrap();

        let copy = Connection::open(&path).unwrap();
        let count: i64 = copy.query_row("SELECT COUNT(*) FROM people", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 2);
    }
}
