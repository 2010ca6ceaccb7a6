//! Working store for one run.
//!
//! Tables built from sources and query results live in a relational store
//! for the duration of a run. [`RelationalStore`] is the seam the assembler,
//! query runner and exporter talk to; [`SqliteStore`] implements it on an
//! in-memory SQLite database.

pub mod sqlite;

use std::path::Path;

use crate::error::StoreResult;
use crate::models::Frame;

pub use sqlite::SqliteStore;

/// Operations the pipeline needs from a relational engine.
pub trait RelationalStore {
    /// Write `frame` as table `name`, dropping any table of that name.
    ///
    /// With `keep_index` the frame's row index becomes the first column.
    fn create_or_replace_table(&mut self, name: &str, frame: &Frame, keep_index: bool) -> StoreResult<()>;

    /// Run one SQL statement and collect its result.
    fn execute_sql(&self, sql: &str) -> StoreResult<Frame>;

    /// Save a query result under a new name.
    ///
    /// Fails with [`crate::error::StoreError::Duplicate`] when the name is
    /// taken, compared case-insensitively.
    fn persist_as(&mut self, name: &str, frame: &Frame) -> StoreResult<()>;

    /// Whether a table of this name was written during the run.
    fn contains(&self, name: &str) -> bool;

    /// Names of the tables written so far, in creation order.
    fn table_names(&self) -> Vec<String>;

    /// Read a whole table back.
    fn read_table(&self, name: &str) -> StoreResult<Frame>;

    /// Copy the whole database to a file.
    fn export_to(&self, path: &Path) -> StoreResult<()>;
}
