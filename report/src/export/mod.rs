//! Report exporter.
//!
//! Writes assembled tables, query results and the working database to the
//! output directory. Existing files are only replaced with `force`; every
//! target is checked before anything is written.

use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::{ExportFormat, OutputConfig};
use crate::error::{ExportError, ExportResult};
use crate::models::{cell_to_string, Frame};
use crate::queries::QueryOutput;
use crate::settings;
use crate::store::RelationalStore;

/// Destination for a run's outputs.
pub trait Exporter {
    /// Write every table of the store. Returns the files written.
    fn export_tables(&self, store: &dyn RelationalStore, format: ExportFormat) -> ExportResult<Vec<PathBuf>>;

    /// Write query results in order. Returns the files written.
    fn export_queries(&self, results: &[QueryOutput], format: ExportFormat) -> ExportResult<Vec<PathBuf>>;

    /// Copy the working database to a file.
    fn export_database(&self, store: &dyn RelationalStore) -> ExportResult<PathBuf>;
}

/// Writes CSV, XLSX and SQLite files into one directory.
#[derive(Debug, Clone)]
pub struct FileExporter {
    pub dir: PathBuf,
    pub basename: String,
    pub force: bool,
    pub column_width: Option<u32>,
}

impl FileExporter {
    pub fn new(output: &OutputConfig, force: bool) -> Self {
        Self {
            dir: output.dir.clone(),
            basename: output.basename.clone(),
            force,
            column_width: output.styles.as_ref().map(|s| s.column_width),
        }
    }

    fn target(&self, name: &str, format: ExportFormat) -> PathBuf {
        self.dir.join(format!("{}.{}", name, format.extension()))
    }

    /// Fail on the first target that exists, unless forced.
    fn claim(&self, targets: &[PathBuf]) -> ExportResult<()> {
        if self.force {
            return Ok(());
        }
        match targets.iter().find(|t| t.exists()) {
            Some(existing) => Err(ExportError::Exists(existing.clone())),
            None => Ok(()),
        }
    }

    /// Write named frames as one CSV file each, or as sheets of one workbook.
    fn write_frames(&self, frames: &[(&str, &Frame)], format: ExportFormat, workbook: &str) -> ExportResult<Vec<PathBuf>> {
        match format {
            ExportFormat::Csv => {
                let targets: Vec<PathBuf> = frames.iter().map(|(name, _)| self.target(name, format)).collect();
                self.claim(&targets)?;
                for ((_, frame), target) in frames.iter().zip(&targets) {
                    write_csv(frame, target)?;
                }
                Ok(targets)
            }
            ExportFormat::Xlsx => {
                let target = self.target(workbook, format);
                self.claim(std::slice::from_ref(&target))?;
                write_workbook(frames, &target, self.column_width)?;
                Ok(vec![target])
            }
        }
    }
}

impl Exporter for FileExporter {
    fn export_tables(&self, store: &dyn RelationalStore, format: ExportFormat) -> ExportResult<Vec<PathBuf>> {
        let names = store.table_names();
        let mut tables = Vec::with_capacity(names.len());
        for name in &names {
            tables.push(store.read_table(name)?);
        }
        let frames: Vec<(&str, &Frame)> = names.iter().map(String::as_str).zip(&tables).collect();
        self.write_frames(&frames, format, settings::EXPORT_TABLES_BASENAME)
    }

    fn export_queries(&self, results: &[QueryOutput], format: ExportFormat) -> ExportResult<Vec<PathBuf>> {
        let frames: Vec<(&str, &Frame)> = results.iter().map(|r| (r.name.as_str(), &r.frame)).collect();
        self.write_frames(&frames, format, &self.basename)
    }

    fn export_database(&self, store: &dyn RelationalStore) -> ExportResult<PathBuf> {
        let target = self.dir.join(format!("{}.db", self.basename));
        if target.exists() {
            if !self.force {
                return Err(ExportError::Exists(target));
            }
            std::fs::remove_file(&target)?;
        }
        store.export_to(&target)?;
        Ok(target)
    }
}

// =============================================================================
// Writers
// =============================================================================

fn write_csv(frame: &Frame, path: &Path) -> ExportResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&frame.columns)?;
    for row in &frame.rows {
        writer.write_record(row.iter().map(cell_to_string))?;
    }
    writer.flush()?;
    Ok(())
}

/// Excel caps sheet names at 31 characters.
pub fn sheet_name(name: &str) -> String {
    name.chars().take(settings::MAX_SHEET_NAME_LEN).collect()
}

/// Sheet names for a workbook, in order.
///
/// A name whose truncated form is already taken (Excel compares them
/// case-insensitively) gets a `~1`, `~2`, ... suffix within the limit.
pub fn unique_sheet_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut taken = HashSet::new();
    names
        .into_iter()
        .map(|name| {
            let mut candidate = sheet_name(name);
            let mut n = 1;
            while !taken.insert(candidate.to_lowercase()) {
                let suffix = format!("~{}", n);
                let keep = settings::MAX_SHEET_NAME_LEN - suffix.len();
                candidate = name.chars().take(keep).chain(suffix.chars()).collect();
                n += 1;
            }
            candidate
        })
        .collect()
}

fn write_workbook(frames: &[(&str, &Frame)], path: &Path, column_width: Option<u32>) -> ExportResult<()> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    let names = unique_sheet_names(frames.iter().map(|(name, _)| *name));
    for ((_, frame), name) in frames.iter().zip(names) {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(name)?;
        write_sheet(worksheet, frame, &header, column_width)?;
    }

    workbook.save(path)?;
    Ok(())
}

fn write_sheet(sheet: &mut Worksheet, frame: &Frame, header: &Format, column_width: Option<u32>) -> Result<(), XlsxError> {
    for (c, column) in frame.columns.iter().enumerate() {
        let col = u16::try_from(c).unwrap_or(u16::MAX);
        sheet.write_string_with_format(0, col, column, header)?;
        if let Some(width) = column_width {
            sheet.set_column_width(col, f64::from(width))?;
        }
    }

    for (r, row) in frame.rows.iter().enumerate() {
        let line = u32::try_from(r + 1).unwrap_or(u32::MAX);
        for (c, cell) in row.iter().enumerate() {
            let col = u16::try_from(c).unwrap_or(u16::MAX);
            match cell {
                Value::Null => {}
                Value::Bool(b) => {
                    sheet.write_boolean(line, col, *b)?;
                }
                Value::Number(n) => {
                    sheet.write_number(line, col, n.as_f64().unwrap_or(f64::NAN))?;
                }
                Value::String(s) => {
                    sheet.write_string(line, col, s)?;
                }
                other => {
                    sheet.write_string(line, col, other.to_string())?;
                }
            }
        }
    }
    Ok(())
}
