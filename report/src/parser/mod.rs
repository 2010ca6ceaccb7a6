//! Source importer.
//!
//! Reads one physical source into a [`Frame`]:
//!
//! - [`csv`] - delimited text, encoding and delimiter auto-detected
//! - [`xlsx`] - one sheet of a workbook
//!
//! The format is chosen from the file extension.

pub mod csv;
pub mod xlsx;

use std::path::Path;

use crate::config::SheetSelector;
use crate::error::ImportResult;
use crate::logs::RunLog;
use crate::models::Frame;
use crate::settings;

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Xlsx,
}

impl SourceFormat {
    /// Format from the extension: it must contain `csv` or `xlsx`, in any case.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        if ext.contains("xlsx") {
            Some(SourceFormat::Xlsx)
        } else if ext.contains("csv") {
            Some(SourceFormat::Csv)
        } else {
            None
        }
    }
}

/// A source read into memory, with what was learned reading it.
#[derive(Debug, Clone)]
pub struct ImportedSource {
    pub frame: Frame,
    pub format: SourceFormat,
    /// Encoding of a delimited source.
    pub encoding: Option<String>,
    /// Delimiter of a delimited source.
    pub delimiter: Option<char>,
    /// Sheet read from a workbook.
    pub sheet: Option<String>,
}

/// Read a source in the given format.
///
/// Workbooks default to their first sheet, with a notice in `log`. The
/// sheet selector is ignored for delimited text.
pub fn import_source(
    path: &Path,
    format: SourceFormat,
    sheet: Option<&SheetSelector>,
    log: &mut RunLog,
) -> ImportResult<ImportedSource> {
    let imported = match format {
        SourceFormat::Csv => {
            let source = csv::read_csv_file(path)?;
            ImportedSource {
                frame: source.frame,
                format,
                encoding: Some(source.encoding),
                delimiter: Some(source.delimiter),
                sheet: None,
            }
        }
        SourceFormat::Xlsx => {
            if sheet.is_none() {
                log.info_with_data(settings::MSG_NO_SHEET_PROVIDED, path.display(), 0, 1);
            }
            let source = xlsx::read_sheet(path, sheet)?;
            ImportedSource {
                frame: source.frame,
                format,
                encoding: None,
                delimiter: None,
                sheet: Some(source.sheet),
            }
        }
    };

    log.info(
        format!(
            "Imported {} ({} rows, {} columns{})",
            path.display(),
            imported.frame.row_count(),
            imported.frame.column_count(),
            imported.details()
        ),
        1,
        1,
    );
    Ok(imported)
}

impl ImportedSource {
    fn details(&self) -> String {
        match (&self.encoding, self.delimiter, &self.sheet) {
            (Some(enc), Some(delim), _) => format!(", encoding {}, delimiter {:?}", enc, delim),
            (_, _, Some(sheet)) => format!(", sheet {}", sheet),
            _ => String::new(),
        }
    }
}
