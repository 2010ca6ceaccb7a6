//! Delimited text sources with encoding and delimiter auto-detection.

use serde_json::Value;
use std::path::Path;

use crate::error::{ImportError, ImportResult};
use crate::models::{real, Frame};
use crate::settings;

/// A parsed delimited file with what was detected about it.
#[derive(Debug, Clone)]
pub struct CsvSource {
    pub frame: Frame,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to a string using the given encoding.
///
/// Unknown encodings are looked up by label; anything else falls back to
/// lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8_lossy(bytes).into_owned(),
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        label => match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(enc) => enc.decode(bytes).0.into_owned(),
            None => String::from_utf8_lossy(bytes).into_owned(),
        },
    }
}

/// Detect the delimiter by counting occurrences in the header line.
///
/// Falls back to `,` when no candidate appears.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &settings::CANDIDATE_DELIMITERS {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Read a delimited file, detecting encoding and delimiter.
pub fn read_csv_file(path: &Path) -> ImportResult<CsvSource> {
    let bytes = std::fs::read(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let encoding = detect_encoding(&bytes);
    let content = decode_content(&bytes, &encoding);
    let delimiter = detect_delimiter(&content);

    let frame = parse_csv(&content, delimiter).map_err(|message| match message {
        CsvProblem::NoHeaders => ImportError::NoHeaders {
            path: path.to_path_buf(),
        },
        CsvProblem::Invalid(message) => ImportError::Csv {
            path: path.to_path_buf(),
            message,
        },
    })?;

    Ok(CsvSource {
        frame,
        encoding,
        delimiter,
    })
}

#[derive(Debug)]
pub enum CsvProblem {
    NoHeaders,
    Invalid(String),
}

/// Parse delimited text into a frame with inferred column types.
pub fn parse_csv(content: &str, delimiter: char) -> Result<Frame, CsvProblem> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| CsvProblem::Invalid(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(CsvProblem::NoHeaders);
    }
    let width = headers.len();

    let mut raw_rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| CsvProblem::Invalid(e.to_string()))?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let mut row: Vec<String> = record.iter().take(width).map(str::to_string).collect();
        row.resize(width, String::new());
        raw_rows.push(row);
    }

    let kinds: Vec<TextKind> = (0..width)
        .map(|i| infer_kind(raw_rows.iter().map(|row| row[i].as_str())))
        .collect();

    let rows = raw_rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(&kinds)
                .map(|(field, kind)| convert(&field, *kind))
                .collect()
        })
        .collect();

    Ok(Frame::new(dedupe_headers(headers), rows))
}

/// Column type inferred from text fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextKind {
    Integer,
    Real,
    Bool,
    Text,
}

fn infer_kind<'a>(fields: impl Iterator<Item = &'a str>) -> TextKind {
    let mut integer = true;
    let mut numeric = true;
    let mut boolean = true;
    let mut seen = false;

    for field in fields.filter(|f| !f.is_empty()) {
        seen = true;
        let field = field.trim();
        integer &= field.parse::<i64>().is_ok();
        numeric &= field.parse::<f64>().is_ok_and(f64::is_finite);
        boolean &= parse_bool(field).is_some();
    }

    match (seen, integer, numeric, boolean) {
        (false, ..) => TextKind::Text,
        (_, true, ..) => TextKind::Integer,
        (_, _, true, _) => TextKind::Real,
        (_, _, _, true) => TextKind::Bool,
        _ => TextKind::Text,
    }
}

fn parse_bool(field: &str) -> Option<bool> {
    match field {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

fn convert(field: &str, kind: TextKind) -> Value {
    if field.is_empty() {
        return Value::Null;
    }
    let trimmed = field.trim();
    match kind {
        TextKind::Integer => trimmed.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
        TextKind::Real => trimmed.parse::<f64>().map(real).unwrap_or(Value::Null),
        TextKind::Bool => parse_bool(trimmed).map(Value::Bool).unwrap_or(Value::Null),
        TextKind::Text => Value::String(field.to_string()),
    }
}

/// Repeated header names get a `.1`, `.2`, ... suffix; blank ones are
/// named after their position.
pub fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(headers.len());
    for (i, header) in headers.into_iter().enumerate() {
        let base = if header.is_empty() {
            format!("Unnamed: {}", i)
        } else {
            header
        };
        let mut name = base.clone();
        let mut n = 1;
        while seen.contains(&name) {
            name = format!("{}.{}", base, n);
            n += 1;
        }
        seen.push(name);
    }
    seen
}
