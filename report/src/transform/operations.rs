//! Frame operations.
//!
//! - [`FrameOperation`] - the `input` options, applied to every source
//! - [`Replacement`] - one regex substitution from a query's `replace`

use regex::Regex;
use serde_json::Value;

use crate::config::InputOptions;
use crate::models::Frame;
use crate::settings;

/// Operations switched on by the `input` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOperation {
    /// Remove leading and trailing whitespace from text cells
    Strip,

    /// Slugify column names, `_` separated, case kept
    SlugifyColumns,

    /// Convert column names to lowercase
    LowercaseColumns,

    /// Convert text cells to uppercase
    UppercaseRows,
}

impl FrameOperation {
    /// Enabled operations, in the order they are applied.
    pub fn from_input(input: &InputOptions) -> Vec<FrameOperation> {
        [
            (input.strip, FrameOperation::Strip),
            (input.slugify_columns, FrameOperation::SlugifyColumns),
            (input.lowercase_columns, FrameOperation::LowercaseColumns),
            (input.uppercase_rows, FrameOperation::UppercaseRows),
        ]
        .into_iter()
        .filter_map(|(enabled, op)| enabled.then_some(op))
        .collect()
    }

    /// Message logged when the operation is enabled.
    pub fn message(self) -> &'static str {
        match self {
            FrameOperation::Strip => settings::MSG_STRIP_WHITESPACE,
            FrameOperation::SlugifyColumns => settings::MSG_SLUGIFY_COLUMNS,
            FrameOperation::LowercaseColumns => settings::MSG_LOWERCASE_COLUMNS,
            FrameOperation::UppercaseRows => settings::MSG_UPPERCASE_ROWS,
        }
    }

    /// Apply this operation to a frame
    pub fn apply(self, frame: &mut Frame) {
        match self {
            FrameOperation::Strip => frame.map_cells(|v| map_text(v, |s| s.trim().to_string())),
            FrameOperation::SlugifyColumns => frame.map_columns(slugify),
            FrameOperation::LowercaseColumns => frame.map_columns(str::to_lowercase),
            FrameOperation::UppercaseRows => frame.map_cells(|v| map_text(v, str::to_uppercase)),
        }
    }
}

/// Apply `f` to text cells; other cells are returned unchanged.
fn map_text(value: &Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(s)),
        other => other.clone(),
    }
}

/// Slugify a column name: apostrophes dropped, runs of other
/// non-alphanumeric characters become `_`, no leading or trailing `_`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if matches!(c, '\'' | '\u{2019}' | '"') {
            continue;
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_end_matches('_').to_string()
}

// =============================================================================
// Replace
// =============================================================================

/// A compiled regex substitution.
///
/// Replacements are written with `\1` or `\g<name>` group references; they
/// are translated to the `regex` crate's `${1}` syntax when compiled.
#[derive(Debug, Clone)]
pub struct Replacement {
    pub pattern: String,
    regex: Regex,
    replacement: String,
}

impl Replacement {
    /// Compile a pattern and its replacement.
    ///
    /// Fails with a message on an invalid pattern or a replacement that
    /// refers to a group the pattern does not have.
    pub fn compile(pattern: &str, replacement: &str) -> Result<Self, String> {
        let regex = Regex::new(pattern).map_err(|e| e.to_string())?;
        let (replacement, groups) = translate_replacement(replacement)?;

        for group in groups {
            let known = match group.parse::<usize>() {
                Ok(n) => n < regex.captures_len(),
                Err(_) => regex.capture_names().flatten().any(|name| name == group),
            };
            if !known {
                return Err(format!("invalid group reference {}", group));
            }
        }

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            replacement,
        })
    }

    /// Substitute every match in a text cell.
    pub fn apply(&self, value: &Value) -> Value {
        map_text(value, |s| self.regex.replace_all(s, self.replacement.as_str()).into_owned())
    }
}

/// Translate a replacement string to `regex` syntax.
///
/// Returns the translated string and the group names or numbers it uses.
pub fn translate_replacement(replacement: &str) -> Result<(String, Vec<String>), String> {
    let mut out = String::with_capacity(replacement.len());
    let mut groups = Vec::new();
    let mut chars = replacement.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' => match chars.next() {
                Some(d) if d.is_ascii_digit() => {
                    let mut group = d.to_string();
                    if let Some(next) = chars.peek().copied().filter(char::is_ascii_digit) {
                        group.push(next);
                        chars.next();
                    }
                    let group = group.trim_start_matches('0');
                    let group = if group.is_empty() { "0" } else { group }.to_string();
                    out.push_str(&format!("${{{}}}", group));
                    groups.push(group);
                }
                Some('g') => {
                    if chars.next() != Some('<') {
                        return Err("missing < after \\g".to_string());
                    }
                    let mut group = String::new();
                    loop {
                        match chars.next() {
                            Some('>') => break,
                            Some(ch) => group.push(ch),
                            None => return Err("missing > in group reference".to_string()),
                        }
                    }
                    if group.is_empty() {
                        return Err("empty group reference".to_string());
                    }
                    out.push_str(&format!("${{{}}}", group));
                    groups.push(group);
                }
                Some('\\') => out.push('\\'),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => return Err("bad escape (end of replacement)".to_string()),
            },
            other => out.push(other),
        }
    }
    Ok((out, groups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame() -> Frame {
        Frame::new(
            vec!["First Name".into(), "O'Brien Score".into()],
            vec![vec![json!("  ann "), json!(3)], vec![Value::Null, json!(" x")]],
        )
    }

    #[test]
    fn test_operations_follow_fixed_order() {
        let input = InputOptions {
            strip: true,
            slugify_columns: true,
            lowercase_columns: true,
            uppercase_rows: true,
            include_index: false,
        };
        assert_eq!(
            FrameOperation::from_input(&input),
            vec![
                FrameOperation::Strip,
                FrameOperation::SlugifyColumns,
                FrameOperation::LowercaseColumns,
                FrameOperation::UppercaseRows,
            ]
        );
        assert!(FrameOperation::from_input(&InputOptions::default()).is_empty());
    }

    #[test]
    fn test_strip_and_uppercase_touch_text_only() {
        let mut frame = frame();
        FrameOperation::Strip.apply(&mut frame);
        FrameOperation::UppercaseRows.apply(&mut frame);

        assert_eq!(frame.rows[0], vec![json!("ANN"), json!(3)]);
        assert_eq!(frame.rows[1], vec![Value::Null, json!("X")]);
    }

    #[test]
    fn test_slugify_then_lowercase_columns() {
        let mut frame = frame();
        FrameOperation::SlugifyColumns.apply(&mut frame);
        assert_eq!(frame.columns, vec!["First_Name", "OBrien_Score"]);

        FrameOperation::LowercaseColumns.apply(&mut frame);
        assert_eq!(frame.columns, vec!["first_name", "obrien_score"]);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("  Total (USD) "), "Total_USD");
        assert_eq!(slugify("a--b"), "a_b");
        assert_eq!(slugify("Année"), "Année");
    }

    #[test]
    fn test_replace_with_group_reference() {
        let op = Replacement::compile(r"(\w+)@example\.com", r"\1 at example").unwrap();
        assert_eq!(op.apply(&json!("bob@example.com")), json!("bob at example"));
        assert_eq!(op.apply(&json!(5)), json!(5));
        assert_eq!(op.apply(&Value::Null), Value::Null);
    }

    #[test]
    fn test_replace_dollar_is_literal() {
        let op = Replacement::compile("USD", "$").unwrap();
        assert_eq!(op.apply(&json!("10 USD")), json!("10 $"));
    }

    #[test]
    fn test_replace_named_group() {
        let op = Replacement::compile(r"(?P<first>\w+) (?P<last>\w+)", r"\g<last>, \g<first>").unwrap();
        assert_eq!(op.apply(&json!("Ada Lovelace")), json!("Lovelace, Ada"));
    }

    #[test]
    fn test_invalid_pattern_and_group() {
        assert!(Replacement::compile("(unclosed", "x").is_err());
        assert!(Replacement::compile("(a)", r"\2").is_err());
        assert!(Replacement::compile("(a)", r"\g<nope>").is_err());
        assert!(Replacement::compile("a", "\\").is_err());
    }

    #[test]
    fn test_translate_replacement() {
        let (out, groups) = translate_replacement(r"\1-\12 \\ cost $").unwrap();
        assert_eq!(out, r"${1}-${12} \ cost $$");
        assert_eq!(groups, vec!["1", "12"]);
    }
}
