//! Typed cell content.

use chrono::NaiveDateTime;
use std::fmt;
use std::sync::Arc;

use super::pool::StringPool;

/// Types of data a cell can hold. Immutable once decoded.
///
/// Text is reference-counted so values deduplicated by the
/// [`StringPool`] share one allocation across sheets and files.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Empty cell
    Empty,
    /// Text value
    Text(Arc<str>),
    /// Numeric value
    Number(f64),
    /// Boolean value
    Boolean(bool),
    /// Date/time value
    Date(NaiveDateTime),
}

impl CellValue {
    /// Build a text value without pooling. Mostly for tests and fixtures;
    /// readers go through [`CellValue::from_raw_text`].
    pub fn text(value: impl AsRef<str>) -> Self {
        CellValue::Text(Arc::from(value.as_ref()))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Classify a raw text field from a delimited file.
    ///
    /// Numeric-looking text becomes `Number`, TRUE/FALSE becomes `Boolean`,
    /// blank becomes `Empty`, anything else stays `Text` (pooled).
    pub fn from_raw_text(raw: &str, pool: &StringPool) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Empty;
        }
        match trimmed {
            "TRUE" | "True" | "true" => return CellValue::Boolean(true),
            "FALSE" | "False" | "false" => return CellValue::Boolean(false),
            _ => {}
        }
        if let Some(number) = parse_number(trimmed) {
            return CellValue::Number(number);
        }
        CellValue::Text(pool.intern(raw))
    }
}

/// Strict numeric parse: the whole trimmed field must be a finite number.
///
/// The leading-character guard keeps words like "Infinity" or "nan" textual.
fn parse_number(text: &str) -> Option<f64> {
    let first = text.as_bytes().first()?;
    if !matches!(first, b'0'..=b'9' | b'-' | b'+' | b'.') {
        return None;
    }
    match fast_float2::parse::<f64, _>(text) {
        Ok(value) if value.is_finite() => Some(value),
        _ => None,
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            CellValue::Date(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}
