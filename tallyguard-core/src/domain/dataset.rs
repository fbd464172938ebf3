//! Tabular dataset model
//!
//! A dataset is the in-memory table handed over by a data source: row 0 is
//! the header row, every following row is a data row. Cells keep the raw
//! shape they had in the source (spreadsheet cells can be numbers, dates or
//! text), so detectors decide for themselves how to interpret them.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

use super::header::HeaderMap;

/// Offset between a 0-based data index and the row number users see:
/// one for the header row, one for 1-based numbering.
pub const ROW_OFFSET: usize = 2;

/// Convert a 0-based data row index into the externally visible row number
pub fn display_row(data_index: usize) -> usize {
    data_index + ROW_OFFSET
}

/// Convert an externally visible row number back to a data index
pub fn data_index(row: usize) -> Option<usize> {
    row.checked_sub(ROW_OFFSET)
}

/// A raw cell value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

impl Cell {
    /// Whether the cell is empty or whitespace-only text
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Display form of the cell, as a spreadsheet would show it
    pub fn to_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => format_number(*n),
            Cell::Bool(b) => b.to_string(),
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    /// Trimmed display form
    pub fn trimmed(&self) -> String {
        self.to_text().trim().to_string()
    }

    /// Interpret the cell as a monetary amount
    ///
    /// Text accepts currency symbols, thousands separators and accounting
    /// parentheses for negatives: `(1,200.00)` -> -1200.
    pub fn as_amount(&self) -> Option<f64> {
        match self {
            Cell::Number(n) if n.is_finite() => Some(*n),
            Cell::Text(s) => parse_amount(s),
            _ => None,
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s)
        }
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

impl From<NaiveDate> for Cell {
    fn from(d: NaiveDate) -> Self {
        Cell::Date(d)
    }
}

impl From<JsonValue> for Cell {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Cell::Empty,
            JsonValue::Bool(b) => Cell::Bool(b),
            JsonValue::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Empty),
            JsonValue::String(s) => Cell::from(s),
            other => Cell::Text(other.to_string()),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Cell::Empty => serializer.serialize_none(),
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Number(n) => serializer.serialize_f64(*n),
            Cell::Bool(b) => serializer.serialize_bool(*b),
            Cell::Date(d) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value: JsonValue = Deserialize::deserialize(deserializer)?;
        Ok(Cell::from(value))
    }
}

/// Parse a monetary amount from text
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    // Accounting notation: (100.00) -> -100.00
    let (negate, s) = match s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        Some(inner) => (true, inner.trim()),
        None => (false, s),
    };

    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ',' | ' '))
        .collect();

    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negate { -value.abs() } else { value })
}

/// Format a number without a trailing `.0` for whole values
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// An ordered table of rows whose first row is the header row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    rows: Vec<Vec<Cell>>,
}

impl Dataset {
    /// Build a dataset from raw rows (header first)
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// Build a dataset from text rows, mapping empty strings to `Cell::Empty`
    pub fn from_text_rows<R, S>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|s| Cell::from(s.into())).collect())
            .collect();
        Self { rows }
    }

    /// Total number of rows, header included
    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset has a header and at least one data row
    pub fn has_data(&self) -> bool {
        self.rows.len() >= 2
    }

    /// The header row, if any
    pub fn header(&self) -> Option<&[Cell]> {
        self.rows.first().map(|r| r.as_slice())
    }

    /// Data rows (everything after the header)
    pub fn data_rows(&self) -> &[Vec<Cell>] {
        if self.rows.is_empty() {
            &[]
        } else {
            &self.rows[1..]
        }
    }

    /// Number of data rows
    pub fn data_len(&self) -> usize {
        self.data_rows().len()
    }

    /// Copy of the header plus at most `max_data_rows` data rows
    pub fn truncated(&self, max_data_rows: usize) -> Dataset {
        let keep = self.rows.len().min(max_data_rows.saturating_add(1));
        Self {
            rows: self.rows[..keep].to_vec(),
        }
    }

    /// Resolve the header row into a column lookup
    pub fn header_map(&self) -> HeaderMap {
        self.header().map(HeaderMap::from_cells).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_row_offset() {
        assert_eq!(display_row(0), 2);
        assert_eq!(display_row(9), 11);
        assert_eq!(data_index(2), Some(0));
        assert_eq!(data_index(1), None);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("  -42.50  "), Some(-42.5));
        assert_eq!(parse_amount("$1,000"), Some(1000.0));
        assert_eq!(parse_amount("(500.00)"), Some(-500.0));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("NaN"), None);
    }

    #[test]
    fn test_cell_blank() {
        assert!(Cell::Empty.is_blank());
        assert!(Cell::Text("   ".into()).is_blank());
        assert!(!Cell::Number(0.0).is_blank());
        assert!(!Cell::Text("x".into()).is_blank());
    }

    #[test]
    fn test_cell_from_json() {
        assert_eq!(Cell::from(serde_json::json!(null)), Cell::Empty);
        assert_eq!(Cell::from(serde_json::json!(12.5)), Cell::Number(12.5));
        assert_eq!(Cell::from(serde_json::json!("")), Cell::Empty);
        assert_eq!(Cell::from(serde_json::json!(true)), Cell::Bool(true));
    }

    #[test]
    fn test_number_display() {
        assert_eq!(Cell::Number(100.0).to_text(), "100");
        assert_eq!(Cell::Number(-12.5).to_text(), "-12.5");
    }

    #[test]
    fn test_dataset_rows() {
        let ds = Dataset::from_text_rows(vec![vec!["Date", "Amount"], vec!["2024-01-01", "10"]]);
        assert!(ds.has_data());
        assert_eq!(ds.data_len(), 1);
        assert_eq!(ds.data_rows()[0][1], Cell::Text("10".into()));

        let empty = Dataset::default();
        assert!(!empty.has_data());
        assert!(empty.data_rows().is_empty());
        assert_eq!(empty.truncated(3).total_rows(), 0);

        assert_eq!(ds.truncated(0).total_rows(), 1);
        assert_eq!(ds.truncated(10), ds);
    }

    #[test]
    fn test_dataset_json_roundtrip_shape() {
        let ds: Dataset = serde_json::from_str(r#"[["Amount","Date"],[12,null]]"#).unwrap();
        assert_eq!(ds.data_rows()[0][0], Cell::Number(12.0));
        assert_eq!(ds.data_rows()[0][1], Cell::Empty);
    }
}
