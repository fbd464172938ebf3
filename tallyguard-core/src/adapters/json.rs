//! JSON dataset source
//!
//! Accepts the array-of-arrays shape spreadsheet APIs hand out:
//! `[["Date", "Amount"], ["2024-01-15", 12.5], ...]`. Cells may be
//! null, strings, numbers or booleans.

use std::path::{Path, PathBuf};

use serde_json::Value as JsonValue;

use crate::domain::result::{Error, Result};
use crate::domain::{Cell, Dataset};
use crate::ports::DatasetSource;

/// JSON file source
#[derive(Debug, Clone)]
pub struct JsonSource {
    path: PathBuf,
}

impl JsonSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DatasetSource for JsonSource {
    fn name(&self) -> &str {
        "json"
    }

    fn load(&self) -> Result<Dataset> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::input(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        parse_json_table(&content)
    }
}

/// Parse an array-of-arrays table
pub fn parse_json_table(content: &str) -> Result<Dataset> {
    let value: JsonValue = serde_json::from_str(content)?;
    let JsonValue::Array(rows) = value else {
        return Err(Error::input("Expected a JSON array of rows"));
    };

    let mut table = Vec::with_capacity(rows.len());
    for (i, row) in rows.into_iter().enumerate() {
        let JsonValue::Array(cells) = row else {
            return Err(Error::input(format!("Row {} is not an array", i + 1)));
        };
        table.push(cells.into_iter().map(Cell::from).collect());
    }
    Ok(Dataset::new(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parses_mixed_cells() {
        let dataset =
            parse_json_table(r#"[["Date","Amount","Paid"],["2024-01-15",12.5,true],[null,"",false]]"#)
                .unwrap();

        assert_eq!(dataset.data_len(), 2);
        let rows = dataset.data_rows();
        assert_eq!(rows[0][1], Cell::Number(12.5));
        assert_eq!(rows[0][2], Cell::Bool(true));
        assert_eq!(rows[1][0], Cell::Empty);
        assert_eq!(rows[1][1], Cell::Empty);
    }

    #[test]
    fn test_rejects_non_table_shapes() {
        assert!(matches!(
            parse_json_table(r#"{"rows": []}"#),
            Err(Error::Input(_))
        ));
        let err = parse_json_table(r#"[["Date"], "oops"]"#).unwrap_err();
        assert!(err.to_string().contains("Row 2"));
        assert!(matches!(parse_json_table("not json"), Err(Error::Json(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[["Amount"],[42]]"#).unwrap();

        let dataset = JsonSource::new(file.path()).load().unwrap();
        assert_eq!(dataset.data_rows()[0][0].as_amount(), Some(42.0));
    }
}
