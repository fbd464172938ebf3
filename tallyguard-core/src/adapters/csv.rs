//! CSV dataset source
//!
//! Reads every record, header included, as raw text. Rows may have
//! different lengths; missing trailing cells read as empty.

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::domain::result::{Error, Result};
use crate::domain::{Cell, Dataset};
use crate::ports::DatasetSource;

/// CSV file source
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    delimiter: u8,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
        }
    }

    /// Use another field delimiter (e.g., `b';'` or `b'\t'`)
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DatasetSource for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn load(&self) -> Result<Dataset> {
        let file = std::fs::File::open(&self.path).map_err(|e| {
            Error::input(format!("Failed to open {}: {}", self.path.display(), e))
        })?;
        read_csv(file, self.delimiter)
    }
}

/// Parse CSV from any reader (a file, stdin, an in-memory buffer)
pub fn read_csv<R: Read>(reader: R, delimiter: u8) -> Result<Dataset> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(reader);

    let mut rows: Vec<Vec<Cell>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = record
            .iter()
            .enumerate()
            .map(|(i, field)| {
                // Spreadsheet exports often start with a UTF-8 byte order mark
                let field = if rows.is_empty() && i == 0 {
                    field.trim_start_matches('\u{feff}')
                } else {
                    field
                };
                if field.trim().is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(field.to_string())
                }
            })
            .collect();
        rows.push(row);
    }

    Ok(Dataset::new(rows))
}
