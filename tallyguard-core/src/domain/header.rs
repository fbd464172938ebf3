//! Header resolution

use std::collections::HashMap;

use super::dataset::Cell;

/// Well-known column names detectors look up
pub mod columns {
    pub const AMOUNT: &str = "amount";
    pub const DATE: &str = "date";
    pub const DESCRIPTION: &str = "description";
    pub const CATEGORY: &str = "category";
    pub const EMAIL: &str = "email";
    pub const TRANSACTION_TYPE: &str = "transaction_type";
}

/// Mapping from normalized header text to column index
///
/// Keys are trimmed and lower-cased. When two header cells normalize to
/// the same name, the last one wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderMap {
    index: HashMap<String, usize>,
}

impl HeaderMap {
    /// Resolve a header row
    pub fn from_cells(cells: &[Cell]) -> Self {
        let mut index = HashMap::new();
        for (i, cell) in cells.iter().enumerate() {
            let name = normalize(&cell.to_text());
            if name.is_empty() {
                continue;
            }
            index.insert(name, i);
        }
        Self { index }
    }

    /// Column index for a name, matched case-insensitively
    pub fn get(&self, name: &str) -> Option<usize> {
        self.index.get(&normalize(name)).copied()
    }

    /// Whether the column exists
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Cell for a column in a row, `Cell::Empty` when the row is short.
    /// Returns `None` only when the column is absent from the header.
    pub fn cell<'a>(&self, row: &'a [Cell], name: &str) -> Option<&'a Cell> {
        const EMPTY: &Cell = &Cell::Empty;
        self.get(name).map(|i| row.get(i).unwrap_or(EMPTY))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
