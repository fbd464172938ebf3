//! Shared state for one detection pass

use chrono::NaiveDate;
use regex::Regex;

use crate::config::DetectionConfig;
use crate::domain::header::columns;
use crate::domain::result::{Error, Result};
use crate::domain::{display_row, Cell, Dataset, HeaderMap, Snapshot};
use crate::services::validation::DateParser;

/// Regexes compiled once from a [`DetectionConfig`]
#[derive(Debug, Clone)]
pub struct CompiledRules {
    pub dates: DateParser,
    pub email: Regex,
}

impl CompiledRules {
    pub fn compile(config: &DetectionConfig) -> Result<Self> {
        config.validate()?;
        let dates = DateParser::new(&config.date.date_patterns)?;
        let email = Regex::new(&config.email.format)
            .map_err(|e| Error::config(format!("email.format is not a valid regex: {}", e)))?;
        Ok(Self { dates, email })
    }
}

/// Read-only view over a dataset that every detector works from
pub struct ScanContext<'a> {
    pub header: HeaderMap,
    pub rows: &'a [Vec<Cell>],
    pub config: &'a DetectionConfig,
    pub rules: &'a CompiledRules,
    /// Reference date for the future-date rule
    pub today: NaiveDate,
}

impl<'a> ScanContext<'a> {
    pub fn new(
        dataset: &'a Dataset,
        config: &'a DetectionConfig,
        rules: &'a CompiledRules,
        today: NaiveDate,
    ) -> Self {
        Self {
            header: dataset.header_map(),
            rows: dataset.data_rows(),
            config,
            rules,
            today,
        }
    }

    /// Cell of a named column; `None` when the column does not exist
    pub fn cell(&self, index: usize, column: &str) -> Option<&'a Cell> {
        let row: &'a [Cell] = &self.rows[index];
        self.header.cell(row, column)
    }

    /// Parsed amount of a row, if the column exists and parses
    pub fn amount(&self, index: usize) -> Option<f64> {
        self.cell(index, columns::AMOUNT).and_then(Cell::as_amount)
    }

    /// Parsed date of a row, if the column exists and parses
    pub fn date(&self, index: usize) -> Option<NaiveDate> {
        self.cell(index, columns::DATE)
            .and_then(|c| self.rules.dates.parse(c))
    }

    /// Trimmed text of a column, `None` when absent or blank
    pub fn text(&self, index: usize, column: &str) -> Option<String> {
        self.cell(index, column)
            .filter(|c| !c.is_blank())
            .map(Cell::trimmed)
    }

    /// Display snapshot of a row
    pub fn snapshot(&self, index: usize) -> Snapshot {
        Snapshot::capture(&self.header, &self.rows[index], |c| self.rules.dates.parse(c))
    }

    /// Externally visible row number of a data index
    pub fn row_number(&self, index: usize) -> usize {
        display_row(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
