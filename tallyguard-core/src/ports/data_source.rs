//! Dataset source port
//!
//! Anything that can hand over an in-memory table: a CSV file, a JSON
//! export, a spreadsheet service.

use crate::domain::result::Result;
use crate::domain::Dataset;

/// Dataset source trait
///
/// `load` returns the full table with the header as row 0. A table with
/// fewer than two rows is not an error; the detection pass simply finds
/// nothing in it.
pub trait DatasetSource: Send + Sync {
    /// Source name used in logs and messages (e.g., "csv", "json")
    fn name(&self) -> &str;

    /// Read the table
    fn load(&self) -> Result<Dataset>;
}
