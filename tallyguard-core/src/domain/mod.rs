//! Core domain entities
//!
//! Datasets, anomalies and the transaction-type rule table. These are pure
//! data structures - no I/O or external dependencies.

pub mod anomaly;
pub mod dataset;
pub mod header;
pub mod result;
pub mod rule;

pub use anomaly::{
    Anomaly, AnomalyRecord, Reason, ReasonKind, Snapshot, SnapshotValue, NOT_AVAILABLE,
};
pub use dataset::{display_row, Cell, Dataset, ROW_OFFSET};
pub use header::HeaderMap;
pub use rule::{AmountSign, TypeRule, TYPE_RULES};
