//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external collaborators. The detection
//! engine depends only on these traits, not on concrete implementations.

mod anomaly_provider;
mod data_source;

pub use anomaly_provider::{AnomalyProvider, ProviderAnalysis};
pub use data_source::DatasetSource;
