//! Replay provider
//!
//! Answers with a provider response saved earlier, so hybrid scans can be
//! repeated offline and exercised in tests.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::domain::result::{Error, Result};
use crate::domain::Dataset;
use crate::ports::{AnomalyProvider, ProviderAnalysis};

/// Provider returning a fixed analysis
#[derive(Debug, Clone)]
pub struct ReplayProvider {
    analysis: ProviderAnalysis,
}

impl ReplayProvider {
    pub fn new(analysis: ProviderAnalysis) -> Self {
        Self { analysis }
    }

    /// Build from a raw reply (object with `anomalies`/`insights`, or a bare list)
    pub fn from_value(value: JsonValue) -> Self {
        Self::new(ProviderAnalysis::from_value(value))
    }

    /// Load a saved reply from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::input(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let value: JsonValue = serde_json::from_str(&content)?;
        Ok(Self::from_value(value))
    }
}

#[async_trait]
impl AnomalyProvider for ReplayProvider {
    fn name(&self) -> &str {
        "replay"
    }

    async fn analyze(&self, _dataset: &Dataset) -> Result<ProviderAnalysis> {
        Ok(self.analysis.clone())
    }
}
