//! AI anomaly provider port

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::result::Result;
use crate::domain::Dataset;

/// What a provider returned for one dataset
///
/// `anomalies` stays raw JSON: provider output is untrusted and goes
/// through the output validator before it is merged. Row numbers in it are
/// relative to the data rows (0 is the first row after the header).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderAnalysis {
    #[serde(default = "empty_list")]
    pub anomalies: JsonValue,
    #[serde(default)]
    pub insights: String,
}

fn empty_list() -> JsonValue {
    JsonValue::Array(Vec::new())
}

impl ProviderAnalysis {
    /// Interpret a provider's JSON reply
    ///
    /// A bare list is taken as the anomaly list. An object contributes its
    /// `anomalies` and `insights` keys. Anything else is kept as-is in
    /// `anomalies` so the output validator can report it.
    pub fn from_value(value: JsonValue) -> Self {
        match value {
            JsonValue::Array(_) => Self {
                anomalies: value,
                insights: String::new(),
            },
            JsonValue::Object(mut map) => {
                let anomalies = map.remove("anomalies").unwrap_or_else(empty_list);
                let insights = match map.remove("insights") {
                    Some(JsonValue::String(s)) => s,
                    Some(JsonValue::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                };
                Self { anomalies, insights }
            }
            other => Self {
                anomalies: other,
                insights: String::new(),
            },
        }
    }
}

/// AI anomaly provider trait
///
/// Implementations call out to a model (or replay a saved answer). Retry,
/// timeout and fallback are the caller's job; an implementation should
/// classify its failures with `Error::provider_transient` or
/// `Error::provider_fatal` so the caller knows whether to try again.
#[async_trait]
pub trait AnomalyProvider: Send + Sync {
    /// Provider name (e.g., "gemini", "replay")
    fn name(&self) -> &str;

    /// Analyze a dataset
    async fn analyze(&self, dataset: &Dataset) -> Result<ProviderAnalysis>;
}
