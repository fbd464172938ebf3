//! Gemini API client
//!
//! Sends the dataset to a `generateContent` endpoint and reads the anomaly
//! list back out of the model's text answer. The model is asked for
//! 0-based data row indices; moving them onto the dataset's numbering is
//! the caller's job.
//!
//! API Documentation: https://ai.google.dev/api/generate-content

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::config::AiSettings;
use crate::domain::result::{Error, Result};
use crate::domain::Dataset;
use crate::ports::{AnomalyProvider, ProviderAnalysis};

/// Default production API URL
const GEMINI_PRODUCTION_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variable to override the Gemini API base URL
pub const GEMINI_BASE_URL_ENV: &str = "GEMINI_BASE_URL";

/// Get the Gemini base URL, checking the environment variable first
pub fn get_base_url() -> String {
    std::env::var(GEMINI_BASE_URL_ENV).unwrap_or_else(|_| GEMINI_PRODUCTION_URL.to_string())
}

// =============================================================================
// API Response Models
// =============================================================================

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

// =============================================================================
// Gemini HTTP Client
// =============================================================================

/// Gemini anomaly provider
#[derive(Debug)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    /// Create a provider from the AI settings
    ///
    /// The API key is read from the environment variable named in
    /// `apiKeyEnv`; the base URL honours `GEMINI_BASE_URL`.
    pub fn from_settings(settings: &AiSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env).map_err(|_| {
            Error::config(format!(
                "AI detection needs an API key in the {} environment variable",
                settings.api_key_env
            ))
        })?;
        Self::new_with_base_url(
            &api_key,
            &settings.model,
            &get_base_url(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    /// Create a provider against an explicit base URL
    pub fn new_with_base_url(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::config("Gemini API key cannot be empty"));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn map_request_error(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::provider_transient("Gemini request timed out")
        } else if error.is_connect() {
            Error::provider_transient("Unable to connect to Gemini servers")
        } else {
            Error::provider_fatal(format!("Gemini request failed: {}", error))
        }
    }
}

#[async_trait]
impl AnomalyProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn analyze(&self, dataset: &Dataset) -> Result<ProviderAnalysis> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = json!({
            "contents": [{ "parts": [{ "text": build_prompt(dataset) }] }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        check_status(response.status())?;

        let reply: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::provider_fatal(format!("Failed to parse Gemini response: {}", e)))?;

        let text = reply
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        let value = extract_json(&text)
            .ok_or_else(|| Error::provider_fatal("Gemini answer did not contain JSON"))?;
        Ok(ProviderAnalysis::from_value(value))
    }
}

/// Map an HTTP status onto a provider error; rate limits and server errors
/// are worth retrying, everything else is not
fn check_status(status: StatusCode) -> Result<()> {
    match status.as_u16() {
        200..=299 => Ok(()),
        401 | 403 => Err(Error::provider_fatal(
            "Gemini authentication failed. Your API key may be invalid or revoked.",
        )),
        429 => Err(Error::provider_transient("Gemini rate limit exceeded")),
        code if status.is_server_error() => {
            Err(Error::provider_transient(format!("Gemini server error: HTTP {}", code)))
        }
        code => Err(Error::provider_fatal(format!("Gemini API error: HTTP {}", code))),
    }
}

/// Build the analysis prompt
///
/// Rows are listed as JSON with their 0-based data index so the model's
/// answer can be mapped back without ambiguity.
pub fn build_prompt(dataset: &Dataset) -> String {
    let header = dataset
        .header()
        .map(|cells| serde_json::to_string(cells).unwrap_or_default())
        .unwrap_or_else(|| "[]".to_string());

    let mut prompt = String::from(
        "You are auditing a table of financial transactions for data quality problems and \
         suspicious entries.\n\
         Reply with JSON only, in this shape:\n\
         {\"anomalies\": [{\"row\": <0-based data row index>, \"errors\": [\"<reason>\"], \
         \"confidence\": <0..1>}], \"insights\": \"<one paragraph>\"}\n\
         Row indices count data rows only: index 0 is the first row after the header.\n\n",
    );
    prompt.push_str(&format!("Header: {}\nRows:\n", header));
    for (index, row) in dataset.data_rows().iter().enumerate() {
        let cells = serde_json::to_string(row).unwrap_or_default();
        prompt.push_str(&format!("{}: {}\n", index, cells));
    }
    prompt
}

/// Pull a JSON value out of model text
///
/// Accepts a bare JSON document, a ```json fenced block, or JSON embedded
/// in surrounding prose.
pub fn extract_json(text: &str) -> Option<JsonValue> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            if let Ok(value) = serde_json::from_str(after[..end].trim()) {
                return Some(value);
            }
        }
    }

    let start = trimmed.find(['{', '['])?;
    let end = trimmed.rfind(['}', ']'])?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bare_json() {
        let value = extract_json(r#" {"anomalies": [], "insights": "ok"} "#).unwrap();
        assert_eq!(value["insights"], "ok");
    }

    #[test]
    fn test_extract_fenced_json() {
        let text = "Here you go:\n```json\n[{\"row\": 0, \"errors\": [\"Odd\"]}]\n```\nDone.";
        let value = extract_json(text).unwrap();
        assert_eq!(value[0]["row"], 0);
    }

    #[test]
    fn test_extract_embedded_json() {
        let value = extract_json("Result: {\"anomalies\": [{\"row\": 3}]} end").unwrap();
        assert_eq!(value["anomalies"][0]["row"], 3);
        assert!(extract_json("no json here").is_none());
    }

    #[test]
    fn test_prompt_lists_zero_based_rows() {
        let dataset = Dataset::from_text_rows(vec![
            vec!["Date", "Amount"],
            vec!["2024-01-15", "12"],
            vec!["2024-01-16", "13"],
        ]);
        let prompt = build_prompt(&dataset);
        assert!(prompt.contains("Header: [\"Date\",\"Amount\"]"));
        assert!(prompt.contains("0: [\"2024-01-15\",\"12\"]"));
        assert!(prompt.contains("1: [\"2024-01-16\",\"13\"]"));
    }

    #[test]
    fn test_status_classification() {
        assert!(check_status(StatusCode::OK).is_ok());
        assert!(check_status(StatusCode::TOO_MANY_REQUESTS)
            .unwrap_err()
            .is_retryable());
        assert!(check_status(StatusCode::SERVICE_UNAVAILABLE)
            .unwrap_err()
            .is_retryable());
        assert!(!check_status(StatusCode::UNAUTHORIZED)
            .unwrap_err()
            .is_retryable());
        assert!(!check_status(StatusCode::BAD_REQUEST)
            .unwrap_err()
            .is_retryable());
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let err = GeminiProvider::new_with_base_url(
            " ",
            "gemini-1.5-flash",
            "http://localhost",
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
