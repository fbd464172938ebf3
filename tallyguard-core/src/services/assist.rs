//! AI-assisted detection
//!
//! Calls an [`AnomalyProvider`] with a timeout and exponential backoff,
//! moves its rows onto the dataset's numbering and combines the result
//! with the rule-based scan according to the detection mode. A provider
//! that keeps failing never fails the scan: the rule-based result is used
//! and the failure is reported as a warning.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use crate::config::{AiSettings, DetectionAlgorithm};
use crate::domain::result::{Error, Result};
use crate::domain::dataset::data_index;
use crate::domain::{Anomaly, Dataset, Reason, ROW_OFFSET};
use crate::ports::{AnomalyProvider, ProviderAnalysis};
use crate::services::contract;
use crate::services::detect::{DetectionReport, DetectionService};

/// How the provider call is bounded and retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Limit for a single attempt
    pub timeout: Duration,
    /// Attempts after the first one
    pub max_retries: u32,
    /// Wait before the first retry; doubled after each retry
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &AiSettings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
        }
    }
}

/// Call a provider, retrying transient failures with exponential backoff
pub async fn call_with_retry(
    provider: &dyn AnomalyProvider,
    dataset: &Dataset,
    policy: &RetryPolicy,
) -> Result<ProviderAnalysis> {
    let mut backoff = policy.initial_backoff;
    let mut attempt = 0;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout, provider.analyze(dataset)).await {
            Ok(result) => result,
            Err(_) => Err(Error::provider_transient(format!(
                "{} did not answer within {}s",
                provider.name(),
                policy.timeout.as_secs()
            ))),
        };

        match outcome {
            Ok(analysis) => return Ok(analysis),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Shift provider rows (relative to the data rows) onto display rows
///
/// Rows that are not whole non-negative numbers are left alone; the output
/// validator drops them later.
pub fn shift_rows(anomalies: &JsonValue) -> JsonValue {
    let JsonValue::Array(items) = anomalies else {
        return anomalies.clone();
    };
    let shifted = items
        .iter()
        .map(|item| {
            let mut item = item.clone();
            if let JsonValue::Object(obj) = &mut item {
                if let Some(row) = obj.get("row").and_then(relative_row) {
                    obj.insert("row".to_string(), JsonValue::from(row + ROW_OFFSET as u64));
                }
            }
            item
        })
        .collect();
    JsonValue::Array(shifted)
}

fn relative_row(value: &JsonValue) -> Option<u64> {
    let n = match value {
        JsonValue::Number(n) => n.as_f64()?,
        JsonValue::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if n < 0.0 || n.fract() != 0.0 || n > u32::MAX as f64 {
        return None;
    }
    Some(n as u64)
}

/// Provider anomalies turned into pipeline anomalies
#[derive(Debug, Default)]
pub struct ProviderAnomalies {
    pub anomalies: Vec<Anomaly>,
    pub warnings: Vec<String>,
}

/// Validate, repair and row-adjust a provider's answer against a dataset
///
/// Snapshots are taken from the dataset, not from the provider, and rows
/// outside the dataset are dropped.
pub fn adopt(
    service: &DetectionService,
    dataset: &Dataset,
    today: NaiveDate,
    provider_name: &str,
    anomalies: &JsonValue,
) -> ProviderAnomalies {
    let mut out = ProviderAnomalies::default();
    let enforced = contract::enforce(&shift_rows(anomalies));
    if let Some(violation) = enforced.violation {
        out.warnings.push(format!(
            "Repaired malformed output from {}: {}",
            provider_name, violation
        ));
    }

    let ctx = service.context(dataset, today);
    let mut dropped = 0;
    for record in enforced.records {
        let Some(index) = data_index(record.row).filter(|i| *i < ctx.len()) else {
            dropped += 1;
            continue;
        };
        let reasons = record.errors.into_iter().map(Reason::external).collect();
        out.anomalies.push(
            Anomaly::new(record.row, reasons, ctx.snapshot(index)).with_confidence(record.confidence),
        );
    }
    if dropped > 0 {
        out.warnings.push(format!(
            "Dropped {} anomalies from {} that point outside the dataset",
            dropped, provider_name
        ));
    }
    out
}

/// Detection with an optional AI provider
pub struct AssistService {
    detection: DetectionService,
    provider: Option<Arc<dyn AnomalyProvider>>,
    policy: RetryPolicy,
}

impl AssistService {
    pub fn new(detection: DetectionService, provider: Option<Arc<dyn AnomalyProvider>>) -> Self {
        let policy = RetryPolicy::from_settings(&detection.config().ai);
        Self {
            detection,
            provider,
            policy,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn detection(&self) -> &DetectionService {
        &self.detection
    }

    /// Scan a dataset in the configured mode
    pub async fn detect(&self, dataset: &Dataset, today: NaiveDate) -> DetectionReport {
        let mode = self.detection.config().detection_algorithm;
        self.detect_as(mode, dataset, today).await
    }

    /// Scan a dataset in an explicit mode
    pub async fn detect_as(
        &self,
        mode: DetectionAlgorithm,
        dataset: &Dataset,
        today: NaiveDate,
    ) -> DetectionReport {
        let mut warnings = Vec::new();
        let rule_based = || self.detection.rule_anomalies(dataset, today);

        if !mode.uses_provider() || !dataset.has_data() {
            return self
                .detection
                .finalize(mode, dataset, vec![rule_based()], warnings);
        }

        let Some(provider) = &self.provider else {
            warnings.push("No AI provider is configured; using rule-based detection".to_string());
            return self
                .detection
                .finalize(mode, dataset, vec![rule_based()], warnings);
        };

        let max_rows = self.detection.config().ai.max_rows;
        let sent = if dataset.data_len() > max_rows {
            warnings.push(format!(
                "Only the first {} of {} rows were sent to {}",
                max_rows,
                dataset.data_len(),
                provider.name()
            ));
            dataset.truncated(max_rows)
        } else {
            dataset.clone()
        };

        match call_with_retry(provider.as_ref(), &sent, &self.policy).await {
            Ok(analysis) => {
                let adopted = adopt(&self.detection, dataset, today, provider.name(), &analysis.anomalies);
                warnings.extend(adopted.warnings);

                let sources = if mode.uses_rules() {
                    vec![rule_based(), adopted.anomalies]
                } else {
                    vec![adopted.anomalies]
                };
                let mut report = self.detection.finalize(mode, dataset, sources, warnings);
                let insights = analysis.insights.trim();
                if !insights.is_empty() {
                    report.insights = Some(insights.to_string());
                }
                report
            }
            Err(e) => {
                warnings.push(format!(
                    "AI provider {} failed ({}); using rule-based detection",
                    provider.name(),
                    e
                ));
                self.detection
                    .finalize(mode, dataset, vec![rule_based()], warnings)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectionConfig;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails `failures` times with the given error kind, then answers
    struct ScriptedProvider {
        failures: usize,
        retryable: bool,
        delay: Duration,
        calls: AtomicUsize,
        answer: JsonValue,
    }

    impl ScriptedProvider {
        fn answering(answer: JsonValue) -> Self {
            Self {
                failures: 0,
                retryable: true,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                answer,
            }
        }
    }

    #[async_trait]
    impl AnomalyProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn analyze(&self, _dataset: &Dataset) -> Result<ProviderAnalysis> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if call < self.failures {
                return Err(if self.retryable {
                    Error::provider_transient("503")
                } else {
                    Error::provider_fatal("401")
                });
            }
            Ok(ProviderAnalysis::from_value(self.answer.clone()))
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(5),
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn dataset() -> Dataset {
        Dataset::from_text_rows(vec![
            vec!["Date", "Amount", "Description"],
            vec!["2024-01-15", "12.5", "Coffee"],
            vec!["2024-01-16", "", "Lunch"],
            vec!["2024-01-17", "30", "Books"],
        ])
    }

    fn service(mode: DetectionAlgorithm, provider: Option<Arc<dyn AnomalyProvider>>) -> AssistService {
        let mut config = DetectionConfig::default();
        config.detection_algorithm = mode;
        let detection = DetectionService::new(config).unwrap();
        AssistService::new(detection, provider).with_policy(policy())
    }

    #[test]
    fn test_shift_rows() {
        let shifted = shift_rows(&json!([
            {"row": 0}, {"row": "3"}, {"row": -1}, {"row": 1.5}, {"errors": []}, "x"
        ]));
        assert_eq!(
            shifted,
            json!([{"row": 2}, {"row": 5}, {"row": -1}, {"row": 1.5}, {"errors": []}, "x"])
        );
        assert_eq!(shift_rows(&json!({"row": 1})), json!({"row": 1}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures_with_backoff() {
        let provider = ScriptedProvider {
            failures: 2,
            ..ScriptedProvider::answering(json!([]))
        };
        let start = tokio::time::Instant::now();
        let result = call_with_retry(&provider, &dataset(), &policy()).await;
        assert!(result.is_ok());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        // 100ms + 200ms of backoff
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let provider = ScriptedProvider {
            failures: 10,
            ..ScriptedProvider::answering(json!([]))
        };
        let result = call_with_retry(&provider, &dataset(), &policy()).await;
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_errors_are_not_retried() {
        let provider = ScriptedProvider {
            failures: 1,
            retryable: false,
            ..ScriptedProvider::answering(json!([]))
        };
        assert!(call_with_retry(&provider, &dataset(), &policy()).await.is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient() {
        let provider = ScriptedProvider {
            delay: Duration::from_secs(60),
            ..ScriptedProvider::answering(json!([]))
        };
        let err = call_with_retry(&provider, &dataset(), &policy()).await.unwrap_err();
        assert!(err.to_string().contains("did not answer within 5s"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_hybrid_merges_provider_rows() {
        let provider = Arc::new(ScriptedProvider::answering(json!({
            "anomalies": [
                {"row": 1, "errors": ["Amount missing for a recurring purchase"], "confidence": 0.4},
                {"row": 2, "errors": "Unusual vendor", "confidence": 0.6},
                {"row": 40, "errors": ["Out of range"], "confidence": 0.9}
            ],
            "insights": "Two rows look odd"
        })));
        let report = service(DetectionAlgorithm::Hybrid, Some(provider))
            .detect(&dataset(), today())
            .await;

        assert_eq!(report.mode, DetectionAlgorithm::Hybrid);
        assert_eq!(report.insights.as_deref(), Some("Two rows look odd"));
        assert!(report.warnings.iter().any(|w| w.contains("Dropped 1")));

        let row3 = report.anomalies.iter().find(|a| a.row == 3).unwrap();
        assert!(row3.errors.contains(&"amount is missing".to_string()));
        assert!(row3
            .errors
            .contains(&"Amount missing for a recurring purchase".to_string()));

        let row4 = report.anomalies.iter().find(|a| a.row == 4).unwrap();
        assert_eq!(row4.errors, vec!["Unusual vendor"]);
        assert!((row4.confidence - 0.6).abs() < 1e-9);
        assert_eq!(row4.snapshot.description.display(), "Books");
    }

    #[tokio::test]
    async fn test_hybrid_scores_every_keyword_in_provider_messages() {
        let provider = Arc::new(ScriptedProvider::answering(json!([
            {"row": 0, "errors": ["Invalid vendor: tax id missing"], "confidence": 0.4},
            {"row": 2, "errors": ["Suspicious split, receipt required"], "confidence": 0.5}
        ])));
        let report = service(DetectionAlgorithm::Hybrid, Some(provider))
            .detect(&dataset(), today())
            .await;

        // 0.4 + 0.2 (Invalid) + 0.1 (missing)
        let row2 = report.anomalies.iter().find(|a| a.row == 2).unwrap();
        assert_eq!(row2.errors, vec!["Invalid vendor: tax id missing"]);
        assert!((row2.confidence - 0.7).abs() < 1e-9);

        // 0.5 - 0.1 (Suspicious) + 0.1 (required)
        let row4 = report.anomalies.iter().find(|a| a.row == 4).unwrap();
        assert!((row4.confidence - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_ai_mode_uses_provider_only() {
        let provider = Arc::new(ScriptedProvider::answering(json!([
            {"row": 0, "errors": ["Looks odd"], "confidence": 0.7}
        ])));
        let report = service(DetectionAlgorithm::Ai, Some(provider))
            .detect(&dataset(), today())
            .await;
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].row, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_failure_falls_back_to_rules() {
        let provider = Arc::new(ScriptedProvider {
            failures: usize::MAX,
            retryable: false,
            ..ScriptedProvider::answering(json!([]))
        });
        let report = service(DetectionAlgorithm::Ai, Some(provider))
            .detect(&dataset(), today())
            .await;
        assert!(report.warnings.iter().any(|w| w.contains("failed")));
        assert!(report.anomalies.iter().any(|a| a.row == 3));
    }

    #[tokio::test]
    async fn test_missing_provider_is_a_warning() {
        let report = service(DetectionAlgorithm::Hybrid, None)
            .detect(&dataset(), today())
            .await;
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.anomalies.len(), 1);
    }
}
