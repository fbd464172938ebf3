//! Detection service - one deterministic pass over a dataset
//!
//! Field validators, the type rule engine, outlier detection and the
//! pattern detector run independently over the same rows. Their results
//! are merged by row, scored, checked against the output contract and
//! ranked.

use chrono::{Local, NaiveDate};
use serde::Serialize;
use uuid::Uuid;

use crate::config::{DetectionAlgorithm, DetectionConfig};
use crate::domain::result::Result;
use crate::domain::{Anomaly, AnomalyRecord, Dataset};
use crate::services::context::{CompiledRules, ScanContext};
use crate::services::{contract, merge, outliers, patterns, scoring, type_rules, validation};

/// Result of a detection run
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub run_id: Uuid,
    pub mode: DetectionAlgorithm,
    /// Data rows in the dataset (header excluded)
    pub rows_scanned: usize,
    /// Ranked by confidence, highest first, then by row
    pub anomalies: Vec<AnomalyRecord>,
    /// Recoverable problems met along the way
    pub warnings: Vec<String>,
    /// Free-text summary from an AI provider, when one ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insights: Option<String>,
}

impl DetectionReport {
    fn empty(mode: DetectionAlgorithm, rows_scanned: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode,
            rows_scanned,
            anomalies: Vec::new(),
            warnings: Vec::new(),
            insights: None,
        }
    }

    /// Anomalies at or above a confidence level
    pub fn above(&self, min_confidence: f64) -> impl Iterator<Item = &AnomalyRecord> {
        self.anomalies
            .iter()
            .filter(move |a| a.confidence >= min_confidence)
    }
}

/// Detection service
///
/// Holds a validated configuration with its patterns compiled once, so a
/// single service can scan any number of datasets.
pub struct DetectionService {
    config: DetectionConfig,
    rules: CompiledRules,
}

impl DetectionService {
    /// Create a service, rejecting configurations no detector can use
    pub fn new(config: DetectionConfig) -> Result<Self> {
        let rules = CompiledRules::compile(&config)?;
        Ok(Self { config, rules })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Shared read-only view of a dataset for the detectors
    pub fn context<'a>(&'a self, dataset: &'a Dataset, today: NaiveDate) -> ScanContext<'a> {
        ScanContext::new(dataset, &self.config, &self.rules, today)
    }

    /// Rule-based scan using the local date as "today"
    pub fn detect(&self, dataset: &Dataset) -> DetectionReport {
        self.detect_on(dataset, Local::now().date_naive())
    }

    /// Rule-based scan with an explicit reference date
    pub fn detect_on(&self, dataset: &Dataset, today: NaiveDate) -> DetectionReport {
        let candidates = self.rule_anomalies(dataset, today);
        self.finalize(DetectionAlgorithm::Standard, dataset, vec![candidates], Vec::new())
    }

    /// Run every rule-based detector and merge their results, unscored
    pub fn rule_anomalies(&self, dataset: &Dataset, today: NaiveDate) -> Vec<Anomaly> {
        if !dataset.has_data() {
            return Vec::new();
        }
        let ctx = self.context(dataset, today);

        let fields = validation::check_fields(&ctx);
        let outlier_hits = outliers::detect_outliers(&ctx, &fields.amounts);
        let type_hits = type_rules::check_types(&ctx);
        let pattern_hits = patterns::detect_patterns(&ctx);

        merge::merge([fields.anomalies, type_hits, outlier_hits, pattern_hits])
    }

    /// Merge candidate lists, score them and enforce the output contract
    pub fn finalize(
        &self,
        mode: DetectionAlgorithm,
        dataset: &Dataset,
        sources: Vec<Vec<Anomaly>>,
        mut warnings: Vec<String>,
    ) -> DetectionReport {
        let mut report = DetectionReport::empty(mode, dataset.data_len());
        if !dataset.has_data() {
            report.warnings = warnings;
            return report;
        }

        let mut merged = merge::merge(sources);
        scoring::score_all(&mut merged);

        let records: Vec<AnomalyRecord> = merged.into_iter().map(Anomaly::into_record).collect();
        let enforced = contract::enforce(&contract::to_value(&records));
        if let Some(violation) = enforced.violation {
            warnings.push(format!("Repaired malformed anomaly output: {}", violation));
        }

        let mut anomalies = enforced.records;
        rank(&mut anomalies);

        report.anomalies = anomalies;
        report.warnings = warnings;
        report
    }
}

/// Highest confidence first, ties broken by row
pub fn rank(anomalies: &mut [AnomalyRecord]) {
    anomalies.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.row.cmp(&b.row))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn service() -> DetectionService {
        DetectionService::new(DetectionConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_bad_config() {
        let mut config = DetectionConfig::default();
        config.outliers.threshold = 0.0;
        assert!(DetectionService::new(config).is_err());
    }

    #[test]
    fn test_header_only_dataset_is_empty_result() {
        let dataset = Dataset::from_text_rows(vec![vec!["Date", "Amount"]]);
        let report = service().detect_on(&dataset, today());
        assert!(report.anomalies.is_empty());
        assert_eq!(report.rows_scanned, 0);

        let report = service().detect_on(&Dataset::default(), today());
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn test_one_record_per_row() {
        let dataset = Dataset::from_text_rows(vec![
            vec!["Date", "Amount", "Description", "transaction_type"],
            vec!["2024-01-15", "50", "Taxi", "EXPENSE"],
            vec!["bad", "", "", "EXPENSE"],
        ]);
        let report = service().detect_on(&dataset, today());
        let rows: Vec<usize> = report.anomalies.iter().map(|a| a.row).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows.contains(&2));
        assert!(rows.contains(&3));

        let second = report.anomalies.iter().find(|a| a.row == 3).unwrap();
        assert!(second.errors.contains(&"Invalid date format".to_string()));
        assert!(second.errors.contains(&"amount is required for EXPENSE transactions".to_string()));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_ranking() {
        let mut records: Vec<AnomalyRecord> = [(4, 0.5), (2, 0.9), (3, 0.5), (5, 1.0)]
            .iter()
            .map(|(row, confidence)| AnomalyRecord {
                row: *row,
                errors: vec!["x".into()],
                confidence: *confidence,
                snapshot: Default::default(),
            })
            .collect();
        rank(&mut records);
        let rows: Vec<usize> = records.iter().map(|a| a.row).collect();
        assert_eq!(rows, vec![5, 2, 3, 4]);
    }
}
