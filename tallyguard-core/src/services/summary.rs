//! Report statistics for a dataset
//!
//! Descriptive numbers shown next to a scan. The quartiles here use the
//! reporting formula `sorted[floor(n * 0.25)]` / `sorted[floor(n * 0.75)]`,
//! which differs from the index arithmetic of the IQR outlier check.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::header::columns;
use crate::domain::AnomalyRecord;
use crate::services::context::ScanContext;
use crate::services::outliers::mean_and_stddev;

/// Label for rows without a category
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Confidence at or above which an anomaly counts as high
pub const HIGH_CONFIDENCE: f64 = 0.8;

/// Confidence at or above which an anomaly counts as medium
pub const MEDIUM_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub rows: usize,
    /// `None` when no amount parsed
    pub amounts: Option<AmountStats>,
    pub by_category: Vec<GroupTotal>,
    pub by_month: Vec<GroupTotal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomalies: Option<ConfidenceBands>,
}

impl DatasetSummary {
    /// Attach anomaly counts from a scan of the same dataset
    pub fn with_anomalies(mut self, anomalies: &[AnomalyRecord]) -> Self {
        self.anomalies = Some(confidence_bands(anomalies, self.rows));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmountStats {
    pub count: usize,
    pub total: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTotal {
    pub key: String,
    pub count: usize,
    pub total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfidenceBands {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    /// Share of data rows carrying at least one anomaly
    pub flagged_share: f64,
}

/// Reporting-side quartiles over a sorted, non-empty slice
pub fn reporting_quartiles(sorted: &[f64]) -> Option<(f64, f64)> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let q1 = sorted[(n as f64 * 0.25).floor() as usize];
    let q3 = sorted[((n as f64 * 0.75).floor() as usize).min(n - 1)];
    Some((q1, q3))
}

/// Median of a sorted, non-empty slice
pub fn median(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(sorted[n / 2]),
        _ => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
    }
}

pub fn amount_stats(values: &[f64]) -> Option<AmountStats> {
    let (mean, std_dev) = mean_and_stddev(values)?;
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let (q1, q3) = reporting_quartiles(&sorted)?;
    Some(AmountStats {
        count: values.len(),
        total: values.iter().sum(),
        mean,
        std_dev,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        median: median(&sorted)?,
        q1,
        q3,
    })
}

pub fn confidence_bands(anomalies: &[AnomalyRecord], rows: usize) -> ConfidenceBands {
    let mut bands = ConfidenceBands::default();
    for anomaly in anomalies {
        if anomaly.confidence >= HIGH_CONFIDENCE {
            bands.high += 1;
        } else if anomaly.confidence >= MEDIUM_CONFIDENCE {
            bands.medium += 1;
        } else {
            bands.low += 1;
        }
    }
    if rows > 0 {
        bands.flagged_share = anomalies.len() as f64 / rows as f64;
    }
    bands
}

/// Summarize the rows of a scan context
pub fn summarize(ctx: &ScanContext) -> DatasetSummary {
    let mut values = Vec::new();
    let mut categories: BTreeMap<String, GroupTotal> = BTreeMap::new();
    let mut months: BTreeMap<String, GroupTotal> = BTreeMap::new();
    let has_category = ctx.header.contains(columns::CATEGORY);

    for index in 0..ctx.len() {
        let Some(amount) = ctx.amount(index) else {
            continue;
        };
        values.push(amount);

        if has_category {
            let key = ctx
                .text(index, columns::CATEGORY)
                .unwrap_or_else(|| UNCATEGORIZED.to_string());
            add(&mut categories, key, amount);
        }
        if let Some(date) = ctx.date(index) {
            add(&mut months, date.format("%Y-%m").to_string(), amount);
        }
    }

    DatasetSummary {
        rows: ctx.len(),
        amounts: amount_stats(&values),
        by_category: categories.into_values().collect(),
        by_month: months.into_values().collect(),
        anomalies: None,
    }
}

fn add(groups: &mut BTreeMap<String, GroupTotal>, key: String, amount: f64) {
    let group = groups.entry(key.clone()).or_insert(GroupTotal {
        key,
        count: 0,
        total: 0.0,
    });
    group.count += 1;
    group.total += amount;
}
