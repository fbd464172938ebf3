//! Behavioral pattern heuristics
//!
//! Round amounts, repeated amounts, weekend dates and same-day bursts in a
//! single category. Each check emits its own anomalies with a base
//! confidence; rows hit by several checks are combined by the merger.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate, Weekday};

use crate::domain::dataset::format_number;
use crate::domain::header::columns;
use crate::domain::{Anomaly, Reason};
use crate::services::context::ScanContext;

/// Minimum number of data rows before patterns mean anything
pub const MIN_PATTERN_ROWS: usize = 5;

pub const ROUND_NUMBER_CONFIDENCE: f64 = 1.0;
pub const FREQUENT_AMOUNT_CONFIDENCE: f64 = 0.7;
pub const WEEKEND_CONFIDENCE: f64 = 0.5;
pub const SAME_DAY_CONFIDENCE: f64 = 0.6;

/// Occurrences needed before an amount counts as frequent
pub fn frequency_threshold(row_count: usize) -> usize {
    let tenth = (row_count as f64 * 0.1).ceil() as usize;
    tenth.max(3)
}

/// Run every enabled pattern check
pub fn detect_patterns(ctx: &ScanContext) -> Vec<Anomaly> {
    let switches = &ctx.config.patterns;
    if !switches.enabled || ctx.len() < MIN_PATTERN_ROWS {
        return Vec::new();
    }

    let mut anomalies = Vec::new();
    if switches.round_numbers {
        anomalies.extend(round_numbers(ctx));
    }
    if switches.frequent_amounts {
        anomalies.extend(frequent_amounts(ctx));
    }
    if switches.weekend_transactions {
        anomalies.extend(weekend_transactions(ctx));
    }
    if switches.same_day_category {
        anomalies.extend(same_day_clusters(ctx));
    }
    anomalies
}

fn flag(ctx: &ScanContext, index: usize, reason: Reason, confidence: f64) -> Anomaly {
    Anomaly::new(ctx.row_number(index), vec![reason], ctx.snapshot(index)).with_confidence(confidence)
}

fn round_numbers(ctx: &ScanContext) -> Vec<Anomaly> {
    let threshold = ctx.config.round_number_threshold;
    (0..ctx.len())
        .filter_map(|index| {
            let amount = ctx.amount(index)?;
            if amount.abs() >= threshold && amount % threshold == 0.0 {
                let reason = Reason::suspicious(format!(
                    "Suspicious round number amount: {}",
                    format_number(amount)
                ));
                Some(flag(ctx, index, reason, ROUND_NUMBER_CONFIDENCE))
            } else {
                None
            }
        })
        .collect()
}

/// Group key for an exact amount; `-0.0` and `0.0` share a group
fn amount_key(amount: f64) -> u64 {
    if amount == 0.0 {
        0.0f64.to_bits()
    } else {
        amount.to_bits()
    }
}

fn frequent_amounts(ctx: &ScanContext) -> Vec<Anomaly> {
    let threshold = frequency_threshold(ctx.len());
    let amounts: Vec<(usize, f64)> = (0..ctx.len())
        .filter_map(|index| ctx.amount(index).map(|a| (index, a)))
        .collect();

    let mut counts: HashMap<u64, usize> = HashMap::new();
    for (_, amount) in &amounts {
        *counts.entry(amount_key(*amount)).or_default() += 1;
    }

    amounts
        .into_iter()
        .filter_map(|(index, amount)| {
            let count = counts.get(&amount_key(amount)).copied().unwrap_or(0);
            if count >= threshold {
                let reason = Reason::frequent(format!(
                    "Unusually frequent amount: {} appears {} times",
                    format_number(amount),
                    count
                ));
                Some(flag(ctx, index, reason, FREQUENT_AMOUNT_CONFIDENCE))
            } else {
                None
            }
        })
        .collect()
}

fn weekend_transactions(ctx: &ScanContext) -> Vec<Anomaly> {
    (0..ctx.len())
        .filter_map(|index| {
            let date = ctx.date(index)?;
            let day = match date.weekday() {
                Weekday::Sat => "Saturday",
                Weekday::Sun => "Sunday",
                _ => return None,
            };
            let reason = Reason::general(format!(
                "Weekend transaction on {} ({})",
                date.format("%Y-%m-%d"),
                day
            ));
            Some(flag(ctx, index, reason, WEEKEND_CONFIDENCE))
        })
        .collect()
}

fn same_day_clusters(ctx: &ScanContext) -> Vec<Anomaly> {
    if !ctx.header.contains(columns::CATEGORY) {
        return Vec::new();
    }

    // date -> category -> data indices, ordered for stable output
    let mut groups: BTreeMap<NaiveDate, BTreeMap<String, Vec<usize>>> = BTreeMap::new();
    for index in 0..ctx.len() {
        let (Some(date), Some(category)) = (ctx.date(index), ctx.text(index, columns::CATEGORY))
        else {
            continue;
        };
        groups
            .entry(date)
            .or_default()
            .entry(category)
            .or_default()
            .push(index);
    }

    let mut anomalies = Vec::new();
    for (date, categories) in groups {
        for (category, indices) in categories {
            if indices.len() < 2 {
                continue;
            }
            for index in indices {
                let reason = Reason::general(format!(
                    "Multiple {} transactions on {}",
                    category,
                    date.format("%Y-%m-%d")
                ));
                anomalies.push(flag(ctx, index, reason, SAME_DAY_CONFIDENCE));
            }
        }
    }
    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectionConfig;
    use crate::domain::{Dataset, ReasonKind};
    use crate::services::context::CompiledRules;

    fn run_with(rows: Vec<Vec<String>>, config: &DetectionConfig) -> Vec<Anomaly> {
        let dataset = Dataset::from_text_rows(rows);
        let rules = CompiledRules::compile(config).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let ctx = ScanContext::new(&dataset, config, &rules, today);
        detect_patterns(&ctx)
    }

    fn only(switch: &str) -> DetectionConfig {
        let mut config = DetectionConfig::default();
        config.patterns.round_numbers = switch == "round";
        config.patterns.frequent_amounts = switch == "frequent";
        config.patterns.weekend_transactions = switch == "weekend";
        config.patterns.same_day_category = switch == "same_day";
        config
    }

    fn amount_rows(amounts: &[&str]) -> Vec<Vec<String>> {
        let mut rows = vec![vec!["Amount".to_string()]];
        rows.extend(amounts.iter().map(|a| vec![a.to_string()]));
        rows
    }

    #[test]
    fn test_frequency_threshold() {
        assert_eq!(frequency_threshold(5), 3);
        assert_eq!(frequency_threshold(30), 3);
        assert_eq!(frequency_threshold(40), 4);
        assert_eq!(frequency_threshold(41), 5);
    }

    #[test]
    fn test_frequent_amounts_at_threshold() {
        let mut amounts: Vec<String> = (0..33).map(|i| format!("{}.25", i + 100)).collect();
        amounts.extend(std::iter::repeat("7.5".to_string()).take(4));
        amounts.extend(std::iter::repeat("8.5".to_string()).take(3));
        let refs: Vec<&str> = amounts.iter().map(|s| s.as_str()).collect();
        assert_eq!(refs.len(), 40);

        let anomalies = run_with(amount_rows(&refs), &only("frequent"));
        let rows: Vec<usize> = anomalies.iter().map(|a| a.row).collect();
        assert_eq!(rows, vec![35, 36, 37, 38]);
        assert_eq!(anomalies[0].confidence, Some(FREQUENT_AMOUNT_CONFIDENCE));
        assert_eq!(anomalies[0].reasons[0].kind, ReasonKind::Frequent);
    }

    #[test]
    fn test_round_numbers() {
        let anomalies = run_with(
            amount_rows(&["100", "250", "-300", "99.99", "50", "1,000"]),
            &only("round"),
        );
        let rows: Vec<usize> = anomalies.iter().map(|a| a.row).collect();
        assert_eq!(rows, vec![2, 4, 7]);
        assert_eq!(
            anomalies[1].messages(),
            vec!["Suspicious round number amount: -300"]
        );
        assert_eq!(anomalies[0].reasons[0].kind, ReasonKind::Suspicious);
    }

    #[test]
    fn test_too_few_rows() {
        let anomalies = run_with(amount_rows(&["100", "200", "300", "400"]), &only("round"));
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_weekend_transactions() {
        let rows = vec![
            vec!["Date".to_string()],
            vec!["2024-03-08".to_string()], // Friday
            vec!["2024-03-09".to_string()], // Saturday
            vec!["2024-03-10".to_string()], // Sunday
            vec!["2024-03-11".to_string()],
            vec!["garbage".to_string()],
        ];
        let anomalies = run_with(rows, &only("weekend"));
        assert_eq!(anomalies.len(), 2);
        assert_eq!(anomalies[0].row, 3);
        assert_eq!(
            anomalies[0].messages(),
            vec!["Weekend transaction on 2024-03-09 (Saturday)"]
        );
        assert_eq!(anomalies[1].confidence, Some(WEEKEND_CONFIDENCE));
    }

    #[test]
    fn test_same_day_clusters() {
        let rows: Vec<Vec<String>> = [
            ["Date", "Category"],
            ["2024-03-11", "Travel"],
            ["2024-03-11", "Travel"],
            ["2024-03-11", "Office"],
            ["2024-03-12", "Travel"],
            ["03/11/2024", "Travel"],
            ["2024-03-11", ""],
            ["2024-03-11", ""],
        ]
        .iter()
        .map(|r| r.iter().map(|s| s.to_string()).collect())
        .collect();
        let anomalies = run_with(rows, &only("same_day"));
        let rows: Vec<usize> = anomalies.iter().map(|a| a.row).collect();
        assert_eq!(rows, vec![2, 3, 6]);
        assert_eq!(
            anomalies[0].messages(),
            vec!["Multiple Travel transactions on 2024-03-11"]
        );
    }

    #[test]
    fn test_disabled_switch() {
        let mut config = DetectionConfig::default();
        config.patterns.enabled = false;
        assert!(run_with(amount_rows(&["100", "200", "300", "400", "500"]), &config).is_empty());
    }
}
