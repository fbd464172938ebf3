//! Statistical outlier detection over the amount column
//!
//! Runs once per dataset on the amounts collected by the field validators.

use crate::config::{OutlierMethod, OutlierRules};
use crate::domain::dataset::format_number;
use crate::domain::{Anomaly, Reason};
use crate::services::context::ScanContext;

/// Base confidence of an outlier anomaly
pub const OUTLIER_CONFIDENCE: f64 = 0.8;

/// Population mean and standard deviation
pub fn mean_and_stddev(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

/// Detection-side quartiles over an already sorted slice
///
/// `Q1 = sorted[floor((n+1)/4) - 1]`, `Q3 = sorted[floor(3(n+1)/4) - 1]`.
/// Needs at least three values for both indices to be in range.
pub fn detection_quartiles(sorted: &[f64]) -> Option<(f64, f64)> {
    let n = sorted.len();
    if n < 3 {
        return None;
    }
    let q1 = sorted[(n + 1) / 4 - 1];
    let q3 = sorted[3 * (n + 1) / 4 - 1];
    Some((q1, q3))
}

/// Flag collected amounts with the configured method
pub fn detect_outliers(ctx: &ScanContext, amounts: &[(usize, f64)]) -> Vec<Anomaly> {
    let rules = &ctx.config.outliers;
    if !rules.check {
        return Vec::new();
    }
    let flagged = match rules.method {
        OutlierMethod::Zscore => zscore_outliers(amounts, rules),
        OutlierMethod::Iqr => iqr_outliers(amounts, rules),
        OutlierMethod::None => Vec::new(),
    };

    flagged
        .into_iter()
        .map(|(index, reason)| {
            Anomaly::new(ctx.row_number(index), vec![reason], ctx.snapshot(index))
                .with_confidence(OUTLIER_CONFIDENCE)
        })
        .collect()
}

fn zscore_outliers(amounts: &[(usize, f64)], rules: &OutlierRules) -> Vec<(usize, Reason)> {
    let values: Vec<f64> = amounts.iter().map(|(_, a)| *a).collect();
    let Some((mean, stddev)) = mean_and_stddev(&values) else {
        return Vec::new();
    };
    if stddev == 0.0 {
        return Vec::new();
    }

    amounts
        .iter()
        .filter(|(_, amount)| (amount - mean).abs() > rules.threshold * stddev)
        .map(|(index, amount)| {
            let z = (amount - mean) / stddev;
            let reason = Reason::general(format!(
                "Statistical outlier: amount {} has a z-score of {:.2} (mean {:.2}, std dev {:.2})",
                format_number(*amount),
                z,
                mean,
                stddev
            ));
            (*index, reason)
        })
        .collect()
}

fn iqr_outliers(amounts: &[(usize, f64)], rules: &OutlierRules) -> Vec<(usize, Reason)> {
    let mut sorted: Vec<f64> = amounts.iter().map(|(_, a)| *a).collect();
    sorted.sort_by(f64::total_cmp);
    let Some((q1, q3)) = detection_quartiles(&sorted) else {
        return Vec::new();
    };
    let iqr = q3 - q1;
    let lower = q1 - rules.iqr_factor * iqr;
    let upper = q3 + rules.iqr_factor * iqr;

    amounts
        .iter()
        .filter(|(_, amount)| *amount < lower || *amount > upper)
        .map(|(index, amount)| {
            let reason = Reason::general(format!(
                "Statistical outlier: amount {} is outside the expected range [{:.2}, {:.2}]",
                format_number(*amount),
                lower,
                upper
            ));
            (*index, reason)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed(values: &[f64]) -> Vec<(usize, f64)> {
        values.iter().copied().enumerate().collect()
    }

    fn rules(method: OutlierMethod, threshold: f64) -> OutlierRules {
        OutlierRules {
            check: true,
            method,
            threshold,
            iqr_factor: 1.5,
        }
    }

    #[test]
    fn test_mean_and_stddev() {
        let (mean, sd) = mean_and_stddev(&[10.0, 10.0, 10.0, 10.0, 1000.0]).unwrap();
        assert_eq!(mean, 208.0);
        assert!((sd - 396.0).abs() < 1e-9);
        assert!(mean_and_stddev(&[]).is_none());
    }

    #[test]
    fn test_zscore_flags_only_the_spike() {
        // Population z of a single spike among n values is sqrt(n - 1)
        let amounts = indexed(&[10.0, 10.0, 10.0, 10.0, 1000.0]);
        let flagged = zscore_outliers(&amounts, &rules(OutlierMethod::Zscore, 1.9));
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].0, 4);
        assert!(flagged[0].1.message.starts_with("Statistical outlier: amount 1000"));

        let mut long = vec![10.0; 19];
        long.push(1000.0);
        let flagged = zscore_outliers(&indexed(&long), &rules(OutlierMethod::Zscore, 3.0));
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].0, 19);
    }

    #[test]
    fn test_zscore_skips_constant_amounts() {
        let amounts = indexed(&[5.0, 5.0, 5.0]);
        assert!(zscore_outliers(&amounts, &rules(OutlierMethod::Zscore, 0.1)).is_empty());
    }

    #[test]
    fn test_detection_quartile_indices() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        assert_eq!(detection_quartiles(&sorted), Some((2.0, 7.0)));
        assert_eq!(detection_quartiles(&[1.0, 2.0]), None);
        assert_eq!(detection_quartiles(&[1.0, 2.0, 3.0]), Some((1.0, 3.0)));
    }

    #[test]
    fn test_iqr_bounds() {
        // n = 10: Q1 = sorted[1] = 2, Q3 = sorted[7] = 8, bounds [-7, 17]
        let amounts = indexed(&[3.0, 1.0, 2.0, 4.0, 5.0, 6.0, 7.0, 8.0, 14.0, 15.0]);
        let flagged = iqr_outliers(&amounts, &rules(OutlierMethod::Iqr, 3.0));
        assert!(flagged.is_empty());

        // n = 8: Q1 = 2, Q3 = 6, bounds [-4, 12]
        let amounts = indexed(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 15.0]);
        let flagged = iqr_outliers(&amounts, &rules(OutlierMethod::Iqr, 3.0));
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].0, 7);
        assert!(flagged[0].1.message.contains("[-4.00, 12.00]"));
    }
}
