//! Anomaly merger
//!
//! Combines anomaly lists keyed by row: reasons are unioned in order of
//! first occurrence (deduplicated by message) and the highest confidence
//! wins. An unset confidence counts as 1.0.

use std::collections::HashMap;

use crate::domain::{Anomaly, Reason};

/// Merge any number of anomaly lists into one anomaly per row
///
/// Rows keep the position of their first appearance.
pub fn merge<I>(sources: I) -> Vec<Anomaly>
where
    I: IntoIterator<Item = Vec<Anomaly>>,
{
    let mut merged: Vec<Anomaly> = Vec::new();
    let mut by_row: HashMap<usize, usize> = HashMap::new();

    for anomaly in sources.into_iter().flatten() {
        match by_row.get(&anomaly.row) {
            Some(&slot) => absorb(&mut merged[slot], anomaly),
            None => {
                by_row.insert(anomaly.row, merged.len());
                merged.push(dedup_reasons(anomaly));
            }
        }
    }
    merged
}

fn dedup_reasons(mut anomaly: Anomaly) -> Anomaly {
    let mut kept = Vec::with_capacity(anomaly.reasons.len());
    for reason in anomaly.reasons.drain(..) {
        if !kept.iter().any(|r: &Reason| r.message == reason.message) {
            kept.push(reason);
        }
    }
    anomaly.reasons = kept;
    anomaly
}

fn absorb(target: &mut Anomaly, other: Anomaly) {
    for reason in other.reasons {
        if !target.reasons.iter().any(|r| r.message == reason.message) {
            target.reasons.push(reason);
        }
    }
    target.confidence = max_confidence(target.confidence, other.confidence);
}

fn max_confidence(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        // unset scores as 1.0, which nothing can exceed
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Snapshot;

    fn anomaly(row: usize, errors: &[&str], confidence: Option<f64>) -> Anomaly {
        let reasons = errors.iter().map(|e| Reason::general(*e)).collect();
        let mut a = Anomaly::new(row, reasons, Snapshot::default());
        a.confidence = confidence;
        a
    }

    #[test]
    fn test_same_row_unions_and_takes_max() {
        let merged = merge(vec![
            vec![anomaly(5, &["A"], Some(0.6))],
            vec![anomaly(5, &["B"], Some(0.9))],
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].row, 5);
        assert_eq!(merged[0].messages(), vec!["A", "B"]);
        assert_eq!(merged[0].confidence, Some(0.9));
    }

    #[test]
    fn test_merge_outcome_is_commutative() {
        let a = vec![anomaly(5, &["A", "C"], Some(0.6)), anomaly(7, &["X"], Some(0.4))];
        let b = vec![anomaly(5, &["B", "A"], Some(0.9))];

        let ab = merge(vec![a.clone(), b.clone()]);
        let ba = merge(vec![b, a]);
        for row in [5, 7] {
            let left = ab.iter().find(|x| x.row == row).unwrap();
            let right = ba.iter().find(|x| x.row == row).unwrap();
            let mut l = left.messages();
            let mut r = right.messages();
            l.sort();
            r.sort();
            assert_eq!(l, r);
            assert_eq!(left.confidence, right.confidence);
        }
    }

    #[test]
    fn test_duplicate_messages_within_one_source() {
        let merged = merge(vec![vec![
            anomaly(3, &["Dup", "Dup"], Some(0.5)),
            anomaly(3, &["Dup", "Other"], Some(0.2)),
        ]]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].messages(), vec!["Dup", "Other"]);
        assert_eq!(merged[0].confidence, Some(0.5));
    }

    #[test]
    fn test_unset_confidence_dominates() {
        let merged = merge(vec![
            vec![anomaly(2, &["A"], None)],
            vec![anomaly(2, &["B"], Some(0.7))],
        ]);
        assert_eq!(merged[0].confidence, None);
    }

    #[test]
    fn test_first_appearance_order() {
        let merged = merge(vec![
            vec![anomaly(9, &["A"], None), anomaly(4, &["B"], None)],
            vec![anomaly(2, &["C"], None), anomaly(9, &["D"], None)],
        ]);
        let rows: Vec<usize> = merged.iter().map(|a| a.row).collect();
        assert_eq!(rows, vec![9, 4, 2]);
    }
}
