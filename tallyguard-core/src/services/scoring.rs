//! Confidence scorer
//!
//! Applied once to every merged anomaly. Adjustments are driven by the
//! [`ReasonKind`]s of each reason, never by the message text. An external
//! reason can carry several kinds and collects each adjustment.

use crate::domain::{Anomaly, Reason, ReasonKind};

/// Added for every reason beyond the first
pub const EXTRA_REASON_BONUS: f64 = 0.1;

/// Lower bound applied once a down-weighting reason is present
pub const HEURISTIC_FLOOR: f64 = 0.3;

/// Per-reason adjustment
pub fn kind_adjustment(kind: ReasonKind) -> f64 {
    match kind {
        ReasonKind::Missing | ReasonKind::Required => 0.1,
        ReasonKind::Invalid | ReasonKind::NotAllowed => 0.2,
        ReasonKind::Suspicious | ReasonKind::Frequent => -0.1,
        ReasonKind::General => 0.0,
    }
}

fn is_heuristic(kind: ReasonKind) -> bool {
    matches!(kind, ReasonKind::Suspicious | ReasonKind::Frequent)
}

/// Final confidence of an anomaly, always within `[0, 1]`
pub fn score(anomaly: &Anomaly) -> f64 {
    let base = match anomaly.confidence {
        None => 1.0,
        Some(c) if c.is_nan() => 0.0,
        Some(c) => c,
    };
    let extra = anomaly.reasons.len().saturating_sub(1) as f64 * EXTRA_REASON_BONUS;
    let mut confidence = (base + extra).min(1.0);

    confidence += anomaly
        .reasons
        .iter()
        .flat_map(Reason::kinds)
        .map(kind_adjustment)
        .sum::<f64>();

    if anomaly.reasons.iter().flat_map(Reason::kinds).any(is_heuristic) {
        confidence = confidence.max(HEURISTIC_FLOOR);
    }

    confidence.clamp(0.0, 1.0)
}

/// Score every anomaly in place
pub fn score_all(anomalies: &mut [Anomaly]) {
    for anomaly in anomalies.iter_mut() {
        anomaly.confidence = Some(score(anomaly));
    }
}
