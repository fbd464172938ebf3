//! Output validator and repairer
//!
//! The anomaly list is checked as raw JSON because part of it may come
//! from an external provider. Validation fails fast on the first broken
//! element; repair never fails and returns a possibly smaller list of
//! well-formed records.

use serde_json::{Map, Value};

use crate::domain::dataset::parse_amount;
use crate::domain::result::{ContractViolation, ViolationKind};
use crate::domain::{AnomalyRecord, Snapshot, SnapshotValue, NOT_AVAILABLE, ROW_OFFSET};

/// Placeholder for anomalies whose errors could not be recovered
pub const UNSPECIFIED_ERROR: &str = "Unspecified anomaly";

/// Confidence assigned when none can be read
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Records after contract enforcement
#[derive(Debug, Clone, PartialEq)]
pub struct Enforced {
    pub records: Vec<AnomalyRecord>,
    /// Set when the input needed repair
    pub violation: Option<ContractViolation>,
}

/// Check the anomaly list, stopping at the first offending element
pub fn validate(value: &Value) -> Result<(), ContractViolation> {
    let Value::Array(items) = value else {
        return Err(violation(None, ViolationKind::NotAList));
    };
    for (index, item) in items.iter().enumerate() {
        validate_item(item).map_err(|problem| violation(Some(index), problem))?;
    }
    Ok(())
}

fn violation(index: Option<usize>, problem: ViolationKind) -> ContractViolation {
    ContractViolation { index, problem }
}

fn validate_item(item: &Value) -> Result<(), ViolationKind> {
    let Value::Object(obj) = item else {
        return Err(ViolationKind::NotAnObject);
    };
    if obj.get("row").and_then(read_row).is_none() {
        return Err(ViolationKind::MissingRow);
    }
    match obj.get("errors") {
        Some(Value::String(s)) if !s.trim().is_empty() => {}
        Some(Value::Array(list)) if !list.is_empty() => {}
        _ => return Err(ViolationKind::BadErrors),
    }
    match obj.get("amount") {
        None | Some(Value::Number(_)) => {}
        Some(Value::String(s)) if s == NOT_AVAILABLE || parse_amount(s).is_some() => {}
        Some(other) => return Err(ViolationKind::BadAmount(display_raw(other))),
    }
    Ok(())
}

fn display_raw(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Validate, and repair instead of failing when the list is broken
pub fn enforce(value: &Value) -> Enforced {
    let found = match validate(value) {
        Ok(()) => match serde_json::from_value::<Vec<AnomalyRecord>>(value.clone()) {
            Ok(records) if records.iter().all(is_well_formed) => {
                return Enforced {
                    records,
                    violation: None,
                }
            }
            Ok(_) => violation(None, ViolationKind::Malformed("confidence out of range".into())),
            Err(e) => violation(None, ViolationKind::Malformed(e.to_string())),
        },
        Err(v) => v,
    };
    Enforced {
        records: repair(value),
        violation: Some(found),
    }
}

fn is_well_formed(record: &AnomalyRecord) -> bool {
    record.row >= ROW_OFFSET
        && !record.errors.is_empty()
        && (0.0..=1.0).contains(&record.confidence)
}

/// Self-heal an anomaly list
///
/// Elements without a usable row are dropped, `errors` is coerced to a
/// non-empty list, and confidence defaults to 0.5 or is clamped. Feeding
/// the output back in yields the same list.
pub fn repair(value: &Value) -> Vec<AnomalyRecord> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(obj) => repair_item(obj),
            _ => None,
        })
        .collect()
}

fn repair_item(obj: &Map<String, Value>) -> Option<AnomalyRecord> {
    let row = obj.get("row").and_then(read_row)?;
    Some(AnomalyRecord {
        row,
        errors: repair_errors(obj.get("errors")),
        confidence: repair_confidence(obj.get("confidence")),
        snapshot: Snapshot {
            amount: repair_amount(obj.get("amount")),
            date: repair_field(obj.get("date")),
            description: repair_field(obj.get("description")),
            category: repair_field(obj.get("category")),
            email: repair_field(obj.get("email")),
            transaction_type: repair_field(obj.get("transaction_type")),
        },
    })
}

/// A row number: a whole number, or numeric text, no smaller than the header offset
fn read_row(value: &Value) -> Option<usize> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if n.fract() != 0.0 || n < ROW_OFFSET as f64 || n > u32::MAX as f64 {
        return None;
    }
    Some(n as usize)
}

fn repair_errors(value: Option<&Value>) -> Vec<String> {
    let errors: Vec<String> = match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    };
    let errors: Vec<String> = errors.into_iter().filter(|s| !s.trim().is_empty()).collect();
    if errors.is_empty() {
        vec![UNSPECIFIED_ERROR.to_string()]
    } else {
        errors
    }
}

fn repair_confidence(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
        _ => DEFAULT_CONFIDENCE,
    }
}

fn repair_amount(value: Option<&Value>) -> SnapshotValue {
    match value {
        Some(Value::Number(n)) => n
            .as_f64()
            .map(SnapshotValue::Number)
            .unwrap_or_default(),
        Some(Value::String(s)) if parse_amount(s).is_some() => SnapshotValue::Text(s.clone()),
        _ => SnapshotValue::not_available(),
    }
}

fn repair_field(value: Option<&Value>) -> SnapshotValue {
    match value {
        Some(Value::String(s)) => SnapshotValue::Text(s.clone()),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(SnapshotValue::Number)
            .unwrap_or_default(),
        Some(Value::Bool(b)) => SnapshotValue::Text(b.to_string()),
        _ => SnapshotValue::not_available(),
    }
}

/// Serialize records back into the raw list shape
pub fn to_value(records: &[AnomalyRecord]) -> Value {
    Value::Array(records.iter().map(AnomalyRecord::to_json).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_accepts_well_formed() {
        let list = json!([
            {"row": 2, "errors": ["A"], "confidence": 0.9, "amount": 12.5},
            {"row": 3, "errors": "B", "confidence": 0.4, "amount": "N/A"},
            {"row": 4, "errors": ["C"], "confidence": 0.4, "amount": "1,200.00"},
        ]);
        assert!(validate(&list).is_ok());
    }

    #[test]
    fn test_validate_names_offending_index() {
        let err = validate(&json!({"row": 2})).unwrap_err();
        assert_eq!(err.problem, ViolationKind::NotAList);

        let err = validate(&json!([{"row": 2, "errors": ["A"]}, "oops"])).unwrap_err();
        assert_eq!(err.index, Some(1));
        assert_eq!(err.problem, ViolationKind::NotAnObject);

        let err = validate(&json!([{"errors": ["A"]}])).unwrap_err();
        assert_eq!(err.problem, ViolationKind::MissingRow);

        let err = validate(&json!([{"row": 2, "errors": 7}])).unwrap_err();
        assert_eq!(err.problem, ViolationKind::BadErrors);

        let err = validate(&json!([{"row": 2, "errors": ["A"], "amount": "lots"}])).unwrap_err();
        assert_eq!(err.problem, ViolationKind::BadAmount("lots".into()));
        assert!(err.to_string().contains("index 0"));
    }

    #[test]
    fn test_repair_heals_and_drops() {
        let list = json!([
            {"errors": ["no row"]},
            "not an object",
            {"row": 5, "errors": "Single", "confidence": 3.5},
            {"row": "6", "errors": {"bad": true}},
            {"row": 7, "errors": ["A", 42, ""], "confidence": "0.25", "amount": "lots"},
            {"row": 1, "errors": ["header row"]},
        ]);
        let records = repair(&list);
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].row, 5);
        assert_eq!(records[0].errors, vec!["Single"]);
        assert_eq!(records[0].confidence, 1.0);

        assert_eq!(records[1].row, 6);
        assert_eq!(records[1].errors, vec![UNSPECIFIED_ERROR]);
        assert_eq!(records[1].confidence, DEFAULT_CONFIDENCE);
        assert!(records[1].snapshot.date.is_not_available());

        assert_eq!(records[2].errors, vec!["A", "42"]);
        assert_eq!(records[2].confidence, 0.25);
        assert!(records[2].snapshot.amount.is_not_available());
    }

    #[test]
    fn test_repair_is_idempotent() {
        let list = json!([
            {"row": 5, "errors": "Single", "confidence": -1},
            {"row": 8.0, "errors": [], "amount": "$40", "date": 45000},
            {"row": 9, "errors": ["x"], "confidence": null, "category": true},
        ]);
        let once = repair(&list);
        let twice = repair(&to_value(&once));
        assert_eq!(once, twice);
        assert!(validate(&to_value(&once)).is_ok());
    }

    #[test]
    fn test_enforce_passes_valid_lists_through() {
        let list = json!([{"row": 2, "errors": ["A"], "confidence": 0.3}]);
        let enforced = enforce(&list);
        assert!(enforced.violation.is_none());
        assert_eq!(enforced.records[0].confidence, 0.3);
        assert!(enforced.records[0].snapshot.amount.is_not_available());
    }

    #[test]
    fn test_enforce_repairs_shape_mismatch() {
        // structurally valid but confidence is missing
        let list = json!([{"row": 2, "errors": ["A"]}]);
        let enforced = enforce(&list);
        assert!(matches!(
            enforced.violation.as_ref().map(|v| &v.problem),
            Some(ViolationKind::Malformed(_))
        ));
        assert_eq!(enforced.records[0].confidence, DEFAULT_CONFIDENCE);

        let enforced = enforce(&json!("nope"));
        assert!(enforced.records.is_empty());
        assert!(enforced.violation.is_some());
    }
}
